//! In-process brokerage and price feed used by tests and `MODE=mock`.

use crate::domain::errors::DashboardError;
use crate::domain::market::price_tick::PriceTick;
use crate::domain::market::timeframe::Timeframe;
use crate::domain::ports::{
    AccountService, ExecutionService, PriceStreamConnector, PriceStreamSession,
};
use crate::domain::trading::portfolio::{HistoryPeriod, PortfolioHistoryPoint, Position};
use crate::domain::trading::symbol::Symbol;
use crate::domain::trading::types::{LiquidationReport, OrderRequest, OrderResult};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub list_positions: usize,
    pub portfolio_history: usize,
    pub submit_order: usize,
    pub cancel_order: usize,
    pub close_all_positions: usize,
}

#[derive(Default)]
struct Counters {
    list_positions: AtomicUsize,
    portfolio_history: AtomicUsize,
    submit_order: AtomicUsize,
    cancel_order: AtomicUsize,
    close_all_positions: AtomicUsize,
}

/// Scripted brokerage. Counts every remote call it receives.
#[derive(Default)]
pub struct MockBrokerage {
    positions: Mutex<Vec<Position>>,
    history: Vec<PortfolioHistoryPoint>,
    delay: Option<Duration>,
    query_error: Option<DashboardError>,
    order_error: Option<DashboardError>,
    liquidation_error: Option<DashboardError>,
    counters: Counters,
    submitted: Mutex<Vec<OrderRequest>>,
    cancelled: Mutex<Vec<String>>,
    next_order_id: AtomicUsize,
}

impl MockBrokerage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Paper account with a few holdings and a month of daily equity.
    pub fn demo() -> Self {
        let position = |symbol: &str, qty: i64, entry: Decimal, price: Decimal| {
            let quantity = Decimal::from(qty);
            Symbol::parse(symbol).ok().map(|symbol| Position {
                symbol,
                quantity,
                market_value: quantity * price,
                cost_basis: quantity * entry,
                unrealized_pl: quantity * (price - entry),
                avg_entry_price: entry,
                current_price: Some(price),
            })
        };
        let positions = [
            position("AAPL", 10, Decimal::new(18250, 2), Decimal::new(19110, 2)),
            position("MSFT", 5, Decimal::new(41200, 2), Decimal::new(40875, 2)),
            position("NVDA", 8, Decimal::new(11830, 2), Decimal::new(12544, 2)),
        ]
        .into_iter()
        .flatten()
        .collect();

        let today = Utc::now();
        let history = (0..30i64)
            .rev()
            .map(|days_ago| PortfolioHistoryPoint {
                time: today - chrono::Duration::days(days_ago),
                equity: Decimal::from(100_000 + (30 - days_ago) * 85 - (days_ago % 4) * 120),
            })
            .collect();

        Self::new().with_positions(positions).with_history(history)
    }

    pub fn with_positions(self, positions: Vec<Position>) -> Self {
        Self {
            positions: Mutex::new(positions),
            ..self
        }
    }

    pub fn with_history(self, history: Vec<PortfolioHistoryPoint>) -> Self {
        Self { history, ..self }
    }

    /// Every call sleeps this long before answering.
    pub fn with_delay(self, delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..self
        }
    }

    pub fn failing_queries(self, message: &str) -> Self {
        Self {
            query_error: Some(DashboardError::remote(message)),
            ..self
        }
    }

    pub fn rejecting_orders(self, status: u16, message: &str) -> Self {
        Self {
            order_error: Some(DashboardError::remote_with_status(status, message)),
            ..self
        }
    }

    pub fn failing_liquidation(self, message: &str) -> Self {
        Self {
            liquidation_error: Some(DashboardError::remote(message)),
            ..self
        }
    }

    pub fn calls(&self) -> CallCounts {
        CallCounts {
            list_positions: self.counters.list_positions.load(Ordering::SeqCst),
            portfolio_history: self.counters.portfolio_history.load(Ordering::SeqCst),
            submit_order: self.counters.submit_order.load(Ordering::SeqCst),
            cancel_order: self.counters.cancel_order.load(Ordering::SeqCst),
            close_all_positions: self.counters.close_all_positions.load(Ordering::SeqCst),
        }
    }

    pub fn submitted_orders(&self) -> Vec<OrderRequest> {
        lock(&self.submitted).clone()
    }

    pub fn cancelled_orders(&self) -> Vec<String> {
        lock(&self.cancelled).clone()
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl AccountService for MockBrokerage {
    async fn list_positions(&self) -> Result<Vec<Position>, DashboardError> {
        self.counters.list_positions.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if let Some(e) = &self.query_error {
            return Err(e.clone());
        }
        Ok(lock(&self.positions).clone())
    }

    async fn portfolio_history(
        &self,
        _period: HistoryPeriod,
        _timeframe: Timeframe,
    ) -> Result<Vec<PortfolioHistoryPoint>, DashboardError> {
        self.counters.portfolio_history.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if let Some(e) = &self.query_error {
            return Err(e.clone());
        }
        Ok(self.history.clone())
    }
}

#[async_trait]
impl ExecutionService for MockBrokerage {
    async fn submit_order(&self, order: &OrderRequest) -> Result<OrderResult, DashboardError> {
        self.counters.submit_order.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if let Some(e) = &self.order_error {
            return Err(e.clone());
        }

        lock(&self.submitted).push(order.clone());
        let id = self.next_order_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(OrderResult {
            order_id: format!("mock-order-{}", id),
            symbol: order.symbol.clone(),
            quantity: Decimal::from(order.quantity),
            side: order.side,
            order_type: order.order_type.as_alpaca_str().to_string(),
            time_in_force: order.time_in_force.as_alpaca_str().to_string(),
            status: "accepted".to_string(),
            submitted_at: Some(Utc::now()),
        })
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), DashboardError> {
        self.counters.cancel_order.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        lock(&self.cancelled).push(order_id.to_string());
        Ok(())
    }

    async fn close_all_positions(&self) -> Result<LiquidationReport, DashboardError> {
        self.counters
            .close_all_positions
            .fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if let Some(e) = &self.liquidation_error {
            return Err(e.clone());
        }

        let closed: Vec<Position> = std::mem::take(&mut *lock(&self.positions));
        Ok(LiquidationReport {
            symbols: closed.into_iter().map(|p| p.symbol).collect(),
        })
    }
}

#[derive(Debug)]
enum FeedMessage {
    Tick(PriceTick),
    Error(String),
    Disconnect,
}

#[derive(Default)]
struct FeedShared {
    current: Mutex<Option<mpsc::UnboundedSender<FeedMessage>>>,
    subscribed: Mutex<Vec<Symbol>>,
    subscribe_calls: Mutex<Vec<Vec<Symbol>>>,
    unsubscribe_calls: Mutex<Vec<Vec<Symbol>>>,
    connects: AtomicUsize,
    closes: AtomicUsize,
    refuse_connections: AtomicBool,
}

/// Scripted price source. Each `connect` opens a fresh session; pushes go
/// to the most recent one.
#[derive(Clone, Default)]
pub struct MockPriceFeed {
    shared: Arc<FeedShared>,
}

impl MockPriceFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when no session is open.
    pub fn push(&self, symbol: &str, price: Decimal) -> bool {
        match Symbol::parse(symbol) {
            Ok(symbol) => self.send(FeedMessage::Tick(PriceTick::now(symbol, price))),
            Err(_) => false,
        }
    }

    pub fn push_tick(&self, tick: PriceTick) -> bool {
        self.send(FeedMessage::Tick(tick))
    }

    /// Makes the open session fail with a remote error.
    pub fn fail(&self, reason: &str) -> bool {
        self.send(FeedMessage::Error(reason.to_string()))
    }

    /// Makes the open session end as if the server hung up.
    pub fn disconnect(&self) -> bool {
        self.send(FeedMessage::Disconnect)
    }

    pub fn refuse_connections(&self, refuse: bool) {
        self.shared.refuse_connections.store(refuse, Ordering::SeqCst);
    }

    pub fn connect_count(&self) -> usize {
        self.shared.connects.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.shared.closes.load(Ordering::SeqCst)
    }

    /// Symbols the remote side currently believes are subscribed
    pub fn subscribed(&self) -> Vec<Symbol> {
        lock(&self.shared.subscribed).clone()
    }

    pub fn subscribe_calls(&self) -> Vec<Vec<Symbol>> {
        lock(&self.shared.subscribe_calls).clone()
    }

    pub fn unsubscribe_calls(&self) -> Vec<Vec<Symbol>> {
        lock(&self.shared.unsubscribe_calls).clone()
    }

    /// Pushes a pseudo-random walk for every subscribed symbol on each tick
    /// of `every`. Used by `MODE=mock`; the caller aborts the handle.
    pub fn spawn_simulation(&self, every: Duration) -> JoinHandle<()> {
        let feed = self.clone();
        tokio::spawn(async move {
            let mut prices: HashMap<Symbol, f64> = HashMap::new();
            let mut iteration = 0u64;
            let mut interval = tokio::time::interval(every);
            info!("MockPriceFeed: Starting price simulation every {:?}", every);

            loop {
                interval.tick().await;
                iteration += 1;

                for (idx, symbol) in feed.subscribed().into_iter().enumerate() {
                    let current = *prices.entry(symbol.clone()).or_insert_with(|| {
                        if symbol.as_str().contains("BTC") { 96000.0 } else { 150.0 }
                    });

                    // -0.5% to +0.5% per step
                    let seed = (iteration + idx as u64)
                        .wrapping_mul(1103515245)
                        .wrapping_add(12345);
                    let change_pct = ((((seed / 65536) % 1000) as f64 / 1000.0) - 0.5) * 0.01;
                    let next = current * (1.0 + change_pct);
                    prices.insert(symbol.clone(), next);

                    if let Some(price) = Decimal::from_f64(next) {
                        feed.push_tick(PriceTick::now(symbol, price.round_dp(2)));
                    }
                }
            }
        })
    }

    fn send(&self, message: FeedMessage) -> bool {
        match lock(&self.shared.current).as_ref() {
            Some(tx) => tx.send(message).is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl PriceStreamConnector for MockPriceFeed {
    async fn connect(&self) -> Result<Box<dyn PriceStreamSession>, DashboardError> {
        self.shared.connects.fetch_add(1, Ordering::SeqCst);
        if self.shared.refuse_connections.load(Ordering::SeqCst) {
            return Err(DashboardError::remote("mock feed refused connection"));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        *lock(&self.shared.current) = Some(tx);
        lock(&self.shared.subscribed).clear();
        info!("MockPriceFeed: session opened");

        Ok(Box::new(MockSession {
            rx,
            shared: self.shared.clone(),
            closed: false,
        }))
    }
}

struct MockSession {
    rx: mpsc::UnboundedReceiver<FeedMessage>,
    shared: Arc<FeedShared>,
    closed: bool,
}

#[async_trait]
impl PriceStreamSession for MockSession {
    async fn subscribe(&mut self, symbols: &[Symbol]) -> Result<(), DashboardError> {
        lock(&self.shared.subscribe_calls).push(symbols.to_vec());
        let mut subscribed = lock(&self.shared.subscribed);
        for symbol in symbols {
            if !subscribed.contains(symbol) {
                subscribed.push(symbol.clone());
            }
        }
        Ok(())
    }

    async fn unsubscribe(&mut self, symbols: &[Symbol]) -> Result<(), DashboardError> {
        lock(&self.shared.unsubscribe_calls).push(symbols.to_vec());
        lock(&self.shared.subscribed).retain(|s| !symbols.contains(s));
        Ok(())
    }

    async fn next_tick(&mut self) -> Option<Result<PriceTick, DashboardError>> {
        match self.rx.recv().await {
            Some(FeedMessage::Tick(tick)) => Some(Ok(tick)),
            Some(FeedMessage::Error(reason)) => Some(Err(DashboardError::interrupted(reason))),
            Some(FeedMessage::Disconnect) | None => None,
        }
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.rx.close();
            self.shared.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}
