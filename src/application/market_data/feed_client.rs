//! Background market data feed
//!
//! One tokio task owns the streaming connection for the lifetime of the
//! dashboard. The rest of the system talks to it through a command channel
//! (subscribe / unsubscribe / stop) and observes it through a `watch`
//! channel carrying [`FeedState`]. Prices flow out only through the
//! [`LivePriceStore`].

use crate::application::market_data::live_price_store::LivePriceStore;
use crate::domain::errors::DashboardError;
use crate::domain::ports::{PriceStreamConnector, PriceStreamSession};
use crate::domain::trading::symbol::Symbol;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const COMMAND_BUFFER: usize = 32;
const STOP_GRACE_PERIOD: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct FeedSettings {
    pub reconnect: bool,
    pub max_reconnect_attempts: u32,
    pub initial_reconnect_delay: Duration,
    pub max_reconnect_delay: Duration,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            reconnect: true,
            max_reconnect_attempts: 5,
            initial_reconnect_delay: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(30),
        }
    }
}

impl FeedSettings {
    /// Exponential backoff for the given 1-based attempt, capped
    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        std::cmp::min(
            self.initial_reconnect_delay.saturating_mul(factor),
            self.max_reconnect_delay,
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeedState {
    Idle,
    Connecting,
    Streaming {
        since: DateTime<Utc>,
    },
    Interrupted {
        reason: String,
        since: DateTime<Utc>,
    },
    Stopped,
}

impl FeedState {
    pub fn is_streaming(&self) -> bool {
        matches!(self, FeedState::Streaming { .. })
    }
}

#[derive(Debug)]
enum FeedCommand {
    Subscribe(Vec<Symbol>),
    Unsubscribe(Vec<Symbol>),
    Replace(Vec<Symbol>),
    Stop,
}

/// Handle to the background feed task.
pub struct MarketDataFeedClient {
    command_tx: mpsc::Sender<FeedCommand>,
    state_rx: watch::Receiver<FeedState>,
    symbols: Arc<std::sync::RwLock<BTreeSet<Symbol>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl MarketDataFeedClient {
    /// Spawns the feed task and returns without waiting for the connection.
    pub fn start(
        connector: Arc<dyn PriceStreamConnector>,
        store: Arc<LivePriceStore>,
        symbols: Vec<Symbol>,
        settings: FeedSettings,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (state_tx, state_rx) = watch::channel(FeedState::Idle);
        let symbols = Arc::new(std::sync::RwLock::new(symbols.into_iter().collect()));

        let worker = FeedWorker {
            connector,
            store,
            commands: command_rx,
            state_tx,
            symbols: symbols.clone(),
            settings,
        };
        let task = tokio::spawn(worker.run());

        Self {
            command_tx,
            state_rx,
            symbols,
            task: Mutex::new(Some(task)),
        }
    }

    pub async fn subscribe(&self, symbols: Vec<Symbol>) -> Result<(), DashboardError> {
        self.send(FeedCommand::Subscribe(symbols)).await
    }

    pub async fn unsubscribe(&self, symbols: Vec<Symbol>) -> Result<(), DashboardError> {
        self.send(FeedCommand::Unsubscribe(symbols)).await
    }

    /// Replaces the subscription set without tearing down the connection.
    pub async fn resubscribe(&self, symbols: Vec<Symbol>) -> Result<(), DashboardError> {
        self.send(FeedCommand::Replace(symbols)).await
    }

    /// Closes the connection and waits for the task to exit. Never fails;
    /// calling it again, or after the stream already died, is a no-op.
    pub async fn stop(&self) {
        let Some(task) = self.task.lock().await.take() else {
            debug!("FeedClient: stop requested but feed already stopped");
            return;
        };

        if self.command_tx.send(FeedCommand::Stop).await.is_err() {
            debug!("FeedClient: feed task already finished");
        }

        let abort = task.abort_handle();
        match tokio::time::timeout(STOP_GRACE_PERIOD, task).await {
            Ok(Ok(())) => info!("FeedClient: stopped"),
            Ok(Err(e)) => error!("FeedClient: feed task ended abnormally: {}", e),
            Err(_) => {
                warn!(
                    "FeedClient: feed task did not stop within {:?}, aborting",
                    STOP_GRACE_PERIOD
                );
                abort.abort();
            }
        }
    }

    pub fn state(&self) -> FeedState {
        self.state_rx.borrow().clone()
    }

    /// Receiver that observes every state change, including failures.
    pub fn watch_state(&self) -> watch::Receiver<FeedState> {
        self.state_rx.clone()
    }

    pub fn symbols(&self) -> Vec<Symbol> {
        match self.symbols.read() {
            Ok(guard) => guard.iter().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().iter().cloned().collect(),
        }
    }

    async fn send(&self, command: FeedCommand) -> Result<(), DashboardError> {
        self.command_tx.send(command).await.map_err(|_| {
            let reason = match self.state() {
                FeedState::Interrupted { reason, .. } => reason,
                _ => "feed is not running".to_string(),
            };
            DashboardError::interrupted(reason)
        })
    }
}

impl Drop for MarketDataFeedClient {
    fn drop(&mut self) {
        // Best effort; the task closes its session on Stop or channel close
        let _ = self.command_tx.try_send(FeedCommand::Stop);
    }
}

enum Flow {
    Continue,
    Stop,
}

enum SessionExit {
    Stopped,
    Failed(DashboardError),
}

struct FeedWorker {
    connector: Arc<dyn PriceStreamConnector>,
    store: Arc<LivePriceStore>,
    commands: mpsc::Receiver<FeedCommand>,
    state_tx: watch::Sender<FeedState>,
    symbols: Arc<std::sync::RwLock<BTreeSet<Symbol>>>,
    settings: FeedSettings,
}

impl FeedWorker {
    async fn run(mut self) {
        let mut failures: u32 = 0;

        loop {
            match self.run_session(&mut failures).await {
                SessionExit::Stopped => break,
                SessionExit::Failed(e) => {
                    error!("FeedClient: {}", e);
                    failures += 1;
                    self.state_tx.send_replace(FeedState::Interrupted {
                        reason: e.detail().to_string(),
                        since: Utc::now(),
                    });

                    if !self.settings.reconnect || failures > self.settings.max_reconnect_attempts
                    {
                        warn!(
                            "FeedClient: giving up after {} failed attempt(s); prices are now stale",
                            failures
                        );
                        return;
                    }

                    let delay = self.settings.backoff(failures);
                    info!(
                        "FeedClient: reconnecting in {:?} (attempt {}/{})",
                        delay, failures, self.settings.max_reconnect_attempts
                    );
                    if !self.wait_offline(delay).await {
                        break;
                    }
                }
            }
        }

        self.state_tx.send_replace(FeedState::Stopped);
    }

    /// Connects, subscribes and pumps ticks until stopped or the stream fails.
    async fn run_session(&mut self, failures: &mut u32) -> SessionExit {
        self.state_tx.send_replace(FeedState::Connecting);

        let connector = Arc::clone(&self.connector);
        let mut connecting = connector.connect();
        let mut session: Box<dyn PriceStreamSession> = loop {
            tokio::select! {
                result = &mut connecting => match result {
                    Ok(session) => break session,
                    Err(e) => return SessionExit::Failed(e),
                },
                command = self.commands.recv() => {
                    if !self.apply_offline(command) {
                        return SessionExit::Stopped;
                    }
                }
            }
        };
        drop(connecting);

        let initial = self.current_symbols();
        if !initial.is_empty() {
            if let Err(e) = session.subscribe(&initial).await {
                session.close().await;
                return SessionExit::Failed(e);
            }
        }

        info!("FeedClient: streaming {} symbol(s)", initial.len());
        self.state_tx.send_replace(FeedState::Streaming { since: Utc::now() });

        loop {
            tokio::select! {
                tick = session.next_tick() => match tick {
                    Some(Ok(tick)) => {
                        // A session only counts as healthy once data flows;
                        // a rejected subscription fails before this.
                        *failures = 0;
                        if self.is_subscribed(&tick.symbol) {
                            self.store.record(tick);
                        } else {
                            debug!("FeedClient: ignoring bar for unsubscribed {}", tick.symbol);
                        }
                    }
                    Some(Err(e)) => {
                        session.close().await;
                        return SessionExit::Failed(e);
                    }
                    None => {
                        session.close().await;
                        return SessionExit::Failed(DashboardError::interrupted(
                            "stream closed by remote",
                        ));
                    }
                },
                command = self.commands.recv() => {
                    let Some(command) = command else {
                        session.close().await;
                        return SessionExit::Stopped;
                    };
                    match self.apply_online(command, session.as_mut()).await {
                        Ok(Flow::Continue) => {}
                        Ok(Flow::Stop) => {
                            session.close().await;
                            return SessionExit::Stopped;
                        }
                        Err(e) => {
                            session.close().await;
                            return SessionExit::Failed(e);
                        }
                    }
                }
            }
        }
    }

    /// Applies a command to the live session, sending only the diff.
    async fn apply_online(
        &mut self,
        command: FeedCommand,
        session: &mut dyn PriceStreamSession,
    ) -> Result<Flow, DashboardError> {
        let (added, removed) = match command {
            FeedCommand::Stop => return Ok(Flow::Stop),
            FeedCommand::Subscribe(symbols) => (self.add_symbols(symbols), Vec::new()),
            FeedCommand::Unsubscribe(symbols) => (Vec::new(), self.remove_symbols(symbols)),
            FeedCommand::Replace(symbols) => self.replace_symbols(symbols),
        };

        if !removed.is_empty() {
            info!("FeedClient: unsubscribing {:?}", removed);
            session.unsubscribe(&removed).await?;
        }
        if !added.is_empty() {
            info!("FeedClient: subscribing {:?}", added);
            session.subscribe(&added).await?;
        }
        Ok(Flow::Continue)
    }

    /// Records a command while no session exists. Returns false on stop.
    fn apply_offline(&mut self, command: Option<FeedCommand>) -> bool {
        match command {
            None | Some(FeedCommand::Stop) => return false,
            Some(FeedCommand::Subscribe(symbols)) => {
                self.add_symbols(symbols);
            }
            Some(FeedCommand::Unsubscribe(symbols)) => {
                self.remove_symbols(symbols);
            }
            Some(FeedCommand::Replace(symbols)) => {
                self.replace_symbols(symbols);
            }
        }
        true
    }

    /// Sleeps through a reconnect delay while still honouring commands.
    async fn wait_offline(&mut self, delay: Duration) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return true,
                command = self.commands.recv() => {
                    if !self.apply_offline(command) {
                        return false;
                    }
                }
            }
        }
    }

    fn current_symbols(&self) -> Vec<Symbol> {
        match self.symbols.read() {
            Ok(guard) => guard.iter().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().iter().cloned().collect(),
        }
    }

    fn is_subscribed(&self, symbol: &Symbol) -> bool {
        match self.symbols.read() {
            Ok(guard) => guard.contains(symbol),
            Err(poisoned) => poisoned.into_inner().contains(symbol),
        }
    }

    fn with_symbols<R>(&self, f: impl FnOnce(&mut BTreeSet<Symbol>) -> R) -> R {
        match self.symbols.write() {
            Ok(mut guard) => f(&mut guard),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }

    fn add_symbols(&self, symbols: Vec<Symbol>) -> Vec<Symbol> {
        self.with_symbols(|set| symbols.into_iter().filter(|s| set.insert(s.clone())).collect())
    }

    fn remove_symbols(&self, symbols: Vec<Symbol>) -> Vec<Symbol> {
        self.with_symbols(|set| symbols.into_iter().filter(|s| set.remove(s)).collect())
    }

    fn replace_symbols(&self, symbols: Vec<Symbol>) -> (Vec<Symbol>, Vec<Symbol>) {
        let wanted: BTreeSet<Symbol> = symbols.into_iter().collect();
        self.with_symbols(|set| {
            let added = wanted.difference(set).cloned().collect();
            let removed = set.difference(&wanted).cloned().collect();
            *set = wanted;
            (added, removed)
        })
    }
}
