use crate::application::account_query::AccountQueryService;
use crate::application::market_data::feed_client::{FeedState, MarketDataFeedClient};
use crate::application::market_data::live_price_store::{LivePriceStore, PriceSnapshot};
use crate::application::order_execution::OrderExecutionService;
use crate::domain::errors::DashboardError;
use crate::domain::market::timeframe::Timeframe;
use crate::domain::trading::portfolio::{HistoryPeriod, PortfolioHistoryPoint, Position};
use crate::domain::trading::symbol::{Symbol, parse_symbol_list};
use crate::domain::trading::types::OrderForm;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NoticeLevel {
    Success,
    Error,
}

/// User-visible outcome of an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    pub order_id: Option<String>,
    /// HTTP status of a brokerage rejection, when there was one
    pub status: Option<u16>,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
            order_id: None,
            status: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
            order_id: None,
            status: None,
        }
    }

    /// Error notice for a failed action, keeping the brokerage status code.
    pub fn failure(action: &str, error: &DashboardError) -> Self {
        Self {
            status: error.status(),
            ..Self::error(format!("{}: {}", action, error))
        }
    }

    pub fn is_error(&self) -> bool {
        self.level == NoticeLevel::Error
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Positions table plus equity curve, fetched together.
#[derive(Debug, Clone, Serialize)]
pub struct AccountView {
    pub positions: Vec<Position>,
    pub equity_curve: Vec<PortfolioHistoryPoint>,
    pub notices: Vec<Notice>,
}

#[derive(Debug, Clone)]
pub struct LivePricesView {
    pub snapshot: PriceSnapshot,
    pub feed_state: FeedState,
    /// Set when the feed is not streaming or nothing arrived within `stale_after`
    pub stale: bool,
    pub stale_symbols: Vec<Symbol>,
}

/// Entry point for a presentation layer.
///
/// Every action resolves to data or a [`Notice`]; brokerage and feed errors
/// never escape as `Err`.
pub struct DashboardClient {
    accounts: AccountQueryService,
    orders: OrderExecutionService,
    store: Arc<LivePriceStore>,
    feed: MarketDataFeedClient,
    stale_after: chrono::Duration,
    history_period: HistoryPeriod,
    history_timeframe: Timeframe,
}

impl DashboardClient {
    pub fn new(
        accounts: AccountQueryService,
        orders: OrderExecutionService,
        store: Arc<LivePriceStore>,
        feed: MarketDataFeedClient,
        stale_after: Duration,
    ) -> Self {
        Self {
            accounts,
            orders,
            store,
            feed,
            stale_after: chrono::Duration::from_std(stale_after)
                .unwrap_or_else(|_| chrono::Duration::days(365)),
            history_period: HistoryPeriod::default(),
            history_timeframe: Timeframe::default(),
        }
    }

    pub fn with_history_defaults(mut self, period: HistoryPeriod, timeframe: Timeframe) -> Self {
        self.history_period = period;
        self.history_timeframe = timeframe;
        self
    }

    pub async fn refresh(&self) -> AccountView {
        self.refresh_with(self.history_period, self.history_timeframe)
            .await
    }

    /// Fetches positions and history concurrently; a failed half leaves its
    /// section empty and adds an error notice.
    pub async fn refresh_with(&self, period: HistoryPeriod, timeframe: Timeframe) -> AccountView {
        let (positions, history) = tokio::join!(
            self.accounts.list_positions(),
            self.accounts.equity_history(period, timeframe)
        );

        let mut notices = Vec::new();
        let positions = positions.unwrap_or_else(|e| {
            notices.push(Notice::failure("Error loading positions", &e));
            Vec::new()
        });
        let equity_curve = history.unwrap_or_else(|e| {
            notices.push(Notice::failure("Error loading portfolio history", &e));
            Vec::new()
        });

        AccountView {
            positions,
            equity_curve,
            notices,
        }
    }

    pub fn live_prices(&self) -> LivePricesView {
        let snapshot = self.store.snapshot();
        let feed_state = self.feed.state();
        let stale = !feed_state.is_streaming() || snapshot.is_stale(self.stale_after);
        let stale_symbols = snapshot.stale_symbols(self.stale_after);

        LivePricesView {
            snapshot,
            feed_state,
            stale,
            stale_symbols,
        }
    }

    pub async fn place_order(&self, form: OrderForm) -> Notice {
        match self.orders.place_order(form).await {
            Ok(result) => {
                let message = format!(
                    "{} order placed for {} shares of {}. Order ID: {}",
                    result.side, result.quantity, result.symbol, result.order_id
                );
                Notice {
                    order_id: Some(result.order_id),
                    ..Notice::success(message)
                }
            }
            Err(e) => Notice::failure("Error placing order", &e),
        }
    }

    pub async fn cancel_order(&self, order_id: &str) -> Notice {
        match self.orders.cancel_order(order_id).await {
            Ok(()) => Notice {
                order_id: Some(order_id.trim().to_string()),
                ..Notice::success(format!("Order {} cancelled.", order_id.trim()))
            },
            Err(e) => Notice::failure("Error cancelling order", &e),
        }
    }

    pub async fn liquidate_all(&self) -> Notice {
        match self.orders.liquidate_all().await {
            Ok(_) => Notice::success("All positions liquidated."),
            Err(e) => Notice::failure("Error liquidating positions", &e),
        }
    }

    /// Replaces the watchlist from comma-separated input.
    pub async fn watch_symbols(&self, input: &str) -> Notice {
        let symbols = match parse_symbol_list(input) {
            Ok(symbols) => symbols,
            Err(e) => return Notice::failure("Error updating watchlist", &e),
        };

        let names: Vec<&str> = symbols.iter().map(Symbol::as_str).collect();
        let message = format!("Watching {}.", names.join(", "));
        match self.feed.resubscribe(symbols).await {
            Ok(()) => Notice::success(message),
            Err(e) => Notice::failure("Error updating watchlist", &e),
        }
    }

    pub fn feed(&self) -> &MarketDataFeedClient {
        &self.feed
    }

    pub async fn shutdown(&self) {
        info!("DashboardClient: shutting down");
        self.feed.stop().await;
    }
}
