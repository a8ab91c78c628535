use crate::domain::errors::DashboardError;
use crate::domain::market::price_tick::PriceTick;
use crate::domain::market::timeframe::Timeframe;
use crate::domain::trading::portfolio::{HistoryPeriod, PortfolioHistoryPoint, Position};
use crate::domain::trading::symbol::Symbol;
use crate::domain::trading::types::{LiquidationReport, OrderRequest, OrderResult};
use async_trait::async_trait;

/// Read-only account queries against the brokerage.
#[async_trait]
pub trait AccountService: Send + Sync {
    async fn list_positions(&self) -> Result<Vec<Position>, DashboardError>;
    async fn portfolio_history(
        &self,
        period: HistoryPeriod,
        timeframe: Timeframe,
    ) -> Result<Vec<PortfolioHistoryPoint>, DashboardError>;
}

/// State-changing trading calls against the brokerage.
#[async_trait]
pub trait ExecutionService: Send + Sync {
    async fn submit_order(&self, order: &OrderRequest) -> Result<OrderResult, DashboardError>;
    async fn cancel_order(&self, order_id: &str) -> Result<(), DashboardError>;
    async fn close_all_positions(&self) -> Result<LiquidationReport, DashboardError>;
}

/// Opens authenticated sessions to a streaming price source.
#[async_trait]
pub trait PriceStreamConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn PriceStreamSession>, DashboardError>;
}

/// One live streaming connection.
///
/// `next_tick` must be cancel-safe: the feed client polls it inside
/// `tokio::select!` alongside its control channel.
#[async_trait]
pub trait PriceStreamSession: Send {
    async fn subscribe(&mut self, symbols: &[Symbol]) -> Result<(), DashboardError>;
    async fn unsubscribe(&mut self, symbols: &[Symbol]) -> Result<(), DashboardError>;

    /// `None` once the remote side has closed the stream.
    async fn next_tick(&mut self) -> Option<Result<PriceTick, DashboardError>>;

    async fn close(&mut self);
}
