use crate::domain::errors::DashboardError;
use crate::domain::market::timeframe::Timeframe;
use crate::domain::ports::AccountService;
use crate::domain::trading::portfolio::{HistoryPeriod, PortfolioHistoryPoint, Position};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Pulls positions and the equity curve on demand.
///
/// Every call is a fresh snapshot; nothing is cached between calls.
pub struct AccountQueryService {
    account: Arc<dyn AccountService>,
    timeout: Duration,
}

impl AccountQueryService {
    pub fn new(account: Arc<dyn AccountService>, timeout: Duration) -> Self {
        Self { account, timeout }
    }

    pub async fn list_positions(&self) -> Result<Vec<Position>, DashboardError> {
        let positions =
            bounded("list positions", self.timeout, self.account.list_positions()).await?;
        info!("AccountQuery: {} open position(s)", positions.len());
        Ok(positions)
    }

    /// Equity curve sorted ascending by time.
    pub async fn equity_history(
        &self,
        period: HistoryPeriod,
        timeframe: Timeframe,
    ) -> Result<Vec<PortfolioHistoryPoint>, DashboardError> {
        let mut points = bounded(
            "portfolio history",
            self.timeout,
            self.account.portfolio_history(period, timeframe),
        )
        .await?;
        points.sort_by_key(|p| p.time);
        info!(
            "AccountQuery: {} equity point(s) for {} @ {}",
            points.len(),
            period,
            timeframe
        );
        Ok(points)
    }
}

/// Runs a brokerage call under `limit`, mapping expiry to a remote error.
pub(crate) async fn bounded<T>(
    operation: &str,
    limit: Duration,
    call: impl Future<Output = Result<T, DashboardError>>,
) -> Result<T, DashboardError> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => {
            warn!("Brokerage call '{}' timed out after {:?}", operation, limit);
            Err(DashboardError::timeout(operation, limit))
        }
    }
}
