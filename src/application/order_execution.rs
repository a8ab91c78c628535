use crate::application::account_query::bounded;
use crate::domain::errors::DashboardError;
use crate::domain::ports::ExecutionService;
use crate::domain::trading::types::{LiquidationReport, OrderForm, OrderResult};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Stateless pass-through to the brokerage's trading API.
///
/// Input is validated locally before anything leaves the process. Remote
/// rejections come back unchanged; nothing is retried or reconciled here.
pub struct OrderExecutionService {
    execution: Arc<dyn ExecutionService>,
    timeout: Duration,
}

impl OrderExecutionService {
    pub fn new(execution: Arc<dyn ExecutionService>, timeout: Duration) -> Self {
        Self { execution, timeout }
    }

    pub async fn place_order(&self, form: OrderForm) -> Result<OrderResult, DashboardError> {
        let request = form.validate().inspect_err(|e| {
            warn!("OrderExecution: rejected order form {:?}: {}", form, e);
        })?;

        info!(
            "OrderExecution: submitting {} {} x{} ({}, {})",
            request.side,
            request.symbol,
            request.quantity,
            request.order_type,
            request.time_in_force.as_alpaca_str()
        );

        let result = bounded(
            "submit order",
            self.timeout,
            self.execution.submit_order(&request),
        )
        .await
        .inspect_err(|e| error!("OrderExecution: order for {} failed: {}", request.symbol, e))?;

        info!(
            "OrderExecution: order {} accepted (status: {})",
            result.order_id, result.status
        );
        Ok(result)
    }

    pub async fn cancel_order(&self, order_id: &str) -> Result<(), DashboardError> {
        let order_id = order_id.trim();
        if order_id.is_empty() {
            return Err(DashboardError::validation("order id must not be empty"));
        }
        if !order_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(DashboardError::validation(format!(
                "order id '{}' may only contain letters, digits and '-'",
                order_id
            )));
        }

        bounded("cancel order", self.timeout, self.execution.cancel_order(order_id))
            .await
            .inspect_err(|e| error!("OrderExecution: cancel of {} failed: {}", order_id, e))?;
        info!("OrderExecution: order {} cancelled", order_id);
        Ok(())
    }

    /// Asks the brokerage to close every open position in one request.
    pub async fn liquidate_all(&self) -> Result<LiquidationReport, DashboardError> {
        info!("OrderExecution: liquidating all positions");
        let report = bounded(
            "liquidate positions",
            self.timeout,
            self.execution.close_all_positions(),
        )
        .await
        .inspect_err(|e| error!("OrderExecution: liquidation failed: {}", e))?;

        info!(
            "OrderExecution: close requested for {} position(s)",
            report.symbols.len()
        );
        Ok(report)
    }
}
