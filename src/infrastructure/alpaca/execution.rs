use super::common::{AlpacaRestClient, parse_decimal};
use crate::domain::errors::DashboardError;
use crate::domain::ports::ExecutionService;
use crate::domain::trading::symbol::Symbol;
use crate::domain::trading::types::{LiquidationReport, OrderRequest, OrderResult, OrderSide};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

// ===== Execution Service (REST API) =====

pub struct AlpacaExecutionService {
    rest: AlpacaRestClient,
}

impl AlpacaExecutionService {
    pub fn new(rest: AlpacaRestClient) -> Self {
        Self { rest }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct AlpacaOrderRequest {
    symbol: String,
    qty: String,
    side: String,
    #[serde(rename = "type")]
    order_type: String,
    time_in_force: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit_price: Option<String>,
}

impl From<&OrderRequest> for AlpacaOrderRequest {
    fn from(order: &OrderRequest) -> Self {
        Self {
            symbol: order.symbol.to_string(),
            qty: order.quantity.to_string(),
            side: order.side.as_alpaca_str().to_string(),
            order_type: order.order_type.as_alpaca_str().to_string(),
            time_in_force: order.time_in_force.as_alpaca_str().to_string(),
            limit_price: order.order_type.limit_price().map(|p| p.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct AlpacaOrderResponse {
    id: String,
    symbol: String,
    #[serde(default)]
    qty: Option<String>,
    side: String,
    #[serde(rename = "type", default)]
    order_type: String,
    #[serde(default)]
    time_in_force: String,
    status: String,
    #[serde(default)]
    submitted_at: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AlpacaCloseResult {
    symbol: String,
    status: u16,
    #[serde(default)]
    body: Option<serde_json::Value>,
}

pub(crate) fn map_order(
    raw: AlpacaOrderResponse,
    requested: &OrderRequest,
) -> Result<OrderResult, DashboardError> {
    let side = match raw.side.as_str() {
        "buy" => OrderSide::Buy,
        "sell" => OrderSide::Sell,
        other => {
            warn!(
                "AlpacaExecution: unexpected side '{}' in order {}, keeping requested side",
                other, raw.id
            );
            requested.side
        }
    };

    let quantity = match raw.qty.as_deref() {
        Some(qty) => parse_decimal("qty", qty)?,
        None => Decimal::from(requested.quantity),
    };

    Ok(OrderResult {
        symbol: Symbol::parse(&raw.symbol).unwrap_or_else(|_| requested.symbol.clone()),
        quantity,
        side,
        order_type: raw.order_type,
        time_in_force: raw.time_in_force,
        status: raw.status,
        submitted_at: raw
            .submitted_at
            .as_deref()
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
            .map(|dt| dt.with_timezone(&Utc)),
        order_id: raw.id,
    })
}

/// Turns Alpaca's per-symbol multi-status into a report, or an error naming
/// every symbol the brokerage refused to close.
pub(crate) fn map_liquidation(
    results: Vec<AlpacaCloseResult>,
) -> Result<LiquidationReport, DashboardError> {
    let mut symbols = Vec::new();
    let mut failures = Vec::new();

    for result in results {
        if (200..300).contains(&result.status) {
            match Symbol::parse(&result.symbol) {
                Ok(symbol) => symbols.push(symbol),
                Err(e) => warn!("AlpacaExecution: skipping close result: {}", e),
            }
        } else {
            let reason = result
                .body
                .as_ref()
                .and_then(|b| b.get("message"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| format!("HTTP {}", result.status));
            failures.push(format!("{}: {}", result.symbol, reason));
        }
    }

    if !failures.is_empty() {
        return Err(DashboardError::remote(format!(
            "failed to close {}",
            failures.join("; ")
        )));
    }
    Ok(LiquidationReport { symbols })
}

#[async_trait]
impl ExecutionService for AlpacaExecutionService {
    async fn submit_order(&self, order: &OrderRequest) -> Result<OrderResult, DashboardError> {
        let body = serde_json::to_string(&AlpacaOrderRequest::from(order)).map_err(|e| {
            DashboardError::remote(format!("Failed to serialize order request: {}", e))
        })?;

        let url = self.rest.endpoint("/v2/orders", &[])?;
        let request = self
            .rest
            .request(Method::POST, url)
            .header("Content-Type", "application/json")
            .body(body);
        let response = self.rest.send(request, "submit order").await?;

        let raw: AlpacaOrderResponse = AlpacaRestClient::decode(response, "order").await?;
        info!(
            "Alpaca order placed: {} (status: {})",
            raw.id, raw.status
        );
        map_order(raw, order)
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), DashboardError> {
        let url = self.rest.resource("/v2/orders", order_id)?;
        self.rest
            .send(self.rest.request(Method::DELETE, url), "cancel order")
            .await?;

        info!("AlpacaExecution: Order {} cancelled.", order_id);
        Ok(())
    }

    async fn close_all_positions(&self) -> Result<LiquidationReport, DashboardError> {
        let url = self.rest.endpoint("/v2/positions", &[])?;
        let response = self
            .rest
            .send(self.rest.request(Method::DELETE, url), "close all positions")
            .await?;

        let results: Vec<AlpacaCloseResult> =
            AlpacaRestClient::decode(response, "close positions").await?;
        map_liquidation(results)
    }
}
