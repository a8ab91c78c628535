use super::common::{AlpacaRestClient, parse_decimal};
use crate::domain::errors::DashboardError;
use crate::domain::market::timeframe::Timeframe;
use crate::domain::ports::AccountService;
use crate::domain::trading::portfolio::{HistoryPeriod, PortfolioHistoryPoint, Position};
use crate::domain::trading::symbol::Symbol;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::Method;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde::Deserialize;
use tracing::{debug, warn};

// ===== Account Queries (REST API) =====

pub struct AlpacaAccountService {
    rest: AlpacaRestClient,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AlpacaPosition {
    symbol: String,
    qty: String,
    market_value: String,
    cost_basis: String,
    unrealized_pl: String,
    avg_entry_price: String,
    #[serde(default)]
    current_price: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AlpacaPortfolioHistory {
    #[serde(default)]
    timestamp: Vec<i64>,
    #[serde(default)]
    equity: Vec<Option<f64>>,
}

impl AlpacaAccountService {
    pub fn new(rest: AlpacaRestClient) -> Self {
        Self { rest }
    }
}

pub(crate) fn map_position(raw: AlpacaPosition) -> Result<Position, DashboardError> {
    let symbol = Symbol::parse(&raw.symbol).map_err(|e| {
        DashboardError::remote(format!("brokerage returned unusable symbol: {}", e))
    })?;

    Ok(Position {
        symbol,
        quantity: parse_decimal("qty", &raw.qty)?,
        market_value: parse_decimal("market_value", &raw.market_value)?,
        cost_basis: parse_decimal("cost_basis", &raw.cost_basis)?,
        unrealized_pl: parse_decimal("unrealized_pl", &raw.unrealized_pl)?,
        avg_entry_price: parse_decimal("avg_entry_price", &raw.avg_entry_price)?,
        current_price: raw
            .current_price
            .as_deref()
            .map(|p| parse_decimal("current_price", p))
            .transpose()?,
    })
}

/// Zips Alpaca's parallel arrays; intervals without an equity value are dropped.
pub(crate) fn map_history(raw: AlpacaPortfolioHistory) -> Vec<PortfolioHistoryPoint> {
    if raw.timestamp.len() != raw.equity.len() {
        warn!(
            "AlpacaAccount: portfolio history has {} timestamps but {} equity values",
            raw.timestamp.len(),
            raw.equity.len()
        );
    }

    let mut points: Vec<PortfolioHistoryPoint> = raw
        .timestamp
        .into_iter()
        .zip(raw.equity)
        .filter_map(|(ts, equity)| {
            let time = Utc.timestamp_opt(ts, 0).single()?;
            let equity = Decimal::from_f64(equity?)?;
            Some(PortfolioHistoryPoint { time, equity })
        })
        .collect();
    points.sort_by_key(|p| p.time);
    points
}

#[async_trait]
impl AccountService for AlpacaAccountService {
    async fn list_positions(&self) -> Result<Vec<Position>, DashboardError> {
        let url = self.rest.endpoint("/v2/positions", &[])?;
        let response = self
            .rest
            .send(self.rest.request(Method::GET, url), "list positions")
            .await?;
        let raw: Vec<AlpacaPosition> =
            AlpacaRestClient::decode(response, "positions").await?;

        debug!("AlpacaAccount: received {} positions", raw.len());
        raw.into_iter().map(map_position).collect()
    }

    async fn portfolio_history(
        &self,
        period: HistoryPeriod,
        timeframe: Timeframe,
    ) -> Result<Vec<PortfolioHistoryPoint>, DashboardError> {
        let period = period.to_string();
        let url = self.rest.endpoint(
            "/v2/account/portfolio/history",
            &[
                ("period", period.as_str()),
                ("timeframe", timeframe.to_alpaca_string()),
            ],
        )?;
        let response = self
            .rest
            .send(self.rest.request(Method::GET, url), "portfolio history")
            .await?;
        let raw: AlpacaPortfolioHistory =
            AlpacaRestClient::decode(response, "portfolio history").await?;
        Ok(map_history(raw))
    }
}
