use crate::domain::errors::DashboardError;
use crate::domain::trading::symbol::Symbol;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_alpaca_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }
}

impl FromStr for OrderSide {
    type Err = DashboardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "buy" => Ok(OrderSide::Buy),
            "sell" => Ok(OrderSide::Sell),
            other => Err(DashboardError::validation(format!(
                "unknown order side '{}': must be 'buy' or 'sell'",
                other
            ))),
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "Buy"),
            OrderSide::Sell => write!(f, "Sell"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderType {
    Market,
    Limit { limit_price: Decimal },
}

impl OrderType {
    pub fn as_alpaca_str(&self) -> &'static str {
        match self {
            OrderType::Market => "market",
            OrderType::Limit { .. } => "limit",
        }
    }

    pub fn limit_price(&self) -> Option<Decimal> {
        match self {
            OrderType::Market => None,
            OrderType::Limit { limit_price } => Some(*limit_price),
        }
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderType::Market => write!(f, "MARKET"),
            OrderType::Limit { limit_price } => write!(f, "LIMIT @ {}", limit_price),
        }
    }
}

/// Orders submitted from the dashboard are always good-till-cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeInForce {
    #[default]
    GoodTillCancelled,
}

impl TimeInForce {
    pub fn as_alpaca_str(&self) -> &'static str {
        match self {
            TimeInForce::GoodTillCancelled => "gtc",
        }
    }
}

/// Raw order parameters as typed into the order form.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderForm {
    pub symbol: String,
    pub quantity: i64,
    pub side: String,
    pub order_type: String,
    pub limit_price: Option<Decimal>,
}

impl OrderForm {
    pub fn market(symbol: impl Into<String>, quantity: i64, side: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            quantity,
            side: side.into(),
            order_type: "market".to_string(),
            limit_price: None,
        }
    }

    pub fn limit(
        symbol: impl Into<String>,
        quantity: i64,
        side: impl Into<String>,
        limit_price: Decimal,
    ) -> Self {
        Self {
            order_type: "limit".to_string(),
            limit_price: Some(limit_price),
            ..Self::market(symbol, quantity, side)
        }
    }

    /// Checks the form locally and builds the request sent to the brokerage.
    pub fn validate(&self) -> Result<OrderRequest, DashboardError> {
        if self.quantity < 1 {
            return Err(DashboardError::validation(format!(
                "quantity must be at least 1, got {}",
                self.quantity
            )));
        }
        let quantity = u32::try_from(self.quantity).map_err(|_| {
            DashboardError::validation(format!("quantity {} is too large", self.quantity))
        })?;

        let side = self.side.parse::<OrderSide>()?;
        let symbol = Symbol::parse(&self.symbol)?;

        let order_type = match self.order_type.trim().to_lowercase().as_str() {
            "" | "market" => OrderType::Market,
            "limit" => match self.limit_price {
                Some(price) if price > Decimal::ZERO => OrderType::Limit { limit_price: price },
                Some(price) => {
                    return Err(DashboardError::validation(format!(
                        "limit price must be positive, got {}",
                        price
                    )));
                }
                None => {
                    return Err(DashboardError::validation(
                        "limit orders require a limit price",
                    ));
                }
            },
            other => {
                return Err(DashboardError::validation(format!(
                    "unsupported order type '{}': must be 'market' or 'limit'",
                    other
                )));
            }
        };

        Ok(OrderRequest {
            symbol,
            quantity,
            side,
            order_type,
            time_in_force: TimeInForce::GoodTillCancelled,
        })
    }
}

/// A validated order, built per submission and never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub symbol: Symbol,
    pub quantity: u32,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub time_in_force: TimeInForce,
}

/// The brokerage's acknowledgement of a submitted order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderResult {
    pub order_id: String,
    pub symbol: Symbol,
    pub quantity: Decimal,
    pub side: OrderSide,
    pub order_type: String,
    pub time_in_force: String,
    pub status: String,
    pub submitted_at: Option<DateTime<Utc>>,
}

/// Symbols for which the brokerage accepted a close request.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LiquidationReport {
    pub symbols: Vec<Symbol>,
}
