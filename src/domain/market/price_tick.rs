use crate::domain::trading::symbol::Symbol;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

/// Latest close for a symbol, produced once per accepted bar.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceTick {
    pub symbol: Symbol,
    pub price: Decimal,
    pub observed_at: DateTime<Utc>,
}

impl PriceTick {
    pub fn new(symbol: Symbol, price: Decimal, observed_at: DateTime<Utc>) -> Self {
        Self {
            symbol,
            price,
            observed_at,
        }
    }

    /// Tick stamped with the local clock, for sources that carry no time.
    pub fn now(symbol: Symbol, price: Decimal) -> Self {
        Self::new(symbol, price, Utc::now())
    }
}
