use crate::domain::market::price_tick::PriceTick;
use crate::domain::trading::symbol::Symbol;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

/// Last observed price for one symbol
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LivePrice {
    pub price: Decimal,
    /// Timestamp carried by the bar itself
    pub observed_at: DateTime<Utc>,
    /// Local arrival time, used for staleness
    pub received_at: DateTime<Utc>,
}

/// Symbol → last price, written by the feed client and read by the dashboard.
///
/// Entries are overwritten in arrival order; a late bar with an older
/// `observed_at` still replaces the current value.
pub struct LivePriceStore {
    prices: RwLock<HashMap<Symbol, LivePrice>>,
}

impl std::fmt::Debug for LivePriceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LivePriceStore")
            .field("prices", &"<RwLock>")
            .finish()
    }
}

impl LivePriceStore {
    pub fn new() -> Self {
        Self {
            prices: RwLock::new(HashMap::new()),
        }
    }

    pub fn upsert(&self, symbol: Symbol, price: Decimal) {
        self.record(PriceTick::now(symbol, price));
    }

    pub fn record(&self, tick: PriceTick) {
        let entry = LivePrice {
            price: tick.price,
            observed_at: tick.observed_at,
            received_at: Utc::now(),
        };

        match self.prices.write() {
            Ok(mut guard) => {
                guard.insert(tick.symbol, entry);
            }
            Err(poisoned) => {
                tracing::error!("LivePriceStore: Lock poisoned during write, recovering");
                poisoned.into_inner().insert(tick.symbol, entry);
            }
        }
    }

    pub fn get(&self, symbol: &str) -> Option<LivePrice> {
        match self.prices.read() {
            Ok(guard) => guard.get(symbol).cloned(),
            Err(poisoned) => poisoned.into_inner().get(symbol).cloned(),
        }
    }

    pub fn len(&self) -> usize {
        match self.prices.read() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies the current map. Later writes do not affect the returned value.
    pub fn snapshot(&self) -> PriceSnapshot {
        let prices = match self.prices.read() {
            Ok(guard) => guard
                .iter()
                .map(|(s, p)| (s.clone(), p.clone()))
                .collect(),
            Err(poisoned) => poisoned
                .into_inner()
                .iter()
                .map(|(s, p)| (s.clone(), p.clone()))
                .collect(),
        };

        PriceSnapshot {
            prices,
            taken_at: Utc::now(),
        }
    }
}

impl Default for LivePriceStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Immutable copy of the store, ordered by symbol
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceSnapshot {
    pub prices: BTreeMap<Symbol, LivePrice>,
    pub taken_at: DateTime<Utc>,
}

impl PriceSnapshot {
    pub fn price(&self, symbol: &str) -> Option<Decimal> {
        self.prices.get(symbol).map(|p| p.price)
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    /// Most recent arrival across all symbols
    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.prices.values().map(|p| p.received_at).max()
    }

    /// Symbols whose last arrival is older than `max_age` at `taken_at`
    pub fn stale_symbols(&self, max_age: Duration) -> Vec<Symbol> {
        self.prices
            .iter()
            .filter(|(_, p)| self.taken_at - p.received_at > max_age)
            .map(|(s, _)| s.clone())
            .collect()
    }

    /// True when nothing has arrived within `max_age`, including the empty case
    pub fn is_stale(&self, max_age: Duration) -> bool {
        match self.last_updated() {
            Some(last) => self.taken_at - last > max_age,
            None => true,
        }
    }
}
