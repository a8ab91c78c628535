use crate::domain::errors::DashboardError;
use crate::domain::trading::symbol::Symbol;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// One open position as reported by the brokerage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Position {
    pub symbol: Symbol,
    pub quantity: Decimal,
    pub market_value: Decimal,
    pub cost_basis: Decimal,
    pub unrealized_pl: Decimal,
    pub avg_entry_price: Decimal,
    pub current_price: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioHistoryPoint {
    pub time: DateTime<Utc>,
    pub equity: Decimal,
}

/// Lookback window for the equity curve, e.g. `1M` or `3D`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryPeriod {
    count: u32,
    unit: PeriodUnit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodUnit {
    Day,
    Week,
    Month,
    Year,
}

impl HistoryPeriod {
    pub fn new(count: u32, unit: PeriodUnit) -> Result<Self, DashboardError> {
        if count == 0 {
            return Err(DashboardError::validation("history period must be at least 1"));
        }
        Ok(Self { count, unit })
    }

    pub fn one_month() -> Self {
        Self {
            count: 1,
            unit: PeriodUnit::Month,
        }
    }
}

impl Default for HistoryPeriod {
    fn default() -> Self {
        Self::one_month()
    }
}

impl FromStr for HistoryPeriod {
    type Err = DashboardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_uppercase();
        let invalid = || {
            DashboardError::validation(format!(
                "invalid history period '{}': expected <n>D, <n>W, <n>M or <n>A",
                s
            ))
        };

        let unit = match s.chars().last() {
            Some('D') => PeriodUnit::Day,
            Some('W') => PeriodUnit::Week,
            Some('M') => PeriodUnit::Month,
            Some('A') | Some('Y') => PeriodUnit::Year,
            _ => return Err(invalid()),
        };
        let count = s[..s.len() - 1].parse::<u32>().map_err(|_| invalid())?;
        HistoryPeriod::new(count, unit)
    }
}

impl fmt::Display for HistoryPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = match self.unit {
            PeriodUnit::Day => 'D',
            PeriodUnit::Week => 'W',
            PeriodUnit::Month => 'M',
            PeriodUnit::Year => 'A',
        };
        write!(f, "{}{}", self.count, unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_parsing() {
        assert_eq!("1M".parse::<HistoryPeriod>().unwrap(), HistoryPeriod::one_month());
        assert_eq!("3d".parse::<HistoryPeriod>().unwrap().to_string(), "3D");
        assert_eq!("1Y".parse::<HistoryPeriod>().unwrap().to_string(), "1A");
        assert!("0M".parse::<HistoryPeriod>().is_err());
        assert!("M".parse::<HistoryPeriod>().is_err());
        assert!("12".parse::<HistoryPeriod>().is_err());
        assert!("".parse::<HistoryPeriod>().is_err());
    }
}
