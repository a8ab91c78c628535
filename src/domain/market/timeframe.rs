use crate::domain::errors::DashboardError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Resolution of the portfolio equity curve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Timeframe {
    OneMin,
    FiveMin,
    FifteenMin,
    OneHour,
    #[default]
    OneDay,
}

impl Timeframe {
    /// Converts to the Alpaca portfolio-history timeframe string
    pub fn to_alpaca_string(&self) -> &'static str {
        match self {
            Timeframe::OneMin => "1Min",
            Timeframe::FiveMin => "5Min",
            Timeframe::FifteenMin => "15Min",
            Timeframe::OneHour => "1H",
            Timeframe::OneDay => "1D",
        }
    }
}

impl FromStr for Timeframe {
    type Err = DashboardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "1m" | "1min" => Ok(Timeframe::OneMin),
            "5m" | "5min" => Ok(Timeframe::FiveMin),
            "15m" | "15min" => Ok(Timeframe::FifteenMin),
            "1h" | "1hour" => Ok(Timeframe::OneHour),
            "1d" | "1day" => Ok(Timeframe::OneDay),
            _ => Err(DashboardError::validation(format!(
                "invalid timeframe '{}': valid options are 1Min, 5Min, 15Min, 1H, 1D",
                s
            ))),
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_alpaca_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_str() {
        assert_eq!(Timeframe::from_str("1Min").unwrap(), Timeframe::OneMin);
        assert_eq!(Timeframe::from_str("15m").unwrap(), Timeframe::FifteenMin);
        assert_eq!(Timeframe::from_str("1H").unwrap(), Timeframe::OneHour);
        assert_eq!(Timeframe::from_str("1d").unwrap(), Timeframe::OneDay);
        assert!(Timeframe::from_str("4Hour").is_err());
    }

    #[test]
    fn test_alpaca_strings_round_trip_through_parser() {
        for tf in [
            Timeframe::OneMin,
            Timeframe::FiveMin,
            Timeframe::FifteenMin,
            Timeframe::OneHour,
            Timeframe::OneDay,
        ] {
            assert_eq!(Timeframe::from_str(tf.to_alpaca_string()).unwrap(), tf);
        }
    }
}
