//! Configuration module for livedash.
//!
//! Settings come from environment variables (optionally a `.env` file loaded
//! by the binary). Parsing goes through [`Config::from_lookup`] so it can be
//! exercised without touching the process environment.

mod broker_config;

pub use broker_config::{AlpacaConfig, DataFeed};

use crate::application::market_data::feed_client::FeedSettings;
use crate::domain::market::timeframe::Timeframe;
use crate::domain::trading::portfolio::HistoryPeriod;
use crate::domain::trading::symbol::{Symbol, parse_symbol_list};
use anyhow::{Context, Result, bail};
use std::env;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_SYMBOLS: &str = "AAPL,MSFT";

/// Application execution mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Mock,
    Alpaca,
}

impl FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mock" => Ok(Mode::Mock),
            "alpaca" => Ok(Mode::Alpaca),
            _ => bail!("Invalid MODE: {}. Must be 'mock' or 'alpaca'", s),
        }
    }
}

/// Dashboard behaviour independent of the brokerage.
#[derive(Debug, Clone)]
pub struct DashboardConfig {
    pub symbols: Vec<Symbol>,
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub feed: FeedSettings,
    pub stale_after: Duration,
    pub history_period: HistoryPeriod,
    pub history_timeframe: Timeframe,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            symbols: parse_symbol_list(DEFAULT_SYMBOLS).unwrap_or_default(),
            request_timeout: Duration::from_secs(10),
            max_retries: 2,
            feed: FeedSettings::default(),
            stale_after: Duration::from_secs(120),
            history_period: HistoryPeriod::one_month(),
            history_timeframe: Timeframe::OneDay,
        }
    }
}

impl DashboardConfig {
    pub fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let default_feed = defaults.feed;

        let symbols = match lookup("SYMBOLS") {
            Some(raw) => parse_symbol_list(&raw).context("Failed to parse SYMBOLS")?,
            None => defaults.symbols,
        };

        let feed = FeedSettings {
            reconnect: parse_or(lookup, "FEED_RECONNECT", default_feed.reconnect)?,
            max_reconnect_attempts: parse_or(
                lookup,
                "FEED_MAX_RECONNECT_ATTEMPTS",
                default_feed.max_reconnect_attempts,
            )?,
            initial_reconnect_delay: millis_or(
                lookup,
                "FEED_RECONNECT_DELAY_MS",
                default_feed.initial_reconnect_delay,
            )?,
            max_reconnect_delay: millis_or(
                lookup,
                "FEED_MAX_RECONNECT_DELAY_MS",
                default_feed.max_reconnect_delay,
            )?,
        };

        let request_timeout = millis_or(lookup, "REQUEST_TIMEOUT_MS", defaults.request_timeout)?;
        if request_timeout.is_zero() {
            bail!("REQUEST_TIMEOUT_MS must be greater than 0");
        }

        let stale_after = Duration::from_secs(parse_or(
            lookup,
            "PRICE_STALE_AFTER_SECS",
            defaults.stale_after.as_secs(),
        )?);

        Ok(Self {
            symbols,
            request_timeout,
            max_retries: parse_or(lookup, "HTTP_MAX_RETRIES", defaults.max_retries)?,
            feed,
            stale_after,
            history_period: parse_or(lookup, "HISTORY_PERIOD", defaults.history_period)?,
            history_timeframe: parse_or(lookup, "HISTORY_TIMEFRAME", defaults.history_timeframe)?,
        })
    }
}

/// Main application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub mode: Mode,
    pub alpaca: AlpacaConfig,
    pub dashboard: DashboardConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mode_str = lookup("MODE").unwrap_or_else(|| "mock".to_string());
        let mode = Mode::from_str(&mode_str)?;

        let alpaca = AlpacaConfig::from_lookup(&lookup).context("Failed to load Alpaca config")?;
        if mode == Mode::Alpaca && !alpaca.has_credentials() {
            bail!("MODE=alpaca requires ALPACA_API_KEY and ALPACA_SECRET_KEY");
        }

        let dashboard =
            DashboardConfig::from_lookup(&lookup).context("Failed to load dashboard config")?;

        Ok(Self {
            mode,
            alpaca,
            dashboard,
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("Failed to parse {}='{}': {}", key, raw, e)),
        _ => Ok(default),
    }
}

fn millis_or(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Result<Duration> {
    let millis = parse_or(lookup, key, default.as_millis() as u64)?;
    Ok(Duration::from_millis(millis))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::from_lookup(env_of(&[])).expect("Should parse with defaults");
        assert_eq!(config.mode, Mode::Mock);
        let symbols: Vec<&str> = config.dashboard.symbols.iter().map(Symbol::as_str).collect();
        assert_eq!(symbols, vec!["AAPL", "MSFT"]);
        assert_eq!(config.dashboard.request_timeout, Duration::from_secs(10));
        assert_eq!(config.dashboard.max_retries, 2);
        assert!(config.dashboard.feed.reconnect);
        assert_eq!(config.dashboard.history_period.to_string(), "1M");
        assert_eq!(config.dashboard.history_timeframe, Timeframe::OneDay);
    }

    #[test]
    fn test_mode_parsing() {
        assert!(matches!(Mode::from_str("mock").unwrap(), Mode::Mock));
        assert!(matches!(Mode::from_str("ALPACA").unwrap(), Mode::Alpaca));
        assert!(Mode::from_str("oanda").is_err());
    }

    #[test]
    fn test_alpaca_mode_requires_credentials() {
        let err = Config::from_lookup(env_of(&[("MODE", "alpaca")])).unwrap_err();
        assert!(err.to_string().contains("ALPACA_API_KEY"));

        let config = Config::from_lookup(env_of(&[
            ("MODE", "alpaca"),
            ("ALPACA_API_KEY", "key"),
            ("ALPACA_SECRET_KEY", "secret"),
        ]))
        .unwrap();
        assert_eq!(config.mode, Mode::Alpaca);
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(env_of(&[
            ("SYMBOLS", "tsla, nvda ,tsla"),
            ("REQUEST_TIMEOUT_MS", "2500"),
            ("HTTP_MAX_RETRIES", "0"),
            ("FEED_RECONNECT", "false"),
            ("FEED_RECONNECT_DELAY_MS", "250"),
            ("PRICE_STALE_AFTER_SECS", "30"),
            ("HISTORY_PERIOD", "1A"),
            ("HISTORY_TIMEFRAME", "1H"),
        ]))
        .unwrap();

        let dashboard = config.dashboard;
        let symbols: Vec<&str> = dashboard.symbols.iter().map(Symbol::as_str).collect();
        assert_eq!(symbols, vec!["TSLA", "NVDA"]);
        assert_eq!(dashboard.request_timeout, Duration::from_millis(2500));
        assert_eq!(dashboard.max_retries, 0);
        assert!(!dashboard.feed.reconnect);
        assert_eq!(dashboard.feed.initial_reconnect_delay, Duration::from_millis(250));
        assert_eq!(dashboard.stale_after, Duration::from_secs(30));
        assert_eq!(dashboard.history_period.to_string(), "1A");
        assert_eq!(dashboard.history_timeframe, Timeframe::OneHour);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(Config::from_lookup(env_of(&[("REQUEST_TIMEOUT_MS", "soon")])).is_err());
        assert!(Config::from_lookup(env_of(&[("REQUEST_TIMEOUT_MS", "0")])).is_err());
        assert!(Config::from_lookup(env_of(&[("SYMBOLS", " , ")])).is_err());
        assert!(Config::from_lookup(env_of(&[("MODE", "paper")])).is_err());
    }
}
