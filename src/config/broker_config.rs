//! Alpaca configuration parsing from environment variables.

use anyhow::{Result, bail};
use std::fmt;
use std::str::FromStr;

/// Alpaca market data feed: the free IEX feed or the consolidated SIP feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataFeed {
    #[default]
    Iex,
    Sip,
}

impl FromStr for DataFeed {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "iex" => Ok(DataFeed::Iex),
            "sip" => Ok(DataFeed::Sip),
            _ => bail!("Invalid ALPACA_DATA_FEED: {}. Must be 'iex' or 'sip'", s),
        }
    }
}

impl fmt::Display for DataFeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataFeed::Iex => write!(f, "iex"),
            DataFeed::Sip => write!(f, "sip"),
        }
    }
}

/// Alpaca API configuration
#[derive(Clone, Default)]
pub struct AlpacaConfig {
    pub api_key: String,
    pub secret_key: String,
    pub base_url: String,
    pub data_ws_url: String,
    pub data_feed: DataFeed,
}

// Credentials stay out of logs.
impl fmt::Debug for AlpacaConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlpacaConfig")
            .field("api_key", &mask(&self.api_key))
            .field("secret_key", &mask(&self.secret_key))
            .field("base_url", &self.base_url)
            .field("data_ws_url", &self.data_ws_url)
            .field("data_feed", &self.data_feed)
            .finish()
    }
}

fn mask(value: &str) -> &'static str {
    if value.is_empty() { "<unset>" } else { "<redacted>" }
}

impl AlpacaConfig {
    pub fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self> {
        let data_feed = match lookup("ALPACA_DATA_FEED") {
            Some(raw) => raw.parse()?,
            None => DataFeed::default(),
        };

        Ok(Self {
            api_key: lookup("ALPACA_API_KEY").unwrap_or_default(),
            secret_key: lookup("ALPACA_SECRET_KEY").unwrap_or_default(),
            base_url: lookup("ALPACA_BASE_URL")
                .unwrap_or_else(|| "https://paper-api.alpaca.markets".to_string()),
            data_ws_url: lookup("ALPACA_WS_URL").unwrap_or_else(|| {
                format!("wss://stream.data.alpaca.markets/v2/{}", data_feed)
            }),
            data_feed,
        })
    }

    pub fn has_credentials(&self) -> bool {
        !self.api_key.trim().is_empty() && !self.secret_key.trim().is_empty()
    }
}
