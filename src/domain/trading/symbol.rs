use crate::domain::errors::DashboardError;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

/// Uppercase ticker identifying a tradable instrument.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    /// Trims and uppercases `raw`. Crypto pairs (`BTC/USD`) and share
    /// classes (`BRK.B`) are accepted.
    pub fn parse(raw: &str) -> Result<Self, DashboardError> {
        let normalized = raw.trim().to_uppercase();
        if normalized.is_empty() {
            return Err(DashboardError::validation("symbol must not be empty"));
        }
        if let Some(bad) = normalized
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '/' | '-')))
        {
            return Err(DashboardError::validation(format!(
                "symbol '{}' contains invalid character '{}'",
                raw.trim(),
                bad
            )));
        }
        Ok(Symbol(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Symbol {
    type Err = DashboardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Symbol::parse(s)
    }
}

impl TryFrom<String> for Symbol {
    type Error = DashboardError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Symbol::parse(&value)
    }
}

impl From<Symbol> for String {
    fn from(symbol: Symbol) -> Self {
        symbol.0
    }
}

impl Borrow<str> for Symbol {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parses comma-separated user input such as `"aapl, msft"`.
///
/// Blank entries are skipped and duplicates collapse onto their first
/// occurrence.
pub fn parse_symbol_list(input: &str) -> Result<Vec<Symbol>, DashboardError> {
    let mut symbols: Vec<Symbol> = Vec::new();
    for part in input.split(',').filter(|p| !p.trim().is_empty()) {
        let symbol = Symbol::parse(part)?;
        if !symbols.contains(&symbol) {
            symbols.push(symbol);
        }
    }

    if symbols.is_empty() {
        return Err(DashboardError::validation("no symbols given"));
    }
    Ok(symbols)
}
