//! Ticker symbols.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Rejected ticker input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("ticker symbol must not be empty")]
pub struct EmptyTicker;

/// Case-sensitive, non-empty instrument code (e.g. `GOOGL`, `BRK-B`, `BTC-USD`).
///
/// Nothing beyond non-emptiness is checked: an unknown symbol simply comes
/// back with no data.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TickerSymbol(String);

impl TickerSymbol {
    /// Surrounding whitespace is trimmed; case is preserved.
    pub fn new(raw: impl AsRef<str>) -> Result<Self, EmptyTicker> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(EmptyTicker);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TickerSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TickerSymbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for TickerSymbol {
    type Err = EmptyTicker;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for TickerSymbol {
    type Error = EmptyTicker;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TickerSymbol> for String {
    fn from(value: TickerSymbol) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_blank_input() {
        assert_eq!(TickerSymbol::new(""), Err(EmptyTicker));
        assert_eq!(TickerSymbol::new("   "), Err(EmptyTicker));
    }

    #[test]
    fn preserves_case_and_trims() {
        let t = TickerSymbol::new("  brk-B ").unwrap();
        assert_eq!(t.as_str(), "brk-B");
        assert_ne!(t, TickerSymbol::new("BRK-B").unwrap());
    }

    #[test]
    fn deserialize_rejects_empty() {
        let ok: TickerSymbol = serde_json::from_str("\"GOOG\"").unwrap();
        assert_eq!(ok.to_string(), "GOOG");
        assert!(serde_json::from_str::<TickerSymbol>("\"\"").is_err());
    }
}
