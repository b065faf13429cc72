//! Currencies, currency pairs and the instrument key.
//!
//! An [`Instrument`] identifies one order book: a venue plus the pair traded
//! on it. It is immutable and cheap to hash, so it is used as the key for every
//! per-instrument map in the crate.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::venue::Venue;
use crate::error::Error;

/// Quote currencies recognised when a venue concatenates its symbols
/// (`BTCUSDT`). Longer symbols are tried first so `USDT` wins over `USD`.
const KNOWN_QUOTES: &[&str] = &[
    "USDT", "USDC", "BUSD", "TUSD", "USD", "EUR", "KRW", "JPY", "GBP", "BTC", "ETH", "BNB", "HT",
    "OKB",
];

/// Upper-cased currency symbol
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Currency(String);

impl Currency {
    /// Create a currency from any casing of its symbol
    pub fn new(symbol: impl AsRef<str>) -> Self {
        Self(symbol.as_ref().trim().to_ascii_uppercase())
    }

    /// The upper-cased symbol
    pub fn symbol(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Pair of (target, base) currencies, e.g. BTC priced in USDT
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CurrencyPair {
    /// Currency being bought or sold
    pub target: Currency,
    /// Currency the price is quoted in
    pub base: Currency,
}

impl CurrencyPair {
    /// Create a pair from two symbols
    pub fn new(target: impl AsRef<str>, base: impl AsRef<str>) -> Self {
        Self {
            target: Currency::new(target),
            base: Currency::new(base),
        }
    }

    /// Parse a venue symbol into a pair.
    ///
    /// Accepts `BTC-USDT`, `BTC/USDT`, `BTC_USDT` and concatenated symbols
    /// such as `btcusdt` whose quote currency is a known quote.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSymbol`] if no split can be found.
    pub fn parse(symbol: &str) -> Result<Self, Error> {
        let trimmed = symbol.trim();
        if let Some((target, base)) = trimmed.split_once(['-', '/', '_']) {
            if target.is_empty() || base.is_empty() {
                return Err(Error::InvalidSymbol(symbol.to_string()));
            }
            return Ok(Self::new(target, base));
        }

        let upper = trimmed.to_ascii_uppercase();
        let mut quotes: Vec<&str> = KNOWN_QUOTES.to_vec();
        quotes.sort_by_key(|q| std::cmp::Reverse(q.len()));
        quotes
            .into_iter()
            .find(|quote| upper.len() > quote.len() && upper.ends_with(quote))
            .map(|quote| Self::new(&upper[..upper.len() - quote.len()], quote))
            .ok_or_else(|| Error::InvalidSymbol(symbol.to_string()))
    }
}

impl fmt::Display for CurrencyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.target, self.base)
    }
}

impl FromStr for CurrencyPair {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Key of one order book: (venue, target currency, base currency)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Instrument {
    /// Venue the book lives on
    pub venue: Venue,
    /// Pair traded on the venue
    pub pair: CurrencyPair,
}

impl Instrument {
    /// Create an instrument key
    pub fn new(venue: Venue, target: impl AsRef<str>, base: impl AsRef<str>) -> Self {
        Self {
            venue,
            pair: CurrencyPair::new(target, base),
        }
    }

    /// Build an instrument from a venue symbol
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSymbol`] if the symbol cannot be split.
    pub fn from_symbol(venue: Venue, symbol: &str) -> Result<Self, Error> {
        Ok(Self {
            venue,
            pair: CurrencyPair::parse(symbol)?,
        })
    }

    /// Target currency
    pub fn target(&self) -> &Currency {
        &self.pair.target
    }

    /// Base currency
    pub fn base(&self) -> &Currency {
        &self.pair.base
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.venue, self.pair)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_currency_is_uppercased() {
        assert_eq!(Currency::new(" btc ").symbol(), "BTC");
    }

    #[test]
    fn test_parse_separated_symbols() {
        for symbol in ["BTC-USDT", "btc/usdt", "Btc_Usdt"] {
            let pair = CurrencyPair::parse(symbol).unwrap();
            assert_eq!(pair, CurrencyPair::new("BTC", "USDT"), "symbol {}", symbol);
        }
    }

    #[test]
    fn test_parse_concatenated_prefers_longest_quote() {
        let pair = CurrencyPair::parse("ethusdt").unwrap();
        assert_eq!(pair.target.symbol(), "ETH");
        assert_eq!(pair.base.symbol(), "USDT");

        let pair = CurrencyPair::parse("XRPKRW").unwrap();
        assert_eq!(pair, CurrencyPair::new("XRP", "KRW"));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(CurrencyPair::parse("USDT").is_err());
        assert!(CurrencyPair::parse("-USDT").is_err());
        assert!(CurrencyPair::parse("FOOBAR").is_err());
    }

    #[test]
    fn test_instrument_display_and_equality() {
        let a = Instrument::new(Venue::Binance, "btc", "usdt");
        let b = Instrument::from_symbol(Venue::Binance, "BTCUSDT").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "BINANCE:BTC-USDT");
        assert_ne!(a, Instrument::new(Venue::Kraken, "BTC", "USDT"));
    }
}
