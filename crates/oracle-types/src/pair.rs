//! Trading pair identifiers and registry entries.

use crate::ChannelId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error returned when a pair string such as `"BTC/USD"` cannot be parsed.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid trading pair '{0}': expected BASE/QUOTE")]
pub struct PairParseError(pub String);

/// A base/quote asset combination, e.g. `STX/USD`.
///
/// Asset symbols are normalised to upper case so that `btc/usd` and `BTC/USD`
/// address the same pair. Serialises as the `BASE/QUOTE` string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PairKey {
	pub base: String,
	pub quote: String,
}

impl PairKey {
	pub fn new(base: impl AsRef<str>, quote: impl AsRef<str>) -> Self {
		Self {
			base: base.as_ref().trim().to_uppercase(),
			quote: quote.as_ref().trim().to_uppercase(),
		}
	}
}

impl fmt::Display for PairKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}/{}", self.base, self.quote)
	}
}

impl FromStr for PairKey {
	type Err = PairParseError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.split_once('/') {
			Some((base, quote))
				if !base.trim().is_empty() && !quote.trim().is_empty() && !quote.contains('/') =>
			{
				Ok(Self::new(base, quote))
			}
			_ => Err(PairParseError(s.to_string())),
		}
	}
}

impl TryFrom<String> for PairKey {
	type Error = PairParseError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		value.parse()
	}
}

impl From<PairKey> for String {
	fn from(pair: PairKey) -> Self {
		pair.to_string()
	}
}

/// A registered trading pair as known to the registry collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairRegistration {
	pub pair: PairKey,
	/// Minimum number of healthy channels the pair must keep.
	pub min_sources: usize,
	/// Whitelisted channels allowed to publish for this pair.
	pub channels: Vec<ChannelId>,
}

impl PairRegistration {
	pub fn new(pair: PairKey, min_sources: usize, channels: Vec<ChannelId>) -> Self {
		Self {
			pair,
			min_sources,
			channels,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_pair_parse_and_display() {
		let pair: PairKey = "stx/usd".parse().unwrap();
		assert_eq!(pair.base, "STX");
		assert_eq!(pair.quote, "USD");
		assert_eq!(pair.to_string(), "STX/USD");
	}

	#[test]
	fn test_pair_parse_rejects_malformed() {
		assert!("BTCUSD".parse::<PairKey>().is_err());
		assert!("/USD".parse::<PairKey>().is_err());
		assert!("BTC/".parse::<PairKey>().is_err());
		assert!("A/B/C".parse::<PairKey>().is_err());
	}

	#[test]
	fn test_pair_serializes_as_string() {
		let pair = PairKey::new("alex", "stx");
		let json = serde_json::to_string(&pair).unwrap();
		assert_eq!(json, "\"ALEX/STX\"");

		let back: PairKey = serde_json::from_str(&json).unwrap();
		assert_eq!(back, pair);
	}
}
