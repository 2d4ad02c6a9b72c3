//! Fixed-point price observations and aggregates.
//!
//! Prices travel through the pipeline as unsigned integers scaled by
//! [`PRICE_SCALE`] (two decimal places), which is also the unit the ledger
//! stores. Floating point is only used for the statistics derived from them.

use crate::PairKey;
use serde::{Deserialize, Serialize};

/// Scale factor between a decimal price and its fixed-point representation.
pub const PRICE_SCALE: u64 = 100;

/// Converts a decimal price reported by a source into fixed-point units.
///
/// Truncates like an integer cast, but snaps values that sit within float
/// noise of the next unit (`100.02 * 100 == 10001.999…`) to that unit.
/// Returns `None` for negative, NaN or infinite input.
pub fn to_fixed(value: f64) -> Option<u64> {
	if !value.is_finite() || value < 0.0 {
		return None;
	}
	let scaled = value * PRICE_SCALE as f64;
	let nearest = scaled.round();
	let units = if (scaled - nearest).abs() < 1e-6 {
		nearest
	} else {
		scaled.trunc()
	};
	if units > u64::MAX as f64 {
		return None;
	}
	Some(units as u64)
}

/// Converts fixed-point units back into a decimal price.
pub fn from_fixed(units: u64) -> f64 {
	units as f64 / PRICE_SCALE as f64
}

/// A single price reported by one external source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
	pub source: String,
	pub pair: PairKey,
	/// Fixed-point price, see [`PRICE_SCALE`].
	pub price: u64,
	pub timestamp: u64,
	pub volume: Option<f64>,
	pub confidence: Option<f64>,
}

impl Observation {
	pub fn new(source: impl Into<String>, pair: PairKey, price: u64, timestamp: u64) -> Self {
		Self {
			source: source.into(),
			pair,
			price,
			timestamp,
			volume: None,
			confidence: None,
		}
	}

	pub fn with_volume(mut self, volume: f64) -> Self {
		self.volume = Some(volume);
		self
	}

	pub fn with_confidence(mut self, confidence: f64) -> Self {
		self.confidence = Some(confidence);
		self
	}

	/// Weight of this observation in the weighted mean:
	/// `confidence × volume`, where a missing or non-positive volume counts as 1.
	pub fn weight(&self) -> f64 {
		let confidence = self.confidence.unwrap_or(1.0);
		let volume = match self.volume {
			Some(v) if v > 0.0 => v,
			_ => 1.0,
		};
		confidence * volume
	}
}

/// The combined view of one pair's observations for one coordination cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedPrice {
	pub pair: PairKey,
	pub median: f64,
	pub mean: f64,
	pub weighted: f64,
	pub std_dev: f64,
	/// `max(0, 1 - std_dev / mean)`, zero when the mean is not positive.
	pub confidence: f64,
	/// Outlier-resistant trimmed mean; this is the value that gets published.
	pub trimmed: u64,
	pub source_count: usize,
	pub sources: Vec<String>,
	/// Newest observation timestamp among the contributors.
	pub timestamp: u64,
}

impl AggregatedPrice {
	pub fn published_price(&self) -> u64 {
		self.trimmed
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_to_fixed_handles_float_noise() {
		assert_eq!(to_fixed(100.02), Some(10002));
		assert_eq!(to_fixed(0.29), Some(29));
		assert_eq!(to_fixed(1.239), Some(123));
		assert_eq!(to_fixed(64123.456), Some(6412345));
	}

	#[test]
	fn test_to_fixed_rejects_invalid_values() {
		assert_eq!(to_fixed(-1.0), None);
		assert_eq!(to_fixed(f64::NAN), None);
		assert_eq!(to_fixed(f64::INFINITY), None);
	}

	#[test]
	fn test_observation_weight() {
		let pair = PairKey::new("BTC", "USD");
		let plain = Observation::new("kraken", pair.clone(), 100, 0);
		assert_eq!(plain.weight(), 1.0);

		let weighted = Observation::new("kraken", pair.clone(), 100, 0)
			.with_volume(250.0)
			.with_confidence(0.8);
		assert!((weighted.weight() - 200.0).abs() < 1e-9);

		let zero_volume = Observation::new("kraken", pair, 100, 0)
			.with_volume(0.0)
			.with_confidence(0.5);
		assert_eq!(zero_volume.weight(), 0.5);
	}
}
