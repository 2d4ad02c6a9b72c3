//! Combines one pair's observations into an [`AggregatedPrice`].

use oracle_config::AggregationConfig;
use oracle_types::{AggregatedPrice, Observation, PairKey};
use tracing::{debug, warn};

/// Median of `values`; the mean of the two middle values for even counts.
pub fn median(values: &[f64]) -> Option<f64> {
	if values.is_empty() {
		return None;
	}
	let mut sorted = values.to_vec();
	sorted.sort_by(|a, b| a.total_cmp(b));
	let mid = sorted.len() / 2;
	if sorted.len() % 2 == 0 {
		Some((sorted[mid - 1] + sorted[mid]) / 2.0)
	} else {
		Some(sorted[mid])
	}
}

/// Sample standard deviation (n - 1 denominator); zero below two values.
pub fn sample_std_dev(values: &[f64], mean: f64) -> f64 {
	if values.len() < 2 {
		return 0.0;
	}
	let variance =
		values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
	variance.sqrt()
}

/// Outlier-resistant mean of fixed-point prices.
///
/// Drops `max(1, n / trim_divisor)` prices from each end of the sorted sample
/// unless that would leave nothing, then takes the integer average. Samples
/// of one or two prices use the element at `n / 2`.
pub fn trimmed_mean(prices: &[u64], trim_divisor: usize) -> Option<u64> {
	if prices.is_empty() {
		return None;
	}
	let mut sorted = prices.to_vec();
	sorted.sort_unstable();
	let n = sorted.len();
	if n <= 2 {
		return Some(sorted[n / 2]);
	}

	let trim = (n / trim_divisor.max(1)).max(1);
	let kept = if n > 2 * trim {
		&sorted[trim..n - trim]
	} else {
		&sorted[..]
	};

	let sum: u128 = kept.iter().map(|p| *p as u128).sum();
	Some((sum / kept.len() as u128) as u64)
}

#[derive(Debug, Clone)]
pub struct Aggregator {
	min_observations: usize,
	trim_divisor: usize,
}

impl Default for Aggregator {
	fn default() -> Self {
		Self::new(2, 5)
	}
}

impl Aggregator {
	pub fn new(min_observations: usize, trim_divisor: usize) -> Self {
		Self {
			min_observations: min_observations.max(1),
			trim_divisor: trim_divisor.max(1),
		}
	}

	pub fn from_config(config: &AggregationConfig) -> Self {
		Self::new(config.min_observations, config.trim_divisor)
	}

	/// Aggregates the observations belonging to `pair`.
	///
	/// Returns `None` when fewer than the minimum number of observations are
	/// available. The result only depends on the observations, so aggregating
	/// the same set twice yields identical values.
	pub fn aggregate(&self, pair: &PairKey, observations: &[Observation]) -> Option<AggregatedPrice> {
		let relevant: Vec<&Observation> = observations.iter().filter(|o| &o.pair == pair).collect();

		if relevant.len() < self.min_observations {
			warn!(
				"Insufficient sources for {}: {} of {} required",
				pair,
				relevant.len(),
				self.min_observations
			);
			return None;
		}

		let raw: Vec<u64> = relevant.iter().map(|o| o.price).collect();
		let prices: Vec<f64> = raw.iter().map(|p| *p as f64).collect();

		let n = prices.len() as f64;
		let mean = prices.iter().sum::<f64>() / n;
		let median = median(&prices)?;
		let std_dev = sample_std_dev(&prices, mean);

		let total_weight: f64 = relevant.iter().map(|o| o.weight()).sum();
		let weighted = if total_weight > 0.0 {
			relevant
				.iter()
				.map(|o| o.price as f64 * o.weight())
				.sum::<f64>()
				/ total_weight
		} else {
			mean
		};

		let confidence = if mean > 0.0 {
			(1.0 - std_dev / mean).max(0.0)
		} else {
			0.0
		};

		let trimmed = trimmed_mean(&raw, self.trim_divisor)?;
		let timestamp = relevant.iter().map(|o| o.timestamp).max().unwrap_or_default();

		let aggregate = AggregatedPrice {
			pair: pair.clone(),
			median,
			mean,
			weighted,
			std_dev,
			confidence,
			trimmed,
			source_count: relevant.len(),
			sources: relevant.iter().map(|o| o.source.clone()).collect(),
			timestamp,
		};

		debug!(
			"Aggregated {} from {} sources: trimmed={} median={:.2} confidence={:.4}",
			pair, aggregate.source_count, aggregate.trimmed, aggregate.median, aggregate.confidence
		);
		Some(aggregate)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn observations(pair: &PairKey, prices: &[u64]) -> Vec<Observation> {
		prices
			.iter()
			.enumerate()
			.map(|(i, p)| Observation::new(format!("s{}", i), pair.clone(), *p, 1_000 + i as u64))
			.collect()
	}

	#[test]
	fn test_outlier_is_trimmed_away() {
		let pair = PairKey::new("STX", "USD");
		let aggregate = Aggregator::default()
			.aggregate(&pair, &observations(&pair, &[10000, 10002, 10006, 9940]))
			.unwrap();

		assert_eq!(aggregate.trimmed, 10001);
		assert_eq!(aggregate.published_price(), 10001);
		assert_eq!(aggregate.median, 10001.0);
		assert_eq!(aggregate.mean, 9987.0);
		assert_eq!(aggregate.source_count, 4);
		assert_eq!(aggregate.timestamp, 1_003);
		assert!(aggregate.confidence > 0.99);
	}

	#[test]
	fn test_insufficient_observations() {
		let pair = PairKey::new("STX", "USD");
		let aggregator = Aggregator::default();
		assert!(aggregator.aggregate(&pair, &[]).is_none());
		assert!(aggregator
			.aggregate(&pair, &observations(&pair, &[100]))
			.is_none());

		let other = PairKey::new("BTC", "USD");
		assert!(aggregator
			.aggregate(&pair, &observations(&other, &[100, 101, 102]))
			.is_none());
	}

	#[test]
	fn test_two_observations_use_middle_element() {
		let pair = PairKey::new("STX", "USD");
		let aggregate = Aggregator::default()
			.aggregate(&pair, &observations(&pair, &[200, 100]))
			.unwrap();
		assert_eq!(aggregate.trimmed, 200);
		assert_eq!(aggregate.median, 150.0);
	}

	#[test]
	fn test_trimmed_mean_stays_within_range() {
		let samples: &[&[u64]] = &[
			&[1, 2, 3],
			&[5, 1000, 7, 6, 4],
			&[10, 20, 30, 40, 50, 60, 70, 80, 90, 100, 110],
			&[3, 9],
			&[u64::MAX / 2, u64::MAX / 2 - 1, u64::MAX / 2 - 2],
		];
		for sample in samples {
			let trimmed = trimmed_mean(sample, 5).unwrap();
			assert!(trimmed >= *sample.iter().min().unwrap());
			assert!(trimmed <= *sample.iter().max().unwrap());
		}
	}

	#[test]
	fn test_trim_never_empties_sample() {
		assert_eq!(trimmed_mean(&[1, 2, 3], 5), Some(2));
		assert_eq!(trimmed_mean(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10], 5), Some(5));
		assert_eq!(trimmed_mean(&[10, 10, 10], 1), Some(10));
	}

	#[test]
	fn test_weighted_mean_uses_confidence_and_volume() {
		let pair = PairKey::new("BTC", "USD");
		let obs = vec![
			Observation::new("a", pair.clone(), 100, 1).with_volume(3.0),
			Observation::new("b", pair.clone(), 200, 1),
		];
		let aggregate = Aggregator::default().aggregate(&pair, &obs).unwrap();
		assert_eq!(aggregate.weighted, 125.0);
	}

	#[test]
	fn test_aggregation_is_idempotent() {
		let pair = PairKey::new("ALEX", "USD");
		let obs = observations(&pair, &[31, 29, 30, 35, 28]);
		let aggregator = Aggregator::default();
		assert_eq!(
			aggregator.aggregate(&pair, &obs),
			aggregator.aggregate(&pair, &obs)
		);
	}

	#[test]
	fn test_zero_prices_have_zero_confidence() {
		let pair = PairKey::new("ALEX", "USD");
		let aggregate = Aggregator::default()
			.aggregate(&pair, &observations(&pair, &[0, 0]))
			.unwrap();
		assert_eq!(aggregate.confidence, 0.0);
	}
}
