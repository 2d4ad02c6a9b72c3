//! Flags aggregates that look untrustworthy.
//!
//! Any one of these triggers is sufficient:
//! - a single source sits more than `source_deviation_bps` away from the
//!   plain average of the cycle's observations (0 turns this off);
//! - the weighted price deviates from the median of the recent history by
//!   more than `deviation_threshold` (only with `min_history` entries);
//! - the aggregate's own confidence is below `min_confidence`.

use crate::aggregator::median;
use oracle_config::AnomalyConfig;
use oracle_types::{AggregatedPrice, Observation, PairKey};
use std::fmt;
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub enum AnomalyVerdict {
	Accepted,
	Deviation { deviation: f64, reference: f64 },
	LowConfidence { confidence: f64 },
	SourceDeviation { source: String, deviation_bps: u64 },
}

impl AnomalyVerdict {
	pub fn is_anomalous(&self) -> bool {
		!matches!(self, AnomalyVerdict::Accepted)
	}
}

impl fmt::Display for AnomalyVerdict {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Accepted => write!(f, "accepted"),
			Self::Deviation {
				deviation,
				reference,
			} => write!(
				f,
				"deviation {:.2}% from trailing median {:.2}",
				deviation * 100.0,
				reference
			),
			Self::LowConfidence { confidence } => write!(f, "confidence {:.4} too low", confidence),
			Self::SourceDeviation {
				source,
				deviation_bps,
			} => write!(
				f,
				"source {} is {} bps from the cross-source average",
				source, deviation_bps
			),
		}
	}
}

#[derive(Debug, Clone)]
pub struct AnomalyDetector {
	deviation_threshold: f64,
	min_confidence: f64,
	history_window: usize,
	min_history: usize,
	source_deviation_bps: u64,
}

impl Default for AnomalyDetector {
	fn default() -> Self {
		Self::from_config(&AnomalyConfig::default())
	}
}

impl AnomalyDetector {
	pub fn new(
		deviation_threshold: f64,
		min_confidence: f64,
		history_window: usize,
		min_history: usize,
	) -> Self {
		Self {
			deviation_threshold,
			min_confidence,
			history_window: history_window.max(1),
			min_history,
			source_deviation_bps: 0,
		}
	}

	pub fn with_source_deviation_bps(mut self, bps: u64) -> Self {
		self.source_deviation_bps = bps;
		self
	}

	pub fn from_config(config: &AnomalyConfig) -> Self {
		Self::new(
			config.deviation_threshold,
			config.min_confidence,
			config.history_window,
			config.min_history,
		)
		.with_source_deviation_bps(config.source_deviation_bps)
	}

	/// Flags the first source whose price is too far from the average of
	/// all observations in the cycle.
	pub fn screen_sources(&self, observations: &[Observation]) -> AnomalyVerdict {
		if self.source_deviation_bps == 0 || observations.len() < 2 {
			return AnomalyVerdict::Accepted;
		}
		let total: u128 = observations.iter().map(|o| o.price as u128).sum();
		let average = total / observations.len() as u128;
		if average == 0 {
			return AnomalyVerdict::Accepted;
		}

		observations
			.iter()
			.find_map(|o| {
				let deviation_bps = ((o.price as u128).abs_diff(average) * 10_000 / average) as u64;
				(deviation_bps > self.source_deviation_bps).then(|| AnomalyVerdict::SourceDeviation {
					source: o.source.clone(),
					deviation_bps,
				})
			})
			.unwrap_or(AnomalyVerdict::Accepted)
	}

	/// The source screen followed by [`evaluate`](Self::evaluate).
	pub fn evaluate_cycle<'a, I>(
		&self,
		candidate: &AggregatedPrice,
		observations: &[Observation],
		history: I,
	) -> AnomalyVerdict
	where
		I: IntoIterator<Item = &'a AggregatedPrice>,
		I::IntoIter: DoubleEndedIterator + ExactSizeIterator,
	{
		match self.screen_sources(observations) {
			AnomalyVerdict::Accepted => self.evaluate(candidate, history),
			rejected => rejected,
		}
	}

	/// Judges `candidate` against `history`, oldest entry first.
	pub fn evaluate<'a, I>(&self, candidate: &AggregatedPrice, history: I) -> AnomalyVerdict
	where
		I: IntoIterator<Item = &'a AggregatedPrice>,
		I::IntoIter: DoubleEndedIterator + ExactSizeIterator,
	{
		let history = history.into_iter();
		if history.len() >= self.min_history {
			let recent: Vec<f64> = history
				.rev()
				.take(self.history_window)
				.map(|a| a.weighted)
				.collect();

			if let Some(reference) = median(&recent).filter(|m| *m > 0.0) {
				let deviation = (candidate.weighted - reference).abs() / reference;
				if deviation > self.deviation_threshold {
					return AnomalyVerdict::Deviation {
						deviation,
						reference,
					};
				}
			}
		}

		if candidate.confidence < self.min_confidence {
			return AnomalyVerdict::LowConfidence {
				confidence: candidate.confidence,
			};
		}

		AnomalyVerdict::Accepted
	}

	/// Convenience wrapper over [`evaluate`](Self::evaluate) that logs rejections.
	pub fn is_anomalous<'a, I>(&self, pair: &PairKey, candidate: &AggregatedPrice, history: I) -> bool
	where
		I: IntoIterator<Item = &'a AggregatedPrice>,
		I::IntoIter: DoubleEndedIterator + ExactSizeIterator,
	{
		let verdict = self.evaluate(candidate, history);
		if verdict.is_anomalous() {
			warn!(
				"Anomalous aggregate for {} (weighted {:.2}, confidence {:.4}): {}",
				pair, candidate.weighted, candidate.confidence, verdict
			);
		}
		verdict.is_anomalous()
	}
}
