//! Per-source health counters.
//!
//! Process-lifetime state: counters only reset on restart. Other components
//! read snapshots for diagnostics; only [`SourceService`](crate::SourceService)
//! writes.

use dashmap::DashMap;
use oracle_types::current_timestamp;
use serde::Serialize;
use std::collections::BTreeMap;

/// Longest error message kept in [`SourceHealth::last_error`].
pub const MAX_ERROR_CHARS: usize = 180;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SourceHealth {
	pub ok: u64,
	pub err: u64,
	pub last_error: Option<String>,
	pub last_latency_ms: Option<u64>,
	pub total_latency_ms: u64,
	pub last_ts: Option<u64>,
}

impl SourceHealth {
	/// Mean latency over successful fetches.
	pub fn avg_latency_ms(&self) -> Option<f64> {
		(self.ok > 0).then(|| self.total_latency_ms as f64 / self.ok as f64)
	}
}

#[derive(Debug, Default)]
pub struct SourceMetricsRegistry {
	sources: DashMap<String, SourceHealth>,
}

impl SourceMetricsRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn record_success(&self, source: &str, latency_ms: u64) {
		let mut entry = self.sources.entry(source.to_string()).or_default();
		entry.ok += 1;
		entry.last_error = None;
		entry.last_latency_ms = Some(latency_ms);
		entry.total_latency_ms = entry.total_latency_ms.saturating_add(latency_ms);
		entry.last_ts = Some(current_timestamp());
	}

	pub fn record_failure(&self, source: &str, error: &str) {
		let mut entry = self.sources.entry(source.to_string()).or_default();
		entry.err += 1;
		entry.last_error = Some(truncate_error(error));
		entry.last_ts = Some(current_timestamp());
	}

	pub fn get(&self, source: &str) -> Option<SourceHealth> {
		self.sources.get(source).map(|e| e.value().clone())
	}

	/// All sources, ordered by name.
	pub fn snapshot(&self) -> BTreeMap<String, SourceHealth> {
		self.sources
			.iter()
			.map(|e| (e.key().clone(), e.value().clone()))
			.collect()
	}
}

fn truncate_error(error: &str) -> String {
	if error.chars().count() <= MAX_ERROR_CHARS {
		return error.to_string();
	}
	let mut truncated: String = error.chars().take(MAX_ERROR_CHARS).collect();
	truncated.push('…');
	truncated
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_success_clears_last_error_and_accumulates_latency() {
		let registry = SourceMetricsRegistry::new();
		registry.record_failure("binance", "boom");
		registry.record_success("binance", 40);
		registry.record_success("binance", 60);

		let health = registry.get("binance").unwrap();
		assert_eq!(health.ok, 2);
		assert_eq!(health.err, 1);
		assert_eq!(health.last_error, None);
		assert_eq!(health.last_latency_ms, Some(60));
		assert_eq!(health.total_latency_ms, 100);
		assert_eq!(health.avg_latency_ms(), Some(50.0));
	}

	#[test]
	fn test_failure_does_not_touch_latency() {
		let registry = SourceMetricsRegistry::new();
		registry.record_failure("kraken", "timeout");
		let health = registry.get("kraken").unwrap();
		assert_eq!(health.last_latency_ms, None);
		assert_eq!(health.avg_latency_ms(), None);
	}

	#[test]
	fn test_long_errors_are_truncated() {
		let registry = SourceMetricsRegistry::new();
		registry.record_failure("alex", &"x".repeat(500));
		let error = registry.get("alex").unwrap().last_error.unwrap();
		assert_eq!(error.chars().count(), MAX_ERROR_CHARS + 1);
		assert!(error.ends_with('…'));
	}

	#[test]
	fn test_snapshot_is_sorted() {
		let registry = SourceMetricsRegistry::new();
		registry.record_success("kraken", 1);
		registry.record_success("binance", 1);
		let names: Vec<_> = registry.snapshot().into_keys().collect();
		assert_eq!(names, vec!["binance", "kraken"]);
	}
}
