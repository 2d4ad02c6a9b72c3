//! Health states and alert events produced by the health monitor.

use crate::{current_timestamp, ChannelId, PairKey};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Health of one channel for one pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
	Healthy,
	Warning,
	Critical,
	Offline,
}

impl fmt::Display for HealthStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Healthy => write!(f, "healthy"),
			Self::Warning => write!(f, "warning"),
			Self::Critical => write!(f, "critical"),
			Self::Offline => write!(f, "offline"),
		}
	}
}

/// Alert severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
	Info,
	Warning,
	Critical,
}

impl fmt::Display for AlertLevel {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Info => write!(f, "INFO"),
			Self::Warning => write!(f, "WARNING"),
			Self::Critical => write!(f, "CRITICAL"),
		}
	}
}

/// A notification about a channel or pair that needs operator attention.
///
/// `channel` is `None` for pair-wide conditions such as running out of
/// healthy channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
	pub id: Uuid,
	pub timestamp: u64,
	pub level: AlertLevel,
	pub channel: Option<ChannelId>,
	pub pair: PairKey,
	pub message: String,
	pub metrics: HashMap<String, serde_json::Value>,
}

impl AlertEvent {
	pub fn new(
		level: AlertLevel,
		channel: Option<ChannelId>,
		pair: PairKey,
		message: impl Into<String>,
	) -> Self {
		Self {
			id: Uuid::new_v4(),
			timestamp: current_timestamp(),
			level,
			channel,
			pair,
			message: message.into(),
			metrics: HashMap::new(),
		}
	}

	pub fn at(mut self, timestamp: u64) -> Self {
		self.timestamp = timestamp;
		self
	}

	pub fn with_metric(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
		self.metrics.insert(key.into(), value.into());
		self
	}

	/// Whether `other` concerns the same channel, pair and severity.
	pub fn same_subject(&self, other: &AlertEvent) -> bool {
		self.channel == other.channel && self.pair == other.pair && self.level == other.level
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_same_subject_ignores_message() {
		let pair = PairKey::new("BTC", "USD");
		let a = AlertEvent::new(AlertLevel::Warning, Some("SP1".into()), pair.clone(), "uptime");
		let b = AlertEvent::new(AlertLevel::Warning, Some("SP1".into()), pair.clone(), "accuracy");
		let c = AlertEvent::new(AlertLevel::Critical, Some("SP1".into()), pair.clone(), "failures");
		let d = AlertEvent::new(AlertLevel::Warning, None, pair, "uptime");

		assert!(a.same_subject(&b));
		assert!(!a.same_subject(&c));
		assert!(!a.same_subject(&d));
	}

	#[test]
	fn test_alert_serialization_uses_lowercase_level() {
		let alert = AlertEvent::new(AlertLevel::Critical, None, PairKey::new("STX", "USD"), "x")
			.with_metric("healthy", 1);
		let json = serde_json::to_value(&alert).unwrap();
		assert_eq!(json["level"], "critical");
		assert_eq!(json["pair"], "STX/USD");
		assert_eq!(json["metrics"]["healthy"], 1);
	}
}
