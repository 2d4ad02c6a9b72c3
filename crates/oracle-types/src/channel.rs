//! Publishing channels ("oracles") and their reliability bookkeeping.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Reliability score assigned to a channel that has no history yet.
pub const DEFAULT_RELIABILITY: f64 = 0.5;

/// Number of response-time samples retained per channel.
pub const RESPONSE_SAMPLE_LIMIT: usize = 100;

/// Identifier of a downstream publishing endpoint, usually a ledger address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub String);

impl ChannelId {
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for ChannelId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&str> for ChannelId {
	fn from(value: &str) -> Self {
		Self(value.to_string())
	}
}

impl From<String> for ChannelId {
	fn from(value: String) -> Self {
		Self(value)
	}
}

/// State of one channel within one trading pair.
///
/// Channels are never destroyed: a misbehaving channel is disabled and stays
/// in the store so its history remains visible in status reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
	pub id: ChannelId,
	pub enabled: bool,
	/// Unix timestamp of the last successful submission.
	pub last_submission: Option<u64>,
	/// Last price accepted through this channel.
	pub last_price: Option<u64>,
	/// Rolling response-time samples in milliseconds, oldest first.
	pub response_times_ms: VecDeque<u64>,
	pub consecutive_failures: u32,
	/// Running trust metric in `[0, 1]`.
	pub reliability: f64,
}

impl Channel {
	pub fn new(id: impl Into<ChannelId>) -> Self {
		Self {
			id: id.into(),
			enabled: true,
			last_submission: None,
			last_price: None,
			response_times_ms: VecDeque::new(),
			consecutive_failures: 0,
			reliability: DEFAULT_RELIABILITY,
		}
	}

	/// Applies a successful submission: resets the failure counter and
	/// raises reliability by `step`, capped at 1.
	pub fn record_success(&mut self, price: u64, at: u64, response_time_ms: u64, step: f64) {
		self.consecutive_failures = 0;
		self.last_price = Some(price);
		self.last_submission = Some(at);
		self.reliability = (self.reliability + step).min(1.0);
		self.record_response_time(response_time_ms);
	}

	/// Applies a failed submission: bumps the failure counter and lowers
	/// reliability by `step`, floored at 0.
	pub fn record_failure(&mut self, response_time_ms: u64, step: f64) {
		self.consecutive_failures = self.consecutive_failures.saturating_add(1);
		self.reliability = (self.reliability - step).max(0.0);
		self.record_response_time(response_time_ms);
	}

	pub fn record_response_time(&mut self, response_time_ms: u64) {
		self.response_times_ms.push_back(response_time_ms);
		while self.response_times_ms.len() > RESPONSE_SAMPLE_LIMIT {
			self.response_times_ms.pop_front();
		}
	}

	pub fn last_response_time_ms(&self) -> Option<u64> {
		self.response_times_ms.back().copied()
	}
}
