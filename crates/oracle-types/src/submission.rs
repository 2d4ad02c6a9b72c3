//! Submission outcomes and channel selection strategies.

use crate::{ChannelId, PairKey};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Acknowledgement returned by the publish collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionReceipt {
	pub accepted: bool,
	/// Transaction reference assigned by the ledger.
	pub tx_ref: String,
}

/// Outcome of publishing one price through one channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRecord {
	pub channel: ChannelId,
	pub pair: PairKey,
	pub price: u64,
	pub timestamp: u64,
	pub success: bool,
	pub tx_ref: Option<String>,
	pub error: Option<String>,
	pub response_time_ms: u64,
}

/// All submissions issued for one pair in one coordination cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionBatch {
	pub id: Uuid,
	pub pair: PairKey,
	pub price: u64,
	pub timestamp: u64,
	pub records: Vec<SubmissionRecord>,
}

impl SubmissionBatch {
	pub fn new(pair: PairKey, price: u64, timestamp: u64, records: Vec<SubmissionRecord>) -> Self {
		Self {
			id: Uuid::new_v4(),
			pair,
			price,
			timestamp,
			records,
		}
	}

	pub fn successes(&self) -> usize {
		self.records.iter().filter(|r| r.success).count()
	}
}

/// How the coordinator picks the channels that carry a price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
	/// Rotate through the whitelist starting at a stable hash of the pair.
	#[default]
	RoundRobin,
	/// Take the channels with the highest reliability scores.
	BestReliability,
	/// Uniform random sample.
	Random,
}

impl fmt::Display for SelectionStrategy {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::RoundRobin => write!(f, "round_robin"),
			Self::BestReliability => write!(f, "best_reliability"),
			Self::Random => write!(f, "random"),
		}
	}
}

impl FromStr for SelectionStrategy {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"round_robin" => Ok(Self::RoundRobin),
			"best_reliability" => Ok(Self::BestReliability),
			"random" => Ok(Self::Random),
			other => Err(format!("Unknown selection strategy: {}", other)),
		}
	}
}
