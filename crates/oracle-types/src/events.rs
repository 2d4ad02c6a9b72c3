use serde::{Deserialize, Serialize};

use crate::{AggregatedPrice, AlertEvent, ChannelId, PairKey, SubmissionBatch};

/// Events broadcast between the coordinator, orchestrator and monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OracleEvent {
	PriceAggregated {
		price: AggregatedPrice,
	},
	AnomalyRejected {
		pair: PairKey,
		reason: String,
	},
	SubmissionCompleted {
		batch: SubmissionBatch,
	},
	ChannelDisabled {
		pair: PairKey,
		channel: ChannelId,
		consecutive_failures: u32,
	},
	CircuitBreakerTriggered {
		pair: PairKey,
		volatility_bps: u64,
	},
	AlertRaised {
		alert: AlertEvent,
	},
}
