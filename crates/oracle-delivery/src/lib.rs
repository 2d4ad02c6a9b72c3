//! Ledger collaborators for the oracle coordinator.
//!
//! The ledger that stores and serves published prices is external. This
//! crate defines the two interfaces the coordinator needs from it and
//! provides a dry-run implementation plus an HTTP gateway client.
//!
//! - [`PublishInterface`] - submit prices, probe channels, trip the circuit breaker
//! - [`RegistryInterface`] - read and edit pair/channel whitelists

use async_trait::async_trait;
use oracle_types::{ChannelId, ConfigSchema, PairKey, PairRegistration, SubmissionReceipt};
use std::sync::Arc;
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod dry_run;
	pub mod http;
}

/// Errors that can occur while talking to the ledger.
#[derive(Debug, Error)]
pub enum DeliveryError {
	/// Transport-level failure.
	#[error("Network error: {0}")]
	Network(String),
	/// The ledger answered but refused the request.
	#[error("Rejected: {0}")]
	Rejected(String),
	#[error("Unknown pair: {0}")]
	UnknownPair(PairKey),
	#[error("Channel {channel} is not registered for {pair}")]
	UnknownChannel { pair: PairKey, channel: ChannelId },
	#[error("Already registered: {0}")]
	AlreadyRegistered(String),
	#[error("Invalid configuration: {0}")]
	Configuration(String),
}

/// Price publication side of the ledger.
///
/// Submissions must be safe to repeat; the coordinator never retries within
/// a cycle, but the next cycle may publish the same price again.
#[async_trait]
pub trait PublishInterface: Send + Sync {
	/// Returns the configuration schema for this backend.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Publishes `price` (fixed-point) for `pair` through `channel`.
	async fn submit_price(
		&self,
		pair: &PairKey,
		price: u64,
		channel: &ChannelId,
	) -> Result<SubmissionReceipt, DeliveryError>;

	/// Liveness probe for one channel on one pair.
	async fn check_channel(&self, pair: &PairKey, channel: &ChannelId)
		-> Result<bool, DeliveryError>;

	/// Halts publication for `pair` after extreme volatility.
	async fn trigger_circuit_breaker(&self, pair: &PairKey) -> Result<(), DeliveryError>;
}

/// Pair and channel whitelist registry.
#[async_trait]
pub trait RegistryInterface: Send + Sync {
	async fn list_pairs(&self) -> Result<Vec<PairRegistration>, DeliveryError>;

	async fn register_pair(&self, registration: &PairRegistration) -> Result<(), DeliveryError>;

	async fn add_channel(&self, pair: &PairKey, channel: &ChannelId) -> Result<(), DeliveryError>;

	async fn remove_channel(&self, pair: &PairKey, channel: &ChannelId)
		-> Result<(), DeliveryError>;

	async fn set_min_sources(&self, pair: &PairKey, min_sources: usize)
		-> Result<(), DeliveryError>;
}

/// Both halves of a ledger backend.
#[derive(Clone)]
pub struct Ledger {
	pub publisher: Arc<dyn PublishInterface>,
	pub registry: Arc<dyn RegistryInterface>,
}

impl Ledger {
	/// Wraps one backend that implements both interfaces.
	pub fn from_backend<T>(backend: T) -> Self
	where
		T: PublishInterface + RegistryInterface + 'static,
	{
		let backend = Arc::new(backend);
		Self {
			publisher: backend.clone(),
			registry: backend,
		}
	}
}

/// Builds the configured ledger backend.
///
/// `seed` pre-populates the in-memory registry of the dry-run backend; the
/// HTTP backend reads its registry from the gateway instead.
pub fn create_ledger(
	backend: &str,
	config: &toml::Value,
	seed: Vec<PairRegistration>,
) -> Result<Ledger, DeliveryError> {
	match backend {
		"dry_run" => {
			implementations::dry_run::DryRunSchema
				.validate(config)
				.map_err(|e| DeliveryError::Configuration(e.to_string()))?;
			Ok(implementations::dry_run::create_ledger(config, seed))
		}
		"http" => {
			implementations::http::HttpLedgerSchema
				.validate(config)
				.map_err(|e| DeliveryError::Configuration(e.to_string()))?;
			implementations::http::create_ledger(config)
		}
		other => Err(DeliveryError::Configuration(format!(
			"Unknown delivery backend: {}",
			other
		))),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_create_ledger_validates_backend_config() {
		let empty = toml::Value::Table(Default::default());
		assert!(create_ledger("dry_run", &empty, vec![]).is_ok());

		assert!(matches!(
			create_ledger("http", &empty, vec![]),
			Err(DeliveryError::Configuration(_))
		));

		let http: toml::Value =
			toml::from_str("endpoint = \"http://127.0.0.1:9000\"\ntimeout_secs = 3").unwrap();
		assert!(create_ledger("http", &http, vec![]).is_ok());

		assert!(matches!(
			create_ledger("chain", &empty, vec![]),
			Err(DeliveryError::Configuration(_))
		));
	}
}
