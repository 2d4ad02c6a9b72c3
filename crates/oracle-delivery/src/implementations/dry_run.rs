//! In-memory ledger used when the coordinator runs in dry-run mode.
//!
//! Submissions are acknowledged with a `mock_tx_<timestamp>` reference and
//! logged instead of sent anywhere. Channels listed in `failing_channels`
//! reject every submission and probe, which is handy for exercising the
//! reliability and health paths without a real ledger.

use crate::{DeliveryError, Ledger, PublishInterface, RegistryInterface};
use async_trait::async_trait;
use dashmap::DashMap;
use oracle_types::{
	current_timestamp, ChannelId, ConfigSchema, Field, FieldType, PairKey, PairRegistration,
	Schema, SubmissionReceipt, ValidationError,
};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{info, warn};

pub struct DryRunLedger {
	pairs: DashMap<PairKey, PairRegistration>,
	failing: HashSet<ChannelId>,
	latency: Duration,
	/// Pairs whose circuit breaker was tripped, with the trip time.
	halted: DashMap<PairKey, u64>,
}

impl DryRunLedger {
	pub fn new(seed: Vec<PairRegistration>) -> Self {
		let pairs = DashMap::new();
		for registration in seed {
			pairs.insert(registration.pair.clone(), registration);
		}
		Self {
			pairs,
			failing: HashSet::new(),
			latency: Duration::ZERO,
			halted: DashMap::new(),
		}
	}

	pub fn with_failing_channels(mut self, channels: impl IntoIterator<Item = ChannelId>) -> Self {
		self.failing.extend(channels);
		self
	}

	pub fn with_latency(mut self, latency: Duration) -> Self {
		self.latency = latency;
		self
	}

	pub fn is_halted(&self, pair: &PairKey) -> bool {
		self.halted.contains_key(pair)
	}

	async fn simulate_latency(&self) {
		if !self.latency.is_zero() {
			tokio::time::sleep(self.latency).await;
		}
	}
}

/// Configuration schema for [`DryRunLedger`].
pub struct DryRunSchema;

impl ConfigSchema for DryRunSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![
				Field::new(
					"failing_channels",
					FieldType::Array(Box::new(FieldType::String)),
				),
				Field::new(
					"latency_ms",
					FieldType::Integer {
						min: Some(0),
						max: Some(60_000),
					},
				),
			],
		);

		schema.validate(config)
	}
}

#[async_trait]
impl PublishInterface for DryRunLedger {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(DryRunSchema)
	}

	async fn submit_price(
		&self,
		pair: &PairKey,
		price: u64,
		channel: &ChannelId,
	) -> Result<SubmissionReceipt, DeliveryError> {
		self.simulate_latency().await;

		if self.is_halted(pair) {
			return Err(DeliveryError::Rejected(format!(
				"circuit breaker active for {}",
				pair
			)));
		}
		if self.failing.contains(channel) {
			return Err(DeliveryError::Rejected(format!(
				"channel {} refused the submission",
				channel
			)));
		}

		let tx_ref = format!("mock_tx_{}", current_timestamp());
		info!(
			"[dry-run] Submitted {} = {} via {} ({})",
			pair, price, channel, tx_ref
		);
		Ok(SubmissionReceipt {
			accepted: true,
			tx_ref,
		})
	}

	async fn check_channel(
		&self,
		_pair: &PairKey,
		channel: &ChannelId,
	) -> Result<bool, DeliveryError> {
		self.simulate_latency().await;
		Ok(!self.failing.contains(channel))
	}

	async fn trigger_circuit_breaker(&self, pair: &PairKey) -> Result<(), DeliveryError> {
		warn!("[dry-run] Circuit breaker triggered for {}", pair);
		self.halted.insert(pair.clone(), current_timestamp());
		Ok(())
	}
}

#[async_trait]
impl RegistryInterface for DryRunLedger {
	async fn list_pairs(&self) -> Result<Vec<PairRegistration>, DeliveryError> {
		let mut pairs: Vec<PairRegistration> =
			self.pairs.iter().map(|e| e.value().clone()).collect();
		pairs.sort_by(|a, b| a.pair.cmp(&b.pair));
		Ok(pairs)
	}

	async fn register_pair(&self, registration: &PairRegistration) -> Result<(), DeliveryError> {
		if self.pairs.contains_key(&registration.pair) {
			return Err(DeliveryError::AlreadyRegistered(registration.pair.to_string()));
		}
		self.pairs
			.insert(registration.pair.clone(), registration.clone());
		Ok(())
	}

	async fn add_channel(&self, pair: &PairKey, channel: &ChannelId) -> Result<(), DeliveryError> {
		let mut entry = self
			.pairs
			.get_mut(pair)
			.ok_or_else(|| DeliveryError::UnknownPair(pair.clone()))?;
		if entry.channels.contains(channel) {
			return Err(DeliveryError::AlreadyRegistered(format!(
				"{} on {}",
				channel, pair
			)));
		}
		entry.channels.push(channel.clone());
		Ok(())
	}

	async fn remove_channel(
		&self,
		pair: &PairKey,
		channel: &ChannelId,
	) -> Result<(), DeliveryError> {
		let mut entry = self
			.pairs
			.get_mut(pair)
			.ok_or_else(|| DeliveryError::UnknownPair(pair.clone()))?;
		let before = entry.channels.len();
		entry.channels.retain(|c| c != channel);
		if entry.channels.len() == before {
			return Err(DeliveryError::UnknownChannel {
				pair: pair.clone(),
				channel: channel.clone(),
			});
		}
		Ok(())
	}

	async fn set_min_sources(
		&self,
		pair: &PairKey,
		min_sources: usize,
	) -> Result<(), DeliveryError> {
		let mut entry = self
			.pairs
			.get_mut(pair)
			.ok_or_else(|| DeliveryError::UnknownPair(pair.clone()))?;
		entry.min_sources = min_sources;
		Ok(())
	}
}

/// Factory function to create a dry-run ledger from configuration.
///
/// Configuration parameters:
/// - `failing_channels`: channels that reject everything (default: none)
/// - `latency_ms`: artificial delay per call (default: 0)
pub fn create_ledger(config: &toml::Value, seed: Vec<PairRegistration>) -> Ledger {
	let failing = config
		.get("failing_channels")
		.and_then(|v| v.as_array())
		.map(|channels| {
			channels
				.iter()
				.filter_map(|c| c.as_str())
				.map(ChannelId::from)
				.collect::<Vec<_>>()
		})
		.unwrap_or_default();

	let latency_ms = config
		.get("latency_ms")
		.and_then(|v| v.as_integer())
		.unwrap_or(0)
		.max(0) as u64;

	Ledger::from_backend(
		DryRunLedger::new(seed)
			.with_failing_channels(failing)
			.with_latency(Duration::from_millis(latency_ms)),
	)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn seeded() -> DryRunLedger {
		DryRunLedger::new(vec![PairRegistration::new(
			PairKey::new("STX", "USD"),
			2,
			vec!["SP1".into(), "SP2".into()],
		)])
	}

	#[tokio::test]
	async fn test_submit_returns_mock_reference() {
		let ledger = seeded();
		let receipt = ledger
			.submit_price(&PairKey::new("STX", "USD"), 187, &"SP1".into())
			.await
			.unwrap();
		assert!(receipt.accepted);
		assert!(receipt.tx_ref.starts_with("mock_tx_"));
	}

	#[tokio::test]
	async fn test_failing_channels_and_circuit_breaker() {
		let pair = PairKey::new("STX", "USD");
		let ledger = seeded().with_failing_channels(vec![ChannelId::from("SP2")]);

		assert!(ledger.submit_price(&pair, 1, &"SP2".into()).await.is_err());
		assert!(!ledger.check_channel(&pair, &"SP2".into()).await.unwrap());
		assert!(ledger.check_channel(&pair, &"SP1".into()).await.unwrap());

		ledger.trigger_circuit_breaker(&pair).await.unwrap();
		assert!(ledger.is_halted(&pair));
		assert!(matches!(
			ledger.submit_price(&pair, 1, &"SP1".into()).await,
			Err(DeliveryError::Rejected(_))
		));
	}

	#[tokio::test]
	async fn test_registry_operations() {
		let ledger = seeded();
		let pair = PairKey::new("STX", "USD");

		ledger.add_channel(&pair, &"SP3".into()).await.unwrap();
		assert!(ledger.add_channel(&pair, &"SP3".into()).await.is_err());
		ledger.remove_channel(&pair, &"SP1".into()).await.unwrap();
		assert!(matches!(
			ledger.remove_channel(&pair, &"SP1".into()).await,
			Err(DeliveryError::UnknownChannel { .. })
		));
		ledger.set_min_sources(&pair, 3).await.unwrap();

		let btc = PairRegistration::new(PairKey::new("BTC", "USD"), 1, vec![]);
		ledger.register_pair(&btc).await.unwrap();
		assert!(ledger.register_pair(&btc).await.is_err());

		let pairs = ledger.list_pairs().await.unwrap();
		assert_eq!(pairs.len(), 2);
		assert_eq!(pairs[0].pair, PairKey::new("BTC", "USD"));
		let stx = &pairs[1];
		assert_eq!(stx.min_sources, 3);
		assert_eq!(stx.channels, vec![ChannelId::from("SP2"), ChannelId::from("SP3")]);

		assert!(matches!(
			ledger.add_channel(&PairKey::new("ETH", "USD"), &"SP1".into()).await,
			Err(DeliveryError::UnknownPair(_))
		));
	}

	#[tokio::test]
	async fn test_factory_reads_failing_channels() {
		let config: toml::Value = toml::from_str("failing_channels = [\"SPX\"]").unwrap();
		let ledger = create_ledger(&config, vec![]);
		assert!(!ledger
			.publisher
			.check_channel(&PairKey::new("STX", "USD"), &"SPX".into())
			.await
			.unwrap());
	}
}
