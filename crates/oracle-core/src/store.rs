//! Shared pair and channel state.
//!
//! One [`PairState`] per registered pair, each behind its own lock so the
//! coordination and health loops only contend on the pair they are both
//! touching. The coordinator is the only writer of channel reliability and
//! the enabled flag; the orchestrator disables channels through the same
//! per-pair lock.

use crate::error::CoreError;
use async_trait::async_trait;
use dashmap::DashMap;
use oracle_monitoring::ReferencePriceSource;
use oracle_types::{AggregatedPrice, Channel, ChannelId, PairKey, PairRegistration};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A price that made it onto the ledger through at least one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PublishedPrice {
	pub price: u64,
	pub timestamp: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PairState {
	pub pair: PairKey,
	pub min_sources: usize,
	/// Whitelist order is preserved; selection depends on it.
	pub channels: Vec<Channel>,
	/// Accepted aggregates, oldest first.
	pub history: VecDeque<AggregatedPrice>,
	pub published: VecDeque<PublishedPrice>,
	pub last_submission: Option<u64>,
	pub submission_count: u64,
	/// Set while the circuit breaker holds the pair.
	pub circuit_breaker_at: Option<u64>,
}

impl PairState {
	fn new(registration: &PairRegistration) -> Self {
		Self {
			pair: registration.pair.clone(),
			min_sources: registration.min_sources,
			channels: registration
				.channels
				.iter()
				.cloned()
				.map(Channel::new)
				.collect(),
			history: VecDeque::new(),
			published: VecDeque::new(),
			last_submission: None,
			submission_count: 0,
			circuit_breaker_at: None,
		}
	}

	pub fn channel(&self, id: &ChannelId) -> Option<&Channel> {
		self.channels.iter().find(|c| &c.id == id)
	}

	pub fn channel_mut(&mut self, id: &ChannelId) -> Option<&mut Channel> {
		self.channels.iter_mut().find(|c| &c.id == id)
	}

	pub fn enabled_channels(&self) -> impl Iterator<Item = &Channel> {
		self.channels.iter().filter(|c| c.enabled)
	}

	pub fn latest(&self) -> Option<&AggregatedPrice> {
		self.history.back()
	}

	pub fn registration(&self) -> PairRegistration {
		PairRegistration::new(
			self.pair.clone(),
			self.min_sources,
			self.enabled_channels().map(|c| c.id.clone()).collect(),
		)
	}
}

pub struct PriceStore {
	pairs: DashMap<PairKey, Arc<RwLock<PairState>>>,
	history_size: usize,
	published_size: usize,
}

impl PriceStore {
	pub fn new(history_size: usize) -> Self {
		Self {
			pairs: DashMap::new(),
			history_size: history_size.max(1),
			published_size: history_size.max(1),
		}
	}

	pub fn from_registrations(
		registrations: impl IntoIterator<Item = PairRegistration>,
		history_size: usize,
	) -> Self {
		let store = Self::new(history_size);
		for registration in registrations {
			store
				.pairs
				.entry(registration.pair.clone())
				.or_insert_with(|| Arc::new(RwLock::new(PairState::new(&registration))));
		}
		store
	}

	pub fn register(&self, registration: &PairRegistration) -> Result<(), CoreError> {
		match self.pairs.entry(registration.pair.clone()) {
			dashmap::mapref::entry::Entry::Occupied(_) => {
				Err(CoreError::AlreadyRegistered(registration.pair.to_string()))
			}
			dashmap::mapref::entry::Entry::Vacant(slot) => {
				slot.insert(Arc::new(RwLock::new(PairState::new(registration))));
				Ok(())
			}
		}
	}

	pub fn contains(&self, pair: &PairKey) -> bool {
		self.pairs.contains_key(pair)
	}

	pub fn pairs(&self) -> Vec<PairKey> {
		let mut pairs: Vec<PairKey> = self.pairs.iter().map(|e| e.key().clone()).collect();
		pairs.sort();
		pairs
	}

	pub fn is_empty(&self) -> bool {
		self.pairs.is_empty()
	}

	pub fn get(&self, pair: &PairKey) -> Result<Arc<RwLock<PairState>>, CoreError> {
		self.pairs
			.get(pair)
			.map(|e| e.value().clone())
			.ok_or_else(|| CoreError::UnknownPair(pair.clone()))
	}

	pub async fn snapshot(&self, pair: &PairKey) -> Result<PairState, CoreError> {
		Ok(self.get(pair)?.read().await.clone())
	}

	pub async fn snapshots(&self) -> Vec<PairState> {
		let mut states = Vec::new();
		for pair in self.pairs() {
			if let Ok(state) = self.snapshot(&pair).await {
				states.push(state);
			}
		}
		states
	}

	/// Appends an accepted aggregate, evicting the oldest past the cap.
	pub async fn push_aggregate(&self, aggregate: AggregatedPrice) -> Result<(), CoreError> {
		let state = self.get(&aggregate.pair)?;
		let mut state = state.write().await;
		self.record_aggregate(&mut state, aggregate);
		Ok(())
	}

	pub(crate) fn record_aggregate(&self, state: &mut PairState, aggregate: AggregatedPrice) {
		state.history.push_back(aggregate);
		while state.history.len() > self.history_size {
			state.history.pop_front();
		}
	}

	pub(crate) fn push_published(&self, state: &mut PairState, published: PublishedPrice) {
		state.published.push_back(published);
		while state.published.len() > self.published_size {
			state.published.pop_front();
		}
	}

	pub async fn add_channel(&self, pair: &PairKey, channel: &ChannelId) -> Result<(), CoreError> {
		let state = self.get(pair)?;
		let mut state = state.write().await;
		match state.channel_mut(channel) {
			Some(existing) if existing.enabled => Err(CoreError::AlreadyRegistered(format!(
				"{} on {}",
				channel, pair
			))),
			// Re-adding a disabled channel gives it a fresh start.
			Some(existing) => {
				*existing = Channel::new(channel.clone());
				Ok(())
			}
			None => {
				state.channels.push(Channel::new(channel.clone()));
				Ok(())
			}
		}
	}

	/// Disables a channel. Channels are never dropped from the store.
	pub async fn disable_channel(&self, pair: &PairKey, channel: &ChannelId) -> Result<(), CoreError> {
		let state = self.get(pair)?;
		let mut state = state.write().await;
		let entry = state
			.channel_mut(channel)
			.ok_or_else(|| CoreError::UnknownChannel {
				pair: pair.clone(),
				channel: channel.clone(),
			})?;
		entry.enabled = false;
		Ok(())
	}

	pub async fn set_min_sources(&self, pair: &PairKey, min_sources: usize) -> Result<(), CoreError> {
		let state = self.get(pair)?;
		state.write().await.min_sources = min_sources;
		Ok(())
	}

	/// Every enabled (channel, pair) combination.
	pub async fn enabled_targets(&self) -> Vec<(ChannelId, PairKey)> {
		let mut targets = Vec::new();
		for pair in self.pairs() {
			if let Ok(state) = self.get(&pair) {
				let state = state.read().await;
				targets.extend(state.enabled_channels().map(|c| (c.id.clone(), pair.clone())));
			}
		}
		targets
	}

	pub async fn enabled_channel_count(&self) -> usize {
		self.enabled_targets().await.len()
	}
}

/// The pair's own aggregate history serves as the reference for channel
/// accuracy: the published price of the aggregate nearest in time, which is
/// what channels were asked to submit.
#[async_trait]
impl ReferencePriceSource for PriceStore {
	async fn reference_price(&self, pair: &PairKey, timestamp: u64) -> Option<f64> {
		let state = self.get(pair).ok()?;
		let state = state.read().await;
		state
			.history
			.iter()
			.min_by_key(|a| a.timestamp.abs_diff(timestamp))
			.map(|a| a.published_price() as f64)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn aggregate(pair: &PairKey, weighted: f64, timestamp: u64) -> AggregatedPrice {
		AggregatedPrice {
			pair: pair.clone(),
			median: weighted,
			mean: weighted,
			weighted,
			std_dev: 0.0,
			confidence: 1.0,
			trimmed: weighted as u64,
			source_count: 2,
			sources: vec!["a".into(), "b".into()],
			timestamp,
		}
	}

	fn store() -> PriceStore {
		PriceStore::from_registrations(
			vec![PairRegistration::new(
				PairKey::new("STX", "USD"),
				2,
				vec!["SP1".into(), "SP2".into()],
			)],
			3,
		)
	}

	#[tokio::test]
	async fn test_history_is_bounded() {
		let store = store();
		let pair = PairKey::new("STX", "USD");
		for i in 0..5 {
			store
				.push_aggregate(aggregate(&pair, 100.0 + i as f64, i))
				.await
				.unwrap();
		}
		let state = store.snapshot(&pair).await.unwrap();
		assert_eq!(state.history.len(), 3);
		assert_eq!(state.history.front().unwrap().timestamp, 2);
		assert_eq!(state.latest().unwrap().timestamp, 4);
	}

	#[tokio::test]
	async fn test_channels_are_disabled_not_removed() {
		let store = store();
		let pair = PairKey::new("STX", "USD");

		store.disable_channel(&pair, &"SP1".into()).await.unwrap();
		let state = store.snapshot(&pair).await.unwrap();
		assert_eq!(state.channels.len(), 2);
		assert_eq!(state.enabled_channels().count(), 1);
		assert_eq!(store.enabled_targets().await.len(), 1);

		store.add_channel(&pair, &"SP1".into()).await.unwrap();
		assert!(store.add_channel(&pair, &"SP1".into()).await.is_err());
		assert_eq!(store.enabled_channel_count().await, 2);

		assert!(matches!(
			store.disable_channel(&pair, &"SP9".into()).await,
			Err(CoreError::UnknownChannel { .. })
		));
	}

	#[tokio::test]
	async fn test_register_rejects_duplicates() {
		let store = store();
		let btc = PairRegistration::new(PairKey::new("BTC", "USD"), 1, vec![]);
		store.register(&btc).unwrap();
		assert!(store.register(&btc).is_err());
		assert_eq!(
			store.pairs(),
			vec![PairKey::new("BTC", "USD"), PairKey::new("STX", "USD")]
		);
	}

	#[tokio::test]
	async fn test_reference_is_nearest_aggregate() {
		let store = store();
		let pair = PairKey::new("STX", "USD");
		store.push_aggregate(aggregate(&pair, 100.0, 1_000)).await.unwrap();
		store.push_aggregate(aggregate(&pair, 110.0, 1_060)).await.unwrap();

		assert_eq!(store.reference_price(&pair, 1_020).await, Some(100.0));
		assert_eq!(store.reference_price(&pair, 1_050).await, Some(110.0));
		assert_eq!(
			store.reference_price(&PairKey::new("BTC", "USD"), 1_000).await,
			None
		);
	}

	#[tokio::test]
	async fn test_reference_is_the_published_price() {
		let store = store();
		let pair = PairKey::new("STX", "USD");
		let mut skewed = aggregate(&pair, 10_250.0, 1_000);
		skewed.trimmed = 10_000;
		store.push_aggregate(skewed).await.unwrap();

		assert_eq!(store.reference_price(&pair, 1_000).await, Some(10_000.0));
	}
}
