//! Submission coordination.
//!
//! One cycle per pair: fetch, aggregate, reject anomalies, gate on cadence,
//! select channels and publish through them. Submissions within a cycle are
//! staggered and independent; a failing channel only costs its own
//! reliability.

use crate::error::CoreError;
use crate::event_bus::EventBus;
use crate::selection::select_channels;
use crate::store::{PairState, PriceStore, PublishedPrice};
use futures::future::join_all;
use oracle_config::CoordinationConfig;
use oracle_delivery::PublishInterface;
use oracle_pricing::{Aggregator, AnomalyDetector};
use oracle_sources::SourceService;
use oracle_storage::StorageService;
use oracle_types::{
	current_timestamp, AggregatedPrice, ChannelId, OracleEvent, PairKey, SelectionStrategy,
	SubmissionBatch, SubmissionRecord,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitReason {
	FirstAggregate,
	PriceChange(f64),
	MaxDelayElapsed(u64),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
	StalePrice { age_secs: u64 },
	MinDelay { elapsed_secs: u64 },
	NoSignificantChange { change: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitDecision {
	Submit(SubmitReason),
	Skip(SkipReason),
}

impl fmt::Display for SubmitReason {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::FirstAggregate => write!(f, "first aggregate"),
			Self::PriceChange(change) => write!(f, "price moved {:.3}%", change * 100.0),
			Self::MaxDelayElapsed(elapsed) => write!(f, "{}s since last submission", elapsed),
		}
	}
}

impl fmt::Display for SkipReason {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::StalePrice { age_secs } => write!(f, "price is {}s old", age_secs),
			Self::MinDelay { elapsed_secs } => {
				write!(f, "only {}s since last submission", elapsed_secs)
			}
			Self::NoSignificantChange { change } => {
				write!(f, "price moved only {:.3}%", change * 100.0)
			}
		}
	}
}

/// Decides whether `candidate` should be published.
///
/// `previous` is the last stored aggregate before `candidate`;
/// `last_submission` is when the pair was last published.
pub fn should_submit(
	now: u64,
	candidate: &AggregatedPrice,
	previous: Option<&AggregatedPrice>,
	last_submission: Option<u64>,
	config: &CoordinationConfig,
) -> SubmitDecision {
	let age_secs = now.saturating_sub(candidate.timestamp);
	if age_secs > config.max_price_age_secs {
		return SubmitDecision::Skip(SkipReason::StalePrice { age_secs });
	}

	let (previous, last_submission) = match (previous, last_submission) {
		(Some(previous), Some(last)) => (previous, last),
		_ => return SubmitDecision::Submit(SubmitReason::FirstAggregate),
	};

	let elapsed_secs = now.saturating_sub(last_submission);
	if elapsed_secs < config.submission_delay_min_secs {
		return SubmitDecision::Skip(SkipReason::MinDelay { elapsed_secs });
	}

	let change = if previous.weighted > 0.0 {
		(candidate.weighted - previous.weighted).abs() / previous.weighted
	} else {
		f64::INFINITY
	};
	if change > config.price_change_threshold {
		return SubmitDecision::Submit(SubmitReason::PriceChange(change));
	}

	if elapsed_secs >= config.submission_delay_max_secs {
		return SubmitDecision::Submit(SubmitReason::MaxDelayElapsed(elapsed_secs));
	}

	SubmitDecision::Skip(SkipReason::NoSignificantChange { change })
}

/// What one pair's cycle ended with.
#[derive(Debug, Clone)]
pub enum CycleOutcome {
	InsufficientData { observations: usize },
	Anomalous,
	Halted,
	Skipped(SkipReason),
	NoChannels,
	Submitted(SubmissionBatch),
}

/// Point-in-time view of the coordinator's bookkeeping.
#[derive(Debug, Clone, Serialize)]
pub struct CoordinatorStatus {
	pub pairs: usize,
	pub channels: usize,
	pub enabled_channels: usize,
	pub history_sizes: BTreeMap<String, usize>,
	/// Pair, then channel, to reliability.
	pub reliability: BTreeMap<String, BTreeMap<String, f64>>,
	pub last_submission: BTreeMap<String, Option<u64>>,
	pub submission_counts: BTreeMap<String, u64>,
	pub strategy: SelectionStrategy,
	pub channels_per_submission: usize,
	pub submission_delay_min_secs: u64,
	pub submission_delay_max_secs: u64,
	pub price_change_threshold: f64,
}

pub struct SubmissionCoordinator {
	config: CoordinationConfig,
	store: Arc<PriceStore>,
	sources: Arc<SourceService>,
	aggregator: Aggregator,
	detector: AnomalyDetector,
	publisher: Arc<dyn PublishInterface>,
	storage: Arc<StorageService>,
	event_bus: EventBus,
}

impl SubmissionCoordinator {
	#[allow(clippy::too_many_arguments)]
	pub fn new(
		config: CoordinationConfig,
		store: Arc<PriceStore>,
		sources: Arc<SourceService>,
		aggregator: Aggregator,
		detector: AnomalyDetector,
		publisher: Arc<dyn PublishInterface>,
		storage: Arc<StorageService>,
		event_bus: EventBus,
	) -> Self {
		Self {
			config,
			store,
			sources,
			aggregator,
			detector,
			publisher,
			storage,
			event_bus,
		}
	}

	pub fn config(&self) -> &CoordinationConfig {
		&self.config
	}

	/// Runs one cycle over every pair, one pair after the other.
	pub async fn run_cycle(&self) -> Result<Vec<(PairKey, CycleOutcome)>, CoreError> {
		let pairs = self.store.pairs();
		if pairs.is_empty() {
			return Err(CoreError::NoPairs);
		}

		let mut outcomes = Vec::with_capacity(pairs.len());
		for pair in pairs {
			match self.run_pair_cycle(&pair).await {
				Ok(outcome) => outcomes.push((pair, outcome)),
				Err(e) => error!("Coordination cycle for {} failed: {}", pair, e),
			}
		}
		Ok(outcomes)
	}

	pub async fn run_pair_cycle(&self, pair: &PairKey) -> Result<CycleOutcome, CoreError> {
		let state = self.store.get(pair)?;

		let observations = self.sources.fetch(pair).await;
		let Some(aggregate) = self.aggregator.aggregate(pair, &observations) else {
			return Ok(CycleOutcome::InsufficientData {
				observations: observations.len(),
			});
		};

		// Judged against the history before this aggregate; every aggregate
		// is recorded, rejected or not.
		let (verdict, previous, last_submission, halted) = {
			let mut state = state.write().await;
			let verdict = self
				.detector
				.evaluate_cycle(&aggregate, &observations, &state.history);
			let previous = state.latest().cloned();
			self.store.record_aggregate(&mut state, aggregate.clone());
			(
				verdict,
				previous,
				state.last_submission,
				state.circuit_breaker_at.is_some(),
			)
		};

		if verdict.is_anomalous() {
			warn!(
				"Rejecting aggregate for {} (weighted {:.2}, confidence {:.4}): {}",
				pair, aggregate.weighted, aggregate.confidence, verdict
			);
			self.event_bus.publish(OracleEvent::AnomalyRejected {
				pair: pair.clone(),
				reason: verdict.to_string(),
			});
			return Ok(CycleOutcome::Anomalous);
		}

		self.event_bus.publish(OracleEvent::PriceAggregated {
			price: aggregate.clone(),
		});

		if halted {
			info!("Circuit breaker active for {}, not submitting", pair);
			return Ok(CycleOutcome::Halted);
		}

		let now = current_timestamp();
		match should_submit(
			now,
			&aggregate,
			previous.as_ref(),
			last_submission,
			&self.config,
		) {
			SubmitDecision::Skip(reason) => {
				info!("Skipping submission for {}: {}", pair, reason);
				return Ok(CycleOutcome::Skipped(reason));
			}
			SubmitDecision::Submit(reason) => {
				debug!("Submitting {} ({})", pair, reason);
			}
		}

		let selected = {
			let state = state.read().await;
			self.select(&state)
		};
		if selected.is_empty() {
			warn!("No enabled channels available for {}", pair);
			return Ok(CycleOutcome::NoChannels);
		}

		let price = aggregate.published_price();
		let records = self.dispatch(pair, price, &selected).await;

		{
			let mut state = state.write().await;
			for record in &records {
				if let Some(channel) = state.channel_mut(&record.channel) {
					if record.success {
						channel.record_success(
							record.price,
							record.timestamp,
							record.response_time_ms,
							self.config.reliability_step,
						);
					} else {
						channel.record_failure(record.response_time_ms, self.config.reliability_step);
					}
				}
			}
			state.last_submission = Some(now);
			state.submission_count += 1;
			if records.iter().any(|r| r.success) {
				self.store
					.push_published(&mut state, PublishedPrice { price, timestamp: now });
			}
		}

		let batch = SubmissionBatch::new(pair.clone(), price, now, records);
		info!(
			"Submitted {} = {} through {}/{} channels",
			pair,
			price,
			batch.successes(),
			batch.records.len()
		);
		if let Err(e) = self.storage.store_batch(&batch).await {
			warn!("Failed to persist submission batch for {}: {}", pair, e);
		}
		self.event_bus.publish(OracleEvent::SubmissionCompleted {
			batch: batch.clone(),
		});

		Ok(CycleOutcome::Submitted(batch))
	}

	fn select(&self, state: &PairState) -> Vec<ChannelId> {
		let enabled: Vec<_> = state.enabled_channels().collect();
		select_channels(
			self.config.selection_strategy,
			&state.pair,
			&enabled,
			self.config.channels_per_submission,
			state.submission_count,
		)
	}

	/// Publishes `price` through every channel, the i-th one delayed by
	/// `i * stagger_secs`. Never retries within the cycle.
	async fn dispatch(
		&self,
		pair: &PairKey,
		price: u64,
		channels: &[ChannelId],
	) -> Vec<SubmissionRecord> {
		let timeout = Duration::from_secs(self.config.submission_timeout_secs.max(1));
		let stagger = Duration::from_secs(self.config.stagger_secs);

		let submissions = channels.iter().enumerate().map(|(index, channel)| {
			let publisher = self.publisher.clone();
			async move {
				if index > 0 && !stagger.is_zero() {
					tokio::time::sleep(stagger * index as u32).await;
				}

				let started = Instant::now();
				let result =
					tokio::time::timeout(timeout, publisher.submit_price(pair, price, channel)).await;
				let response_time_ms = started.elapsed().as_millis() as u64;

				let (success, tx_ref, error) = match result {
					Ok(Ok(receipt)) if receipt.accepted => {
						info!(
							"Channel {} accepted {} = {} ({})",
							channel, pair, price, receipt.tx_ref
						);
						(true, Some(receipt.tx_ref), None)
					}
					Ok(Ok(receipt)) => {
						error!("Channel {} did not accept {} ({})", channel, pair, receipt.tx_ref);
						(false, Some(receipt.tx_ref), Some("not accepted".to_string()))
					}
					Ok(Err(e)) => {
						error!("Submission of {} through {} failed: {}", pair, channel, e);
						(false, None, Some(e.to_string()))
					}
					Err(_) => {
						error!(
							"Submission of {} through {} timed out after {:?}",
							pair, channel, timeout
						);
						(false, None, Some(format!("timed out after {:?}", timeout)))
					}
				};

				SubmissionRecord {
					channel: channel.clone(),
					pair: pair.clone(),
					price,
					timestamp: current_timestamp(),
					success,
					tx_ref,
					error,
					response_time_ms,
				}
			}
		});

		join_all(submissions).await
	}

	pub async fn status_report(&self) -> CoordinatorStatus {
		let states = self.store.snapshots().await;
		let mut status = CoordinatorStatus {
			pairs: states.len(),
			channels: 0,
			enabled_channels: 0,
			history_sizes: BTreeMap::new(),
			reliability: BTreeMap::new(),
			last_submission: BTreeMap::new(),
			submission_counts: BTreeMap::new(),
			strategy: self.config.selection_strategy,
			channels_per_submission: self.config.channels_per_submission,
			submission_delay_min_secs: self.config.submission_delay_min_secs,
			submission_delay_max_secs: self.config.submission_delay_max_secs,
			price_change_threshold: self.config.price_change_threshold,
		};

		for state in states {
			let key = state.pair.to_string();
			status.channels += state.channels.len();
			status.enabled_channels += state.enabled_channels().count();
			status.history_sizes.insert(key.clone(), state.history.len());
			status.reliability.insert(
				key.clone(),
				state
					.channels
					.iter()
					.map(|c| (c.id.to_string(), c.reliability))
					.collect(),
			);
			status
				.last_submission
				.insert(key.clone(), state.last_submission);
			status.submission_counts.insert(key, state.submission_count);
		}
		status
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::{coordinator_with, quotes, stx};
	use oracle_delivery::implementations::dry_run::DryRunLedger;
	use oracle_delivery::DeliveryError;
	use oracle_monitoring::{AlertManager, HealthMonitor};
	use oracle_types::SubmissionReceipt;
	use std::sync::Mutex;

	fn aggregate(weighted: f64, timestamp: u64) -> AggregatedPrice {
		AggregatedPrice {
			pair: stx(),
			median: weighted,
			mean: weighted,
			weighted,
			std_dev: 0.0,
			confidence: 1.0,
			trimmed: weighted as u64,
			source_count: 3,
			sources: vec![],
			timestamp,
		}
	}

	#[test]
	fn test_first_aggregate_always_submits() {
		let config = CoordinationConfig::default();
		let now = 1_700_000_000;
		assert_eq!(
			should_submit(now, &aggregate(10_000.0, now), None, None, &config),
			SubmitDecision::Submit(SubmitReason::FirstAggregate)
		);
	}

	#[test]
	fn test_cadence_gates() {
		let config = CoordinationConfig::default();
		let t0 = 1_700_000_000;
		let previous = aggregate(10_000.0, t0);

		// One second later, tiny move: below the minimum delay.
		assert!(matches!(
			should_submit(t0 + 1, &aggregate(10_005.0, t0 + 1), Some(&previous), Some(t0), &config),
			SubmitDecision::Skip(SkipReason::MinDelay { elapsed_secs: 1 })
		));

		// Past the minimum delay but the move is below 0.1%.
		assert!(matches!(
			should_submit(t0 + 10, &aggregate(10_005.0, t0 + 10), Some(&previous), Some(t0), &config),
			SubmitDecision::Skip(SkipReason::NoSignificantChange { .. })
		));

		assert!(matches!(
			should_submit(t0 + 10, &aggregate(10_020.0, t0 + 10), Some(&previous), Some(t0), &config),
			SubmitDecision::Submit(SubmitReason::PriceChange(_))
		));

		assert!(matches!(
			should_submit(t0 + 30, &aggregate(10_000.0, t0 + 30), Some(&previous), Some(t0), &config),
			SubmitDecision::Submit(SubmitReason::MaxDelayElapsed(30))
		));

		assert!(matches!(
			should_submit(t0 + 100, &aggregate(12_000.0, t0 + 20), Some(&previous), Some(t0), &config),
			SubmitDecision::Skip(SkipReason::StalePrice { age_secs: 80 })
		));
	}

	#[tokio::test]
	async fn test_cycle_publishes_trimmed_mean() {
		let ledger = Arc::new(DryRunLedger::new(vec![]));
		let harness = coordinator_with(
			quotes(&[10_000, 10_002, 10_006, 9_940]),
			&["SP1", "SP2", "SP3", "SP4"],
			ledger,
		);
		let mut events = harness.event_bus.subscribe();

		let outcome = harness.coordinator.run_pair_cycle(&stx()).await.unwrap();
		let CycleOutcome::Submitted(batch) = outcome else {
			panic!("expected a submission, got {:?}", outcome);
		};
		assert_eq!(batch.price, 10_001);
		assert_eq!(batch.records.len(), 3);
		assert_eq!(batch.successes(), 3);

		let state = harness.store.snapshot(&stx()).await.unwrap();
		assert_eq!(state.history.len(), 1);
		assert_eq!(state.submission_count, 1);
		assert!(state.last_submission.is_some());
		let raised: Vec<_> = state
			.channels
			.iter()
			.filter(|c| (c.reliability - 0.6).abs() < 1e-9)
			.collect();
		assert_eq!(raised.len(), 3);

		let stored = harness.storage.latest_batch(&stx()).await.unwrap().unwrap();
		assert_eq!(stored.id, batch.id);

		let mut saw_completion = false;
		while let Ok(event) = events.try_recv() {
			if matches!(event, OracleEvent::SubmissionCompleted { .. }) {
				saw_completion = true;
			}
		}
		assert!(saw_completion);

		// Immediately again: the minimum delay holds the pair back.
		assert!(matches!(
			harness.coordinator.run_pair_cycle(&stx()).await.unwrap(),
			CycleOutcome::Skipped(SkipReason::MinDelay { .. })
		));
		assert_eq!(harness.store.snapshot(&stx()).await.unwrap().history.len(), 2);
	}

	#[tokio::test]
	async fn test_failed_channel_loses_reliability_but_cadence_advances() {
		let ledger = Arc::new(DryRunLedger::new(vec![]).with_failing_channels(vec!["SP2".into()]));
		let harness = coordinator_with(quotes(&[10_000, 10_010]), &["SP1", "SP2"], ledger);

		let CycleOutcome::Submitted(batch) =
			harness.coordinator.run_pair_cycle(&stx()).await.unwrap()
		else {
			panic!("expected a submission");
		};
		assert_eq!(batch.successes(), 1);

		let state = harness.store.snapshot(&stx()).await.unwrap();
		let sp1 = state.channel(&"SP1".into()).unwrap();
		let sp2 = state.channel(&"SP2".into()).unwrap();
		assert!((sp1.reliability - 0.6).abs() < 1e-9);
		assert_eq!(sp1.last_price, Some(10_010));
		assert!((sp2.reliability - 0.4).abs() < 1e-9);
		assert_eq!(sp2.consecutive_failures, 1);
		assert!(state.last_submission.is_some());
		assert_eq!(state.published.len(), 1);
	}

	#[tokio::test]
	async fn test_insufficient_and_anomalous_cycles_do_not_submit() {
		let ledger = Arc::new(DryRunLedger::new(vec![]));
		let harness = coordinator_with(quotes(&[10_000]), &["SP1"], ledger.clone());
		assert!(matches!(
			harness.coordinator.run_pair_cycle(&stx()).await.unwrap(),
			CycleOutcome::InsufficientData { observations: 1 }
		));

		let harness = coordinator_with(quotes(&[10_000, 10_010]), &["SP1"], ledger);
		let now = current_timestamp();
		for _ in 0..3 {
			harness
				.store
				.push_aggregate(aggregate(20_000.0, now))
				.await
				.unwrap();
		}
		assert!(matches!(
			harness.coordinator.run_pair_cycle(&stx()).await.unwrap(),
			CycleOutcome::Anomalous
		));
		let state = harness.store.snapshot(&stx()).await.unwrap();
		assert_eq!(state.history.len(), 4);
		assert_eq!(state.submission_count, 0);
		assert!(state.last_submission.is_none());
	}

	#[tokio::test]
	async fn test_lasting_price_move_becomes_the_new_reference() {
		let ledger = Arc::new(DryRunLedger::new(vec![]));
		let harness = coordinator_with(quotes(&[11_000, 11_000]), &["SP1"], ledger);
		let now = current_timestamp();
		for _ in 0..3 {
			harness
				.store
				.push_aggregate(aggregate(10_000.0, now))
				.await
				.unwrap();
		}

		// 10% above a trailing median of 10000.
		assert!(matches!(
			harness.coordinator.run_pair_cycle(&stx()).await.unwrap(),
			CycleOutcome::Anomalous
		));

		// Median of [10000, 10000, 10000, 11000] is 10500, under 5% away.
		let CycleOutcome::Submitted(batch) = harness.coordinator.run_pair_cycle(&stx()).await.unwrap()
		else {
			panic!("expected the pair to publish again after the move settled");
		};
		assert_eq!(batch.price, 11_000);

		let state = harness.store.snapshot(&stx()).await.unwrap();
		assert_eq!(state.history.len(), 5);
		assert_eq!(state.submission_count, 1);
	}

	#[tokio::test]
	async fn test_cycle_with_outlying_source_is_rejected() {
		let ledger = Arc::new(DryRunLedger::new(vec![]));
		let harness = coordinator_with(
			quotes(&[10_000, 10_000, 10_000, 11_000]),
			&["SP1"],
			ledger,
		);
		let mut events = harness.event_bus.subscribe();

		assert!(matches!(
			harness.coordinator.run_pair_cycle(&stx()).await.unwrap(),
			CycleOutcome::Anomalous
		));
		let Ok(OracleEvent::AnomalyRejected { reason, .. }) = events.try_recv() else {
			panic!("expected an anomaly event");
		};
		assert!(reason.contains("quote3"));
	}

	#[tokio::test]
	async fn test_halted_pair_is_not_submitted() {
		let ledger = Arc::new(DryRunLedger::new(vec![]));
		let harness = coordinator_with(quotes(&[10_000, 10_010]), &["SP1"], ledger);
		harness
			.store
			.get(&stx())
			.unwrap()
			.write()
			.await
			.circuit_breaker_at = Some(1);

		assert!(matches!(
			harness.coordinator.run_pair_cycle(&stx()).await.unwrap(),
			CycleOutcome::Halted
		));
	}

	#[tokio::test]
	async fn test_honest_channels_track_the_published_price() {
		let ledger = Arc::new(DryRunLedger::new(vec![]));
		let mut harness = coordinator_with(
			quotes(&[10_000, 10_000, 10_000, 11_000]),
			&["SP1", "SP2"],
			ledger.clone(),
		);
		harness.coordinator.detector = AnomalyDetector::default().with_source_deviation_bps(0);

		let CycleOutcome::Submitted(batch) =
			harness.coordinator.run_pair_cycle(&stx()).await.unwrap()
		else {
			panic!("expected a submission");
		};
		let state = harness.store.snapshot(&stx()).await.unwrap();
		let aggregate = state.latest().unwrap();
		assert_eq!(batch.price, 10_000);
		assert!((aggregate.weighted - 10_250.0).abs() < 1e-9);

		let monitor = HealthMonitor::new(
			oracle_config::HealthConfig::default(),
			ledger,
			harness.store.clone(),
			Arc::new(AlertManager::new(300, 1000)),
		);
		for record in &batch.records {
			monitor.record_submission(record).await;
		}
		monitor.collect_metrics().await;

		for entry in monitor.channel_detail(&"SP1".into()).await {
			assert_eq!(entry.mean_deviation, Some(0.0));
		}
		let raised = monitor.process_alerts().await;
		assert!(raised.iter().all(|a| !a.message.contains("deviation")));
	}

	struct TimedLedger {
		calls: Mutex<Vec<(ChannelId, Instant)>>,
	}

	#[async_trait::async_trait]
	impl PublishInterface for TimedLedger {
		fn config_schema(&self) -> Box<dyn oracle_types::ConfigSchema> {
			Box::new(oracle_delivery::implementations::dry_run::DryRunSchema)
		}

		async fn submit_price(
			&self,
			_pair: &PairKey,
			_price: u64,
			channel: &ChannelId,
		) -> Result<SubmissionReceipt, DeliveryError> {
			self.calls
				.lock()
				.unwrap()
				.push((channel.clone(), Instant::now()));
			Ok(SubmissionReceipt {
				accepted: true,
				tx_ref: "tx".into(),
			})
		}

		async fn check_channel(&self, _: &PairKey, _: &ChannelId) -> Result<bool, DeliveryError> {
			Ok(true)
		}

		async fn trigger_circuit_breaker(&self, _: &PairKey) -> Result<(), DeliveryError> {
			Ok(())
		}
	}

	#[tokio::test]
	async fn test_submissions_are_staggered() {
		let ledger = Arc::new(TimedLedger {
			calls: Mutex::new(Vec::new()),
		});
		let mut harness = coordinator_with(quotes(&[10_000, 10_010]), &["SP1", "SP2"], ledger.clone());
		harness.coordinator.config.stagger_secs = 1;

		let started = Instant::now();
		harness.coordinator.run_pair_cycle(&stx()).await.unwrap();

		let calls = ledger.calls.lock().unwrap();
		assert_eq!(calls.len(), 2);
		let first = calls.iter().map(|(_, at)| *at).min().unwrap();
		let last = calls.iter().map(|(_, at)| *at).max().unwrap();
		assert!(first.duration_since(started) < Duration::from_millis(500));
		assert!(last.duration_since(first) >= Duration::from_millis(900));
	}

	#[tokio::test]
	async fn test_status_report() {
		let ledger = Arc::new(DryRunLedger::new(vec![]));
		let harness = coordinator_with(quotes(&[10_000, 10_010]), &["SP1", "SP2"], ledger);
		harness.coordinator.run_pair_cycle(&stx()).await.unwrap();

		let status = harness.coordinator.status_report().await;
		assert_eq!(status.pairs, 1);
		assert_eq!(status.channels, 2);
		assert_eq!(status.history_sizes["STX/USD"], 1);
		assert_eq!(status.submission_counts["STX/USD"], 1);
		assert_eq!(status.reliability["STX/USD"].len(), 2);
		assert_eq!(status.strategy, SelectionStrategy::RoundRobin);
	}
}
