//! Health state machine per (channel, pair).
//!
//! The same channel can be healthy for one pair and degraded for another, so
//! every tracked entry is keyed by both. Each check cycle recomputes a
//! weighted score from three components:
//!
//! - responsiveness: `max(0, 1 - avg_response_ms / (timeout_secs * 1000))`
//!   over the last [`RESPONSE_WINDOW`] response times
//! - failure freedom: `max(0, 1 - consecutive_failures / max_failures)`
//! - submission frequency: `min(1, per_hour / min_per_hour)`
//!
//! and maps it onto [`HealthStatus`] with fixed thresholds.

use crate::alerts::AlertManager;
use async_trait::async_trait;
use futures::future::join_all;
use oracle_config::HealthConfig;
use oracle_delivery::PublishInterface;
use oracle_types::{
	current_timestamp, AlertEvent, AlertLevel, ChannelId, HealthStatus, PairKey, SubmissionRecord,
};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Number of response-time samples averaged for responsiveness.
pub const RESPONSE_WINDOW: usize = 10;

/// Number of recent submissions compared against the reference price.
pub const ACCURACY_WINDOW: usize = 10;

const SUBMISSION_SAMPLE_LIMIT: usize = 100;
const HOUR_SECS: u64 = 3600;

/// External view of a pair's price used to judge channel accuracy.
#[async_trait]
pub trait ReferencePriceSource: Send + Sync {
	/// Fixed-point reference price for `pair` nearest to `timestamp`.
	async fn reference_price(&self, pair: &PairKey, timestamp: u64) -> Option<f64>;
}

#[derive(Debug, Clone, Copy)]
pub struct ScoreInputs {
	pub avg_response_ms: f64,
	pub timeout_secs: u64,
	pub consecutive_failures: u32,
	pub max_consecutive_failures: u32,
	pub submissions_per_hour: f64,
	pub min_submissions_per_hour: f64,
}

/// Weighted health score in `[0, 1]`.
pub fn health_score(inputs: &ScoreInputs) -> f64 {
	let timeout_ms = (inputs.timeout_secs.max(1) * 1000) as f64;
	let responsiveness = (1.0 - inputs.avg_response_ms / timeout_ms).max(0.0);

	let max_failures = inputs.max_consecutive_failures.max(1) as f64;
	let failure_freedom = (1.0 - inputs.consecutive_failures as f64 / max_failures).max(0.0);

	let frequency = if inputs.min_submissions_per_hour > 0.0 {
		(inputs.submissions_per_hour / inputs.min_submissions_per_hour).min(1.0)
	} else {
		1.0
	};

	0.3 * responsiveness + 0.4 * failure_freedom + 0.3 * frequency
}

pub fn status_for_score(score: f64) -> HealthStatus {
	if score >= 0.8 {
		HealthStatus::Healthy
	} else if score >= 0.6 {
		HealthStatus::Warning
	} else if score >= 0.3 {
		HealthStatus::Critical
	} else {
		HealthStatus::Offline
	}
}

#[derive(Debug, Clone, Copy, Serialize)]
struct SubmissionSample {
	timestamp: u64,
	price: u64,
	success: bool,
}

/// Health bookkeeping for one channel on one pair.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelHealth {
	pub channel: ChannelId,
	pub pair: PairKey,
	pub status: HealthStatus,
	pub score: f64,
	pub avg_response_time_ms: f64,
	pub consecutive_failures: u32,
	pub total_checks: u64,
	pub uptime: f64,
	/// `1 - mean_deviation`, or 1 when nothing could be compared yet.
	pub accuracy: f64,
	pub mean_deviation: Option<f64>,
	/// Successful submissions over the last hour.
	pub submission_frequency: f64,
	pub last_submission: Option<u64>,
	pub last_check: Option<u64>,
	pub monitored_since: u64,
	#[serde(skip)]
	response_times_ms: VecDeque<u64>,
	#[serde(skip)]
	submissions: VecDeque<SubmissionSample>,
}

impl ChannelHealth {
	fn new(channel: ChannelId, pair: PairKey, now: u64) -> Self {
		Self {
			channel,
			pair,
			status: HealthStatus::Offline,
			score: 0.0,
			avg_response_time_ms: 0.0,
			consecutive_failures: 0,
			total_checks: 0,
			uptime: 1.0,
			accuracy: 1.0,
			mean_deviation: None,
			submission_frequency: 0.0,
			last_submission: None,
			last_check: None,
			monitored_since: now,
			response_times_ms: VecDeque::new(),
			submissions: VecDeque::new(),
		}
	}

	fn push_response_time(&mut self, ms: u64) {
		self.response_times_ms.push_back(ms);
		while self.response_times_ms.len() > RESPONSE_WINDOW {
			self.response_times_ms.pop_front();
		}
	}

	fn apply_check(&mut self, healthy: bool, response_ms: u64, now: u64) {
		self.total_checks += 1;
		self.last_check = Some(now);
		self.push_response_time(response_ms);
		if healthy {
			self.consecutive_failures = 0;
		} else {
			self.consecutive_failures = self.consecutive_failures.saturating_add(1);
		}
	}

	fn apply_submission(&mut self, record: &SubmissionRecord) {
		self.push_response_time(record.response_time_ms);
		self.submissions.push_back(SubmissionSample {
			timestamp: record.timestamp,
			price: record.price,
			success: record.success,
		});
		while self.submissions.len() > SUBMISSION_SAMPLE_LIMIT {
			self.submissions.pop_front();
		}
		if record.success {
			self.consecutive_failures = 0;
			self.last_submission = Some(record.timestamp);
		} else {
			self.consecutive_failures = self.consecutive_failures.saturating_add(1);
		}
	}

	fn submissions_in_last_hour(&self, now: u64) -> usize {
		let since = now.saturating_sub(HOUR_SECS);
		self.submissions
			.iter()
			.filter(|s| s.success && s.timestamp > since)
			.count()
	}

	/// Recomputes derived metrics and the status; returns the previous status.
	fn refresh(&mut self, config: &HealthConfig) -> HealthStatus {
		self.avg_response_time_ms = if self.response_times_ms.is_empty() {
			0.0
		} else {
			self.response_times_ms.iter().sum::<u64>() as f64 / self.response_times_ms.len() as f64
		};

		self.uptime = if self.total_checks == 0 {
			1.0
		} else {
			let up = self
				.total_checks
				.saturating_sub(self.consecutive_failures as u64);
			up as f64 / self.total_checks as f64
		};

		self.score = health_score(&ScoreInputs {
			avg_response_ms: self.avg_response_time_ms,
			timeout_secs: config.response_timeout_secs,
			consecutive_failures: self.consecutive_failures,
			max_consecutive_failures: config.max_consecutive_failures,
			submissions_per_hour: self.submission_frequency,
			min_submissions_per_hour: config.min_submission_frequency,
		});

		let previous = self.status;
		self.status = status_for_score(self.score);
		previous
	}

	fn log_transition(&self, previous: HealthStatus) {
		if previous == self.status {
			return;
		}
		match self.status {
			HealthStatus::Healthy => info!(
				"Channel {} on {} is now {} (score {:.2})",
				self.channel, self.pair, self.status, self.score
			),
			_ => warn!(
				"Channel {} on {} went from {} to {} (score {:.2})",
				self.channel, self.pair, previous, self.status, self.score
			),
		}
	}
}

/// Point-in-time summary across every tracked entry.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSummary {
	pub total_channels: usize,
	pub healthy: usize,
	pub warning: usize,
	pub critical: usize,
	pub offline: usize,
	pub average_score: f64,
	pub average_uptime: f64,
	pub alerts_last_hour: usize,
	pub monitoring_active: bool,
	pub last_update: Option<u64>,
}

type HealthKey = (ChannelId, PairKey);

pub struct HealthMonitor {
	config: HealthConfig,
	publisher: Arc<dyn PublishInterface>,
	reference: Arc<dyn ReferencePriceSource>,
	alerts: Arc<AlertManager>,
	entries: RwLock<HashMap<HealthKey, ChannelHealth>>,
	active: AtomicBool,
}

impl HealthMonitor {
	pub fn new(
		config: HealthConfig,
		publisher: Arc<dyn PublishInterface>,
		reference: Arc<dyn ReferencePriceSource>,
		alerts: Arc<AlertManager>,
	) -> Self {
		Self {
			config,
			publisher,
			reference,
			alerts,
			entries: RwLock::new(HashMap::new()),
			active: AtomicBool::new(false),
		}
	}

	pub fn alerts(&self) -> &Arc<AlertManager> {
		&self.alerts
	}

	pub fn set_active(&self, active: bool) {
		self.active.store(active, Ordering::Relaxed);
	}

	pub fn is_active(&self) -> bool {
		self.active.load(Ordering::Relaxed)
	}

	/// Starts tracking new (channel, pair) targets and drops the ones that
	/// are no longer enabled.
	pub async fn sync_targets(&self, targets: impl IntoIterator<Item = (ChannelId, PairKey)>) {
		let targets: Vec<HealthKey> = targets.into_iter().collect();
		let now = current_timestamp();
		let mut entries = self.entries.write().await;

		entries.retain(|key, _| targets.contains(key));
		for (channel, pair) in targets {
			entries
				.entry((channel.clone(), pair.clone()))
				.or_insert_with(|| {
					debug!("Monitoring channel {} on {}", channel, pair);
					ChannelHealth::new(channel, pair, now)
				});
		}
	}

	/// Probes every tracked channel concurrently and updates its state.
	pub async fn perform_health_checks(&self) -> usize {
		let targets: Vec<HealthKey> = self.entries.read().await.keys().cloned().collect();
		let timeout = Duration::from_secs(self.config.response_timeout_secs.max(1));

		let probes = targets.into_iter().map(|(channel, pair)| {
			let publisher = self.publisher.clone();
			async move {
				let started = Instant::now();
				let outcome =
					tokio::time::timeout(timeout, publisher.check_channel(&pair, &channel)).await;
				let elapsed = started.elapsed().as_millis() as u64;
				let healthy = match outcome {
					Ok(Ok(healthy)) => healthy,
					Ok(Err(e)) => {
						debug!("Health probe for {} on {} failed: {}", channel, pair, e);
						false
					}
					Err(_) => {
						debug!("Health probe for {} on {} timed out", channel, pair);
						false
					}
				};
				((channel, pair), healthy, elapsed)
			}
		});
		let results = join_all(probes).await;

		let now = current_timestamp();
		let mut entries = self.entries.write().await;
		for (key, healthy, elapsed) in &results {
			if let Some(entry) = entries.get_mut(key) {
				entry.apply_check(*healthy, *elapsed, now);
				let previous = entry.refresh(&self.config);
				entry.log_transition(previous);
			}
		}
		debug!("Completed {} health checks", results.len());
		results.len()
	}

	/// Recomputes submission frequency, uptime and accuracy for every entry.
	pub async fn collect_metrics(&self) {
		let now = current_timestamp();

		let samples: Vec<(HealthKey, Vec<SubmissionSample>)> = {
			let entries = self.entries.read().await;
			entries
				.iter()
				.map(|(key, entry)| {
					let recent = entry
						.submissions
						.iter()
						.rev()
						.filter(|s| s.success)
						.take(ACCURACY_WINDOW)
						.copied()
						.collect();
					(key.clone(), recent)
				})
				.collect()
		};

		let mut deviations: HashMap<HealthKey, f64> = HashMap::new();
		for ((channel, pair), recent) in samples {
			let mut total = 0.0;
			let mut compared = 0usize;
			for sample in recent {
				if let Some(reference) = self
					.reference
					.reference_price(&pair, sample.timestamp)
					.await
					.filter(|r| *r > 0.0)
				{
					total += (sample.price as f64 - reference).abs() / reference;
					compared += 1;
				}
			}
			if compared > 0 {
				deviations.insert((channel, pair), total / compared as f64);
			}
		}

		let mut entries = self.entries.write().await;
		for (key, entry) in entries.iter_mut() {
			entry.submission_frequency = entry.submissions_in_last_hour(now) as f64;
			if let Some(deviation) = deviations.get(key) {
				entry.mean_deviation = Some(*deviation);
				entry.accuracy = (1.0 - deviation).max(0.0);
			}
			let previous = entry.refresh(&self.config);
			entry.log_transition(previous);
		}
	}

	/// Evaluates the alert conditions for every entry and raises the alerts
	/// that survive deduplication.
	pub async fn process_alerts(&self) -> Vec<AlertEvent> {
		let now = current_timestamp();
		let candidates: Vec<AlertEvent> = {
			let entries = self.entries.read().await;
			entries
				.values()
				.flat_map(|entry| self.alert_conditions(entry, now))
				.collect()
		};

		let mut raised = Vec::new();
		for alert in candidates {
			if self.alerts.raise(alert.clone()).await {
				raised.push(alert);
			}
		}
		raised
	}

	fn alert_conditions(&self, entry: &ChannelHealth, now: u64) -> Vec<AlertEvent> {
		let mut alerts = Vec::new();
		let subject = |level: AlertLevel, message: String| {
			AlertEvent::new(level, Some(entry.channel.clone()), entry.pair.clone(), message).at(now)
		};

		if entry.consecutive_failures >= self.config.max_consecutive_failures {
			alerts.push(
				subject(
					AlertLevel::Critical,
					format!(
						"{} consecutive failures on {}",
						entry.consecutive_failures, entry.channel
					),
				)
				.with_metric("consecutive_failures", entry.consecutive_failures),
			);
		}

		if entry.total_checks > 0 && entry.uptime < self.config.min_uptime {
			alerts.push(
				subject(
					AlertLevel::Warning,
					format!("Uptime {:.1}% below target", entry.uptime * 100.0),
				)
				.with_metric("uptime", entry.uptime),
			);
		}

		if let Some(deviation) = entry
			.mean_deviation
			.filter(|d| *d > self.config.max_deviation)
		{
			alerts.push(
				subject(
					AlertLevel::Warning,
					format!("Price deviation {:.2}% from reference", deviation * 100.0),
				)
				.with_metric("mean_deviation", deviation),
			);
		}

		// Frequency needs a full hour of observation to mean anything.
		if now.saturating_sub(entry.monitored_since) >= HOUR_SECS
			&& entry.submission_frequency < self.config.min_submission_frequency
		{
			alerts.push(
				subject(
					AlertLevel::Warning,
					format!(
						"Submission frequency {:.2}/h below minimum",
						entry.submission_frequency
					),
				)
				.with_metric("submission_frequency", entry.submission_frequency),
			);
		}

		alerts
	}

	/// Feeds a completed submission into the matching entry.
	pub async fn record_submission(&self, record: &SubmissionRecord) {
		let mut entries = self.entries.write().await;
		let key = (record.channel.clone(), record.pair.clone());
		let entry = entries.entry(key).or_insert_with(|| {
			ChannelHealth::new(
				record.channel.clone(),
				record.pair.clone(),
				current_timestamp(),
			)
		});
		entry.apply_submission(record);
		let previous = entry.refresh(&self.config);
		entry.log_transition(previous);
	}

	/// Status of every tracked entry, optionally limited to one pair.
	pub async fn channel_status(&self, pair: Option<&PairKey>) -> Vec<ChannelHealth> {
		let entries = self.entries.read().await;
		let mut statuses: Vec<ChannelHealth> = entries
			.values()
			.filter(|e| pair.map_or(true, |p| &e.pair == p))
			.cloned()
			.collect();
		statuses.sort_by(|a, b| a.pair.cmp(&b.pair).then_with(|| a.channel.cmp(&b.channel)));
		statuses
	}

	/// Entries for one channel across all pairs.
	pub async fn channel_detail(&self, channel: &ChannelId) -> Vec<ChannelHealth> {
		let mut statuses: Vec<ChannelHealth> = self
			.entries
			.read()
			.await
			.values()
			.filter(|e| &e.channel == channel)
			.cloned()
			.collect();
		statuses.sort_by(|a, b| a.pair.cmp(&b.pair));
		statuses
	}

	pub async fn summary(&self) -> HealthSummary {
		let now = current_timestamp();
		let alerts_last_hour = self.alerts.count_since(now.saturating_sub(HOUR_SECS)).await;
		let entries = self.entries.read().await;

		let count = |status: HealthStatus| entries.values().filter(|e| e.status == status).count();
		let total = entries.len();
		let average = |f: fn(&ChannelHealth) -> f64| {
			if total == 0 {
				0.0
			} else {
				entries.values().map(f).sum::<f64>() / total as f64
			}
		};

		HealthSummary {
			total_channels: total,
			healthy: count(HealthStatus::Healthy),
			warning: count(HealthStatus::Warning),
			critical: count(HealthStatus::Critical),
			offline: count(HealthStatus::Offline),
			average_score: average(|e| e.score),
			average_uptime: average(|e| e.uptime),
			alerts_last_hour,
			monitoring_active: self.is_active(),
			last_update: entries.values().filter_map(|e| e.last_check).max(),
		}
	}

	pub async fn recent_alerts(&self, limit: usize) -> Vec<AlertEvent> {
		self.alerts.recent(limit).await
	}
}
