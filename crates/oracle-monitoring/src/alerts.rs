//! Alert history with deduplication and fire-and-forget delivery.
//!
//! An alert is suppressed when an alert with the same channel, pair and
//! severity was retained within the dedup window. Retained alerts are logged
//! and handed to every configured sink on a spawned task; sink failures are
//! logged and otherwise ignored.

use async_trait::async_trait;
use oracle_config::HealthConfig;
use oracle_types::AlertEvent;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum AlertError {
	#[error("Delivery failed: {0}")]
	Delivery(String),
	#[error("Sink rejected alert with status {0}")]
	Status(u16),
}

/// Destination for retained alerts.
#[async_trait]
pub trait AlertSink: Send + Sync {
	fn name(&self) -> &str;

	async fn deliver(&self, alert: &AlertEvent) -> Result<(), AlertError>;
}

/// POSTs the alert as JSON to a webhook.
pub struct WebhookSink {
	client: reqwest::Client,
	url: String,
}

impl WebhookSink {
	pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, AlertError> {
		let client = reqwest::Client::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| AlertError::Delivery(e.to_string()))?;
		Ok(Self {
			client,
			url: url.into(),
		})
	}
}

#[async_trait]
impl AlertSink for WebhookSink {
	fn name(&self) -> &str {
		"webhook"
	}

	async fn deliver(&self, alert: &AlertEvent) -> Result<(), AlertError> {
		let response = self
			.client
			.post(&self.url)
			.json(alert)
			.send()
			.await
			.map_err(|e| AlertError::Delivery(e.to_string()))?;
		if !response.status().is_success() {
			return Err(AlertError::Status(response.status().as_u16()));
		}
		Ok(())
	}
}

pub struct AlertManager {
	history: RwLock<VecDeque<AlertEvent>>,
	sinks: Vec<Arc<dyn AlertSink>>,
	dedup_window_secs: u64,
	history_limit: usize,
}

impl AlertManager {
	pub fn new(dedup_window_secs: u64, history_limit: usize) -> Self {
		Self {
			history: RwLock::new(VecDeque::new()),
			sinks: Vec::new(),
			dedup_window_secs,
			history_limit: history_limit.max(1),
		}
	}

	/// Builds the manager from `[health]`, adding a webhook sink when a URL
	/// is configured.
	pub fn from_config(config: &HealthConfig) -> Result<Self, AlertError> {
		let mut manager = Self::new(config.alert_dedup_secs, config.alert_history_size);
		if !config.alert_webhook_url.is_empty() {
			manager = manager.with_sink(Arc::new(WebhookSink::new(
				config.alert_webhook_url.clone(),
				Duration::from_secs(10),
			)?));
		}
		Ok(manager)
	}

	pub fn with_sink(mut self, sink: Arc<dyn AlertSink>) -> Self {
		self.sinks.push(sink);
		self
	}

	/// Records `alert` unless it duplicates a recent one.
	///
	/// Returns whether the alert was retained.
	pub async fn raise(&self, alert: AlertEvent) -> bool {
		{
			let mut history = self.history.write().await;
			let duplicate = history.iter().rev().any(|previous| {
				previous.same_subject(&alert)
					&& alert.timestamp.saturating_sub(previous.timestamp) < self.dedup_window_secs
			});
			if duplicate {
				debug!(
					"Suppressed duplicate {} alert for {}: {}",
					alert.level, alert.pair, alert.message
				);
				return false;
			}

			history.push_back(alert.clone());
			while history.len() > self.history_limit {
				history.pop_front();
			}
		}

		warn!(
			severity = %alert.level,
			pair = %alert.pair,
			channel = alert.channel.as_ref().map(|c| c.as_str()).unwrap_or("-"),
			"Alert: {}",
			alert.message
		);
		self.dispatch(alert);
		true
	}

	fn dispatch(&self, alert: AlertEvent) {
		if self.sinks.is_empty() {
			return;
		}
		let alert = Arc::new(alert);
		for sink in &self.sinks {
			let sink = sink.clone();
			let alert = alert.clone();
			tokio::spawn(async move {
				if let Err(e) = sink.deliver(&alert).await {
					warn!("Alert sink '{}' failed: {}", sink.name(), e);
				}
			});
		}
	}

	/// Up to `limit` alerts, newest first.
	pub async fn recent(&self, limit: usize) -> Vec<AlertEvent> {
		self.history
			.read()
			.await
			.iter()
			.rev()
			.take(limit)
			.cloned()
			.collect()
	}

	pub async fn count_since(&self, since: u64) -> usize {
		self.history
			.read()
			.await
			.iter()
			.filter(|a| a.timestamp >= since)
			.count()
	}

	pub async fn len(&self) -> usize {
		self.history.read().await.len()
	}

	pub async fn is_empty(&self) -> bool {
		self.history.read().await.is_empty()
	}
}
