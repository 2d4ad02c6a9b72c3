//! The engine: owns every component and runs the concurrent loops.
//!
//! Loops never stop on a single failed iteration. An error is logged, the
//! loop pauses for `error_pause_secs` and tries again. Only a missing pair
//! or channel set halts a loop. Every loop watches the shutdown signal at
//! its inter-cycle sleep, so an in-flight cycle always completes.

use crate::coordinator::{CoordinatorStatus, CycleOutcome, SubmissionCoordinator};
use crate::error::CoreError;
use crate::event_bus::EventBus;
use crate::lifecycle::{LifecycleManager, LifecycleState};
use crate::orchestrator::Orchestrator;
use crate::store::PriceStore;
use oracle_config::OracleConfig;
use oracle_delivery::Ledger;
use oracle_monitoring::{AlertManager, ChannelHealth, HealthMonitor, HealthSummary};
use oracle_sources::SourceService;
use oracle_storage::StorageService;
use oracle_types::{current_timestamp, AlertEvent, HealthStatus, OracleEvent, PairKey};
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Which loops the engine runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
	#[default]
	Full,
	/// Coordination loop only.
	Coordinator,
	/// Health, metrics and alert loops plus the orchestration sweep.
	Monitor,
}

impl RunMode {
	fn coordinates(self) -> bool {
		matches!(self, Self::Full | Self::Coordinator)
	}

	fn monitors(self) -> bool {
		matches!(self, Self::Full | Self::Monitor)
	}
}

impl FromStr for RunMode {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"full" => Ok(Self::Full),
			"coordinator" => Ok(Self::Coordinator),
			"monitor" => Ok(Self::Monitor),
			other => Err(format!("Unknown run mode: {}", other)),
		}
	}
}

impl fmt::Display for RunMode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Full => write!(f, "full"),
			Self::Coordinator => write!(f, "coordinator"),
			Self::Monitor => write!(f, "monitor"),
		}
	}
}

#[derive(Debug, Clone, Serialize)]
pub struct PairStatus {
	pub pair: PairKey,
	/// Last accepted aggregate, as it would be published.
	pub price: Option<u64>,
	pub median: Option<f64>,
	pub weighted: Option<f64>,
	pub confidence: Option<f64>,
	pub source_count: usize,
	pub aggregated_at: Option<u64>,
	pub min_sources: usize,
	pub enabled_channels: usize,
	pub healthy_channels: usize,
	pub last_submission: Option<u64>,
	pub submission_count: u64,
	pub halted: bool,
	pub channels: Vec<ChannelHealth>,
}

/// Full diagnostic snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct OracleStatus {
	pub name: String,
	pub state: String,
	pub dry_run: bool,
	pub offline: bool,
	pub timestamp: u64,
	pub pairs: Vec<PairStatus>,
	pub health: HealthSummary,
	pub coordinator: CoordinatorStatus,
	pub recent_alerts: Vec<AlertEvent>,
}

pub struct OracleEngine {
	pub(crate) config: OracleConfig,
	pub(crate) store: Arc<PriceStore>,
	pub(crate) sources: Arc<SourceService>,
	pub(crate) coordinator: Arc<SubmissionCoordinator>,
	pub(crate) orchestrator: Arc<Orchestrator>,
	pub(crate) monitor: Arc<HealthMonitor>,
	pub(crate) alerts: Arc<AlertManager>,
	pub(crate) storage: Arc<StorageService>,
	pub(crate) ledger: Ledger,
	pub(crate) event_bus: EventBus,
	pub(crate) lifecycle: Arc<LifecycleManager>,
}

impl OracleEngine {
	/// Runs the loops for `mode` until shutdown is requested.
	pub async fn run(&self, mode: RunMode) -> Result<(), CoreError> {
		info!(
			"Starting {} in {} mode{}",
			self.config.oracle.name,
			mode,
			if self.config.oracle.dry_run { " (dry run)" } else { "" }
		);
		self.lifecycle
			.transition(LifecycleState::Initializing)
			.await?;

		if let Err(e) = self.preflight().await {
			error!("{}", e);
			self.lifecycle.transition(LifecycleState::Failed).await?;
			return Err(e);
		}

		self.monitor.sync_targets(self.store.enabled_targets().await).await;
		self.monitor.set_active(mode.monitors());
		self.lifecycle.transition(LifecycleState::Running).await?;

		let mut tasks = self.spawn_loops(mode);
		while let Some(result) = tasks.join_next().await {
			if let Err(e) = result {
				error!("Loop task ended abnormally: {}", e);
			}
		}

		self.monitor.set_active(false);
		if !self.lifecycle.shutdown_requested() {
			self.lifecycle.request_shutdown().await?;
		}
		self.lifecycle.transition(LifecycleState::Stopped).await?;
		info!("Engine stopped");
		Ok(())
	}

	/// Signals every loop to stop after its current cycle.
	pub async fn shutdown(&self) -> Result<(), CoreError> {
		info!("Shutdown requested");
		self.lifecycle.request_shutdown().await
	}

	async fn preflight(&self) -> Result<(), CoreError> {
		if !self.config.oracle.dry_run {
			if let Err(e) = self.orchestrator.refresh_registry().await {
				warn!("Could not read the pair registry: {}", e);
			}
		}
		if self.store.is_empty() {
			return Err(CoreError::Configuration(
				"No trading pairs registered; add [[pairs]] entries to the configuration".into(),
			));
		}
		if self.store.enabled_channel_count().await == 0 {
			return Err(CoreError::Configuration(
				"No channels registered for any pair; list channels under [[pairs]]".into(),
			));
		}
		Ok(())
	}

	fn spawn_loops(&self, mode: RunMode) -> JoinSet<()> {
		let mut tasks = JoinSet::new();
		let pause = Duration::from_secs(self.config.orchestration.error_pause_secs.max(1));

		if mode.coordinates() {
			let coordinator = self.coordinator.clone();
			let store = self.store.clone();
			tasks.spawn(run_loop(
				"coordination",
				secs(self.config.coordination.interval_secs),
				pause,
				self.lifecycle.subscribe_shutdown(),
				move || {
					let coordinator = coordinator.clone();
					let store = store.clone();
					async move {
						if store.enabled_channel_count().await == 0 {
							return Err(CoreError::NoChannels);
						}
						let outcomes = coordinator.run_cycle().await?;
						let submitted = outcomes
							.iter()
							.filter(|(_, o)| matches!(o, CycleOutcome::Submitted(_)))
							.count();
						debug!(
							"Coordination cycle finished: {}/{} pairs submitted",
							submitted,
							outcomes.len()
						);
						Ok(())
					}
				},
			));
		}

		if mode.monitors() {
			let monitor = self.monitor.clone();
			let store = self.store.clone();
			tasks.spawn(run_loop(
				"health check",
				secs(self.config.health.check_interval_secs),
				pause,
				self.lifecycle.subscribe_shutdown(),
				move || {
					let monitor = monitor.clone();
					let store = store.clone();
					async move {
						monitor.sync_targets(store.enabled_targets().await).await;
						let checked = monitor.perform_health_checks().await;
						debug!("Health checks completed for {} targets", checked);
						Ok(())
					}
				},
			));

			let monitor = self.monitor.clone();
			tasks.spawn(run_loop(
				"metrics",
				secs(self.config.health.metrics_interval_secs),
				pause,
				self.lifecycle.subscribe_shutdown(),
				move || {
					let monitor = monitor.clone();
					async move {
						monitor.collect_metrics().await;
						Ok(())
					}
				},
			));

			let monitor = self.monitor.clone();
			let event_bus = self.event_bus.clone();
			tasks.spawn(run_loop(
				"alert",
				secs(self.config.health.alert_interval_secs),
				pause,
				self.lifecycle.subscribe_shutdown(),
				move || {
					let monitor = monitor.clone();
					let event_bus = event_bus.clone();
					async move {
						for alert in monitor.process_alerts().await {
							event_bus.publish(OracleEvent::AlertRaised { alert });
						}
						Ok(())
					}
				},
			));

			let orchestrator = self.orchestrator.clone();
			tasks.spawn(run_loop(
				"orchestration",
				secs(self.config.orchestration.health_check_interval_secs),
				pause,
				self.lifecycle.subscribe_shutdown(),
				move || {
					let orchestrator = orchestrator.clone();
					async move {
						let report = orchestrator.sweep().await?;
						if !report.disabled.is_empty() {
							info!("Sweep disabled {} channels", report.disabled.len());
						}
						orchestrator.check_circuit_breakers().await;
						Ok(())
					}
				},
			));

			tasks.spawn(forward_submissions(
				self.event_bus.subscribe(),
				self.monitor.clone(),
				self.lifecycle.subscribe_shutdown(),
			));
		}

		tasks
	}

	pub async fn pair_status(&self, pair: &PairKey) -> Result<PairStatus, CoreError> {
		let state = self.store.snapshot(pair).await?;
		let channels = self.monitor.channel_status(Some(pair)).await;
		let latest = state.latest();

		Ok(PairStatus {
			pair: state.pair.clone(),
			price: latest.map(|a| a.published_price()),
			median: latest.map(|a| a.median),
			weighted: latest.map(|a| a.weighted),
			confidence: latest.map(|a| a.confidence),
			source_count: latest.map(|a| a.source_count).unwrap_or(0),
			aggregated_at: latest.map(|a| a.timestamp),
			min_sources: state.min_sources,
			enabled_channels: state.enabled_channels().count(),
			healthy_channels: channels
				.iter()
				.filter(|c| c.status == HealthStatus::Healthy)
				.count(),
			last_submission: state.last_submission,
			submission_count: state.submission_count,
			halted: state.circuit_breaker_at.is_some(),
			channels,
		})
	}

	pub async fn status(&self) -> OracleStatus {
		let mut pairs = Vec::new();
		for pair in self.store.pairs() {
			if let Ok(status) = self.pair_status(&pair).await {
				pairs.push(status);
			}
		}

		OracleStatus {
			name: self.config.oracle.name.clone(),
			state: self.lifecycle.state().await.to_string(),
			dry_run: self.config.oracle.dry_run,
			offline: self.config.oracle.offline,
			timestamp: current_timestamp(),
			pairs,
			health: self.monitor.summary().await,
			coordinator: self.coordinator.status_report().await,
			recent_alerts: self.alerts.recent(10).await,
		}
	}

	pub fn config(&self) -> &OracleConfig {
		&self.config
	}

	pub fn store(&self) -> &Arc<PriceStore> {
		&self.store
	}

	pub fn sources(&self) -> &Arc<SourceService> {
		&self.sources
	}

	pub fn coordinator(&self) -> &Arc<SubmissionCoordinator> {
		&self.coordinator
	}

	pub fn orchestrator(&self) -> &Arc<Orchestrator> {
		&self.orchestrator
	}

	pub fn monitor(&self) -> &Arc<HealthMonitor> {
		&self.monitor
	}

	pub fn alerts(&self) -> &Arc<AlertManager> {
		&self.alerts
	}

	pub fn storage(&self) -> &Arc<StorageService> {
		&self.storage
	}

	pub fn ledger(&self) -> &Ledger {
		&self.ledger
	}

	pub fn event_bus(&self) -> &EventBus {
		&self.event_bus
	}

	pub fn lifecycle(&self) -> &Arc<LifecycleManager> {
		&self.lifecycle
	}
}

fn secs(value: u64) -> Duration {
	Duration::from_secs(value.max(1))
}

/// Runs `tick` every `interval` until shutdown. A failed tick is followed
/// by `error_pause` instead; a missing pair or channel set ends the loop.
async fn run_loop<F, Fut>(
	name: &'static str,
	interval: Duration,
	error_pause: Duration,
	mut shutdown: watch::Receiver<bool>,
	mut tick: F,
) where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<(), CoreError>>,
{
	info!("Started {} loop (every {:?})", name, interval);

	loop {
		if *shutdown.borrow() {
			break;
		}

		let pause = match tick().await {
			Ok(()) => interval,
			Err(e @ (CoreError::NoPairs | CoreError::NoChannels)) => {
				error!("Halting {} loop: {}", name, e);
				break;
			}
			Err(e) => {
				error!("Error in {} loop: {}; retrying in {:?}", name, e, error_pause);
				error_pause
			}
		};

		tokio::select! {
			_ = tokio::time::sleep(pause) => {}
			changed = shutdown.changed() => {
				if changed.is_err() {
					break;
				}
			}
		}
	}

	info!("Stopped {} loop", name);
}

/// Feeds completed submissions to the health monitor.
async fn forward_submissions(
	mut events: broadcast::Receiver<OracleEvent>,
	monitor: Arc<HealthMonitor>,
	mut shutdown: watch::Receiver<bool>,
) {
	loop {
		if *shutdown.borrow() {
			break;
		}

		tokio::select! {
			event = events.recv() => match event {
				Ok(OracleEvent::SubmissionCompleted { batch }) => {
					for record in &batch.records {
						monitor.record_submission(record).await;
					}
				}
				Ok(_) => {}
				Err(broadcast::error::RecvError::Lagged(skipped)) => {
					warn!("Submission listener lagged, {} events skipped", skipped);
				}
				Err(broadcast::error::RecvError::Closed) => break,
			},
			changed = shutdown.changed() => {
				if changed.is_err() {
					break;
				}
			}
		}
	}
}
