//! Orchestration sweep, circuit breaker and registry operations.
//!
//! The sweep is the hard backstop behind the health monitor: it disables a
//! channel outright once its consecutive failures reach the ceiling and asks
//! the registry to remove it. In dry-run mode every registry and circuit
//! breaker call is logged instead of sent, while the local store still
//! changes.

use crate::error::CoreError;
use crate::event_bus::EventBus;
use crate::store::PriceStore;
use oracle_config::OrchestrationConfig;
use oracle_delivery::Ledger;
use oracle_monitoring::AlertManager;
use oracle_types::{
	current_timestamp, AlertEvent, AlertLevel, Channel, ChannelId, OracleEvent, PairKey,
	PairRegistration,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Whether the sweep counts `channel` as healthy at `now`.
///
/// Channels that never submitted carry no staleness penalty.
pub fn is_channel_healthy(channel: &Channel, now: u64, config: &OrchestrationConfig) -> bool {
	if !channel.enabled || channel.consecutive_failures >= config.unhealthy_after_failures {
		return false;
	}
	if let Some(ms) = channel.last_response_time_ms() {
		if ms > config.channel_timeout_secs.saturating_mul(1000) {
			return false;
		}
	}
	match channel.last_submission {
		Some(at) => now.saturating_sub(at) <= config.price_staleness_secs,
		None => true,
	}
}

/// Volatility of `prices` in basis points: `(max - min) * 10000 / max`.
pub fn volatility_bps(prices: &[u64]) -> Option<u64> {
	if prices.len() < 2 {
		return None;
	}
	let max = *prices.iter().max()?;
	let min = *prices.iter().min()?;
	if max == 0 {
		return None;
	}
	Some(((max - min) as u128 * 10_000 / max as u128) as u64)
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
	pub disabled: Vec<(PairKey, ChannelId)>,
	/// Pairs left with fewer healthy channels than they require.
	pub understaffed: Vec<PairKey>,
}

pub struct Orchestrator {
	config: OrchestrationConfig,
	dry_run: bool,
	store: Arc<PriceStore>,
	ledger: Ledger,
	alerts: Arc<AlertManager>,
	event_bus: EventBus,
}

impl Orchestrator {
	pub fn new(
		config: OrchestrationConfig,
		dry_run: bool,
		store: Arc<PriceStore>,
		ledger: Ledger,
		alerts: Arc<AlertManager>,
		event_bus: EventBus,
	) -> Self {
		Self {
			config,
			dry_run,
			store,
			ledger,
			alerts,
			event_bus,
		}
	}

	pub fn config(&self) -> &OrchestrationConfig {
		&self.config
	}

	pub async fn sweep(&self) -> Result<SweepReport, CoreError> {
		let pairs = self.store.pairs();
		if pairs.is_empty() {
			return Err(CoreError::NoPairs);
		}

		let now = current_timestamp();
		let mut report = SweepReport::default();

		for pair in pairs {
			let state = self.store.get(&pair)?;
			let (disabled, healthy, required) = {
				let mut state = state.write().await;
				let mut disabled = Vec::new();
				for channel in state.channels.iter_mut().filter(|c| c.enabled) {
					if channel.consecutive_failures >= self.config.disable_after_failures {
						channel.enabled = false;
						disabled.push((channel.id.clone(), channel.consecutive_failures));
					}
				}
				let healthy = state
					.channels
					.iter()
					.filter(|c| is_channel_healthy(c, now, &self.config))
					.count();
				(disabled, healthy, state.min_sources)
			};

			for (channel, failures) in disabled {
				warn!(
					"Disabling channel {} for {} after {} consecutive failures",
					channel, pair, failures
				);
				self.request_removal(&pair, &channel).await;
				self.event_bus.publish(OracleEvent::ChannelDisabled {
					pair: pair.clone(),
					channel: channel.clone(),
					consecutive_failures: failures,
				});
				report.disabled.push((pair.clone(), channel));
			}

			if healthy < required {
				error!(
					"CRITICAL: {} has {} healthy channels, {} required",
					pair, healthy, required
				);
				let alert = AlertEvent::new(
					AlertLevel::Critical,
					None,
					pair.clone(),
					format!(
						"Insufficient healthy channels: {} of {} required",
						healthy, required
					),
				)
				.with_metric("healthy_channels", healthy)
				.with_metric("min_sources", required);
				self.raise(alert).await;
				report.understaffed.push(pair);
			}
		}

		Ok(report)
	}

	async fn request_removal(&self, pair: &PairKey, channel: &ChannelId) {
		if self.dry_run {
			info!("[dry-run] Would remove channel {} from {}", channel, pair);
			return;
		}
		if let Err(e) = self.ledger.registry.remove_channel(pair, channel).await {
			error!("Failed to remove channel {} from {}: {}", channel, pair, e);
		}
	}

	/// Halts every pair whose recent published prices swing more than the
	/// volatility threshold. Returns the newly halted pairs.
	pub async fn check_circuit_breakers(&self) -> Vec<(PairKey, u64)> {
		let now = current_timestamp();
		let window = self.config.volatility_window.max(2);
		let mut triggered = Vec::new();

		for pair in self.store.pairs() {
			let Ok(state) = self.store.get(&pair) else {
				continue;
			};
			let bps = {
				let mut state = state.write().await;
				if state.circuit_breaker_at.is_some() {
					continue;
				}
				let recent: Vec<u64> = state
					.published
					.iter()
					.rev()
					.take(window)
					.map(|p| p.price)
					.collect();
				match volatility_bps(&recent) {
					Some(bps) if bps > self.config.volatility_threshold_bps => {
						state.circuit_breaker_at = Some(now);
						bps
					}
					_ => continue,
				}
			};

			error!(
				"CRITICAL: volatility of {} is {} bps (threshold {}), triggering circuit breaker",
				pair, bps, self.config.volatility_threshold_bps
			);
			if self.dry_run {
				info!("[dry-run] Would trigger circuit breaker for {}", pair);
			} else if let Err(e) = self.ledger.publisher.trigger_circuit_breaker(&pair).await {
				error!("Failed to trigger circuit breaker for {}: {}", pair, e);
			}

			self.event_bus.publish(OracleEvent::CircuitBreakerTriggered {
				pair: pair.clone(),
				volatility_bps: bps,
			});
			let alert = AlertEvent::new(
				AlertLevel::Critical,
				None,
				pair.clone(),
				format!("Circuit breaker triggered at {} bps volatility", bps),
			)
			.with_metric("volatility_bps", bps)
			.with_metric("threshold_bps", self.config.volatility_threshold_bps);
			self.raise(alert).await;
			triggered.push((pair, bps));
		}

		triggered
	}

	/// Lifts a local circuit-breaker hold. The published window is cleared
	/// so the same swing does not trip the breaker again.
	pub async fn resume_pair(&self, pair: &PairKey) -> Result<bool, CoreError> {
		let state = self.store.get(pair)?;
		let mut state = state.write().await;
		let was_halted = state.circuit_breaker_at.take().is_some();
		if was_halted {
			state.published.clear();
			info!("Resumed submissions for {}", pair);
		}
		Ok(was_halted)
	}

	pub async fn register_pair(&self, registration: PairRegistration) -> Result<(), CoreError> {
		if registration.min_sources == 0 {
			return Err(CoreError::Configuration(format!(
				"{} needs at least one source",
				registration.pair
			)));
		}
		if self.store.contains(&registration.pair) {
			return Err(CoreError::AlreadyRegistered(registration.pair.to_string()));
		}

		if self.dry_run {
			info!(
				"[dry-run] Would register {} with {} channels",
				registration.pair,
				registration.channels.len()
			);
		} else {
			self.ledger.registry.register_pair(&registration).await?;
		}
		self.store.register(&registration)?;
		info!("Registered pair {}", registration.pair);
		Ok(())
	}

	pub async fn add_channel(&self, pair: &PairKey, channel: &ChannelId) -> Result<(), CoreError> {
		let state = self.store.snapshot(pair).await?;
		if state.channel(channel).is_some_and(|c| c.enabled) {
			return Err(CoreError::AlreadyRegistered(format!("{} on {}", channel, pair)));
		}

		if self.dry_run {
			info!("[dry-run] Would add channel {} to {}", channel, pair);
		} else {
			self.ledger.registry.add_channel(pair, channel).await?;
		}
		self.store.add_channel(pair, channel).await?;
		info!("Added channel {} to {}", channel, pair);
		Ok(())
	}

	pub async fn remove_channel(&self, pair: &PairKey, channel: &ChannelId) -> Result<(), CoreError> {
		let state = self.store.snapshot(pair).await?;
		if !state.channel(channel).is_some_and(|c| c.enabled) {
			return Err(CoreError::UnknownChannel {
				pair: pair.clone(),
				channel: channel.clone(),
			});
		}

		if self.dry_run {
			info!("[dry-run] Would remove channel {} from {}", channel, pair);
		} else {
			self.ledger.registry.remove_channel(pair, channel).await?;
		}
		self.store.disable_channel(pair, channel).await?;
		info!("Removed channel {} from {}", channel, pair);
		Ok(())
	}

	pub async fn update_min_sources(&self, pair: &PairKey, min_sources: usize) -> Result<(), CoreError> {
		if min_sources == 0 {
			return Err(CoreError::Configuration(format!(
				"{} needs at least one source",
				pair
			)));
		}
		if !self.store.contains(pair) {
			return Err(CoreError::UnknownPair(pair.clone()));
		}

		if self.dry_run {
			info!("[dry-run] Would set min sources of {} to {}", pair, min_sources);
		} else {
			self.ledger.registry.set_min_sources(pair, min_sources).await?;
		}
		self.store.set_min_sources(pair, min_sources).await
	}

	/// Pulls pairs and channels the registry knows about into the local
	/// store. Existing local state is kept. Returns how many pairs and
	/// channels were added.
	pub async fn refresh_registry(&self) -> Result<usize, CoreError> {
		let mut added = 0;
		for registration in self.ledger.registry.list_pairs().await? {
			if !self.store.contains(&registration.pair) {
				self.store.register(&registration)?;
				added += 1;
				continue;
			}
			let state = self.store.snapshot(&registration.pair).await?;
			for channel in &registration.channels {
				if state.channel(channel).is_none() {
					self.store.add_channel(&registration.pair, channel).await?;
					added += 1;
				}
			}
		}
		if added > 0 {
			info!("Registry refresh added {} entries", added);
		}
		Ok(added)
	}

	async fn raise(&self, alert: AlertEvent) {
		if self.alerts.raise(alert.clone()).await {
			self.event_bus.publish(OracleEvent::AlertRaised { alert });
		}
	}
}
