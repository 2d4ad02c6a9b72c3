//! Configuration types for the oracle coordinator.
//!
//! Every field carries a serde default so a configuration file only needs
//! to list its trading pairs; everything else falls back to the production
//! defaults below.

use oracle_types::{ChannelId, PairKey, PairRegistration, SelectionStrategy};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Complete oracle configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OracleConfig {
	/// Instance identity and run flags
	#[serde(default)]
	pub oracle: OracleSettings,
	/// External price sources
	#[serde(default)]
	pub sources: SourcesConfig,
	/// Aggregation parameters
	#[serde(default)]
	pub aggregation: AggregationConfig,
	/// Anomaly detection thresholds
	#[serde(default)]
	pub anomaly: AnomalyConfig,
	/// Submission cadence and channel selection
	#[serde(default)]
	pub coordination: CoordinationConfig,
	/// Channel sweep and circuit breaker
	#[serde(default)]
	pub orchestration: OrchestrationConfig,
	/// Health monitor and alerting
	#[serde(default)]
	pub health: HealthConfig,
	/// Ledger collaborator backend
	#[serde(default)]
	pub delivery: DeliveryConfig,
	/// Submission outcome persistence
	#[serde(default)]
	pub storage: StorageConfig,
	/// HTTP diagnostics surface
	#[serde(default)]
	pub api: ApiConfig,
	/// Statically registered pairs
	#[serde(default)]
	pub pairs: Vec<PairConfig>,
}

impl OracleConfig {
	/// Pair registrations seeded from the `[[pairs]]` entries.
	pub fn registrations(&self) -> Vec<PairRegistration> {
		self.pairs.iter().map(PairConfig::to_registration).collect()
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleSettings {
	#[serde(default = "default_name")]
	pub name: String,
	/// Log ledger calls instead of sending them.
	#[serde(default = "default_true")]
	pub dry_run: bool,
	/// Skip all network fetches; sources return no observations.
	#[serde(default)]
	pub offline: bool,
}

impl Default for OracleSettings {
	fn default() -> Self {
		Self {
			name: default_name(),
			dry_run: true,
			offline: false,
		}
	}
}

/// Source adapter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
	#[serde(default = "default_sources")]
	pub enabled: Vec<String>,
	/// Minimum spacing between two calls to the same host.
	#[serde(default = "default_rate_limit_ms")]
	pub rate_limit_ms: u64,
	/// Retries after the first attempt.
	#[serde(default = "default_max_retries")]
	pub max_retries: u32,
	#[serde(default = "default_backoff_base_ms")]
	pub backoff_base_ms: u64,
	#[serde(default = "default_request_timeout_secs")]
	pub request_timeout_secs: u64,
	/// Overall budget for one source, retries included.
	#[serde(default = "default_fetch_timeout_secs")]
	pub fetch_timeout_secs: u64,
	/// Asset -> source -> symbol overrides.
	#[serde(default)]
	pub symbols: HashMap<String, HashMap<String, String>>,
	/// Source -> base URL overrides.
	#[serde(default)]
	pub base_urls: HashMap<String, String>,
}

impl Default for SourcesConfig {
	fn default() -> Self {
		Self {
			enabled: default_sources(),
			rate_limit_ms: default_rate_limit_ms(),
			max_retries: default_max_retries(),
			backoff_base_ms: default_backoff_base_ms(),
			request_timeout_secs: default_request_timeout_secs(),
			fetch_timeout_secs: default_fetch_timeout_secs(),
			symbols: HashMap::new(),
			base_urls: HashMap::new(),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationConfig {
	#[serde(default = "default_min_observations")]
	pub min_observations: usize,
	/// `n / trim_divisor` prices are dropped from each end of the sample.
	#[serde(default = "default_trim_divisor")]
	pub trim_divisor: usize,
	#[serde(default = "default_history_size")]
	pub history_size: usize,
}

impl Default for AggregationConfig {
	fn default() -> Self {
		Self {
			min_observations: default_min_observations(),
			trim_divisor: default_trim_divisor(),
			history_size: default_history_size(),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyConfig {
	/// Relative deviation from the trailing median, 0.05 = 5%.
	#[serde(default = "default_deviation_threshold")]
	pub deviation_threshold: f64,
	#[serde(default = "default_min_confidence")]
	pub min_confidence: f64,
	#[serde(default = "default_history_window")]
	pub history_window: usize,
	#[serde(default = "default_min_history")]
	pub min_history: usize,
	/// Largest distance of one source from the cycle's average, in basis
	/// points. 0 disables the check.
	#[serde(default = "default_source_deviation_bps")]
	pub source_deviation_bps: u64,
}

impl Default for AnomalyConfig {
	fn default() -> Self {
		Self {
			deviation_threshold: default_deviation_threshold(),
			min_confidence: default_min_confidence(),
			history_window: default_history_window(),
			min_history: default_min_history(),
			source_deviation_bps: default_source_deviation_bps(),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinationConfig {
	#[serde(default = "default_coordination_interval_secs")]
	pub interval_secs: u64,
	#[serde(default = "default_submission_delay_min_secs")]
	pub submission_delay_min_secs: u64,
	#[serde(default = "default_submission_delay_max_secs")]
	pub submission_delay_max_secs: u64,
	#[serde(default = "default_max_price_age_secs")]
	pub max_price_age_secs: u64,
	#[serde(default = "default_price_change_threshold")]
	pub price_change_threshold: f64,
	#[serde(default)]
	pub selection_strategy: SelectionStrategy,
	#[serde(default = "default_channels_per_submission")]
	pub channels_per_submission: usize,
	/// Delay between consecutive channel submissions within one batch.
	#[serde(default = "default_stagger_secs")]
	pub stagger_secs: u64,
	#[serde(default = "default_reliability_step")]
	pub reliability_step: f64,
	#[serde(default = "default_submission_timeout_secs")]
	pub submission_timeout_secs: u64,
}

impl Default for CoordinationConfig {
	fn default() -> Self {
		Self {
			interval_secs: default_coordination_interval_secs(),
			submission_delay_min_secs: default_submission_delay_min_secs(),
			submission_delay_max_secs: default_submission_delay_max_secs(),
			max_price_age_secs: default_max_price_age_secs(),
			price_change_threshold: default_price_change_threshold(),
			selection_strategy: SelectionStrategy::default(),
			channels_per_submission: default_channels_per_submission(),
			stagger_secs: default_stagger_secs(),
			reliability_step: default_reliability_step(),
			submission_timeout_secs: default_submission_timeout_secs(),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationConfig {
	#[serde(default = "default_health_interval_secs")]
	pub health_check_interval_secs: u64,
	/// Consecutive failures after which a channel is disabled and removed.
	#[serde(default = "default_disable_after_failures")]
	pub disable_after_failures: u32,
	/// Consecutive failures after which a channel no longer counts as healthy.
	#[serde(default = "default_unhealthy_after_failures")]
	pub unhealthy_after_failures: u32,
	#[serde(default = "default_channel_timeout_secs")]
	pub channel_timeout_secs: u64,
	#[serde(default = "default_price_staleness_secs")]
	pub price_staleness_secs: u64,
	#[serde(default = "default_volatility_threshold_bps")]
	pub volatility_threshold_bps: u64,
	#[serde(default = "default_volatility_window")]
	pub volatility_window: usize,
	#[serde(default = "default_error_pause_secs")]
	pub error_pause_secs: u64,
}

impl Default for OrchestrationConfig {
	fn default() -> Self {
		Self {
			health_check_interval_secs: default_health_interval_secs(),
			disable_after_failures: default_disable_after_failures(),
			unhealthy_after_failures: default_unhealthy_after_failures(),
			channel_timeout_secs: default_channel_timeout_secs(),
			price_staleness_secs: default_price_staleness_secs(),
			volatility_threshold_bps: default_volatility_threshold_bps(),
			volatility_window: default_volatility_window(),
			error_pause_secs: default_error_pause_secs(),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
	#[serde(default = "default_health_interval_secs")]
	pub check_interval_secs: u64,
	#[serde(default = "default_metrics_interval_secs")]
	pub metrics_interval_secs: u64,
	#[serde(default = "default_alert_interval_secs")]
	pub alert_interval_secs: u64,
	#[serde(default = "default_response_timeout_secs")]
	pub response_timeout_secs: u64,
	#[serde(default = "default_max_consecutive_failures")]
	pub max_consecutive_failures: u32,
	#[serde(default = "default_min_uptime")]
	pub min_uptime: f64,
	#[serde(default = "default_max_deviation")]
	pub max_deviation: f64,
	/// Submissions per hour.
	#[serde(default = "default_min_submission_frequency")]
	pub min_submission_frequency: f64,
	#[serde(default = "default_alert_dedup_secs")]
	pub alert_dedup_secs: u64,
	#[serde(default = "default_alert_history_size")]
	pub alert_history_size: usize,
	/// Empty means alerts are only logged.
	#[serde(default)]
	pub alert_webhook_url: String,
}

impl Default for HealthConfig {
	fn default() -> Self {
		Self {
			check_interval_secs: default_health_interval_secs(),
			metrics_interval_secs: default_metrics_interval_secs(),
			alert_interval_secs: default_alert_interval_secs(),
			response_timeout_secs: default_response_timeout_secs(),
			max_consecutive_failures: default_max_consecutive_failures(),
			min_uptime: default_min_uptime(),
			max_deviation: default_max_deviation(),
			min_submission_frequency: default_min_submission_frequency(),
			alert_dedup_secs: default_alert_dedup_secs(),
			alert_history_size: default_alert_history_size(),
			alert_webhook_url: String::new(),
		}
	}
}

/// Ledger backend selection plus its backend-specific table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
	/// `dry_run` or `http`
	#[serde(default = "default_delivery_backend")]
	pub backend: String,
	#[serde(default = "empty_table")]
	pub config: toml::Value,
}

impl Default for DeliveryConfig {
	fn default() -> Self {
		Self {
			backend: default_delivery_backend(),
			config: empty_table(),
		}
	}
}

/// Storage backend selection plus its backend-specific table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
	/// `memory` or `file`
	#[serde(default = "default_storage_backend")]
	pub backend: String,
	#[serde(default = "empty_table")]
	pub config: toml::Value,
}

impl Default for StorageConfig {
	fn default() -> Self {
		Self {
			backend: default_storage_backend(),
			config: empty_table(),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
	#[serde(default = "default_true")]
	pub enabled: bool,
	#[serde(default = "default_api_host")]
	pub host: String,
	#[serde(default = "default_api_port")]
	pub port: u16,
}

impl Default for ApiConfig {
	fn default() -> Self {
		Self {
			enabled: true,
			host: default_api_host(),
			port: default_api_port(),
		}
	}
}

/// A `[[pairs]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairConfig {
	pub base: String,
	pub quote: String,
	#[serde(default = "default_min_sources")]
	pub min_sources: usize,
	#[serde(default)]
	pub channels: Vec<String>,
}

impl PairConfig {
	pub fn key(&self) -> PairKey {
		PairKey::new(&self.base, &self.quote)
	}

	pub fn to_registration(&self) -> PairRegistration {
		PairRegistration::new(
			self.key(),
			self.min_sources,
			self.channels.iter().map(|c| ChannelId::from(c.as_str())).collect(),
		)
	}
}

/// Source names the adapter layer knows how to build.
pub const KNOWN_SOURCES: &[&str] = &["coingecko", "binance", "kraken", "alex"];

fn empty_table() -> toml::Value {
	toml::Value::Table(toml::map::Map::new())
}

fn default_true() -> bool {
	true
}

fn default_name() -> String {
	"oracle-coordinator".to_string()
}

fn default_sources() -> Vec<String> {
	KNOWN_SOURCES.iter().map(|s| s.to_string()).collect()
}

fn default_rate_limit_ms() -> u64 {
	250
}

fn default_max_retries() -> u32 {
	2
}

fn default_backoff_base_ms() -> u64 {
	200
}

fn default_request_timeout_secs() -> u64 {
	5
}

fn default_fetch_timeout_secs() -> u64 {
	10
}

fn default_min_observations() -> usize {
	2
}

fn default_trim_divisor() -> usize {
	5
}

fn default_history_size() -> usize {
	100
}

fn default_deviation_threshold() -> f64 {
	0.05
}

fn default_min_confidence() -> f64 {
	0.7
}

fn default_history_window() -> usize {
	10
}

fn default_min_history() -> usize {
	3
}

fn default_source_deviation_bps() -> u64 {
	500
}

fn default_coordination_interval_secs() -> u64 {
	60
}

fn default_submission_delay_min_secs() -> u64 {
	5
}

fn default_submission_delay_max_secs() -> u64 {
	30
}

fn default_max_price_age_secs() -> u64 {
	60
}

fn default_price_change_threshold() -> f64 {
	0.001
}

fn default_channels_per_submission() -> usize {
	3
}

fn default_stagger_secs() -> u64 {
	5
}

fn default_reliability_step() -> f64 {
	0.1
}

fn default_submission_timeout_secs() -> u64 {
	30
}

fn default_health_interval_secs() -> u64 {
	120
}

fn default_disable_after_failures() -> u32 {
	5
}

fn default_unhealthy_after_failures() -> u32 {
	3
}

fn default_channel_timeout_secs() -> u64 {
	300
}

fn default_price_staleness_secs() -> u64 {
	600
}

fn default_volatility_threshold_bps() -> u64 {
	1000
}

fn default_volatility_window() -> usize {
	10
}

fn default_error_pause_secs() -> u64 {
	10
}

fn default_metrics_interval_secs() -> u64 {
	60
}

fn default_alert_interval_secs() -> u64 {
	30
}

fn default_response_timeout_secs() -> u64 {
	30
}

fn default_max_consecutive_failures() -> u32 {
	3
}

fn default_min_uptime() -> f64 {
	0.95
}

fn default_max_deviation() -> f64 {
	0.02
}

fn default_min_submission_frequency() -> f64 {
	0.5
}

fn default_alert_dedup_secs() -> u64 {
	300
}

fn default_alert_history_size() -> usize {
	1000
}

fn default_delivery_backend() -> String {
	"dry_run".to_string()
}

fn default_storage_backend() -> String {
	"memory".to_string()
}

fn default_api_host() -> String {
	"0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
	8080
}

fn default_min_sources() -> usize {
	1
}
