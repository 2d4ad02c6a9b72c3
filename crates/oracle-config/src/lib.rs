//! Configuration loading for the oracle coordinator.
//!
//! Files are parsed by extension (TOML, JSON or YAML) after `${VAR}`
//! placeholders have been substituted from the environment. A small set of
//! `ORACLE_*` variables can then override individual settings before the
//! result is validated.

use std::collections::HashSet;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

pub mod types;

pub use types::*;

#[derive(Error, Debug)]
pub enum ConfigError {
	#[error("File not found: {0}")]
	FileNotFound(String),

	#[error("Parse error: {0}")]
	ParseError(String),

	#[error("Validation error: {0}")]
	ValidationError(String),

	#[error("Environment variable not found: {0}")]
	EnvVarNotFound(String),

	#[error("IO error: {0}")]
	IoError(#[from] std::io::Error),
}

/// Supported configuration file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
	Toml,
	Json,
	Yaml,
}

impl ConfigFormat {
	pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
		match path.extension().and_then(|s| s.to_str()) {
			Some("toml") => Ok(Self::Toml),
			Some("json") => Ok(Self::Json),
			Some("yaml") | Some("yml") => Ok(Self::Yaml),
			_ => Err(ConfigError::ParseError(format!(
				"Unsupported config format: {}",
				path.display()
			))),
		}
	}
}

/// Configuration loader with environment variable substitution
pub struct ConfigLoader {
	file_path: Option<String>,
	env_prefix: String,
}

impl Default for ConfigLoader {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigLoader {
	pub fn new() -> Self {
		Self {
			file_path: None,
			env_prefix: "ORACLE_".to_string(),
		}
	}

	pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
		self.file_path = Some(path.as_ref().to_string_lossy().to_string());
		self
	}

	pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.env_prefix = prefix.into();
		self
	}

	pub async fn load(&self) -> Result<OracleConfig, ConfigError> {
		let file_path = self.file_path.as_ref().ok_or_else(|| {
			ConfigError::FileNotFound("No configuration file specified".to_string())
		})?;

		if !Path::new(file_path).exists() {
			return Err(ConfigError::FileNotFound(file_path.clone()));
		}

		info!("Loading configuration from {}", file_path);
		let mut config = self.load_from_file(file_path).await?;

		self.apply_env_overrides(&mut config)?;
		validate_config(&config)?;

		Ok(config)
	}

	async fn load_from_file(&self, file_path: &str) -> Result<OracleConfig, ConfigError> {
		let format = ConfigFormat::from_path(Path::new(file_path))?;
		let content = tokio::fs::read_to_string(file_path).await?;
		let substituted = substitute_env_vars(&content)?;
		parse_config(&substituted, format)
	}

	fn env_var(&self, name: &str) -> Option<String> {
		env::var(format!("{}{}", self.env_prefix, name)).ok()
	}

	fn apply_env_overrides(&self, config: &mut OracleConfig) -> Result<(), ConfigError> {
		if let Some(value) = self.env_var("DRY_RUN") {
			debug!("Overriding dry_run from environment");
			config.oracle.dry_run = parse_bool("DRY_RUN", &value)?;
		}

		if let Some(value) = self.env_var("OFFLINE") {
			debug!("Overriding offline from environment");
			config.oracle.offline = parse_bool("OFFLINE", &value)?;
		}

		if let Some(port) = self.env_var("API_PORT") {
			config.api.port = port
				.parse()
				.map_err(|e| ConfigError::ValidationError(format!("Invalid API port: {}", e)))?;
		}

		if let Some(url) = self.env_var("ALERT_WEBHOOK_URL") {
			debug!("Overriding alert webhook from environment");
			config.health.alert_webhook_url = url;
		}

		if let Some(strategy) = self.env_var("SELECTION_STRATEGY") {
			config.coordination.selection_strategy =
				strategy.parse().map_err(ConfigError::ValidationError)?;
		}

		Ok(())
	}
}

/// Parses configuration text in the given format.
pub fn parse_config(content: &str, format: ConfigFormat) -> Result<OracleConfig, ConfigError> {
	match format {
		ConfigFormat::Toml => {
			toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
		}
		ConfigFormat::Json => {
			serde_json::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
		}
		ConfigFormat::Yaml => {
			serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
		}
	}
}

/// Replaces every `${VAR_NAME}` with the value of the environment variable.
pub fn substitute_env_vars(content: &str) -> Result<String, ConfigError> {
	let re = regex::Regex::new(r"\$\{([^}]+)\}")
		.map_err(|e| ConfigError::ParseError(e.to_string()))?;

	let mut result = content.to_string();
	for cap in re.captures_iter(content) {
		let full_match = &cap[0];
		let var_name = &cap[1];

		let env_value =
			env::var(var_name).map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;

		result = result.replace(full_match, &env_value);
	}

	Ok(result)
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
	match value.trim().to_ascii_lowercase().as_str() {
		"1" | "true" | "yes" | "on" => Ok(true),
		"0" | "false" | "no" | "off" => Ok(false),
		other => Err(ConfigError::ValidationError(format!(
			"Invalid boolean for {}: {}",
			name, other
		))),
	}
}

fn check_fraction(name: &str, value: f64) -> Result<(), ConfigError> {
	if value > 0.0 && value <= 1.0 {
		Ok(())
	} else {
		Err(ConfigError::ValidationError(format!(
			"{} must be in (0, 1], got {}",
			name, value
		)))
	}
}

fn check_nonzero(name: &str, value: u64) -> Result<(), ConfigError> {
	if value == 0 {
		return Err(ConfigError::ValidationError(format!(
			"{} must be greater than zero",
			name
		)));
	}
	Ok(())
}

/// Semantic checks that serde cannot express.
pub fn validate_config(config: &OracleConfig) -> Result<(), ConfigError> {
	if config.pairs.is_empty() {
		return Err(ConfigError::ValidationError(
			"At least one trading pair must be configured".to_string(),
		));
	}

	let mut seen = HashSet::new();
	for pair in &config.pairs {
		let key = pair.key();
		if pair.min_sources == 0 {
			return Err(ConfigError::ValidationError(format!(
				"Pair {} must require at least one source",
				key
			)));
		}
		if !seen.insert(key.clone()) {
			return Err(ConfigError::ValidationError(format!(
				"Pair {} is configured more than once",
				key
			)));
		}
	}

	for source in &config.sources.enabled {
		if !KNOWN_SOURCES.contains(&source.as_str()) {
			return Err(ConfigError::ValidationError(format!(
				"Unknown price source: {}",
				source
			)));
		}
	}

	let coordination = &config.coordination;
	if coordination.submission_delay_min_secs > coordination.submission_delay_max_secs {
		return Err(ConfigError::ValidationError(format!(
			"submission_delay_min_secs ({}) exceeds submission_delay_max_secs ({})",
			coordination.submission_delay_min_secs, coordination.submission_delay_max_secs
		)));
	}
	if coordination.channels_per_submission == 0 {
		return Err(ConfigError::ValidationError(
			"channels_per_submission must be greater than zero".to_string(),
		));
	}

	check_fraction("anomaly.deviation_threshold", config.anomaly.deviation_threshold)?;
	check_fraction("anomaly.min_confidence", config.anomaly.min_confidence)?;
	check_fraction(
		"coordination.price_change_threshold",
		coordination.price_change_threshold,
	)?;
	check_fraction("coordination.reliability_step", coordination.reliability_step)?;
	check_fraction("health.min_uptime", config.health.min_uptime)?;
	check_fraction("health.max_deviation", config.health.max_deviation)?;

	check_nonzero("coordination.interval_secs", coordination.interval_secs)?;
	check_nonzero(
		"orchestration.health_check_interval_secs",
		config.orchestration.health_check_interval_secs,
	)?;
	check_nonzero("health.check_interval_secs", config.health.check_interval_secs)?;
	check_nonzero("health.metrics_interval_secs", config.health.metrics_interval_secs)?;
	check_nonzero("health.alert_interval_secs", config.health.alert_interval_secs)?;
	check_nonzero("health.response_timeout_secs", config.health.response_timeout_secs)?;

	if config.aggregation.min_observations < 2 {
		return Err(ConfigError::ValidationError(
			"aggregation.min_observations must be at least 2".to_string(),
		));
	}
	if config.aggregation.trim_divisor == 0 {
		return Err(ConfigError::ValidationError(
			"aggregation.trim_divisor must be greater than zero".to_string(),
		));
	}

	Ok(())
}
