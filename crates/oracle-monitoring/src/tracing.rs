use std::str::FromStr;
use tracing::info;
use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
	#[default]
	Pretty,
	Json,
}

impl FromStr for LogFormat {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"pretty" | "text" => Ok(Self::Pretty),
			"json" => Ok(Self::Json),
			other => Err(format!("Unknown log format: {}", other)),
		}
	}
}

/// Subscriber settings. Presets exist for local debugging and production.
#[derive(Debug, Clone)]
pub struct TracingConfig {
	/// Default filter directive; `RUST_LOG` takes precedence when set.
	pub level: String,
	pub format: LogFormat,
	pub with_thread_ids: bool,
	pub with_file_and_line: bool,
	pub with_target: bool,
	pub with_span_events: FmtSpan,
}

impl Default for TracingConfig {
	fn default() -> Self {
		Self {
			level: "info".to_string(),
			format: LogFormat::Pretty,
			with_thread_ids: false,
			with_file_and_line: false,
			with_target: true,
			with_span_events: FmtSpan::NONE,
		}
	}
}

impl TracingConfig {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_level(mut self, level: impl Into<String>) -> Self {
		self.level = level.into();
		self
	}

	pub fn with_format(mut self, format: LogFormat) -> Self {
		self.format = format;
		self
	}

	pub fn debug() -> Self {
		Self {
			level: "debug".to_string(),
			with_thread_ids: true,
			with_file_and_line: true,
			with_span_events: FmtSpan::CLOSE,
			..Self::default()
		}
	}

	pub fn production() -> Self {
		Self {
			format: LogFormat::Json,
			with_target: false,
			..Self::default()
		}
	}

	fn filter(&self) -> Result<EnvFilter, String> {
		match EnvFilter::try_from_default_env() {
			Ok(filter) => Ok(filter),
			Err(_) => EnvFilter::try_new(&self.level)
				.map_err(|e| format!("Invalid log level '{}': {}", self.level, e)),
		}
	}
}

/// Installs the global subscriber. Fails if one is already installed.
pub fn init_tracing(config: TracingConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
	let builder = tracing_subscriber::fmt()
		.with_env_filter(config.filter()?)
		.with_span_events(config.with_span_events.clone())
		.with_thread_ids(config.with_thread_ids)
		.with_file(config.with_file_and_line)
		.with_line_number(config.with_file_and_line)
		.with_target(config.with_target);

	match config.format {
		LogFormat::Json => builder.json().try_init()?,
		LogFormat::Pretty => builder.try_init()?,
	}

	info!(format = ?config.format, "Logging to stdout with filter {}", config.level);
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_log_format_parsing() {
		assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
		assert_eq!("Pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
		assert!("xml".parse::<LogFormat>().is_err());
	}

	#[test]
	fn test_presets() {
		assert_eq!(TracingConfig::production().format, LogFormat::Json);
		assert_eq!(TracingConfig::debug().level, "debug");
		assert_eq!(
			TracingConfig::new().with_level("oracle_core=trace").level,
			"oracle_core=trace"
		);
	}
}
