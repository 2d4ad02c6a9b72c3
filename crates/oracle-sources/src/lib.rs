//! # Oracle Sources
//!
//! Normalizes heterogeneous external price feeds into [`Observation`]s.
//!
//! ## Key Components
//!
//! - [`SourceInterface`] - One external market-data provider
//! - [`SourceService`] - Concurrent fan-out over every enabled source
//! - [`http::HttpClient`] - Per-host rate limiting and retry with backoff
//! - [`metrics::SourceMetricsRegistry`] - Per-source success/error/latency counters
//! - [`symbols::SymbolMap`] - Asset to provider symbol translation

use async_trait::async_trait;
use futures::future::join_all;
use oracle_config::SourcesConfig;
use oracle_types::{Observation, PairKey};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

pub mod http;
pub mod metrics;
pub mod symbols;

/// Re-export implementations
pub mod implementations {
	pub mod alex;
	pub mod binance;
	pub mod coingecko;
	pub mod kraken;
}

use http::HttpClient;
use metrics::SourceMetricsRegistry;
use symbols::SymbolMap;

/// Errors produced while fetching a price from one source.
#[derive(Debug, Error)]
pub enum SourceError {
	#[error("Network error: {0}")]
	Network(String),
	#[error("Rate limited by {0}")]
	RateLimited(String),
	#[error("Unexpected status {status} from {host}")]
	Status { status: u16, host: String },
	#[error("Malformed payload: {0}")]
	Malformed(String),
	#[error("Timed out after {0:?}")]
	Timeout(Duration),
	#[error("Unknown source: {0}")]
	UnknownSource(String),
}

impl SourceError {
	/// Transport failures, 429 and 5xx responses are worth another attempt.
	pub fn is_retryable(&self) -> bool {
		match self {
			SourceError::Network(_) | SourceError::RateLimited(_) => true,
			SourceError::Status { status, .. } => *status >= 500,
			_ => false,
		}
	}
}

/// A single external market-data provider.
#[async_trait]
pub trait SourceInterface: Send + Sync {
	/// Stable identifier used for deduplication and metrics.
	fn name(&self) -> &str;

	/// Fetches the current price of `pair`.
	async fn fetch_price(&self, pair: &PairKey) -> Result<Observation, SourceError>;
}

/// Reads a price that providers encode either as a JSON number or a string.
pub(crate) fn json_price(value: &serde_json::Value) -> Option<f64> {
	match value {
		serde_json::Value::Number(n) => n.as_f64(),
		serde_json::Value::String(s) => s.trim().parse().ok(),
		_ => None,
	}
}

/// Wraps a decimal price into a fixed-point observation stamped now.
pub(crate) fn observation(
	source: &str,
	pair: &PairKey,
	price: f64,
) -> Result<Observation, SourceError> {
	let units = oracle_types::to_fixed(price)
		.ok_or_else(|| SourceError::Malformed(format!("invalid price {}", price)))?;
	Ok(Observation::new(
		source,
		pair.clone(),
		units,
		oracle_types::current_timestamp(),
	))
}

/// Builds the named source adapter.
pub fn create_source(
	name: &str,
	client: Arc<HttpClient>,
	symbols: Arc<SymbolMap>,
	base_url: Option<&str>,
) -> Result<Box<dyn SourceInterface>, SourceError> {
	match name {
		implementations::coingecko::NAME => Ok(implementations::coingecko::create_source(
			client, symbols, base_url,
		)),
		implementations::binance::NAME => Ok(implementations::binance::create_source(
			client, symbols, base_url,
		)),
		implementations::kraken::NAME => Ok(implementations::kraken::create_source(
			client, symbols, base_url,
		)),
		implementations::alex::NAME => Ok(implementations::alex::create_source(
			client, symbols, base_url,
		)),
		other => Err(SourceError::UnknownSource(other.to_string())),
	}
}

/// Fans a price request out to every configured source.
///
/// A failing or slow source only loses its own contribution; it never fails
/// the whole fetch.
pub struct SourceService {
	sources: Vec<Box<dyn SourceInterface>>,
	metrics: Arc<SourceMetricsRegistry>,
	fetch_timeout: Duration,
	offline: bool,
}

impl SourceService {
	pub fn new(sources: Vec<Box<dyn SourceInterface>>, fetch_timeout: Duration) -> Self {
		Self {
			sources,
			metrics: Arc::new(SourceMetricsRegistry::new()),
			fetch_timeout,
			offline: false,
		}
	}

	/// Skip all network access; [`fetch`](Self::fetch) returns nothing.
	pub fn with_offline(mut self, offline: bool) -> Self {
		self.offline = offline;
		self
	}

	/// Builds the service and its adapters from the `[sources]` section.
	pub fn from_config(config: &SourcesConfig, offline: bool) -> Result<Self, SourceError> {
		let client = Arc::new(HttpClient::new(
			Duration::from_millis(config.rate_limit_ms),
			config.max_retries,
			Duration::from_millis(config.backoff_base_ms),
			Duration::from_secs(config.request_timeout_secs),
		)?);
		let symbols = Arc::new(SymbolMap::builtin().with_overrides(&config.symbols));

		let mut sources = Vec::with_capacity(config.enabled.len());
		for name in &config.enabled {
			let base_url = config.base_urls.get(name).map(|s| s.as_str());
			sources.push(create_source(
				name,
				client.clone(),
				symbols.clone(),
				base_url,
			)?);
		}

		info!(
			"Configured {} price sources (offline: {})",
			sources.len(),
			offline
		);
		Ok(Self::new(sources, Duration::from_secs(config.fetch_timeout_secs)).with_offline(offline))
	}

	pub fn metrics(&self) -> Arc<SourceMetricsRegistry> {
		self.metrics.clone()
	}

	pub fn is_offline(&self) -> bool {
		self.offline
	}

	pub fn source_names(&self) -> Vec<String> {
		self.sources.iter().map(|s| s.name().to_string()).collect()
	}

	/// Fetches `pair` from every configured source.
	pub async fn fetch(&self, pair: &PairKey) -> Vec<Observation> {
		self.fetch_from(pair, None).await
	}

	/// Fetches `pair` from the named subset of sources, or from all of them
	/// when `only` is `None`. At most one observation per source is returned.
	pub async fn fetch_from(&self, pair: &PairKey, only: Option<&[String]>) -> Vec<Observation> {
		if self.offline {
			debug!("Offline mode, skipping fetch for {}", pair);
			return Vec::new();
		}

		let selected = self
			.sources
			.iter()
			.filter(|s| match only {
				Some(names) => names.iter().any(|n| n == s.name()),
				None => true,
			});

		let fetches = selected.map(|source| async move {
			let started = Instant::now();
			let result = match tokio::time::timeout(self.fetch_timeout, source.fetch_price(pair)).await
			{
				Ok(result) => result,
				Err(_) => Err(SourceError::Timeout(self.fetch_timeout)),
			};
			(source.name(), result, started.elapsed().as_millis() as u64)
		});

		let mut seen = HashSet::new();
		let mut observations = Vec::new();
		for (name, result, latency_ms) in join_all(fetches).await {
			match result {
				Ok(observation) => {
					self.metrics.record_success(name, latency_ms);
					if seen.insert(observation.source.clone()) {
						observations.push(observation);
					}
				}
				Err(e) => {
					self.metrics.record_failure(name, &e.to_string());
					warn!("Source {} failed for {}: {}", name, pair, e);
				}
			}
		}

		debug!(
			"Fetched {} observations for {} from {} sources",
			observations.len(),
			pair,
			self.sources.len()
		);
		observations
	}
}

#[cfg(test)]
pub(crate) mod test_support {
	use axum::Router;

	/// Serves `router` on an ephemeral local port and returns its base URL.
	pub async fn serve(router: Router) -> String {
		let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
		let addr = listener.local_addr().unwrap();
		tokio::spawn(async move {
			axum::serve(listener, router).await.unwrap();
		});
		format!("http://{}", addr)
	}
}
