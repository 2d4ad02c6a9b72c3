//! Shared HTTP client for source adapters.
//!
//! Every request first reserves a slot on its host's schedule so that calls
//! to one provider are spaced at least `rate_limit` apart, no matter how many
//! pairs are being fetched concurrently. Retryable failures (transport
//! errors, 429 and 5xx) are retried with exponential backoff up to
//! `max_retries` times after the first attempt.

use crate::SourceError;
use backoff::{backoff::Backoff, ExponentialBackoff};
use dashmap::DashMap;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub struct HttpClient {
	client: reqwest::Client,
	rate_limit: Duration,
	max_retries: u32,
	backoff_base: Duration,
	/// Earliest instant the next request to each host may start.
	next_slot: DashMap<String, Instant>,
}

impl HttpClient {
	pub fn new(
		rate_limit: Duration,
		max_retries: u32,
		backoff_base: Duration,
		request_timeout: Duration,
	) -> Result<Self, SourceError> {
		let client = reqwest::Client::builder()
			.timeout(request_timeout)
			.user_agent(concat!("oracle-coordinator/", env!("CARGO_PKG_VERSION")))
			.build()
			.map_err(|e| SourceError::Network(e.to_string()))?;

		Ok(Self {
			client,
			rate_limit,
			max_retries,
			backoff_base,
			next_slot: DashMap::new(),
		})
	}

	fn backoff(&self) -> ExponentialBackoff {
		ExponentialBackoff {
			current_interval: self.backoff_base,
			initial_interval: self.backoff_base,
			randomization_factor: 0.0,
			multiplier: 2.0,
			max_interval: Duration::from_secs(60),
			max_elapsed_time: None,
			..Default::default()
		}
	}

	/// Waits until `host` may be called again and books the following slot.
	async fn throttle(&self, host: &str) {
		let wait = {
			let now = Instant::now();
			let mut slot = self.next_slot.entry(host.to_string()).or_insert(now);
			let start = (*slot).max(now);
			*slot = start + self.rate_limit;
			start.saturating_duration_since(now)
		};

		if !wait.is_zero() {
			debug!("Throttling request to {} for {:?}", host, wait);
			tokio::time::sleep(wait).await;
		}
	}

	/// GETs `url` and parses the body as JSON.
	pub async fn get_json(&self, url: &str) -> Result<Value, SourceError> {
		let host = host_key(url);
		let mut backoff = self.backoff();
		let mut retries = 0;

		loop {
			self.throttle(&host).await;

			match self.get_once(url, &host).await {
				Ok(value) => return Ok(value),
				Err(e) if e.is_retryable() && retries < self.max_retries => {
					retries += 1;
					let delay = backoff.next_backoff().unwrap_or(self.backoff_base);
					warn!(
						"Request to {} failed, retry {}/{} in {:?}: {}",
						host, retries, self.max_retries, delay, e
					);
					tokio::time::sleep(delay).await;
				}
				Err(e) => return Err(e),
			}
		}
	}

	async fn get_once(&self, url: &str, host: &str) -> Result<Value, SourceError> {
		let response = self
			.client
			.get(url)
			.send()
			.await
			.map_err(|e| SourceError::Network(e.to_string()))?;

		let status = response.status();
		if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
			return Err(SourceError::RateLimited(host.to_string()));
		}
		if !status.is_success() {
			return Err(SourceError::Status {
				status: status.as_u16(),
				host: host.to_string(),
			});
		}

		response
			.json::<Value>()
			.await
			.map_err(|e| SourceError::Malformed(e.to_string()))
	}
}

/// `host[:port]` of a URL, used as the rate-limit bucket.
fn host_key(url: &str) -> String {
	match reqwest::Url::parse(url) {
		Ok(parsed) => match (parsed.host_str(), parsed.port()) {
			(Some(host), Some(port)) => format!("{}:{}", host, port),
			(Some(host), None) => host.to_string(),
			_ => url.to_string(),
		},
		Err(_) => url.to_string(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::serve;
	use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
	use std::sync::atomic::{AtomicUsize, Ordering};
	use std::sync::Arc;

	fn client(rate_limit_ms: u64, max_retries: u32) -> HttpClient {
		HttpClient::new(
			Duration::from_millis(rate_limit_ms),
			max_retries,
			Duration::from_millis(5),
			Duration::from_secs(2),
		)
		.unwrap()
	}

	/// Answers 429 for the first `limited` calls, then a price.
	async fn flaky_server(limited: usize) -> (String, Arc<AtomicUsize>) {
		let calls = Arc::new(AtomicUsize::new(0));
		let router = Router::new()
			.route(
				"/price",
				get(
					|State((calls, limited)): State<(Arc<AtomicUsize>, usize)>| async move {
						let n = calls.fetch_add(1, Ordering::SeqCst);
						if n < limited {
							(StatusCode::TOO_MANY_REQUESTS, Json(serde_json::json!({})))
						} else {
							(StatusCode::OK, Json(serde_json::json!({ "price": "1.25" })))
						}
					},
				),
			)
			.with_state((calls.clone(), limited));
		(serve(router).await, calls)
	}

	#[tokio::test]
	async fn test_rate_limited_responses_are_retried() {
		let (base, calls) = flaky_server(2).await;
		let body = client(0, 2)
			.get_json(&format!("{}/price", base))
			.await
			.unwrap();
		assert_eq!(body["price"], "1.25");
		assert_eq!(calls.load(Ordering::SeqCst), 3);
	}

	#[tokio::test]
	async fn test_retry_budget_is_bounded() {
		let (base, calls) = flaky_server(usize::MAX).await;
		let result = client(0, 2).get_json(&format!("{}/price", base)).await;
		assert!(matches!(result, Err(SourceError::RateLimited(_))));
		assert_eq!(calls.load(Ordering::SeqCst), 3);
	}

	#[tokio::test]
	async fn test_client_errors_fail_fast() {
		let calls = Arc::new(AtomicUsize::new(0));
		let router = Router::new()
			.route(
				"/missing",
				get(|State(calls): State<Arc<AtomicUsize>>| async move {
					calls.fetch_add(1, Ordering::SeqCst);
					StatusCode::NOT_FOUND
				}),
			)
			.with_state(calls.clone());
		let base = serve(router).await;

		let result = client(0, 2).get_json(&format!("{}/missing", base)).await;
		assert!(matches!(
			result,
			Err(SourceError::Status { status: 404, .. })
		));
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn test_malformed_body_is_not_retried() {
		let router = Router::new().route("/text", get(|| async { "not json" }));
		let base = serve(router).await;
		let result = client(0, 2).get_json(&format!("{}/text", base)).await;
		assert!(matches!(result, Err(SourceError::Malformed(_))));
	}

	#[tokio::test]
	async fn test_requests_to_one_host_are_spaced() {
		let (base, _) = flaky_server(0).await;
		let client = client(100, 0);
		let url = format!("{}/price", base);

		let started = Instant::now();
		let (a, b) = tokio::join!(client.get_json(&url), client.get_json(&url));
		assert!(a.is_ok() && b.is_ok());
		assert!(started.elapsed() >= Duration::from_millis(100));
	}

	#[test]
	fn test_host_key_includes_port() {
		assert_eq!(host_key("https://api.kraken.com/0/public"), "api.kraken.com");
		assert_eq!(host_key("http://127.0.0.1:8123/x"), "127.0.0.1:8123");
	}
}
