//! Ledger gateway reached over HTTP.
//!
//! The gateway fronts the contract layer and exposes a small REST surface
//! under `/v1/pairs`. Requests carry an optional bearer token.

use crate::{DeliveryError, Ledger, PublishInterface, RegistryInterface};
use async_trait::async_trait;
use oracle_types::{
	ChannelId, ConfigSchema, Field, FieldType, PairKey, PairRegistration, Schema,
	SubmissionReceipt, ValidationError,
};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Serialize)]
struct SubmitRequest<'a> {
	price: u64,
	channel: &'a ChannelId,
}

#[derive(Debug, Serialize)]
struct ChannelRequest<'a> {
	channel: &'a ChannelId,
}

#[derive(Debug, Serialize)]
struct MinSourcesRequest {
	min_sources: usize,
}

#[derive(Debug, Deserialize)]
struct ChannelStatusResponse {
	healthy: bool,
}

pub struct HttpLedger {
	client: reqwest::Client,
	endpoint: String,
	api_key: Option<String>,
}

impl HttpLedger {
	pub fn new(
		endpoint: impl Into<String>,
		api_key: Option<String>,
		timeout: Duration,
	) -> Result<Self, DeliveryError> {
		let client = reqwest::Client::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| DeliveryError::Configuration(e.to_string()))?;

		Ok(Self {
			client,
			endpoint: endpoint.into().trim_end_matches('/').to_string(),
			api_key,
		})
	}

	fn pair_url(&self, pair: &PairKey, suffix: &str) -> String {
		format!(
			"{}/v1/pairs/{}/{}{}",
			self.endpoint, pair.base, pair.quote, suffix
		)
	}

	fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
		match &self.api_key {
			Some(key) => request.bearer_auth(key),
			None => request,
		}
	}

	async fn send(&self, request: RequestBuilder) -> Result<Response, DeliveryError> {
		let response = self
			.authorize(request)
			.send()
			.await
			.map_err(|e| DeliveryError::Network(e.to_string()))?;

		let status = response.status();
		if status.is_success() {
			return Ok(response);
		}

		let body = response.text().await.unwrap_or_default();
		debug!("Ledger gateway answered {}: {}", status, body);
		Err(match status {
			StatusCode::CONFLICT => DeliveryError::AlreadyRegistered(body),
			_ => DeliveryError::Rejected(format!("{}: {}", status, body)),
		})
	}
}

/// Configuration schema for [`HttpLedger`].
pub struct HttpLedgerSchema;

impl ConfigSchema for HttpLedgerSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![
				Field::new("endpoint", FieldType::String).with_validator(|value| {
					match value.as_str() {
						Some(url) if url.starts_with("http://") || url.starts_with("https://") => {
							Ok(())
						}
						_ => Err("endpoint must start with http:// or https://".to_string()),
					}
				}),
			],
			vec![
				Field::new("api_key", FieldType::String),
				Field::new(
					"timeout_secs",
					FieldType::Integer {
						min: Some(1),
						max: Some(300),
					},
				),
			],
		);

		schema.validate(config)
	}
}

#[async_trait]
impl PublishInterface for HttpLedger {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(HttpLedgerSchema)
	}

	async fn submit_price(
		&self,
		pair: &PairKey,
		price: u64,
		channel: &ChannelId,
	) -> Result<SubmissionReceipt, DeliveryError> {
		let request = self
			.client
			.post(self.pair_url(pair, "/prices"))
			.json(&SubmitRequest { price, channel });

		self.send(request)
			.await?
			.json::<SubmissionReceipt>()
			.await
			.map_err(|e| DeliveryError::Network(format!("Invalid receipt: {}", e)))
	}

	async fn check_channel(
		&self,
		pair: &PairKey,
		channel: &ChannelId,
	) -> Result<bool, DeliveryError> {
		let request = self
			.client
			.get(self.pair_url(pair, &format!("/channels/{}/status", channel)));

		let status = self
			.send(request)
			.await?
			.json::<ChannelStatusResponse>()
			.await
			.map_err(|e| DeliveryError::Network(format!("Invalid status: {}", e)))?;
		Ok(status.healthy)
	}

	async fn trigger_circuit_breaker(&self, pair: &PairKey) -> Result<(), DeliveryError> {
		let request = self.client.post(self.pair_url(pair, "/circuit-breaker"));
		self.send(request).await.map(|_| ())
	}
}

#[async_trait]
impl RegistryInterface for HttpLedger {
	async fn list_pairs(&self) -> Result<Vec<PairRegistration>, DeliveryError> {
		let request = self.client.get(format!("{}/v1/pairs", self.endpoint));
		self.send(request)
			.await?
			.json::<Vec<PairRegistration>>()
			.await
			.map_err(|e| DeliveryError::Network(format!("Invalid pair list: {}", e)))
	}

	async fn register_pair(&self, registration: &PairRegistration) -> Result<(), DeliveryError> {
		let request = self
			.client
			.post(format!("{}/v1/pairs", self.endpoint))
			.json(registration);
		self.send(request).await.map(|_| ())
	}

	async fn add_channel(&self, pair: &PairKey, channel: &ChannelId) -> Result<(), DeliveryError> {
		let request = self
			.client
			.post(self.pair_url(pair, "/channels"))
			.json(&ChannelRequest { channel });
		self.send(request).await.map(|_| ())
	}

	async fn remove_channel(
		&self,
		pair: &PairKey,
		channel: &ChannelId,
	) -> Result<(), DeliveryError> {
		let request = self
			.client
			.delete(self.pair_url(pair, &format!("/channels/{}", channel)));
		self.send(request).await.map(|_| ())
	}

	async fn set_min_sources(
		&self,
		pair: &PairKey,
		min_sources: usize,
	) -> Result<(), DeliveryError> {
		let request = self
			.client
			.put(self.pair_url(pair, "/min-sources"))
			.json(&MinSourcesRequest { min_sources });
		self.send(request).await.map(|_| ())
	}
}

/// Factory function to create an HTTP ledger from configuration.
///
/// Configuration parameters:
/// - `endpoint`: gateway base URL (required)
/// - `api_key`: bearer token (optional)
/// - `timeout_secs`: per-request timeout (default: 10)
pub fn create_ledger(config: &toml::Value) -> Result<Ledger, DeliveryError> {
	let endpoint = config
		.get("endpoint")
		.and_then(|v| v.as_str())
		.ok_or_else(|| DeliveryError::Configuration("endpoint is required".to_string()))?;

	let api_key = config
		.get("api_key")
		.and_then(|v| v.as_str())
		.filter(|k| !k.is_empty())
		.map(String::from);

	let timeout_secs = config
		.get("timeout_secs")
		.and_then(|v| v.as_integer())
		.unwrap_or(10)
		.max(1) as u64;

	Ok(Ledger::from_backend(HttpLedger::new(
		endpoint,
		api_key,
		Duration::from_secs(timeout_secs),
	)?))
}

#[cfg(test)]
mod tests {
	use super::*;
	use axum::{
		extract::{Path, State},
		http::{HeaderMap, StatusCode},
		routing::{delete, get, post},
		Json, Router,
	};
	use std::sync::{Arc, Mutex};

	type Calls = Arc<Mutex<Vec<String>>>;

	async fn gateway() -> (String, Calls) {
		let calls: Calls = Arc::new(Mutex::new(Vec::new()));
		let router = Router::new()
			.route(
				"/v1/pairs",
				get(|| async {
					Json(serde_json::json!([
						{ "pair": "STX/USD", "min_sources": 2, "channels": ["SP1", "SP2"] }
					]))
				}),
			)
			.route(
				"/v1/pairs/{base}/{quote}/prices",
				post(
					|State(calls): State<Calls>,
					 headers: HeaderMap,
					 Path((base, quote)): Path<(String, String)>,
					 Json(body): Json<serde_json::Value>| async move {
						let auth = headers
							.get("authorization")
							.and_then(|v| v.to_str().ok())
							.unwrap_or("")
							.to_string();
						calls
							.lock()
							.unwrap()
							.push(format!("{}/{} {} {}", base, quote, body["price"], auth));
						Json(serde_json::json!({ "accepted": true, "tx_ref": "0xabc" }))
					},
				),
			)
			.route(
				"/v1/pairs/{base}/{quote}/channels/{channel}/status",
				get(|Path((_, _, channel)): Path<(String, String, String)>| async move {
					Json(serde_json::json!({ "healthy": channel != "SPDOWN" }))
				}),
			)
			.route(
				"/v1/pairs/{base}/{quote}/channels/{channel}",
				delete(|| async { StatusCode::NOT_FOUND }),
			)
			.with_state(calls.clone());

		let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
		let addr = listener.local_addr().unwrap();
		tokio::spawn(async move {
			axum::serve(listener, router).await.unwrap();
		});
		(format!("http://{}", addr), calls)
	}

	#[tokio::test]
	async fn test_submit_sends_price_and_token() {
		let (base, calls) = gateway().await;
		let ledger =
			HttpLedger::new(base, Some("secret".to_string()), Duration::from_secs(2)).unwrap();

		let receipt = ledger
			.submit_price(&PairKey::new("STX", "USD"), 187, &"SP1".into())
			.await
			.unwrap();
		assert_eq!(receipt.tx_ref, "0xabc");
		assert_eq!(
			calls.lock().unwrap().as_slice(),
			&["STX/USD 187 Bearer secret".to_string()]
		);
	}

	#[tokio::test]
	async fn test_channel_probe_and_errors() {
		let (base, _) = gateway().await;
		let ledger = HttpLedger::new(base, None, Duration::from_secs(2)).unwrap();
		let pair = PairKey::new("STX", "USD");

		assert!(ledger.check_channel(&pair, &"SP1".into()).await.unwrap());
		assert!(!ledger.check_channel(&pair, &"SPDOWN".into()).await.unwrap());
		assert!(matches!(
			ledger.remove_channel(&pair, &"SP1".into()).await,
			Err(DeliveryError::Rejected(_))
		));
	}

	#[tokio::test]
	async fn test_list_pairs() {
		let (base, _) = gateway().await;
		let ledger = HttpLedger::new(base, None, Duration::from_secs(2)).unwrap();
		let pairs = ledger.list_pairs().await.unwrap();
		assert_eq!(pairs.len(), 1);
		assert_eq!(pairs[0].pair, PairKey::new("STX", "USD"));
		assert_eq!(pairs[0].channels.len(), 2);
	}

	#[tokio::test]
	async fn test_unreachable_gateway_is_network_error() {
		let ledger =
			HttpLedger::new("http://127.0.0.1:1", None, Duration::from_millis(500)).unwrap();
		assert!(matches!(
			ledger.trigger_circuit_breaker(&PairKey::new("STX", "USD")).await,
			Err(DeliveryError::Network(_))
		));
	}
}
