//! CoinGecko simple price endpoint.

use crate::http::HttpClient;
use crate::symbols::SymbolMap;
use crate::{json_price, observation, SourceError, SourceInterface};
use async_trait::async_trait;
use oracle_types::{Observation, PairKey};
use serde_json::Value;
use std::sync::Arc;

pub const NAME: &str = "coingecko";
pub const DEFAULT_BASE_URL: &str = "https://api.coingecko.com";

pub struct CoinGeckoSource {
	client: Arc<HttpClient>,
	symbols: Arc<SymbolMap>,
	base_url: String,
}

impl CoinGeckoSource {
	pub fn new(client: Arc<HttpClient>, symbols: Arc<SymbolMap>) -> Self {
		Self {
			client,
			symbols,
			base_url: DEFAULT_BASE_URL.to_string(),
		}
	}

	pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
		self.base_url = base_url.into().trim_end_matches('/').to_string();
		self
	}

	fn id(&self, asset: &str) -> String {
		self.symbols
			.symbol(NAME, asset)
			.map(String::from)
			.unwrap_or_else(|| asset.to_lowercase())
	}
}

/// Extracts `body[id][vs]`.
fn parse_price(body: &Value, id: &str, vs: &str) -> Result<f64, SourceError> {
	body.get(id)
		.and_then(|prices| prices.get(vs))
		.and_then(json_price)
		.ok_or_else(|| SourceError::Malformed(format!("missing {}.{}", id, vs)))
}

#[async_trait]
impl SourceInterface for CoinGeckoSource {
	fn name(&self) -> &str {
		NAME
	}

	async fn fetch_price(&self, pair: &PairKey) -> Result<Observation, SourceError> {
		let id = self.id(&pair.base);
		let vs = self.id(&pair.quote);
		let url = format!(
			"{}/api/v3/simple/price?ids={}&vs_currencies={}",
			self.base_url, id, vs
		);

		let body = self.client.get_json(&url).await?;
		observation(NAME, pair, parse_price(&body, &id, &vs)?)
	}
}

pub fn create_source(
	client: Arc<HttpClient>,
	symbols: Arc<SymbolMap>,
	base_url: Option<&str>,
) -> Box<dyn SourceInterface> {
	let source = CoinGeckoSource::new(client, symbols);
	match base_url {
		Some(url) => Box::new(source.with_base_url(url)),
		None => Box::new(source),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::serve;
	use axum::{extract::Query, routing::get, Json, Router};
	use std::collections::HashMap;
	use std::time::Duration;

	#[test]
	fn test_parse_price() {
		let body = serde_json::json!({ "stacks": { "usd": 1.87 } });
		assert_eq!(parse_price(&body, "stacks", "usd").unwrap(), 1.87);
		assert!(parse_price(&body, "stacks", "eur").is_err());
		assert!(parse_price(&serde_json::json!({}), "stacks", "usd").is_err());
	}

	#[tokio::test]
	async fn test_fetch_uses_mapped_ids() {
		let router = Router::new().route(
			"/api/v3/simple/price",
			get(|Query(q): Query<HashMap<String, String>>| async move {
				let mapped = q.get("ids").map(String::as_str) == Some("bitcoin")
					&& q.get("vs_currencies").map(String::as_str) == Some("usd");
				if mapped {
					Json(serde_json::json!({ "bitcoin": { "usd": 64123.456 } }))
				} else {
					Json(serde_json::json!({}))
				}
			}),
		);
		let base = serve(router).await;
		let client = Arc::new(
			HttpClient::new(
				Duration::ZERO,
				0,
				Duration::from_millis(1),
				Duration::from_secs(2),
			)
			.unwrap(),
		);
		let source =
			CoinGeckoSource::new(client, Arc::new(SymbolMap::builtin())).with_base_url(base);

		let observation = source
			.fetch_price(&PairKey::new("BTC", "USD"))
			.await
			.unwrap();
		assert_eq!(observation.source, NAME);
		assert_eq!(observation.price, 6412345);
	}
}
