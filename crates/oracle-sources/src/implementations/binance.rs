//! Binance spot ticker.

use crate::http::HttpClient;
use crate::symbols::SymbolMap;
use crate::{json_price, observation, SourceError, SourceInterface};
use async_trait::async_trait;
use oracle_types::{Observation, PairKey};
use serde_json::Value;
use std::sync::Arc;

pub const NAME: &str = "binance";
pub const DEFAULT_BASE_URL: &str = "https://api.binance.com";

pub struct BinanceSource {
	client: Arc<HttpClient>,
	symbols: Arc<SymbolMap>,
	base_url: String,
}

impl BinanceSource {
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

	fn ticker(&self, pair: &PairKey) -> String {
		self.symbols
			.symbol(NAME, &pair.base)
			.map(String::from)
			.unwrap_or_else(|| format!("{}{}", pair.base, pair.quote))
	}
}

fn parse_price(body: &Value) -> Result<f64, SourceError> {
	body.get("price")
		.and_then(json_price)
		.ok_or_else(|| SourceError::Malformed("missing price".to_string()))
}

#[async_trait]
impl SourceInterface for BinanceSource {
	fn name(&self) -> &str {
		NAME
	}

	async fn fetch_price(&self, pair: &PairKey) -> Result<Observation, SourceError> {
		let url = format!(
			"{}/api/v3/ticker/price?symbol={}",
			self.base_url,
			self.ticker(pair)
		);
		let body = self.client.get_json(&url).await?;
		observation(NAME, pair, parse_price(&body)?)
	}
}

pub fn create_source(
	client: Arc<HttpClient>,
	symbols: Arc<SymbolMap>,
	base_url: Option<&str>,
) -> Box<dyn SourceInterface> {
	let source = BinanceSource::new(client, symbols);
	match base_url {
		Some(url) => Box::new(source.with_base_url(url)),
		None => Box::new(source),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::serve;
	use axum::{extract::Query, http::StatusCode, routing::get, Json, Router};
	use std::collections::HashMap;
	use std::time::Duration;

	fn source(base: String) -> BinanceSource {
		let client = Arc::new(
			HttpClient::new(
				Duration::ZERO,
				0,
				Duration::from_millis(1),
				Duration::from_secs(2),
			)
			.unwrap(),
		);
		BinanceSource::new(client, Arc::new(SymbolMap::builtin())).with_base_url(base)
	}

	#[test]
	fn test_ticker_fallback() {
		let source = source("http://unused".to_string());
		assert_eq!(source.ticker(&PairKey::new("STX", "USD")), "STXUSDT");
		assert_eq!(source.ticker(&PairKey::new("SOL", "EUR")), "SOLEUR");
	}

	#[tokio::test]
	async fn test_fetch_parses_string_price() {
		let router = Router::new().route(
			"/api/v3/ticker/price",
			get(|Query(q): Query<HashMap<String, String>>| async move {
				match q.get("symbol").map(String::as_str) {
					Some("STXUSDT") => (
						StatusCode::OK,
						Json(serde_json::json!({ "symbol": "STXUSDT", "price": "1.87650000" })),
					),
					_ => (
						StatusCode::BAD_REQUEST,
						Json(serde_json::json!({ "code": -1121, "msg": "Invalid symbol." })),
					),
				}
			}),
		);
		let source = source(serve(router).await);

		let observation = source
			.fetch_price(&PairKey::new("STX", "USD"))
			.await
			.unwrap();
		assert_eq!(observation.price, 187);

		let err = source
			.fetch_price(&PairKey::new("NOPE", "USD"))
			.await
			.unwrap_err();
		assert!(matches!(err, SourceError::Status { status: 400, .. }));
	}
}
