//! Kraken public ticker.

use crate::http::HttpClient;
use crate::symbols::SymbolMap;
use crate::{json_price, observation, SourceError, SourceInterface};
use async_trait::async_trait;
use oracle_types::{Observation, PairKey};
use serde_json::Value;
use std::sync::Arc;

pub const NAME: &str = "kraken";
pub const DEFAULT_BASE_URL: &str = "https://api.kraken.com";

pub struct KrakenSource {
	client: Arc<HttpClient>,
	symbols: Arc<SymbolMap>,
	base_url: String,
}

impl KrakenSource {
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

/// Reads the last trade price `result.<pair>.c[0]` of the first result entry.
fn parse_price(body: &Value) -> Result<f64, SourceError> {
	if let Some(errors) = body.get("error").and_then(Value::as_array) {
		if !errors.is_empty() {
			return Err(SourceError::Malformed(format!("kraken error: {:?}", errors)));
		}
	}

	body.get("result")
		.and_then(Value::as_object)
		.and_then(|result| result.values().next())
		.and_then(|ticker| ticker.get("c"))
		.and_then(|last| last.get(0))
		.and_then(json_price)
		.ok_or_else(|| SourceError::Malformed("missing result.c[0]".to_string()))
}

#[async_trait]
impl SourceInterface for KrakenSource {
	fn name(&self) -> &str {
		NAME
	}

	async fn fetch_price(&self, pair: &PairKey) -> Result<Observation, SourceError> {
		let url = format!("{}/0/public/Ticker?pair={}", self.base_url, self.ticker(pair));
		let body = self.client.get_json(&url).await?;
		observation(NAME, pair, parse_price(&body)?)
	}
}

pub fn create_source(
	client: Arc<HttpClient>,
	symbols: Arc<SymbolMap>,
	base_url: Option<&str>,
) -> Box<dyn SourceInterface> {
	let source = KrakenSource::new(client, symbols);
	match base_url {
		Some(url) => Box::new(source.with_base_url(url)),
		None => Box::new(source),
	}
}
