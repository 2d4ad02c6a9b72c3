//! ALEX AMM token prices.
//!
//! Quotes are always USD; the pair's quote asset is ignored.

use crate::http::HttpClient;
use crate::symbols::SymbolMap;
use crate::{json_price, observation, SourceError, SourceInterface};
use async_trait::async_trait;
use oracle_types::{Observation, PairKey};
use serde_json::Value;
use std::sync::Arc;

pub const NAME: &str = "alex";
pub const DEFAULT_BASE_URL: &str = "https://api.alexlab.co";

pub struct AlexSource {
	client: Arc<HttpClient>,
	symbols: Arc<SymbolMap>,
	base_url: String,
}

impl AlexSource {
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

	fn token(&self, pair: &PairKey) -> String {
		self.symbols
			.symbol(NAME, &pair.base)
			.map(String::from)
			.unwrap_or_else(|| pair.base.to_lowercase())
	}
}

/// `price_usd`, else `price`; zero or negative prices are rejected.
fn parse_price(body: &Value) -> Result<f64, SourceError> {
	let price = body
		.get("price_usd")
		.and_then(json_price)
		.or_else(|| body.get("price").and_then(json_price))
		.ok_or_else(|| SourceError::Malformed("missing price_usd/price".to_string()))?;

	if price <= 0.0 {
		return Err(SourceError::Malformed(format!(
			"non-positive price {}",
			price
		)));
	}
	Ok(price)
}

#[async_trait]
impl SourceInterface for AlexSource {
	fn name(&self) -> &str {
		NAME
	}

	async fn fetch_price(&self, pair: &PairKey) -> Result<Observation, SourceError> {
		let url = format!(
			"{}/v1/amm/tokens/{}/price",
			self.base_url,
			self.token(pair)
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
	let source = AlexSource::new(client, symbols);
	match base_url {
		Some(url) => Box::new(source.with_base_url(url)),
		None => Box::new(source),
	}
}
