//! Asset to provider symbol translation.
//!
//! Each provider names assets differently (`bitcoin`, `BTCUSDT`, `XXBTZUSD`,
//! `wbtc`). Unknown assets fall back to a per-provider convention applied by
//! the adapters themselves.

use std::collections::HashMap;

const BUILTIN: &[(&str, &[(&str, &str)])] = &[
	(
		"BTC",
		&[
			("coingecko", "bitcoin"),
			("binance", "BTCUSDT"),
			("kraken", "XXBTZUSD"),
			("alex", "wbtc"),
		],
	),
	(
		"ETH",
		&[
			("coingecko", "ethereum"),
			("binance", "ETHUSDT"),
			("kraken", "XETHZUSD"),
		],
	),
	("USD", &[("coingecko", "usd")]),
	("USDT", &[("coingecko", "tether"), ("binance", "USDTUSDT")]),
	("USDC", &[("coingecko", "usd-coin"), ("binance", "USDCUSDT")]),
	(
		"STX",
		&[
			("coingecko", "stacks"),
			("binance", "STXUSDT"),
			("kraken", "STXUSD"),
			("alex", "stx"),
		],
	),
	("ALEX", &[("coingecko", "alex-lab"), ("alex", "alex")]),
	("DIKO", &[("coingecko", "arkadiko"), ("alex", "diko")]),
];

/// Tokens only listed on the ALEX AMM, addressed by their lower-case ticker.
const ALEX_ONLY: &[&str] = &[
	"USDA",
	"XUSD",
	"XBTC",
	"WMNO",
	"BANANA",
	"WELSH",
	"RYDER",
	"CHA",
	"LEO",
	"ROO",
	"NYCC",
	"SLIME",
	"CORGI",
	"PEPE",
	"SHIB",
	"ORDI",
	"AUTO",
	"FLOW",
	"CITY",
	"MIA",
	"NYC",
	"BNS",
	"CRASHPUNKS",
	"MEGAPONT",
	"NOTHING",
];

#[derive(Debug, Clone, Default)]
pub struct SymbolMap {
	/// asset -> source -> symbol
	entries: HashMap<String, HashMap<String, String>>,
}

impl SymbolMap {
	pub fn empty() -> Self {
		Self::default()
	}

	/// The table shipped with the coordinator.
	pub fn builtin() -> Self {
		let mut map = Self::empty();
		for (asset, symbols) in BUILTIN {
			for (source, symbol) in *symbols {
				map.insert(asset, source, symbol);
			}
		}
		for asset in ALEX_ONLY {
			map.insert(asset, "alex", &asset.to_lowercase());
		}
		map
	}

	/// Applies `asset -> source -> symbol` overrides from configuration.
	pub fn with_overrides(mut self, overrides: &HashMap<String, HashMap<String, String>>) -> Self {
		for (asset, symbols) in overrides {
			for (source, symbol) in symbols {
				self.insert(asset, source, symbol);
			}
		}
		self
	}

	pub fn insert(&mut self, asset: &str, source: &str, symbol: &str) {
		self.entries
			.entry(asset.to_uppercase())
			.or_default()
			.insert(source.to_string(), symbol.to_string());
	}

	pub fn symbol(&self, source: &str, asset: &str) -> Option<&str> {
		self.entries
			.get(&asset.to_uppercase())
			.and_then(|s| s.get(source))
			.map(String::as_str)
	}

	/// Assets that have a symbol for `source`.
	pub fn assets_for(&self, source: &str) -> Vec<String> {
		let mut assets: Vec<String> = self
			.entries
			.iter()
			.filter(|(_, s)| s.contains_key(source))
			.map(|(a, _)| a.clone())
			.collect();
		assets.sort();
		assets
	}
}
