use dashmap::DashMap;
use futures::future::try_join_all;
use serde::Deserialize;
use std::time::{Duration, Instant};

use crate::errors::{AppError, AppResult};
use crate::models::{now_iso, CryptoPrice};
use crate::realtime::Broadcaster;
use crate::settings::Settings;

const QUOTE_ASSET: &str = "USDT";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Ticker24h {
	symbol: String,
	last_price: String,
	price_change_percent: String,
}

impl Ticker24h {
	fn into_price(self) -> AppResult<CryptoPrice> {
		let parse = |field: &str, v: &str| {
			v.parse::<f64>().map_err(|_| AppError::Upstream(format!("{} has non-numeric {field}: {v:?}", self.symbol)))
		};
		Ok(CryptoPrice {
			symbol: self.symbol.strip_suffix(QUOTE_ASSET).unwrap_or(&self.symbol).to_string(),
			price: parse("lastPrice", &self.last_price)?,
			change_24h: parse("priceChangePercent", &self.price_change_percent)?,
			last_update: now_iso(),
		})
	}
}

#[derive(Clone)]
struct PriceCache {
	price: CryptoPrice,
	stored_at: Instant,
}

/// 24h ticker snapshots from Binance, cached per symbol.
#[derive(Clone)]
pub struct BinancePriceService {
	client: reqwest::Client,
	api_url: String,
	symbols: Vec<String>,
	ttl: Duration,
	watch_interval: Duration,
	cache: std::sync::Arc<DashMap<String, PriceCache>>,
}

impl BinancePriceService {
	pub fn from_settings(settings: &Settings) -> AppResult<Self> {
		let client = reqwest::Client::builder()
			.user_agent("context-gate/0.1")
			.timeout(Duration::from_millis(5_000))
			.build()
			.map_err(|e| AppError::Anyhow(e.into()))?;
		Ok(Self {
			client,
			api_url: settings.binance_api_url.clone(),
			symbols: settings.price_symbols.clone(),
			ttl: Duration::from_secs(settings.price_cache_ttl_secs),
			watch_interval: Duration::from_secs(settings.price_watch_interval_secs),
			cache: Default::default(),
		})
	}

	/// Current price for every watched symbol, fetched concurrently. Any
	/// failed symbol fails the whole call.
	pub async fn latest(&self) -> AppResult<Vec<CryptoPrice>> {
		try_join_all(self.symbols.iter().map(|s| self.cached_price(s))).await
	}

	async fn cached_price(&self, symbol: &str) -> AppResult<CryptoPrice> {
		let now = Instant::now();
		if let Some(entry) = self.cache.get(symbol) {
			if now.duration_since(entry.stored_at) < self.ttl {
				return Ok(entry.price.clone());
			}
		}
		let price = self.fetch_ticker(symbol).await?;
		self.cache.insert(symbol.to_string(), PriceCache { price: price.clone(), stored_at: now });
		Ok(price)
	}

	async fn fetch_ticker(&self, symbol: &str) -> AppResult<CryptoPrice> {
		let url = format!("{}/api/v3/ticker/24hr", self.api_url);
		let pair = format!("{symbol}{QUOTE_ASSET}");
		let resp = self.client.get(&url)
			.query(&[("symbol", pair.as_str())])
			.send()
			.await
			.map_err(|e| {
				tracing::warn!(%pair, error = %e, "binance request failed");
				AppError::Upstream(format!("request for {pair} failed"))
			})?;
		if !resp.status().is_success() {
			tracing::warn!(%pair, status = %resp.status(), "binance returned an error");
			return Err(AppError::Upstream(format!("{pair} returned {}", resp.status())));
		}
		let ticker: Ticker24h = resp.json().await.map_err(|e| AppError::Upstream(format!("{pair} body: {e}")))?;
		ticker.into_price()
	}

	/// Prices served when the exchange cannot be reached.
	pub fn fallback() -> Vec<CryptoPrice> {
		let ts = now_iso();
		vec![
			CryptoPrice { symbol: "BTC".into(), price: 42150.25, change_24h: 2.34, last_update: ts.clone() },
			CryptoPrice { symbol: "ETH".into(), price: 2234.89, change_24h: -1.12, last_update: ts },
		]
	}

	/// Poll the exchange and push each snapshot to stream subscribers.
	pub fn spawn_watcher(&self, bc: Broadcaster) {
		if self.watch_interval.is_zero() { return; }
		let this = self.clone();
		tokio::spawn(async move {
			let mut interval = tokio::time::interval(this.watch_interval);
			loop {
				interval.tick().await;
				match this.latest().await {
					Ok(prices) => bc.publish(serde_json::json!({ "type": "price_tick", "prices": prices, "ts": now_iso() })),
					Err(e) => tracing::warn!(error = %e, "price watcher tick failed"),
				}
			}
		});
	}
}
