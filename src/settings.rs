use crate::rate_limit::{RateLimiterConfig, DEFAULT_MAX_TRACKED_KEYS, DEFAULT_WINDOW_MS};

/// Runtime configuration, read from the environment (after `.env` and
/// Shuttle secrets have been folded in).
#[derive(Debug, Clone)]
pub struct Settings {
	pub limiter: RateLimiterConfig,
	pub ip_limit: u32,
	pub user_limit: u32,
	pub jwt_secret: String,
	pub binance_api_url: String,
	pub price_symbols: Vec<String>,
	pub price_cache_ttl_secs: u64,
	/// Zero disables the background price watcher.
	pub price_watch_interval_secs: u64,
	pub environment: String,
	/// Key the IP limiter on the last `X-Forwarded-For` hop. Only safe
	/// behind a proxy that appends the peer address.
	pub trust_forwarded_for: bool,
}

/// Keys copied from the Shuttle secret store into the process environment.
pub const SECRET_KEYS: &[&str] = &[
	"JWT_SECRET",
	"RATE_LIMIT_WINDOW_MS",
	"RATE_LIMIT_MAX_TRACKED_KEYS",
	"MCP_IP_LIMIT_PER_WINDOW",
	"MCP_USER_LIMIT_PER_WINDOW",
	"BINANCE_API_URL",
	"PRICE_SYMBOLS",
	"PRICE_CACHE_TTL_SECS",
	"PRICE_WATCH_INTERVAL_SECS",
	"APP_ENV",
	"TRUST_FORWARDED_FOR",
];

impl Default for Settings {
	fn default() -> Self {
		Self {
			limiter: RateLimiterConfig::default(),
			ip_limit: 30,
			user_limit: 15,
			jwt_secret: "dev-secret".into(),
			binance_api_url: "https://api.binance.com".into(),
			price_symbols: vec!["BTC".into(), "ETH".into()],
			price_cache_ttl_secs: 60,
			price_watch_interval_secs: 0,
			environment: "development".into(),
			trust_forwarded_for: false,
		}
	}
}

impl Settings {
	pub fn from_env() -> Self {
		Self::from_lookup(|key| std::env::var(key).ok())
	}

	pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
		let d = Self::default();
		let num = |key: &str| get(key).and_then(|v| v.trim().parse::<u64>().ok());
		Self {
			limiter: RateLimiterConfig {
				window_ms: num("RATE_LIMIT_WINDOW_MS").unwrap_or(DEFAULT_WINDOW_MS),
				max_tracked_keys: num("RATE_LIMIT_MAX_TRACKED_KEYS").map(|v| v as usize).unwrap_or(DEFAULT_MAX_TRACKED_KEYS),
			},
			ip_limit: get("MCP_IP_LIMIT_PER_WINDOW").and_then(|v| v.trim().parse().ok()).unwrap_or(d.ip_limit),
			user_limit: get("MCP_USER_LIMIT_PER_WINDOW").and_then(|v| v.trim().parse().ok()).unwrap_or(d.user_limit),
			jwt_secret: get("JWT_SECRET").filter(|s| !s.is_empty()).unwrap_or(d.jwt_secret),
			binance_api_url: get("BINANCE_API_URL")
				.map(|s| s.trim().trim_end_matches('/').to_string())
				.filter(|s| !s.is_empty())
				.unwrap_or(d.binance_api_url),
			price_symbols: get("PRICE_SYMBOLS")
				.map(|s| s.split(',').map(|x| x.trim().to_uppercase()).filter(|x| !x.is_empty()).collect::<Vec<_>>())
				.filter(|v| !v.is_empty())
				.unwrap_or(d.price_symbols),
			price_cache_ttl_secs: num("PRICE_CACHE_TTL_SECS").unwrap_or(d.price_cache_ttl_secs),
			price_watch_interval_secs: num("PRICE_WATCH_INTERVAL_SECS").unwrap_or(d.price_watch_interval_secs),
			environment: get("APP_ENV").unwrap_or(d.environment),
			trust_forwarded_for: get("TRUST_FORWARDED_FOR")
				.map(|v| v.trim() == "1" || v.trim().eq_ignore_ascii_case("true"))
				.unwrap_or(d.trust_forwarded_for),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashMap;

	fn from(pairs: &[(&str, &str)]) -> Settings {
		let env: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
		Settings::from_lookup(|k| env.get(k).cloned())
	}

	#[test]
	fn defaults_match_hourly_policy() {
		let s = from(&[]);
		assert_eq!(s.limiter.window_ms, 3_600_000);
		assert_eq!(s.limiter.max_tracked_keys, 500);
		assert_eq!(s.ip_limit, 30);
		assert_eq!(s.user_limit, 15);
		assert_eq!(s.price_symbols, vec!["BTC", "ETH"]);
		assert!(!s.trust_forwarded_for);
	}

	#[test]
	fn forwarded_for_trust_is_opt_in() {
		assert!(from(&[("TRUST_FORWARDED_FOR", "true")]).trust_forwarded_for);
		assert!(from(&[("TRUST_FORWARDED_FOR", "1")]).trust_forwarded_for);
		assert!(!from(&[("TRUST_FORWARDED_FOR", "yes please")]).trust_forwarded_for);
	}

	#[test]
	fn reads_overrides_and_ignores_garbage() {
		let s = from(&[
			("RATE_LIMIT_WINDOW_MS", "1000"),
			("MCP_IP_LIMIT_PER_WINDOW", "lots"),
			("MCP_USER_LIMIT_PER_WINDOW", " 4 "),
			("PRICE_SYMBOLS", "sol, btc,,"),
			("BINANCE_API_URL", "http://localhost:9/"),
		]);
		assert_eq!(s.limiter.window_ms, 1_000);
		assert_eq!(s.ip_limit, 30);
		assert_eq!(s.user_limit, 4);
		assert_eq!(s.price_symbols, vec!["SOL", "BTC"]);
		assert_eq!(s.binance_api_url, "http://localhost:9");
	}
}
