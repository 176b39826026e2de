//! Rate-limited API gate in front of the crypto market-context MCP server.
//!
//! The core is [`rate_limit::RateLimiter`], a sliding-window limiter over a
//! capacity-bounded store. [`build_rocket`] wires it into the HTTP surface
//! together with the price feed and the realtime stream.

#[macro_use]
extern crate rocket;

pub mod binance;
pub mod bounded_store;
pub mod caller;
pub mod errors;
pub mod models;
pub mod rate_limit;
pub mod realtime;
pub mod routes;
pub mod settings;

use rocket::{Build, Rocket};
use rocket_cors::{AllowedHeaders, AllowedMethods, AllowedOrigins, CorsOptions};

use crate::binance::BinancePriceService;
use crate::caller::{ClientAddressPolicy, TokenVerifier};
use crate::errors::{AppError, AppResult};
use crate::models::ServiceInfo;
use crate::rate_limit::CallerLimits;
use crate::realtime::Broadcaster;
use crate::settings::Settings;

/// Assemble the service. Fails on limiter geometry that cannot work, such as
/// a zero-length window.
pub fn build_rocket(settings: Settings) -> AppResult<Rocket<Build>> {
	let limits = CallerLimits::new(settings.limiter, settings.ip_limit, settings.user_limit)?;
	tracing::info!(
		window_ms = settings.limiter.window_ms,
		max_tracked_keys = settings.limiter.max_tracked_keys,
		ip_limit = settings.ip_limit,
		user_limit = settings.user_limit,
		"rate limits configured"
	);

	let broadcaster = Broadcaster::new();
	let prices = BinancePriceService::from_settings(&settings)?;
	let cors = build_cors()?;
	let info = ServiceInfo { started_at: std::time::Instant::now(), environment: settings.environment.clone() };
	let watcher = prices.clone();
	let watcher_bc = broadcaster.clone();

	Ok(rocket::build()
		.manage(limits)
		.manage(TokenVerifier::new(&settings.jwt_secret))
		.manage(ClientAddressPolicy { trust_forwarded_for: settings.trust_forwarded_for })
		.manage(prices)
		.manage(broadcaster)
		.manage(info)
		.attach(cors)
		.attach(rocket::fairing::AdHoc::on_liftoff("Price watcher", move |_| {
			Box::pin(async move { watcher.spawn_watcher(watcher_bc) })
		}))
		.mount("/api", routes::mount_routes())
		.register("/", routes::catchers()))
}

fn build_cors() -> AppResult<rocket_cors::Cors> {
	let allowed_methods: AllowedMethods = [
		rocket::http::Method::Get,
		rocket::http::Method::Head,
		rocket::http::Method::Options,
	]
	.into_iter()
	.map(From::from)
	.collect();

	CorsOptions {
		allowed_origins: AllowedOrigins::all(),
		allowed_methods,
		allowed_headers: AllowedHeaders::all(),
		allow_credentials: true,
		expose_headers: ["X-RateLimit-Limit", "X-RateLimit-Remaining", "X-RateLimit-Reset", "Retry-After"]
			.iter()
			.map(|h| h.to_string())
			.collect(),
		..Default::default()
	}
	.to_cors()
	.map_err(|e| AppError::Anyhow(anyhow::anyhow!("invalid CORS configuration: {e}")))
}
