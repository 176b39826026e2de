use rocket::http::Status;
use rocket::request::Request;
use rocket::response::{self, Responder};
use rocket::serde::json::Json;
use rocket::{Catcher, Route, State};
use serde_json::json;

use crate::binance::BinancePriceService;
use crate::caller::Caller;
use crate::errors::{quota_headers, AppResult};
use crate::models::{now_iso, HealthReport, PricesResponse, ServiceInfo};
use crate::rate_limit::{CallerLimits, Quota};

/// Wraps a response with `X-RateLimit-*` headers.
pub struct WithQuota<R> {
	inner: R,
	quota: Quota,
}

impl<'r, 'o: 'r, R: Responder<'r, 'o>> Responder<'r, 'o> for WithQuota<R> {
	fn respond_to(self, req: &'r Request<'_>) -> response::Result<'o> {
		let mut res = self.inner.respond_to(req)?;
		for h in quota_headers(&self.quota) {
			res.set_header(h);
		}
		Ok(res)
	}
}

#[get("/health")]
pub fn health(info: &State<ServiceInfo>) -> Json<HealthReport> {
	Json(HealthReport {
		status: "ok".into(),
		timestamp: now_iso(),
		uptime_secs: info.started_at.elapsed().as_secs(),
		environment: info.environment.clone(),
		version: env!("CARGO_PKG_VERSION").into(),
	})
}

#[head("/health")]
pub fn health_head() -> Status {
	Status::Ok
}

#[get("/crypto-prices")]
pub async fn crypto_prices(prices: &State<BinancePriceService>) -> (Status, Json<PricesResponse>) {
	match prices.latest().await {
		Ok(data) => (Status::Ok, Json(PricesResponse { success: true, error: None, data, timestamp: now_iso() })),
		Err(e) => {
			tracing::warn!(error = %e, "serving fallback prices");
			(
				Status::InternalServerError,
				Json(PricesResponse {
					success: false,
					error: Some("Failed to fetch prices".into()),
					data: BinancePriceService::fallback(),
					timestamp: now_iso(),
				}),
			)
		}
	}
}

/// MCP entry point. The context server itself ships separately; this route
/// already enforces the per-IP and per-user quotas it will sit behind.
#[get("/mcp/context")]
pub fn mcp_context(caller: Caller, limits: &State<CallerLimits>) -> AppResult<WithQuota<(Status, Json<serde_json::Value>)>> {
	let quota = limits.admit(&caller)?;
	tracing::debug!(ip = %caller.ip, user = ?caller.user, remaining = quota.remaining, "mcp request admitted");
	let body = json!({
		"status": "placeholder",
		"message": "MCP server endpoint - under development",
		"info": {
			"description": "This endpoint will be replaced by a separate MCP server",
			"features": [
				"Real-time crypto market data",
				"OAuth-gated access",
				format!("Rate limiting ({}/window per IP, {}/window per user)", limits.ip.limit(), limits.user.limit()),
				"Four data sources: prices, news, on-chain, social",
			],
			"documentation": "See README for MCP server setup instructions",
		},
		"timestamp": now_iso(),
	});
	Ok(WithQuota { inner: (Status::NotImplemented, Json(body)), quota })
}

#[catch(401)]
fn unauthorized() -> Json<serde_json::Value> {
	Json(json!({"error": "unauthorized", "code": 401}))
}

#[catch(404)]
fn not_found() -> Json<serde_json::Value> {
	Json(json!({"error": "not found", "code": 404}))
}

#[catch(500)]
fn internal(req: &Request<'_>) -> Json<serde_json::Value> {
	tracing::error!(uri = %req.uri(), "unhandled server error");
	Json(json!({"error": "internal server error", "code": 500}))
}

pub fn mount_routes() -> Vec<Route> {
	routes![
		health,
		health_head,
		crypto_prices,
		mcp_context,
		// realtime
		crate::realtime::price_stream,
	]
}

pub fn catchers() -> Vec<Catcher> {
	catchers![unauthorized, not_found, internal]
}
