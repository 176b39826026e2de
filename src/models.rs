use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub fn now_iso() -> String {
	OffsetDateTime::now_utc().format(&time::format_description::well_known::Rfc3339).unwrap_or_else(|_| "".into())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CryptoPrice {
	pub symbol: String,
	pub price: f64,
	#[serde(rename = "change24h")]
	pub change_24h: f64,
	pub last_update: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricesResponse {
	pub success: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
	pub data: Vec<CryptoPrice>,
	pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
	pub status: String,
	pub timestamp: String,
	#[serde(rename = "uptime")]
	pub uptime_secs: u64,
	pub environment: String,
	pub version: String,
}

/// Static facts about this deployment, managed as Rocket state.
#[derive(Debug, Clone)]
pub struct ServiceInfo {
	pub started_at: std::time::Instant,
	pub environment: String,
}
