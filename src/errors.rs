use rocket::http::{ContentType, Header, Status};
use rocket::request::Request;
use rocket::response::{Responder, Response};
use rocket::serde::json::json;
use std::io::Cursor;
use thiserror::Error;

use crate::rate_limit::{Quota, RateLimitError};

#[derive(Debug, Error)]
pub enum AppError {
	#[error("unauthorized")]
	Unauthorized,
	#[error("too many requests")]
	RateLimited(Quota),
	#[error("upstream error: {0}")]
	Upstream(String),
	#[error(transparent)]
	Config(#[from] RateLimitError),
	#[error(transparent)]
	Anyhow(#[from] anyhow::Error),
}

impl AppError {
	pub fn status(&self) -> Status {
		match self {
			AppError::Unauthorized => Status::Unauthorized,
			AppError::RateLimited(_) => Status::TooManyRequests,
			AppError::Upstream(_) => Status::BadGateway,
			AppError::Config(_) => Status::InternalServerError,
			AppError::Anyhow(_) => Status::InternalServerError,
		}
	}
}

/// Standard quota headers for a rate-limited response.
pub fn quota_headers(quota: &Quota) -> [Header<'static>; 3] {
	[
		Header::new("X-RateLimit-Limit", quota.limit.to_string()),
		Header::new("X-RateLimit-Remaining", quota.remaining.to_string()),
		Header::new("X-RateLimit-Reset", quota.reset_secs.to_string()),
	]
}

impl<'r> Responder<'r, 'static> for AppError {
	fn respond_to(self, _req: &'r Request<'_>) -> Result<Response<'static>, Status> {
		let status = self.status();
		let mut body = json!({
			"error": self.to_string(),
			"code": status.code,
		});
		if let AppError::Config(_) | AppError::Anyhow(_) = &self {
			tracing::error!(error = %self, "request failed");
		}
		let mut res = Response::build();
		res.status(status).header(ContentType::JSON);
		if let AppError::RateLimited(quota) = &self {
			body["retry_after"] = json!(quota.reset_secs);
			for h in quota_headers(quota) {
				res.header(h);
			}
			res.header(Header::new("Retry-After", quota.reset_secs.to_string()));
		}
		let body = body.to_string();
		res.sized_body(body.len(), Cursor::new(body)).ok()
	}
}

pub type AppResult<T> = Result<T, AppError>;
