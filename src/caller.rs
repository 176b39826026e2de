use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use rocket::http::Status;
use rocket::outcome::Outcome;
use rocket::request::{FromRequest, Outcome as RequestOutcome, Request};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// Claims we rely on from the identity provider's access tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
	pub sub: String,
	pub exp: usize,
}

/// Verifies bearer tokens minted by the external identity provider.
pub struct TokenVerifier {
	key: DecodingKey,
	validation: Validation,
}

impl TokenVerifier {
	pub fn new(secret: &str) -> Self {
		let mut validation = Validation::new(Algorithm::HS256);
		validation.validate_exp = true;
		// provider tokens carry an audience we don't pin
		validation.validate_aud = false;
		Self { key: DecodingKey::from_secret(secret.as_bytes()), validation }
	}

	/// Returns the user id (`sub`) of a valid token.
	pub fn verify(&self, token: &str) -> Result<String, AppError> {
		decode::<Claims>(token, &self.key, &self.validation)
			.map(|data| data.claims.sub)
			.map_err(|e| {
				tracing::debug!(error = %e, "rejected bearer token");
				AppError::Unauthorized
			})
	}
}

/// Who is calling: the client address, and the user id when a valid bearer
/// token was presented.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
	pub ip: String,
	pub user: Option<String>,
}

pub const UNKNOWN_IP: &str = "unknown";

/// Where the client address comes from. `X-Forwarded-For` is client
/// controlled unless a proxy we run appends to it, so it is only read when
/// the deployment says so.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientAddressPolicy {
	pub trust_forwarded_for: bool,
}

/// Last hop of an `X-Forwarded-For` chain: the address our own proxy saw.
fn forwarded_for(header: Option<&str>) -> Option<String> {
	header?
		.rsplit(',')
		.next()
		.map(str::trim)
		.filter(|ip| !ip.is_empty())
		.map(str::to_string)
}

fn client_ip(req: &Request<'_>, policy: ClientAddressPolicy) -> String {
	let forwarded = if policy.trust_forwarded_for {
		forwarded_for(req.headers().get_one("X-Forwarded-For"))
	} else {
		None
	};
	forwarded
		.or_else(|| req.remote().map(|addr| addr.ip().to_string()))
		.unwrap_or_else(|| UNKNOWN_IP.to_string())
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Caller {
	type Error = AppError;

	async fn from_request(req: &'r Request<'_>) -> RequestOutcome<Self, Self::Error> {
		let policy = req.rocket().state::<ClientAddressPolicy>().copied().unwrap_or_default();
		let ip = client_ip(req, policy);
		let auth = req.headers().get_one("Authorization");
		let Some(bearer) = auth.and_then(|h| h.strip_prefix("Bearer ")) else {
			return Outcome::Success(Caller { ip, user: None });
		};
		let Some(verifier) = req.rocket().state::<TokenVerifier>() else {
			tracing::error!("token verifier not managed");
			return Outcome::Error((Status::InternalServerError, AppError::Unauthorized));
		};
		match verifier.verify(bearer.trim()) {
			Ok(user) => Outcome::Success(Caller { ip, user: Some(user) }),
			Err(e) => Outcome::Error((Status::Unauthorized, e)),
		}
	}
}
