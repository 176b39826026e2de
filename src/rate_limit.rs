//! Sliding-window rate limiting.
//!
//! Every key keeps the instants of its recently allowed actions. A check
//! first drops the instants that fell out of the trailing window, then
//! compares what is left against the limit, so the count always reflects
//! the last `window` of real time rather than a fixed bucket.

use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::bounded_store::BoundedStore;
use crate::caller::Caller;
use crate::errors::{AppError, AppResult};

pub const DEFAULT_WINDOW_MS: u64 = 60 * 60 * 1000;
pub const DEFAULT_MAX_TRACKED_KEYS: usize = 500;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RateLimitError {
	#[error("invalid rate limiter configuration: {0}")]
	InvalidConfiguration(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimiterConfig {
	pub window_ms: u64,
	pub max_tracked_keys: usize,
}

impl Default for RateLimiterConfig {
	fn default() -> Self {
		Self { window_ms: DEFAULT_WINDOW_MS, max_tracked_keys: DEFAULT_MAX_TRACKED_KEYS }
	}
}

/// Outcome of a single [`RateLimiter::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckResult {
	pub allowed: bool,
	/// Quota left in the current window, zero when denied.
	pub remaining: u32,
	/// Seconds until quota next frees up, rounded up.
	pub reset_secs: u64,
}

pub struct RateLimiter {
	window: Duration,
	store: Mutex<BoundedStore<Vec<Instant>>>,
}

impl RateLimiter {
	pub fn new(config: RateLimiterConfig) -> Result<Self, RateLimitError> {
		if config.window_ms == 0 {
			return Err(RateLimitError::InvalidConfiguration("window must be positive"));
		}
		let capacity = NonZeroUsize::new(config.max_tracked_keys)
			.ok_or(RateLimitError::InvalidConfiguration("max tracked keys must be positive"))?;
		let window = Duration::from_millis(config.window_ms);
		Ok(Self { window, store: Mutex::new(BoundedStore::new(capacity, window)) })
	}

	/// Number of keys currently held in memory.
	pub fn tracked_keys(&self) -> usize {
		self.lock().len()
	}

	pub fn check(&self, limit: u32, key: &str) -> CheckResult {
		self.check_at(limit, key, Instant::now())
	}

	/// Same as [`check`](Self::check) with an explicit clock reading.
	///
	/// The store lock is held from the read through the write-back so two
	/// callers on the same key cannot both pass on the same count.
	pub fn check_at(&self, limit: u32, key: &str, now: Instant) -> CheckResult {
		let window = self.window;
		let mut store = self.lock();

		let mut stamps: Vec<Instant> = store
			.get(key, now)
			.map(|seen| {
				seen.iter()
					.copied()
					.filter(|t| now.saturating_duration_since(*t) < window)
					.collect()
			})
			.unwrap_or_default();

		if stamps.len() >= limit as usize {
			// limit == 0 has nothing to roll off; report a full window
			let reset_secs = match stamps.first() {
				Some(oldest) => ceil_secs(window.saturating_sub(now.saturating_duration_since(*oldest))),
				None => ceil_secs(window),
			};
			tracing::debug!(key, limit, reset_secs, "rate limit exceeded");
			return CheckResult { allowed: false, remaining: 0, reset_secs };
		}

		stamps.push(now);
		let used = stamps.len() as u32;
		if let Some(evicted) = store.insert(key.to_string(), stamps, now) {
			tracing::trace!(evicted = %evicted, "rate limiter at capacity, dropped least recent key");
		}

		CheckResult { allowed: true, remaining: limit - used, reset_secs: ceil_secs(window) }
	}

	fn lock(&self) -> std::sync::MutexGuard<'_, BoundedStore<Vec<Instant>>> {
		// a panic mid-check leaves at worst one stale sequence behind
		self.store.lock().unwrap_or_else(PoisonError::into_inner)
	}
}

fn ceil_secs(d: Duration) -> u64 {
	d.as_nanos().div_ceil(1_000_000_000) as u64
}

/// Quota telemetry handed back to HTTP clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
	pub limit: u32,
	pub remaining: u32,
	pub reset_secs: u64,
}

/// A limiter bound to the single limit its call site uses.
pub struct NamedLimiter {
	name: &'static str,
	limit: u32,
	limiter: RateLimiter,
}

impl NamedLimiter {
	pub fn new(name: &'static str, limit: u32, config: RateLimiterConfig) -> Result<Self, RateLimitError> {
		Ok(Self { name, limit, limiter: RateLimiter::new(config)? })
	}

	pub fn limit(&self) -> u32 {
		self.limit
	}

	fn admit(&self, key: &str) -> AppResult<Quota> {
		let res = self.limiter.check(self.limit, key);
		let quota = Quota { limit: self.limit, remaining: res.remaining, reset_secs: res.reset_secs };
		if !res.allowed {
			tracing::info!(limiter = self.name, key, retry_after = res.reset_secs, "request throttled");
			return Err(AppError::RateLimited(quota));
		}
		Ok(quota)
	}
}

/// The process-wide limiters guarding the MCP endpoint: one keyed by
/// caller IP, one keyed by authenticated user id.
pub struct CallerLimits {
	pub ip: NamedLimiter,
	pub user: NamedLimiter,
}

impl CallerLimits {
	pub fn new(config: RateLimiterConfig, ip_limit: u32, user_limit: u32) -> Result<Self, RateLimitError> {
		Ok(Self {
			ip: NamedLimiter::new("ip", ip_limit, config)?,
			user: NamedLimiter::new("user", user_limit, config)?,
		})
	}

	/// Charge the caller against the IP limiter, then the user limiter when
	/// the caller is signed in. Returns the tighter of the two quotas.
	pub fn admit(&self, caller: &Caller) -> AppResult<Quota> {
		let by_ip = self.ip.admit(&caller.ip)?;
		let Some(user) = caller.user.as_deref() else {
			return Ok(by_ip);
		};
		let by_user = self.user.admit(user)?;
		Ok(if by_user.remaining < by_ip.remaining { by_user } else { by_ip })
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn limiter(window_ms: u64, max_tracked_keys: usize) -> RateLimiter {
		RateLimiter::new(RateLimiterConfig { window_ms, max_tracked_keys }).unwrap()
	}

	fn ms(n: u64) -> Duration {
		Duration::from_millis(n)
	}

	#[test]
	fn rejects_zero_window_and_zero_capacity() {
		let err = RateLimiter::new(RateLimiterConfig { window_ms: 0, max_tracked_keys: 10 }).err();
		assert!(matches!(err, Some(RateLimitError::InvalidConfiguration(_))));
		let err = RateLimiter::new(RateLimiterConfig { window_ms: 1_000, max_tracked_keys: 0 }).err();
		assert!(matches!(err, Some(RateLimitError::InvalidConfiguration(_))));
	}

	#[test]
	fn remaining_counts_down_then_denies() {
		let rl = limiter(1_000, 100);
		let t0 = Instant::now();
		let remaining: Vec<u32> = (0..5)
			.map(|i| {
				let r = rl.check_at(5, "k", t0 + ms(i));
				assert!(r.allowed);
				assert_eq!(r.reset_secs, 1);
				r.remaining
			})
			.collect();
		assert_eq!(remaining, vec![4, 3, 2, 1, 0]);

		let denied = rl.check_at(5, "k", t0 + ms(10));
		assert!(!denied.allowed);
		assert_eq!(denied.remaining, 0);
		assert!(denied.reset_secs > 0 && denied.reset_secs <= 1);
	}

	#[test]
	fn keys_are_independent() {
		let rl = limiter(1_000, 100);
		let t0 = Instant::now();
		assert_eq!(rl.check_at(2, "t1", t0).remaining, 1);
		assert_eq!(rl.check_at(2, "t2", t0).remaining, 1);
		let third = rl.check_at(2, "t1", t0);
		assert!(third.allowed);
		assert_eq!(third.remaining, 0);
		assert!(!rl.check_at(2, "t1", t0).allowed);
		// t2 still has its second slot
		assert!(rl.check_at(2, "t2", t0).allowed);
	}

	#[test]
	fn denials_do_not_consume_quota() {
		let rl = limiter(1_000, 100);
		let t0 = Instant::now();
		rl.check_at(2, "k", t0);
		rl.check_at(2, "k", t0 + ms(100));
		for i in 0..20 {
			let r = rl.check_at(2, "k", t0 + ms(200 + i));
			assert!(!r.allowed);
			assert_eq!(r.remaining, 0);
		}
		// first slot frees once t0 leaves the window, despite the denials
		let r = rl.check_at(2, "k", t0 + ms(1_000));
		assert!(r.allowed);
		assert_eq!(r.remaining, 0);
	}

	#[test]
	fn window_slides_instead_of_resetting() {
		let rl = limiter(1_000, 100);
		let t0 = Instant::now();
		assert!(rl.check_at(2, "k", t0).allowed);
		assert!(rl.check_at(2, "k", t0 + ms(900)).allowed);
		// a fixed bucket starting at t0 would reset here and allow a burst
		assert!(rl.check_at(2, "k", t0 + ms(1_000)).allowed);
		assert!(!rl.check_at(2, "k", t0 + ms(1_100)).allowed);
		assert!(rl.check_at(2, "k", t0 + ms(1_900)).allowed);
	}

	#[test]
	fn never_more_than_limit_in_any_window() {
		let rl = limiter(1_000, 100);
		let t0 = Instant::now();
		let mut allowed_at = Vec::new();
		for step in 0..300u64 {
			let at = t0 + ms(step * 17);
			if rl.check_at(4, "k", at).allowed {
				allowed_at.push(step * 17);
			}
		}
		for (i, start) in allowed_at.iter().enumerate() {
			let in_window = allowed_at[i..].iter().take_while(|t| **t < start + 1_000).count();
			assert!(in_window <= 4, "{in_window} allowed within 1s of {start}ms");
		}
	}

	#[test]
	fn reset_reports_time_until_oldest_expires() {
		let rl = limiter(10_000, 100);
		let t0 = Instant::now();
		rl.check_at(1, "k", t0);
		let r = rl.check_at(1, "k", t0 + ms(2_500));
		assert!(!r.allowed);
		assert_eq!(r.reset_secs, 8);
		let r = rl.check_at(1, "k", t0 + ms(9_999));
		assert_eq!(r.reset_secs, 1);
	}

	#[test]
	fn zero_limit_always_denies() {
		let rl = limiter(1_000, 100);
		let r = rl.check(0, "k");
		assert!(!r.allowed);
		assert_eq!(r.remaining, 0);
		assert_eq!(r.reset_secs, 1);
		assert_eq!(rl.tracked_keys(), 0);
	}

	#[test]
	fn capacity_eviction_keeps_answering() {
		let rl = limiter(60_000, 3);
		let t0 = Instant::now();
		for i in 0..10 {
			assert!(rl.check_at(1, &format!("ip-{i}"), t0).allowed);
		}
		assert_eq!(rl.tracked_keys(), 3);
		// the most recent keys are still tracked
		assert!(!rl.check_at(1, "ip-9", t0).allowed);
		// an evicted key starts over with a fresh window
		assert!(rl.check_at(1, "ip-0", t0).allowed);
	}

	#[test]
	fn wall_clock_window_expiry() {
		let rl = limiter(1_000, 100);
		assert!(rl.check(2, "wall").allowed);
		assert!(rl.check(2, "wall").allowed);
		assert!(!rl.check(2, "wall").allowed);
		std::thread::sleep(ms(1_100));
		assert!(rl.check(2, "wall").allowed);
	}

	#[test]
	fn concurrent_callers_never_exceed_limit() {
		let rl = std::sync::Arc::new(limiter(60_000, 10));
		let handles: Vec<_> = (0..8)
			.map(|_| {
				let rl = rl.clone();
				std::thread::spawn(move || (0..50).filter(|_| rl.check(25, "shared").allowed).count())
			})
			.collect();
		let allowed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
		assert_eq!(allowed, 25);
	}

	#[test]
	fn caller_limits_charge_ip_and_user() {
		let limits = CallerLimits::new(RateLimiterConfig { window_ms: 60_000, max_tracked_keys: 10 }, 3, 2).unwrap();
		let anon = Caller { ip: "10.0.0.1".into(), user: None };
		let signed = Caller { ip: "10.0.0.2".into(), user: Some("user-1".into()) };

		let q = limits.admit(&anon).unwrap();
		assert_eq!(q, Quota { limit: 3, remaining: 2, reset_secs: 60 });

		let q = limits.admit(&signed).unwrap();
		assert_eq!(q.limit, 2);
		assert_eq!(q.remaining, 1);
		limits.admit(&signed).unwrap();
		match limits.admit(&signed) {
			Err(AppError::RateLimited(q)) => {
				assert_eq!(q.limit, 2);
				assert_eq!(q.remaining, 0);
			}
			other => panic!("expected user throttle, got {other:?}"),
		}

		// same user from another address is still throttled by user id
		let moved = Caller { ip: "10.0.0.3".into(), user: Some("user-1".into()) };
		assert!(limits.admit(&moved).is_err());
	}
}
