//! Capacity-bounded key/value store with least-recently-used eviction and a
//! per-entry time-to-live.

use std::collections::{BTreeMap, HashMap};
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

struct Slot<V> {
	value: V,
	stored_at: Instant,
	touched: u64,
}

/// Map from `String` keys to `V`, holding at most `capacity` keys.
///
/// Recency is tracked with a monotonically increasing touch counter; the
/// `recency` index maps each counter value back to its key so the oldest key
/// is always the first entry of the `BTreeMap`. Entries also expire once they
/// were last written more than `ttl` ago, checked lazily on read.
pub struct BoundedStore<V> {
	entries: HashMap<String, Slot<V>>,
	recency: BTreeMap<u64, String>,
	tick: u64,
	capacity: NonZeroUsize,
	ttl: Duration,
}

impl<V> BoundedStore<V> {
	pub fn new(capacity: NonZeroUsize, ttl: Duration) -> Self {
		Self {
			entries: HashMap::with_capacity(capacity.get().min(1024)),
			recency: BTreeMap::new(),
			tick: 0,
			capacity,
			ttl,
		}
	}

	pub fn capacity(&self) -> usize {
		self.capacity.get()
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Look up `key`, counting the hit as a use. Expired entries are removed
	/// and reported as absent.
	pub fn get(&mut self, key: &str, now: Instant) -> Option<&V> {
		let expired = match self.entries.get(key) {
			Some(slot) => now.saturating_duration_since(slot.stored_at) > self.ttl,
			None => return None,
		};
		if expired {
			self.remove(key);
			return None;
		}
		self.touch(key);
		self.entries.get(key).map(|slot| &slot.value)
	}

	/// Read without affecting recency or expiry.
	pub fn peek(&self, key: &str) -> Option<&V> {
		self.entries.get(key).map(|slot| &slot.value)
	}

	/// Store `value` under `key` as the most recently used entry. Returns the
	/// key that was evicted to make room, if any.
	pub fn insert(&mut self, key: String, value: V, now: Instant) -> Option<String> {
		if let Some(slot) = self.entries.get_mut(&key) {
			slot.value = value;
			slot.stored_at = now;
			self.touch(&key);
			return None;
		}

		let evicted = if self.entries.len() >= self.capacity.get() {
			self.evict_oldest()
		} else {
			None
		};

		let touched = self.next_tick();
		self.recency.insert(touched, key.clone());
		self.entries.insert(key, Slot { value, stored_at: now, touched });
		evicted
	}

	pub fn remove(&mut self, key: &str) -> Option<V> {
		let slot = self.entries.remove(key)?;
		self.recency.remove(&slot.touched);
		Some(slot.value)
	}

	fn touch(&mut self, key: &str) {
		let tick = self.next_tick();
		if let Some(slot) = self.entries.get_mut(key) {
			self.recency.remove(&slot.touched);
			slot.touched = tick;
			self.recency.insert(tick, key.to_string());
		}
	}

	fn evict_oldest(&mut self) -> Option<String> {
		let (_, key) = self.recency.pop_first()?;
		self.entries.remove(&key);
		Some(key)
	}

	fn next_tick(&mut self) -> u64 {
		self.tick += 1;
		self.tick
	}
}
