//! The process-local memory tier: a byte-budget cache of encoded
//! `TilePacket` bytes, refreshed on every successful read.
//!
//! Unlike a cache sized by entry count, tiles vary wildly in size, so this
//! tier is bounded by the *actual* byte footprint of what it holds, backed
//! by [`moka`]'s lock-free concurrent cache. "Refresh on read" (§9 of the
//! design notes this implements) is modeled with a time-to-idle policy
//! rather than a fixed time-to-live: every `get` pushes the entry's expiry
//! back out by the configured TTL, so hot tiles stay resident without a
//! separate LRU touch operation.

use crate::Blob;
use moka::future::Cache;
use std::time::Duration;

/// A TTL-aware, byte-budgeted cache of opaque blobs, keyed by cache key.
#[derive(Clone)]
pub struct MemTier {
	cache: Cache<String, Blob>,
	max_entry_bytes: u64,
}

impl MemTier {
	/// Creates a memory tier that holds at most `max_bytes` of payload
	/// total, rejects any single entry larger than `max_entry_bytes`, and
	/// evicts an entry once it has gone `ttl` without being read or written.
	pub fn new(max_bytes: u64, max_entry_bytes: u64, ttl: Duration) -> Self {
		let cache = Cache::builder()
			.max_capacity(max_bytes)
			.weigher(|_key: &String, value: &Blob| -> u32 { value.len().try_into().unwrap_or(u32::MAX) })
			.time_to_idle(ttl)
			.build();
		Self { cache, max_entry_bytes }
	}

	/// Looks up `key`, resetting its idle-TTL clock on a hit.
	pub async fn get(&self, key: &str) -> Option<Blob> {
		self.cache.get(key).await
	}

	/// Inserts or replaces `key`. Returns `false` without caching anything
	/// if `value` exceeds the configured per-entry size limit.
	pub async fn set(&self, key: &str, value: Blob) -> bool {
		if value.len() > self.max_entry_bytes {
			return false;
		}
		self.cache.insert(key.to_string(), value).await;
		true
	}

	/// Removes `key`. A no-op (not an error) if it wasn't present.
	pub async fn remove(&self, key: &str) {
		self.cache.remove(key).await;
	}

	/// Drops every entry, releasing all held bytes.
	pub fn clear(&self) {
		self.cache.invalidate_all();
	}

	/// Approximate number of entries currently held (moka counters are
	/// eventually consistent with in-flight operations).
	pub fn entry_count(&self) -> u64 {
		self.cache.entry_count()
	}

	/// Approximate total payload bytes currently held.
	pub fn weighted_size(&self) -> u64 {
		self.cache.weighted_size()
	}

	pub fn max_entry_bytes(&self) -> u64 {
		self.max_entry_bytes
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn insert_and_get_roundtrip() {
		let tier = MemTier::new(1024, 1024, Duration::from_secs(60));
		assert!(tier.set("a", Blob::from(&[1u8, 2, 3])).await);
		assert_eq!(tier.get("a").await, Some(Blob::from(&[1u8, 2, 3])));
	}

	#[tokio::test]
	async fn oversized_entry_is_rejected() {
		let tier = MemTier::new(1024, 4, Duration::from_secs(60));
		assert!(!tier.set("a", Blob::from(&[0u8; 5])).await);
		assert_eq!(tier.get("a").await, None);
	}

	#[tokio::test]
	async fn evicts_to_respect_byte_budget() {
		let tier = MemTier::new(10, 10, Duration::from_secs(60));
		assert!(tier.set("a", Blob::from(&[0u8; 6])).await);
		assert!(tier.set("b", Blob::from(&[0u8; 6])).await);
		tier.cache.run_pending_tasks().await;
		// inserting b must evict a to stay within the 10-byte budget
		assert!(tier.get("a").await.is_none());
		assert_eq!(tier.get("b").await, Some(Blob::from(&[0u8; 6])));
	}

	#[tokio::test]
	async fn remove_clears_entry() {
		let tier = MemTier::new(1024, 1024, Duration::from_secs(60));
		tier.set("a", Blob::from(&[0u8; 10])).await;
		tier.remove("a").await;
		assert_eq!(tier.get("a").await, None);
	}

	#[tokio::test]
	async fn clear_drops_everything() {
		let tier = MemTier::new(1024, 1024, Duration::from_secs(60));
		tier.set("a", Blob::from(&[1u8])).await;
		tier.set("b", Blob::from(&[2u8])).await;
		tier.clear();
		tier.cache.run_pending_tasks().await;
		assert_eq!(tier.entry_count(), 0);
	}
}
