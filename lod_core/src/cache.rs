//! The two-tier tile cache: a process-local memory tier in front of an
//! optional shared remote tier, both holding encoded [`TilePacket`] bytes.
//!
//! See [`TileCache::fetch`] for the lookup contract (promotion, TTL
//! extension, corruption handling) and [`TileCache::set`] for how writes
//! fan out to each tier.

use crate::mem_cache::MemTier;
use crate::packet::TilePacket;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// A shared-storage tier behind the memory tier — typically Redis. Only a
/// TTL is enforced here; byte-budget and eviction are the memory tier's job.
#[async_trait]
pub trait RemoteTier: Send + Sync {
	/// Atomically fetches `key` and refreshes its TTL (to the tier's
	/// configured duration, or makes it persistent if that duration is
	/// zero). Returns `Ok(None)` on a clean miss.
	async fn get_extend(&self, key: &str) -> Result<Option<crate::Blob>>;

	/// Writes `value` under `key` with the tier's configured TTL (no
	/// expiry if zero).
	async fn set(&self, key: &str, value: &crate::Blob) -> Result<()>;

	/// Deletes `key`. Not an error if it wasn't present.
	async fn delete(&self, key: &str) -> Result<()>;

	/// Drops every key this tier is responsible for. Used only by tests
	/// and by admin flush tooling that chooses to clear the remote tier
	/// too (the HTTP `/admin/flush` surface does not — it flushes memory
	/// tiers only, per the cache's documented contract).
	async fn clear(&self) -> Result<()> {
		Ok(())
	}
}

/// Which tier satisfied a [`TileCache::fetch`] call — carried through to
/// the request pipeline's `hit-i` / `hit-e` status tag.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Tier {
	Memory,
	Remote,
}

/// The packet returned by a cache hit, annotated with which tier served it.
#[derive(Clone, Debug)]
pub struct Hit {
	pub packet: TilePacket,
	pub tier: Tier,
}

#[derive(Default)]
struct Counters {
	hits: AtomicU64,
	misses: AtomicU64,
}

/// Point-in-time hit/miss counters for one cache instance.
#[derive(Clone, Copy, Debug)]
pub struct Stats {
	pub hits: u64,
	pub misses: u64,
}

impl Stats {
	#[must_use]
	pub fn hit_rate(&self) -> f64 {
		let total = self.hits + self.misses;
		if total == 0 { 0.0 } else { self.hits as f64 / total as f64 }
	}
}

/// One proxy's two-tier cache: an optional memory tier, an optional remote
/// tier, at least one of which is enabled (enforced at construction by the
/// config layer, not by this type).
#[derive(Clone)]
pub struct TileCache {
	mem: Option<MemTier>,
	remote: Option<Arc<dyn RemoteTier>>,
	counters: Arc<Counters>,
}

impl TileCache {
	pub fn new(mem: Option<MemTier>, remote: Option<Arc<dyn RemoteTier>>) -> Self {
		Self { mem, remote, counters: Arc::new(Counters::default()) }
	}

	/// Looks up `key` across both tiers (memory first), validating the
	/// stored bytes as a `TilePacket` and invalidating both tiers if they
	/// turn out to be corrupt. On any hit, schedules a background
	/// memory-tier write-back that both promotes remote-only hits and
	/// extends the memory TTL of already-hot keys — this does not block
	/// the caller.
	pub async fn fetch(&self, key: &str) -> Option<Hit> {
		if let Some(mem) = &self.mem {
			if let Some(bytes) = mem.get(key).await {
				return self.finish_hit(key, bytes, Tier::Memory).await;
			}
		}

		if let Some(remote) = &self.remote {
			match remote.get_extend(key).await {
				Ok(Some(bytes)) => return self.finish_hit(key, bytes, Tier::Remote).await,
				Ok(None) => {}
				Err(err) => log::warn!("remote tier read failed for key {key:?}: {err:#}"),
			}
		}

		self.counters.misses.fetch_add(1, Ordering::Relaxed);
		None
	}

	async fn finish_hit(&self, key: &str, bytes: crate::Blob, tier: Tier) -> Option<Hit> {
		let Some(packet) = TilePacket::decode(bytes.as_slice()) else {
			log::warn!("corrupt TilePacket for key {key:?}, invalidating");
			if let Err(err) = self.invalidate(key).await {
				log::warn!("failed to invalidate corrupt key {key:?}: {err:#}");
			}
			self.counters.misses.fetch_add(1, Ordering::Relaxed);
			return None;
		};

		self.counters.hits.fetch_add(1, Ordering::Relaxed);

		if let Some(mem) = self.mem.clone() {
			let key = key.to_string();
			let packet_bytes = packet.to_bytes();
			tokio::spawn(async move {
				mem.set(&key, packet_bytes).await;
			});
		}

		Some(Hit { packet, tier })
	}

	/// Writes `packet` under `key`. With `internal_only = false` (the
	/// default for externally-triggered writes), also fans out an
	/// asynchronous write to the remote tier with its configured TTL;
	/// `internal_only = true` is used for the background promotion writes
	/// `fetch` schedules, which must never re-trigger a remote write.
	pub async fn set(&self, key: &str, packet: &TilePacket, internal_only: bool) {
		if !internal_only {
			if let Some(remote) = self.remote.clone() {
				let key = key.to_string();
				let bytes = packet.to_bytes();
				tokio::spawn(async move {
					if let Err(err) = remote.set(&key, &bytes).await {
						log::warn!("remote tier write failed for key {key:?}: {err:#}");
					}
				});
			}
		}

		if let Some(mem) = &self.mem {
			mem.set(key, packet.to_bytes()).await;
		}
	}

	/// Equivalent to `set(key, TilePacket::encode(tile, headers)?, false)`.
	pub async fn encode_set(&self, key: &str, tile: impl Into<Vec<u8>>, headers: impl IntoIterator<Item = crate::packet::Header>) -> Result<()> {
		let packet = TilePacket::encode(tile, headers)?;
		self.set(key, &packet, false).await;
		Ok(())
	}

	/// Deletes `key` from both tiers. Missing-in-memory is not an error;
	/// the first hard error from the remote tier is returned.
	pub async fn invalidate(&self, key: &str) -> Result<()> {
		if let Some(mem) = &self.mem {
			mem.remove(key).await;
		}
		if let Some(remote) = &self.remote {
			remote.delete(key).await?;
		}
		Ok(())
	}

	/// Clears the memory tier only, leaving the remote tier untouched —
	/// this is what `/admin/flush` calls.
	pub fn flush_internal(&self) {
		if let Some(mem) = &self.mem {
			mem.clear();
		}
	}

	pub fn stats(&self) -> Stats {
		Stats {
			hits: self.counters.hits.load(Ordering::Relaxed),
			misses: self.counters.misses.load(Ordering::Relaxed),
		}
	}

	pub fn has_mem_tier(&self) -> bool {
		self.mem.is_some()
	}

	pub fn has_remote_tier(&self) -> bool {
		self.remote.is_some()
	}
}
