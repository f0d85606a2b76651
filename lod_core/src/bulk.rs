//! Bulk invalidate/prime engine (§4.8): iterative-deepening expansion of a
//! tile to all descendants up to a max zoom, with per-tile success
//! accounting. Invalidation is cheap enough to run sequentially; priming
//! fans out over a bounded worker pool pulling from a shared job channel.

use crate::cache::TileCache;
use crate::tile::Tile;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};

/// Outcome of a bulk invalidate or prime run: how many tiles were in the
/// expanded set and how many were processed successfully.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BulkResult {
	pub attempted: usize,
	pub succeeded: usize,
}

impl BulkResult {
	/// `"ok"` iff every tile succeeded, `"failed"` otherwise (§4.8 step 5).
	#[must_use]
	pub fn status(&self) -> &'static str {
		if self.succeeded == self.attempted { "ok" } else { "failed" }
	}
}

/// Invalidates every descendant of `root` down to `max_zoom` (inclusive),
/// continuing past individual failures. Sequential: invalidation is cheap
/// and doesn't warrant a worker pool.
pub async fn invalidate_deep(cache: &TileCache, root: Tile, max_zoom: u8, key_for: impl Fn(Tile) -> String) -> BulkResult {
	let tiles = root.deep_children(max_zoom);
	let attempted = tiles.len();
	let mut succeeded = 0;

	for tile in tiles {
		let key = key_for(tile);
		match cache.invalidate(&key).await {
			Ok(()) => succeeded += 1,
			Err(err) => log::warn!("bulk invalidate failed for tile {tile} (key {key:?}): {err:#}"),
		}
	}

	BulkResult { attempted, succeeded }
}

/// Runs `job(tile)` for every descendant of `root` down to `max_zoom`
/// (inclusive), fanning work out across `workers` concurrent workers that
/// pull from a shared, bounded job channel. The producer submits every
/// tile and closes the channel; workers exit once it's drained and closed.
/// The caller is only handed the final tally once every worker has exited.
pub async fn prime_deep<F, Fut>(root: Tile, max_zoom: u8, workers: usize, job: F) -> BulkResult
where
	F: Fn(Tile) -> Fut + Send + Sync + 'static,
	Fut: Future<Output = bool> + Send + 'static,
{
	let tiles = root.deep_children(max_zoom);
	let attempted = tiles.len();
	let workers = workers.max(1).min(attempted.max(1));

	let (job_tx, job_rx) = mpsc::channel::<Tile>(attempted.max(1));
	for tile in tiles {
		// Capacity equals `attempted`, so this never blocks the producer.
		let _ = job_tx.send(tile).await;
	}
	drop(job_tx);

	let job_rx = Arc::new(Mutex::new(job_rx));
	let (result_tx, mut result_rx) = mpsc::channel::<bool>(attempted.max(1));
	let job = Arc::new(job);

	let mut handles = Vec::with_capacity(workers);
	for _ in 0..workers {
		let job_rx = job_rx.clone();
		let result_tx = result_tx.clone();
		let job = job.clone();
		handles.push(tokio::spawn(async move {
			loop {
				let next = job_rx.lock().await.recv().await;
				let Some(tile) = next else { break };
				let ok = job(tile).await;
				let _ = result_tx.send(ok).await;
			}
		}));
	}
	drop(result_tx);

	for handle in handles {
		if let Err(err) = handle.await {
			log::warn!("prime worker panicked: {err}");
		}
	}

	let mut succeeded = 0;
	while let Some(ok) = result_rx.recv().await {
		if ok {
			succeeded += 1;
		}
	}

	BulkResult { attempted, succeeded }
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::mem_cache::MemTier;
	use crate::packet::TilePacket;
	use std::sync::atomic::{AtomicUsize, Ordering};
	use std::time::Duration;

	fn key_for(tile: Tile) -> String {
		tile.to_string()
	}

	#[tokio::test]
	async fn invalidate_deep_counts_every_descendant() {
		let cache = TileCache::new(Some(MemTier::new(1024 * 1024, 1024 * 1024, Duration::from_secs(60))), None);
		let root = Tile::new(5, 10, 10);
		// M=7: 1 + 4 + 16 = 21
		for tile in root.deep_children(7) {
			let packet = TilePacket::encode(b"x".to_vec(), vec![]).unwrap();
			cache.set(&key_for(tile), &packet, false).await;
		}

		let result = invalidate_deep(&cache, root, 7, key_for).await;
		assert_eq!(result.attempted, 21);
		assert_eq!(result.succeeded, 21);
		assert_eq!(result.status(), "ok");

		for tile in root.deep_children(7) {
			assert!(cache.fetch(&key_for(tile)).await.is_none());
		}
	}

	#[tokio::test]
	async fn invalidate_deep_is_idempotent() {
		let cache = TileCache::new(Some(MemTier::new(1024 * 1024, 1024 * 1024, Duration::from_secs(60))), None);
		let root = Tile::new(5, 10, 10);
		let first = invalidate_deep(&cache, root, 7, key_for).await;
		let second = invalidate_deep(&cache, root, 7, key_for).await;
		assert_eq!(first, second);
	}

	#[tokio::test]
	async fn prime_deep_runs_every_tile_exactly_once() {
		let calls = Arc::new(AtomicUsize::new(0));
		let calls_clone = calls.clone();
		let result = prime_deep(Tile::new(5, 10, 10), 7, 4, move |_tile| {
			let calls = calls_clone.clone();
			async move {
				calls.fetch_add(1, Ordering::SeqCst);
				true
			}
		})
		.await;

		assert_eq!(result.attempted, 21);
		assert_eq!(result.succeeded, 21);
		assert_eq!(calls.load(Ordering::SeqCst), 21);
	}

	#[tokio::test]
	async fn prime_deep_counts_partial_failures() {
		let result = prime_deep(Tile::new(0, 0, 0), 1, 2, |tile| async move { tile.x == 0 }).await;
		// children of (0,0,0) at z=1: (0,0),(1,0),(0,1),(1,1); plus the root itself -> 5 tiles
		assert_eq!(result.attempted, 5);
		assert_eq!(result.status(), "failed");
		assert!(result.succeeded < result.attempted);
	}
}
