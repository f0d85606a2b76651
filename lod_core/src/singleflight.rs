//! Per-key request coalescing: guarantees at most one concurrent execution
//! of a fallible async operation per key, with every caller that arrives
//! while one is in flight receiving the same result.
//!
//! This backs the request pipeline's cache-miss path (§4.5 of the design):
//! when N clients ask for the same uncached tile at once, exactly one
//! upstream fetch runs and all N receive identical bytes.

use anyhow::Result;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::future::Future;
use std::sync::Arc;

type InFlight<T> = Shared<BoxFuture<'static, Result<T, Arc<anyhow::Error>>>>;

/// A per-key coordinator. `T` is the value produced by the coalesced
/// operation; it must be cheap to clone since every waiter receives an
/// owned copy of the same result.
pub struct SingleFlight<T> {
	inflight: DashMap<String, InFlight<T>>,
}

impl<T> Default for SingleFlight<T> {
	fn default() -> Self {
		Self { inflight: DashMap::new() }
	}
}

impl<T> SingleFlight<T>
where
	T: Clone + Send + Sync + 'static,
{
	pub fn new() -> Self {
		Self::default()
	}

	/// Runs `f` for `key` unless a call for the same key is already in
	/// flight, in which case this waits for that call's result instead.
	/// Returns the result alongside `shared`, true iff this caller was
	/// coalesced onto someone else's in-flight call rather than the one
	/// that triggered `f`.
	///
	/// Once the in-flight call completes and every waiter has observed the
	/// result, the key is forgotten: the next call for it starts a fresh
	/// `f`.
	pub async fn run<F, Fut>(&self, key: &str, f: F) -> (Result<T, Arc<anyhow::Error>>, bool)
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<T>> + Send + 'static,
	{
		let (fut, shared) = match self.inflight.entry(key.to_string()) {
			Entry::Occupied(entry) => (entry.get().clone(), true),
			Entry::Vacant(entry) => {
				let fut: InFlight<T> = async move { f().await.map_err(Arc::new) }.boxed().shared();
				entry.insert(fut.clone());
				(fut, false)
			}
		};

		let result = fut.await;
		if !shared {
			self.inflight.remove(key);
		}
		(result, shared)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicUsize, Ordering};
	use std::time::Duration;
	use tokio::time::sleep;

	#[tokio::test]
	async fn coalesces_concurrent_callers() {
		let sf: Arc<SingleFlight<u32>> = Arc::new(SingleFlight::new());
		let calls = Arc::new(AtomicUsize::new(0));

		let mut handles = Vec::new();
		for _ in 0..8 {
			let sf = sf.clone();
			let calls = calls.clone();
			handles.push(tokio::spawn(async move {
				sf.run("k", move || {
					let calls = calls.clone();
					async move {
						calls.fetch_add(1, Ordering::SeqCst);
						sleep(Duration::from_millis(30)).await;
						Ok(42u32)
					}
				})
				.await
			}));
		}

		let mut shared_count = 0;
		for handle in handles {
			let (result, shared) = handle.await.unwrap();
			assert_eq!(*result.unwrap(), 42);
			if shared {
				shared_count += 1;
			}
		}

		assert_eq!(calls.load(Ordering::SeqCst), 1);
		assert_eq!(shared_count, 7);
	}

	#[tokio::test]
	async fn forgets_key_after_completion() {
		let sf: SingleFlight<u32> = SingleFlight::new();
		let calls = Arc::new(AtomicUsize::new(0));

		for _ in 0..3 {
			let calls = calls.clone();
			let (result, shared) = sf
				.run("k", move || {
					let calls = calls.clone();
					async move {
						calls.fetch_add(1, Ordering::SeqCst);
						Ok(1u32)
					}
				})
				.await;
			assert_eq!(*result.unwrap(), 1);
			assert!(!shared);
		}

		assert_eq!(calls.load(Ordering::SeqCst), 3);
	}

	#[tokio::test]
	async fn every_waiter_sees_the_same_error() {
		let sf: Arc<SingleFlight<u32>> = Arc::new(SingleFlight::new());

		let mut handles = Vec::new();
		for _ in 0..4 {
			let sf = sf.clone();
			handles.push(tokio::spawn(async move {
				sf.run("k", || async {
					sleep(Duration::from_millis(20)).await;
					anyhow::bail!("upstream exploded")
				})
				.await
			}));
		}

		for handle in handles {
			let (result, _shared) = handle.await.unwrap();
			assert_eq!(result.unwrap_err().to_string(), "upstream exploded");
		}
	}
}
