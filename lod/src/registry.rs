//! The process-global `name → cache` registry (§5, §9): an `ArcSwap`
//! snapshot readers use on the hot path without blocking a concurrent
//! `/admin/reload`.

use crate::config::{AppConfig, max_entry_bytes};
use anyhow::{Context, Result};
use arc_swap::ArcSwap;
use lod_core::{MemTier, ProxyConfig, RedisTier, SingleFlight, TileCache, redis_url_for};
use std::collections::HashMap;
use std::sync::Arc;

use crate::fetch::FetchOutcome;

/// Everything needed to serve one configured proxy: its validated config,
/// its two-tier cache, and its single-flight coordinator for upstream
/// fetches.
pub struct ProxyRuntime {
	pub config: ProxyConfig,
	pub cache: TileCache,
	pub singleflight: SingleFlight<FetchOutcome>,
}

/// `name → runtime`, swapped atomically on reload.
pub type Registry = HashMap<String, Arc<ProxyRuntime>>;

/// Lock-free, hot-swappable registry handle shared across the server.
pub type SharedRegistry = Arc<ArcSwap<Registry>>;

/// Instantiates a cache (and, where configured, a Redis connection) for
/// every proxy in `app`.
pub async fn build_registry(app: &AppConfig) -> Result<Registry> {
	let mut registry = Registry::new();
	for proxy in &app.proxies {
		let runtime = build_proxy_runtime(app, proxy).await.with_context(|| format!("initializing proxy '{}'", proxy.name))?;
		registry.insert(proxy.name.clone(), Arc::new(runtime));
	}
	Ok(registry)
}

async fn build_proxy_runtime(app: &AppConfig, proxy: &ProxyConfig) -> Result<ProxyRuntime> {
	let mem = if proxy.mem_enabled {
		let max_bytes = proxy.mem_cap_mb * 1024 * 1024;
		Some(MemTier::new(max_bytes, max_entry_bytes(app, proxy), proxy.mem_ttl))
	} else {
		None
	};

	let remote: Option<Arc<dyn lod_core::RemoteTier>> = if proxy.redis_enabled {
		let url = redis_url_for(proxy.redis_url.as_deref().unwrap_or_default(), proxy.redis_tls);
		let tier = RedisTier::connect(&url, proxy.redis_ttl).await.with_context(|| format!("connecting redis tier for proxy '{}'", proxy.name))?;
		Some(Arc::new(tier))
	} else {
		None
	};

	Ok(ProxyRuntime { config: proxy.clone(), cache: TileCache::new(mem, remote), singleflight: SingleFlight::new() })
}

/// Reconciles `current` against a newly loaded config (§4.9): a proxy
/// whose name is present in both and whose resolved `ProxyConfig` is
/// unchanged keeps its running cache instance (so warm memory-tier
/// entries and any in-flight single-flight call survive); a new or
/// changed proxy gets a freshly built instance; a proxy missing from the
/// new config is simply absent from the returned map, dropping it.
pub async fn reconcile(current: &Registry, app: &AppConfig) -> Result<Registry> {
	let mut next = Registry::new();
	for proxy in &app.proxies {
		let runtime = match current.get(&proxy.name) {
			Some(existing) if existing.config == *proxy => existing.clone(),
			_ => Arc::new(build_proxy_runtime(app, proxy).await.with_context(|| format!("initializing proxy '{}'", proxy.name))?),
		};
		next.insert(proxy.name.clone(), runtime);
	}
	Ok(next)
}
