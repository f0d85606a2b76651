//! The `/admin/*` HTTP surface (§4.9): status, config echo, reload,
//! flush, bulk invalidate/prime, and per-proxy stats. A thin translation
//! layer over the cache, bulk-worker-pool, and config components — it
//! owns no state beyond the process-global registry and config snapshot.

use crate::AppState;
use crate::config::AppConfig;
use crate::registry::{self, ProxyRuntime};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use lod_core::template::{self, RequestContext};
use lod_core::{ProxyConfig, Tile};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;

fn authorized(state: &AppState, headers: &HeaderMap) -> bool {
	let Some(expected) = state.config.load().admin_token.clone() else {
		return true;
	};
	let Some(header_value) = headers.get(header::AUTHORIZATION) else {
		return false;
	};
	let Ok(header_value) = header_value.to_str() else {
		return false;
	};
	header_value.strip_prefix("Bearer ").is_some_and(|token| token == expected)
}

fn unauthorized() -> Response {
	(StatusCode::UNAUTHORIZED, "missing or invalid admin token").into_response()
}

/// `GET /admin/status`
pub async fn status(State(state): State<AppState>, headers: HeaderMap) -> Response {
	if !authorized(&state, &headers) {
		return unauthorized();
	}
	let boot_time = state.boot_time.format(&time::format_description::well_known::Rfc3339).unwrap_or_default();
	Json(json!({
		"version": env!("CARGO_PKG_VERSION"),
		"environment": if std::env::var("DEPLOY").as_deref() == Ok("DEV") { "dev" } else { "prod" },
		"uptimeSeconds": state.started_at.elapsed().as_secs(),
		"bootTime": boot_time,
	}))
	.into_response()
}

/// `GET /admin/capabilities`
pub async fn capabilities(State(state): State<AppState>, headers: HeaderMap) -> Response {
	if !authorized(&state, &headers) {
		return unauthorized();
	}
	let config = state.config.load_full();
	Json(config_to_json(&config)).into_response()
}

fn config_to_json(config: &AppConfig) -> Value {
	json!({
		"ip": config.ip,
		"port": config.port,
		"adminToken": config.admin_token,
		"metricsEnabled": config.metrics_enabled,
		"proxies": config.proxies.iter().map(proxy_to_json).collect::<Vec<_>>(),
	})
}

fn proxy_to_json(proxy: &ProxyConfig) -> Value {
	json!({
		"name": proxy.name,
		"tileUrl": proxy.tile_url,
		"keyTemplate": proxy.key_template,
		"pullHeaders": proxy.pull_headers,
		"deleteHeaders": proxy.delete_headers,
		"addHeaders": proxy.add_headers,
		"params": proxy.params.iter().map(|(name, def)| (name.clone(), json!({ "default": def.default }))).collect::<BTreeMap<_, _>>(),
		"accessToken": proxy.access_token,
		"memEnabled": proxy.mem_enabled,
		"memCapMB": proxy.mem_cap_mb,
		"memTtlSeconds": proxy.mem_ttl.as_secs(),
		"redisEnabled": proxy.redis_enabled,
		"redisUrl": proxy.redis_url,
		"redisTtlSeconds": proxy.redis_ttl.as_secs(),
		"redisTls": proxy.redis_tls,
		"numWorkers": proxy.num_workers,
		"corsOrigins": proxy.cors_origins,
	})
}

/// `GET /admin/reload`
pub async fn reload(State(state): State<AppState>, headers: HeaderMap) -> Response {
	if !authorized(&state, &headers) {
		return unauthorized();
	}

	let Some(path) = state.config_path.clone() else {
		return Json(json!({ "status": "error", "error": "no config file path to reload from" })).into_response();
	};

	match AppConfig::from_path(&path) {
		Ok(new_config) => {
			let current = state.registry.load_full();
			match registry::reconcile(&current, &new_config).await {
				Ok(next) => {
					state.registry.store(Arc::new(next));
					state.config.store(Arc::new(new_config));
					Json(json!({ "status": "ok", "file": path.display().to_string() })).into_response()
				}
				Err(err) => Json(json!({ "status": "error", "file": path.display().to_string(), "error": format!("{err:#}") })).into_response(),
			}
		}
		Err(err) => Json(json!({ "status": "error", "file": path.display().to_string(), "error": format!("{err:#}") })).into_response(),
	}
}

/// `GET /admin/flush`
pub async fn flush_all(State(state): State<AppState>, headers: HeaderMap) -> Response {
	if !authorized(&state, &headers) {
		return unauthorized();
	}
	for runtime in state.registry.load().values() {
		runtime.cache.flush_internal();
	}
	Json(json!({ "status": "ok" })).into_response()
}

/// `GET /admin/{name}/flush`
pub async fn flush_one(State(state): State<AppState>, headers: HeaderMap, Path(name): Path<String>) -> Response {
	if !authorized(&state, &headers) {
		return unauthorized();
	}
	let Some(runtime) = state.registry.load().get(&name).cloned() else {
		return (StatusCode::BAD_REQUEST, "unknown proxy").into_response();
	};
	runtime.cache.flush_internal();
	Json(json!({ "status": "ok" })).into_response()
}

/// `GET /admin/{name}/stats`
pub async fn stats(State(state): State<AppState>, headers: HeaderMap, Path(name): Path<String>) -> Response {
	if !authorized(&state, &headers) {
		return unauthorized();
	}
	let Some(runtime) = state.registry.load().get(&name).cloned() else {
		return (StatusCode::BAD_REQUEST, "unknown proxy").into_response();
	};
	let stats = runtime.cache.stats();
	Json(json!({
		"hits": stats.hits,
		"misses": stats.misses,
		"hitRate": stats.hit_rate(),
		"hasMemTier": runtime.cache.has_mem_tier(),
		"hasRemoteTier": runtime.cache.has_remote_tier(),
	}))
	.into_response()
}

fn tile_key(proxy: &ProxyConfig, tile: Tile) -> String {
	let params = BTreeMap::new();
	let ctx = RequestContext { z: tile.z, x: tile.x, y: tile.y, endpoint: None, params: &params };
	template::build_key(&proxy.key_template, &ctx)
}

fn tile_url(proxy: &ProxyConfig, tile: Tile) -> String {
	let params = BTreeMap::new();
	let ctx = RequestContext { z: tile.z, x: tile.x, y: tile.y, endpoint: None, params: &params };
	template::substitute(&proxy.tile_url, &ctx)
}

/// Shared parsing for the four bulk invalidate/prime routes.
fn resolve_bulk_target(state: &AppState, name: &str, z: u8, x: u32, y: u32, max_zoom: Option<u8>) -> Result<(Arc<ProxyRuntime>, Tile, u8), Response> {
	let Some(runtime) = state.registry.load().get(name).cloned() else {
		return Err((StatusCode::BAD_REQUEST, "unknown proxy").into_response());
	};
	let tile = Tile::new(z, x, y);
	let max_zoom = max_zoom.unwrap_or(z);
	Ok((runtime, tile, max_zoom))
}

/// `GET /admin/{name}/invalidate/{z}/{x}/{y}` and `.../invalidate/deep/{z}/{x}/{y}[/{maxZoom}]`
pub async fn invalidate(State(state): State<AppState>, headers: HeaderMap, Path((name, z, x, y)): Path<(String, u8, u32, u32)>) -> Response {
	invalidate_impl(state, headers, name, z, x, y, None).await
}

pub async fn invalidate_deep(State(state): State<AppState>, headers: HeaderMap, Path((name, z, x, y)): Path<(String, u8, u32, u32)>) -> Response {
	invalidate_impl(state, headers, name, z, x, y, Some(z)).await
}

pub async fn invalidate_deep_with_max(
	State(state): State<AppState>,
	headers: HeaderMap,
	Path((name, z, x, y, max_zoom)): Path<(String, u8, u32, u32, u8)>,
) -> Response {
	invalidate_impl(state, headers, name, z, x, y, Some(max_zoom)).await
}

async fn invalidate_impl(state: AppState, headers: HeaderMap, name: String, z: u8, x: u32, y: u32, max_zoom: Option<u8>) -> Response {
	if !authorized(&state, &headers) {
		return unauthorized();
	}
	let (runtime, tile, max_zoom) = match resolve_bulk_target(&state, &name, z, x, y, max_zoom) {
		Ok(target) => target,
		Err(response) => return response,
	};

	let config = runtime.config.clone();
	let result = lod_core::invalidate_deep(&runtime.cache, tile, max_zoom, move |t| tile_key(&config, t)).await;
	Json(json!({ "attempted": result.attempted, "invalidated": result.succeeded, "status": result.status() })).into_response()
}

/// `GET /admin/{name}/prime/{z}/{x}/{y}` and `.../prime/deep/{z}/{x}/{y}[/{maxZoom}]`
pub async fn prime(State(state): State<AppState>, headers: HeaderMap, Path((name, z, x, y)): Path<(String, u8, u32, u32)>) -> Response {
	prime_impl(state, headers, name, z, x, y, None).await
}

pub async fn prime_deep(State(state): State<AppState>, headers: HeaderMap, Path((name, z, x, y)): Path<(String, u8, u32, u32)>) -> Response {
	prime_impl(state, headers, name, z, x, y, Some(z)).await
}

pub async fn prime_deep_with_max(
	State(state): State<AppState>,
	headers: HeaderMap,
	Path((name, z, x, y, max_zoom)): Path<(String, u8, u32, u32, u8)>,
) -> Response {
	prime_impl(state, headers, name, z, x, y, Some(max_zoom)).await
}

async fn prime_impl(state: AppState, headers: HeaderMap, name: String, z: u8, x: u32, y: u32, max_zoom: Option<u8>) -> Response {
	if !authorized(&state, &headers) {
		return unauthorized();
	}
	let (runtime, tile, max_zoom) = match resolve_bulk_target(&state, &name, z, x, y, max_zoom) {
		Ok(target) => target,
		Err(response) => return response,
	};

	let fetcher = state.fetcher.clone();
	let runtime_for_job = runtime.clone();
	let result = lod_core::prime_deep(tile, max_zoom, runtime.config.num_workers, move |t| {
		let fetcher = fetcher.clone();
		let runtime = runtime_for_job.clone();
		async move {
			let url = tile_url(&runtime.config, t);
			let key = tile_key(&runtime.config, t);
			match fetcher.fetch(&url, &runtime.config.add_headers, &runtime.config.pull_headers).await {
				Ok(outcome) if outcome.is_cacheable() => runtime.cache.encode_set(&key, outcome.body, outcome.pulled_headers).await.is_ok(),
				_ => false,
			}
		}
	})
	.await;

	Json(json!({ "attempted": result.attempted, "primed": result.succeeded, "status": result.status() })).into_response()
}

#[cfg(feature = "metrics")]
pub async fn metrics_prometheus(State(state): State<AppState>, headers: HeaderMap) -> Response {
	use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};

	if !authorized(&state, &headers) {
		return unauthorized();
	}
	if !state.config.load().metrics_enabled {
		return (StatusCode::NOT_FOUND, "metrics are disabled").into_response();
	}

	let registry = Registry::new();
	let Ok(gauge) = GaugeVec::new(Opts::new("lod_cache_events_total", "Cache hit/miss counters per proxy and tier"), &["proxy", "outcome"]) else {
		return (StatusCode::INTERNAL_SERVER_ERROR, "failed building metrics").into_response();
	};
	if registry.register(Box::new(gauge.clone())).is_err() {
		return (StatusCode::INTERNAL_SERVER_ERROR, "failed registering metrics").into_response();
	}

	for (name, runtime) in state.registry.load().iter() {
		let stats = runtime.cache.stats();
		gauge.with_label_values(&[name.as_str(), "hit"]).set(stats.hits as f64);
		gauge.with_label_values(&[name.as_str(), "miss"]).set(stats.misses as f64);
	}

	let mut buffer = Vec::new();
	if TextEncoder::new().encode(&registry.gather(), &mut buffer).is_err() {
		return (StatusCode::INTERNAL_SERVER_ERROR, "failed encoding metrics").into_response();
	}

	([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], buffer).into_response()
}

#[cfg(not(feature = "metrics"))]
pub async fn metrics_prometheus() -> Response {
	(StatusCode::NOT_FOUND, "metrics support was not compiled in").into_response()
}
