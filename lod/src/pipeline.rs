//! The per-request proxy pipeline (§4.6): auth, coordinate parsing,
//! parameter resolution, cache lookup, and the single-flight upstream
//! fetch on a miss.

use crate::AppState;
use crate::registry::ProxyRuntime;
use axum::body::Body;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use lod_core::template::{self, RequestContext};
use lod_core::{TilePacket, Tier};
use std::collections::BTreeMap;
use std::sync::Arc;

/// The closed set of request-outcome tags the pipeline logs for
/// observability (§4.6).
#[derive(Clone, Copy, Debug)]
enum StatusTag {
	HitMem,
	HitRemote,
	HitWait,
	Miss,
	ErrTransport,
	ErrUpstream,
	ErrWait,
	NotAuth,
	BadRequest,
}

impl StatusTag {
	fn as_str(self) -> &'static str {
		match self {
			Self::HitMem => "hit-i",
			Self::HitRemote => "hit-e",
			Self::HitWait => "hit-w",
			Self::Miss => "miss",
			Self::ErrTransport => "err-t",
			Self::ErrUpstream => "err-u",
			Self::ErrWait => "err-w",
			Self::NotAuth => "nauth",
			Self::BadRequest => "err-c",
		}
	}
}

/// `GET /{name}[/{e}]/{z}/{x}/{y}.*` — the proxy fetch endpoint.
///
/// `name` is known at route-registration time (one sub-router per proxy,
/// each with its own CORS scoping — see `server::build_router`), so the
/// axum route itself only has one wildcard segment, `rest`; the wrapper
/// closure registered there threads `name` through as a plain argument
/// rather than a second path parameter.
pub async fn handle_tile(name: String, state: AppState, rest: String, query: BTreeMap<String, String>) -> Response {
	let Some(proxy) = state.registry.load().get(&name).cloned() else {
		return plain(StatusCode::BAD_REQUEST, "unknown proxy");
	};

	if let Some(expected) = &proxy.config.access_token {
		if query.get("token") != Some(expected) {
			log_tag(&name, StatusTag::NotAuth);
			return plain(StatusCode::UNAUTHORIZED, "missing or invalid token");
		}
	}

	let Some((endpoint, z, x, y)) = parse_coordinates(&rest) else {
		log_tag(&name, StatusTag::BadRequest);
		return plain(StatusCode::BAD_REQUEST, "malformed tile coordinates");
	};

	let mut params = BTreeMap::new();
	for (param_name, def) in &proxy.config.params {
		let value = query.get(param_name).cloned().or_else(|| def.default.clone()).unwrap_or_default();
		params.insert(param_name.clone(), value);
	}

	let ctx = RequestContext { z, x, y, endpoint: endpoint.as_deref(), params: &params };
	let key = template::build_key(&proxy.config.key_template, &ctx);

	if let Some(hit) = proxy.cache.fetch(&key).await {
		let tag = match hit.tier {
			Tier::Memory => StatusTag::HitMem,
			Tier::Remote => StatusTag::HitRemote,
		};
		log_tag(&name, tag);
		return build_response(&hit.packet, &proxy.config.delete_headers);
	}

	let url = match build_upstream_url(&proxy, &ctx) {
		Ok(url) => url,
		Err(_) => {
			log_tag(&name, StatusTag::BadRequest);
			return plain(StatusCode::BAD_REQUEST, "could not build upstream url");
		}
	};

	let fetcher = state.fetcher.clone();
	let add_headers = proxy.config.add_headers.clone();
	let pull_headers = proxy.config.pull_headers.clone();
	let url_owned = url.clone();

	let (result, shared) = proxy
		.singleflight
		.run(&key, move || async move { fetcher.fetch(&url_owned, &add_headers, &pull_headers).await })
		.await;

	match result {
		Ok(outcome) if outcome.is_cacheable() => {
			let tag = if shared { StatusTag::HitWait } else { StatusTag::Miss };
			log_tag(&name, tag);

			let status = if outcome.body.is_empty() { StatusCode::NO_CONTENT } else { StatusCode::OK };
			let headers = outcome.pulled_headers.clone();
			let response = build_raw_response(status, &outcome.body, &headers, &proxy.config.delete_headers);

			let proxy_for_write = proxy.clone();
			let key_for_write = key.clone();
			let body_for_write = outcome.body.clone();
			let headers_for_write = outcome.pulled_headers;
			tokio::spawn(async move {
				if let Err(err) = proxy_for_write.cache.encode_set(&key_for_write, body_for_write, headers_for_write).await {
					log::warn!("failed to cache response for key {key_for_write:?}: {err:#}");
				}
			});

			response
		}
		Ok(_) => {
			let tag = if shared { StatusTag::ErrWait } else { StatusTag::ErrUpstream };
			log_tag(&name, tag);
			plain(StatusCode::INTERNAL_SERVER_ERROR, "upstream returned an unexpected status")
		}
		Err(err) => {
			let tag = if shared { StatusTag::ErrWait } else { StatusTag::ErrTransport };
			log::error!("upstream fetch failed for proxy '{name}' key {key:?}: {err:#}");
			log_tag(&name, tag);
			plain(StatusCode::INTERNAL_SERVER_ERROR, "upstream fetch failed")
		}
	}
}

fn log_tag(proxy: &str, tag: StatusTag) {
	log::info!(target: "lod::pipeline", "proxy={proxy} tag={}", tag.as_str());
}

/// Parses the wildcard tail after `/{name}/` into `(endpoint, z, x, y)`.
/// Accepts `z/x/y[.ext]` (no dynamic endpoint) or `e/z/x/y[.ext]`.
fn parse_coordinates(rest: &str) -> Option<(Option<String>, u8, u32, u32)> {
	let segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();
	let (endpoint, z, x, y_with_ext) = match segments.as_slice() {
		[z, x, y] => (None, *z, *x, *y),
		[e, z, x, y] => (Some((*e).to_string()), *z, *x, *y),
		_ => return None,
	};

	let y = y_with_ext.split('.').next().unwrap_or(y_with_ext);
	let z: u8 = z.parse().ok()?;
	let x: u32 = x.parse().ok()?;
	let y: u32 = y.parse().ok()?;
	Some((endpoint, z, x, y))
}

fn build_upstream_url(proxy: &Arc<ProxyRuntime>, ctx: &RequestContext) -> anyhow::Result<String> {
	let substituted = template::substitute(&proxy.config.tile_url, ctx);
	let consumed = template::tokens_in(&proxy.config.tile_url);

	let mut url = reqwest::Url::parse(&substituted)?;
	{
		let mut pairs = url.query_pairs_mut();
		for (name, value) in ctx.params {
			if !consumed.contains(name) {
				pairs.append_pair(name, value);
			}
		}
	}
	Ok(url.to_string())
}

fn build_response(packet: &TilePacket, delete_headers: &[String]) -> Response {
	let status = if packet.is_empty_tile() { StatusCode::NO_CONTENT } else { StatusCode::OK };
	build_raw_response(status, packet.tile_bytes(), packet.headers(), delete_headers)
}

fn build_raw_response(status: StatusCode, body: &[u8], headers: &[(Vec<u8>, Vec<u8>)], delete_headers: &[String]) -> Response {
	let mut response_headers = HeaderMap::new();
	for (key, value) in headers {
		let Ok(key_str) = std::str::from_utf8(key) else { continue };
		if delete_headers.iter().any(|h| h.eq_ignore_ascii_case(key_str)) {
			continue;
		}
		if let (Ok(name), Ok(value)) = (HeaderName::from_bytes(key), HeaderValue::from_bytes(value)) {
			response_headers.insert(name, value);
		}
	}

	let mut response = Response::builder().status(status).body(Body::from(body.to_vec())).unwrap();
	*response.headers_mut() = response_headers;
	response.headers_mut().remove(header::SERVER);
	response
}

fn plain(status: StatusCode, message: &'static str) -> Response {
	(status, message).into_response()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_three_segments() {
		let (e, z, x, y) = parse_coordinates("7/37/47.pbf").unwrap();
		assert_eq!(e, None);
		assert_eq!((z, x, y), (7, 37, 47));
	}

	#[test]
	fn parses_four_segments_with_endpoint() {
		let (e, z, x, y) = parse_coordinates("v1/7/37/47.pbf").unwrap();
		assert_eq!(e.as_deref(), Some("v1"));
		assert_eq!((z, x, y), (7, 37, 47));
	}

	#[test]
	fn parses_without_extension() {
		let (_, z, x, y) = parse_coordinates("7/37/47").unwrap();
		assert_eq!((z, x, y), (7, 37, 47));
	}

	#[test]
	fn rejects_wrong_segment_count() {
		assert!(parse_coordinates("7/37").is_none());
		assert!(parse_coordinates("a/b/c/d/e").is_none());
	}

	#[test]
	fn rejects_non_numeric_coordinates() {
		assert!(parse_coordinates("z/x/y.pbf").is_none());
	}
}
