//! Per-proxy CORS layer construction (§6).
//!
//! Supports the following `corsOrigins` patterns:
//! - `"*"`                      → allow all origins
//! - `"*suffix"`                → suffix match
//! - `"prefix*"`                → prefix match
//! - `"/regex/"`                → custom regex (leading/trailing `/`)
//! - any other string           → exact match
//!
//! Each configured proxy gets its own layer (built from its own
//! `corsOrigins` list) rather than one process-wide layer, since origins
//! legitimately differ per proxy.

use anyhow::Result;
use axum::http::{Method, header::HeaderValue, request::Parts};
use regex::Regex;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};

/// Browsers cache the preflight decision for 20 days, matching the
/// distilled source's fixed value.
const PREFLIGHT_MAX_AGE: Duration = Duration::from_secs(1_728_000);

type Predicate = Box<dyn Fn(&str) -> bool + Send + Sync + 'static>;

/// Builds a `CorsLayer` whose origin predicate ORs every pattern in
/// `origins`.
pub fn build_cors_layer(origins: &[String]) -> Result<CorsLayer> {
	let checks: Vec<Predicate> = origins
		.iter()
		.map(|pattern| {
			Ok::<Predicate, anyhow::Error>(if pattern == "*" {
				Box::new(|_: &str| true)
			} else if let Some(suffix) = pattern.strip_prefix('*') {
				if suffix.contains('*') {
					let exact = pattern.clone();
					Box::new(move |origin: &str| origin == exact)
				} else {
					let suffix = suffix.to_string();
					Box::new(move |origin: &str| origin.ends_with(&suffix))
				}
			} else if let Some(prefix) = pattern.strip_suffix('*') {
				let prefix = prefix.to_string();
				Box::new(move |origin: &str| origin.starts_with(&prefix))
			} else if pattern.starts_with('/') && pattern.ends_with('/') && pattern.len() >= 2 {
				let re = Regex::new(&pattern[1..pattern.len() - 1])?;
				Box::new(move |origin: &str| re.is_match(origin))
			} else {
				let exact = pattern.clone();
				Box::new(move |origin: &str| origin == exact)
			})
		})
		.collect::<Result<Vec<_>>>()?;

	Ok(CorsLayer::new()
		.allow_methods([Method::GET, Method::OPTIONS])
		.allow_origin(AllowOrigin::predicate(move |origin: &HeaderValue, _parts: &Parts| {
			let origin_str = origin.to_str().unwrap_or("");
			checks.iter().any(|check| check(origin_str))
		}))
		.max_age(PREFLIGHT_MAX_AGE))
}

#[cfg(test)]
mod tests {
	use super::*;
	use axum::http::{Request, header};
	use axum::{Router, body::Body, routing::get};
	use tower::ServiceExt;

	async fn allows_origin(layer: &CorsLayer, origin: &str) -> bool {
		let app = Router::new().route("/", get(|| async { "ok" })).layer(layer.clone());
		let req = Request::builder().uri("/").header(header::ORIGIN, origin).body(Body::empty()).unwrap();
		let resp = app.oneshot(req).await.unwrap();
		resp.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_some()
	}

	#[tokio::test]
	async fn exact_match() {
		let layer = build_cors_layer(&["https://maps.example.org".to_string()]).unwrap();
		assert!(allows_origin(&layer, "https://maps.example.org").await);
		assert!(!allows_origin(&layer, "https://maps.example.com").await);
	}

	#[tokio::test]
	async fn star_allows_everything() {
		let layer = build_cors_layer(&["*".to_string()]).unwrap();
		assert!(allows_origin(&layer, "http://anything.local").await);
	}

	#[tokio::test]
	async fn suffix_and_prefix_match() {
		let suffix_layer = build_cors_layer(&["*example.com".to_string()]).unwrap();
		assert!(allows_origin(&suffix_layer, "https://foo.example.com").await);
		assert!(!allows_origin(&suffix_layer, "https://example.org").await);

		let prefix_layer = build_cors_layer(&["https://dev-*".to_string()]).unwrap();
		assert!(allows_origin(&prefix_layer, "https://dev-01.example.com").await);
		assert!(!allows_origin(&prefix_layer, "https://prod-01.example.com").await);
	}

	#[tokio::test]
	async fn regex_match() {
		let layer = build_cors_layer(&["/^https://(foo|bar)\\.example\\.com$/".to_string()]).unwrap();
		assert!(allows_origin(&layer, "https://foo.example.com").await);
		assert!(!allows_origin(&layer, "https://baz.example.com").await);
	}

	#[tokio::test]
	async fn preflight_carries_max_age() {
		let layer = build_cors_layer(&["*".to_string()]).unwrap();
		let app = Router::new().route("/", get(|| async { "ok" })).layer(layer);
		let req = Request::builder()
			.method("OPTIONS")
			.uri("/")
			.header(header::ORIGIN, "https://example.test")
			.header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
			.body(Body::empty())
			.unwrap();
		let resp = app.oneshot(req).await.unwrap();
		let max_age = resp.headers().get(header::ACCESS_CONTROL_MAX_AGE).and_then(|v| v.to_str().ok()).map(str::to_string);
		assert_eq!(max_age.as_deref(), Some("1728000"));
	}
}
