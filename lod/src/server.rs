//! HTTP server lifecycle (§5's "global HTTP backpressure", §6's routing
//! table): one CORS-scoped sub-router per configured proxy, the admin
//! surface, and the same overload-protection middleware stack this
//! crate's tile server applies — `LoadShed → ConcurrencyLimit → Buffer →
//! Timeout → CatchPanic → HandleError`, outermost last.

use crate::{AppState, admin, cors, pipeline};
use anyhow::{Result, bail};
use axum::error_handling::HandleErrorLayer;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{BoxError, Router, response::IntoResponse};
use lod_derive::context;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tower::{ServiceBuilder, buffer::BufferLayer, limit::ConcurrencyLimitLayer, load_shed::LoadShedLayer, timeout::TimeoutLayer};
use tower_http::catch_panic::CatchPanicLayer;

const GLOBAL_CONCURRENCY: usize = 256;
const GLOBAL_BUFFER: usize = 512;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Orchestrates the axum router and its lifecycle: idempotent start/stop,
/// graceful shutdown, global backpressure.
pub struct LodServer {
	ip: String,
	port: u16,
	state: AppState,
	exit_signal: Option<oneshot::Sender<()>>,
	join: Option<tokio::task::JoinHandle<()>>,
}

impl LodServer {
	pub fn new(state: AppState, ip: String, port: u16) -> Self {
		Self { ip, port, state, exit_signal: None, join: None }
	}

	fn build_router(&self) -> Result<Router> {
		let mut router = Router::new();

		for (name, runtime) in self.state.registry.load().iter() {
			let cors_layer = cors::build_cors_layer(&runtime.config.cors_origins)?;
			let proxy_name = name.clone();
			let handler = move |State(state): State<AppState>,
			                     Path(rest): Path<String>,
			                     Query(query): Query<BTreeMap<String, String>>| {
				let proxy_name = proxy_name.clone();
				async move { pipeline::handle_tile(proxy_name, state, rest, query).await }
			};
			let proxy_router = Router::new()
				.route(&format!("/{name}/{{*rest}}"), get(handler))
				.layer(cors_layer)
				.with_state(self.state.clone());
			router = router.merge(proxy_router);
		}

		let admin_router = Router::new()
			.route("/admin/status", get(admin::status))
			.route("/admin/capabilities", get(admin::capabilities))
			.route("/admin/reload", get(admin::reload))
			.route("/admin/flush", get(admin::flush_all))
			.route("/admin/{name}/flush", get(admin::flush_one))
			.route("/admin/{name}/invalidate/{z}/{x}/{y}", get(admin::invalidate))
			.route("/admin/{name}/invalidate/deep/{z}/{x}/{y}", get(admin::invalidate_deep))
			.route("/admin/{name}/invalidate/deep/{z}/{x}/{y}/{max_zoom}", get(admin::invalidate_deep_with_max))
			.route("/admin/{name}/prime/{z}/{x}/{y}", get(admin::prime))
			.route("/admin/{name}/prime/deep/{z}/{x}/{y}", get(admin::prime_deep))
			.route("/admin/{name}/prime/deep/{z}/{x}/{y}/{max_zoom}", get(admin::prime_deep_with_max))
			.route("/admin/{name}/stats", get(admin::stats))
			.route("/admin/metrics/prometheus", get(admin::metrics_prometheus))
			.with_state(self.state.clone());

		router = router.merge(admin_router);

		let overload_handler = HandleErrorLayer::new(|_err: BoxError| async move {
			let mut response = (StatusCode::SERVICE_UNAVAILABLE, "lod is overloaded, try later").into_response();
			response.headers_mut().insert("Retry-After", "2".parse().unwrap());
			Ok::<_, std::convert::Infallible>(response)
		});

		let protection = ServiceBuilder::new()
			.layer(overload_handler)
			.layer(CatchPanicLayer::new())
			.layer(TimeoutLayer::new(REQUEST_TIMEOUT))
			.layer(BufferLayer::new(GLOBAL_BUFFER))
			.layer(ConcurrencyLimitLayer::new(GLOBAL_CONCURRENCY))
			.layer(LoadShedLayer::new());

		Ok(router.layer(protection))
	}

	/// Starts listening. Idempotent: stops any previously running instance
	/// first.
	#[context("starting lod server")]
	pub async fn start(&mut self) -> Result<()> {
		if self.exit_signal.is_some() || self.join.is_some() {
			self.stop().await;
		}

		let router = self.build_router()?;
		let addr = format!("{}:{}", self.ip, self.port);
		log::info!("binding on {addr}");

		let listener = TcpListener::bind(&addr).await?;
		if self.port == 0 {
			self.port = listener.local_addr()?.port();
		}

		let (tx, rx) = oneshot::channel::<()>();
		let handle = tokio::spawn(async move {
			if let Err(err) = axum::serve(listener, router.into_make_service()).with_graceful_shutdown(async { rx.await.ok(); }).await {
				log::error!("server task exited with error: {err}");
			}
		});

		self.exit_signal = Some(tx);
		self.join = Some(handle);
		Ok(())
	}

	/// Triggers graceful shutdown and waits (with a timeout) for the
	/// listening task to finish. Idempotent.
	pub async fn stop(&mut self) {
		if self.exit_signal.is_none() && self.join.is_none() {
			return;
		}
		log::info!("stopping server");

		if let Some(tx) = self.exit_signal.take() {
			let _ = tx.send(());
		}
		if let Some(handle) = self.join.take() {
			if tokio::time::timeout(Duration::from_secs(10), handle).await.is_err() {
				log::warn!("server task did not shut down within timeout; continuing");
			}
		}
	}

	pub fn get_port(&self) -> u16 {
		self.port
	}
}

/// Rejects a build-router failure early (e.g. an invalid `corsOrigins`
/// regex) rather than discovering it on the first request.
pub fn validate_router(state: &AppState) -> Result<()> {
	let server = LodServer::new(state.clone(), "0.0.0.0".to_string(), 0);
	match server.build_router() {
		Ok(_) => Ok(()),
		Err(err) => bail!("invalid routing configuration: {err:#}"),
	}
}
