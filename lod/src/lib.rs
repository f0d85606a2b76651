//! LOD: a caching reverse proxy in front of upstream vector/raster tile
//! servers.
//!
//! This crate wires `lod_core`'s transport-agnostic cache engine up to
//! axum and `reqwest`: TOML configuration ingestion, the per-request
//! proxy pipeline, the admin HTTP surface, and the CLI entry point all
//! live here. See `lod_core` for the TilePacket codec, two-tier cache,
//! templater, single-flight coordinator, and bulk invalidate/prime engine
//! this binary configures and drives.

pub mod admin;
pub mod config;
pub mod cors;
pub mod fetch;
pub mod pipeline;
pub mod registry;
pub mod server;

use arc_swap::ArcSwap;
use config::AppConfig;
use fetch::UpstreamFetcher;
use registry::SharedRegistry;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use time::OffsetDateTime;

/// Shared state reachable from every axum handler: the hot-swappable
/// proxy registry, the shared upstream HTTP client, the currently active
/// config (for `/admin/capabilities` and as the reload baseline), and
/// process bookkeeping for `/admin/status`.
#[derive(Clone)]
pub struct AppState {
	pub registry: SharedRegistry,
	pub fetcher: Arc<UpstreamFetcher>,
	pub config: Arc<ArcSwap<AppConfig>>,
	pub config_path: Option<Arc<PathBuf>>,
	pub started_at: Instant,
	pub boot_time: OffsetDateTime,
}

impl AppState {
	pub async fn new(config: AppConfig, config_path: Option<PathBuf>) -> anyhow::Result<Self> {
		let registry = registry::build_registry(&config).await?;
		Ok(Self {
			registry: Arc::new(ArcSwap::from_pointee(registry)),
			fetcher: Arc::new(UpstreamFetcher::new()?),
			config: Arc::new(ArcSwap::from_pointee(config)),
			config_path: config_path.map(Arc::new),
			started_at: Instant::now(),
			boot_time: OffsetDateTime::now_utc(),
		})
	}
}
