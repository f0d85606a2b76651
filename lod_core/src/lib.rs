//! Foundational, transport-agnostic pieces of the LOD tile cache engine:
//! the `TilePacket` wire format, the two-tier cache that stores it, the
//! key/URL templater, the single-flight coordinator that collapses
//! concurrent upstream fetches, the tile-tree expander and bulk
//! invalidate/prime engine, the validated `ProxyConfig` shape, and the
//! byte-oriented value types (`Blob`) they're all built on.
//!
//! Nothing in this crate knows about HTTP, TOML configuration, or the
//! upstream fetch itself — those live in the `lod` binary crate, which
//! wires this engine up to axum and `reqwest`.

pub mod bulk;
pub mod cache;
pub mod mem_cache;
pub mod packet;
pub mod proxy_config;
pub mod redis_tier;
pub mod singleflight;
pub mod template;
pub mod tile;
pub mod types;

pub use bulk::{BulkResult, invalidate_deep, prime_deep};
pub use cache::{Hit, RemoteTier, Stats, Tier, TileCache};
pub use mem_cache::MemTier;
pub use packet::{Header, TilePacket};
pub use proxy_config::{ParamDef, ProxyConfig, RESERVED_TOKENS};
pub use redis_tier::{RedisTier, redis_url_for};
pub use singleflight::SingleFlight;
pub use template::RequestContext;
pub use tile::Tile;
pub use types::*;
