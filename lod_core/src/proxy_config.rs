//! The validated, transport-agnostic shape of one configured proxy (§3).
//!
//! Decoding this from TOML, substituting `${VAR}` environment tokens, and
//! resolving defaults live in the `lod` binary crate (§2's "ambient
//! stack" — config ingestion is explicitly out of scope for the core).
//! This type only carries the recognized fields and enforces the
//! invariants the cache engine, templater, and bulk engine depend on.

use anyhow::{Result, bail};
use std::collections::BTreeMap;
use std::time::Duration;

/// Tokens with reserved meaning in `tileUrl` and `keyTemplate`; a `params`
/// entry sharing one of these names is a config error.
pub const RESERVED_TOKENS: [&str; 4] = ["z", "x", "y", "e"];

/// A named query parameter this proxy recognizes, with its default value
/// applied when a request omits it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParamDef {
	pub default: Option<String>,
}

/// One configured proxy endpoint. See §3 of the design for field semantics.
///
/// `PartialEq` compares every field and is used by the `lod` binary's
/// config-reload reconciliation to decide whether a proxy's running cache
/// instance can survive a reload unchanged (§4.9).
#[derive(Clone, Debug, PartialEq)]
pub struct ProxyConfig {
	pub name: String,
	pub tile_url: String,
	pub key_template: String,
	pub pull_headers: Vec<String>,
	pub delete_headers: Vec<String>,
	pub add_headers: Vec<(String, String)>,
	pub params: BTreeMap<String, ParamDef>,
	pub access_token: Option<String>,
	pub mem_enabled: bool,
	pub mem_cap_mb: u64,
	pub mem_ttl: Duration,
	pub redis_enabled: bool,
	pub redis_url: Option<String>,
	pub redis_ttl: Duration,
	pub redis_tls: bool,
	pub num_workers: usize,
	pub cors_origins: Vec<String>,
}

impl ProxyConfig {
	/// Validates the invariants listed in §3/§6: a well-formed name, the
	/// required coordinate tokens present in both templates, no parameter
	/// name colliding with a reserved token, and at least one cache tier
	/// enabled.
	pub fn validate(&self) -> Result<()> {
		if self.name.is_empty() || !self.name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
			bail!("proxy name {:?} must match ^[A-Za-z0-9_-]+$", self.name);
		}

		for token in ["{z}", "{x}", "{y}"] {
			if !self.tile_url.contains(token) {
				bail!("proxy '{}': tileUrl must contain {token}", self.name);
			}
			if !self.key_template.contains(token) {
				bail!("proxy '{}': keyTemplate must contain {token}", self.name);
			}
		}

		for name in self.params.keys() {
			if RESERVED_TOKENS.contains(&name.as_str()) {
				bail!("proxy '{}': param name '{name}' collides with a reserved token", self.name);
			}
		}

		if !self.mem_enabled && !self.redis_enabled {
			bail!("proxy '{}': at least one cache tier (mem or redis) must be enabled", self.name);
		}

		if self.mem_enabled && self.mem_cap_mb == 0 {
			bail!("proxy '{}': memCapMB must be greater than zero when the memory tier is enabled", self.name);
		}

		if self.redis_enabled && self.redis_url.as_deref().unwrap_or("").is_empty() {
			bail!("proxy '{}': redisUrl is required when the redis tier is enabled", self.name);
		}

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn base() -> ProxyConfig {
		ProxyConfig {
			name: "streets".to_string(),
			tile_url: "http://up/{z}/{x}/{y}.pbf".to_string(),
			key_template: "{z}/{x}/{y}".to_string(),
			pull_headers: vec!["Content-Type".to_string()],
			delete_headers: vec![],
			add_headers: vec![],
			params: BTreeMap::new(),
			access_token: None,
			mem_enabled: true,
			mem_cap_mb: 64,
			mem_ttl: Duration::from_secs(3600),
			redis_enabled: false,
			redis_url: None,
			redis_ttl: Duration::from_secs(0),
			redis_tls: false,
			num_workers: 4,
			cors_origins: vec!["*".to_string()],
		}
	}

	#[test]
	fn valid_config_passes() {
		assert!(base().validate().is_ok());
	}

	#[test]
	fn rejects_bad_name() {
		let mut cfg = base();
		cfg.name = "bad name!".to_string();
		assert!(cfg.validate().is_err());
	}

	#[test]
	fn rejects_missing_coordinate_tokens() {
		let mut cfg = base();
		cfg.tile_url = "http://up/{x}/{y}.pbf".to_string();
		assert!(cfg.validate().is_err());
	}

	#[test]
	fn rejects_reserved_param_name() {
		let mut cfg = base();
		cfg.params.insert("z".to_string(), ParamDef::default());
		assert!(cfg.validate().is_err());
	}

	#[test]
	fn rejects_no_tier_enabled() {
		let mut cfg = base();
		cfg.mem_enabled = false;
		cfg.redis_enabled = false;
		assert!(cfg.validate().is_err());
	}

	#[test]
	fn rejects_redis_enabled_without_url() {
		let mut cfg = base();
		cfg.redis_enabled = true;
		cfg.redis_url = None;
		assert!(cfg.validate().is_err());
	}
}
