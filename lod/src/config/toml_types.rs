//! Raw TOML shape of the config file, decoded before env-token
//! substitution has been resolved into final values. `ConfigDoc` renders
//! the `config-doc` CLI subcommand's markdown reference table.

use lod_derive::ConfigDoc;
use serde::Deserialize;
use std::collections::BTreeMap;

/// Top-level config file: server listen settings, the admin surface, and
/// the list of configured proxies.
#[derive(Clone, Debug, Default, Deserialize, ConfigDoc)]
#[serde(deny_unknown_fields)]
pub struct RawConfig {
	#[serde(default)]
	pub server: RawServerConfig,

	/// Bearer token required on every `/admin/*` request. Overridden by
	/// `LOD_ADMIN_TOKEN` if that environment variable is set.
	#[serde(default)]
	pub admin_token: Option<String>,

	/// Enables `GET /admin/metrics/prometheus`.
	#[serde(default)]
	pub metrics_enabled: bool,

	#[serde(default, rename = "proxy")]
	pub proxies: Vec<RawProxyConfig>,
}

/// HTTP listen address.
#[derive(Clone, Debug, Default, Deserialize, ConfigDoc)]
#[serde(deny_unknown_fields)]
pub struct RawServerConfig {
	/// Bind address. Defaults to `0.0.0.0`.
	#[serde(default)]
	pub ip: Option<String>,

	/// Listen port. Defaults to `8080`; overridden by `PORT`.
	#[serde(default)]
	pub port: Option<u16>,
}

/// A recognized query parameter and its default value.
#[derive(Clone, Debug, Default, Deserialize, ConfigDoc)]
#[serde(deny_unknown_fields)]
pub struct RawParamDef {
	pub default: Option<String>,
}

/// One `[[proxy]]` table.
#[derive(Clone, Debug, Deserialize, ConfigDoc)]
#[serde(deny_unknown_fields)]
pub struct RawProxyConfig {
	/// Path prefix this proxy is served under: `/{name}/...`.
	pub name: String,

	/// Upstream URL template; must contain `{z}{x}{y}`.
	pub tile_url: String,

	/// Cache-key template; must contain `{z}{x}{y}`.
	pub key_template: String,

	/// Upstream response headers copied into the cached `TilePacket`.
	/// `Content-Type` and `Content-Encoding` are always included.
	#[serde(default)]
	pub pull_headers: Vec<String>,

	/// Headers stripped from the client-facing response only (the cached
	/// packet keeps the original upstream header set).
	#[serde(default)]
	pub delete_headers: Vec<String>,

	/// Headers injected into every upstream request.
	#[serde(default)]
	pub add_headers: BTreeMap<String, String>,

	/// Recognized query parameters, by name.
	#[serde(default)]
	pub params: BTreeMap<String, RawParamDef>,

	/// Required `?token=` value for this proxy's endpoints. Unset disables
	/// the check.
	#[serde(default)]
	pub access_token: Option<String>,

	#[serde(default)]
	pub mem_enabled: Option<bool>,

	/// Memory tier byte budget, in megabytes.
	#[serde(default)]
	pub mem_cap_mb: Option<u64>,

	/// Memory tier time-to-idle. Defaults to `1h`.
	#[serde(default)]
	pub mem_ttl: Option<String>,

	#[serde(default)]
	pub redis_enabled: Option<bool>,

	/// `redis://` or `rediss://` connection URL; typically an
	/// `${VAR}`-substituted secret.
	#[serde(default)]
	pub redis_url: Option<String>,

	/// Redis key TTL. `0s` (the default) means entries never expire.
	#[serde(default)]
	pub redis_ttl: Option<String>,

	#[serde(default)]
	pub redis_tls: Option<bool>,

	/// Bulk-prime worker pool size. Defaults to 4.
	#[serde(default)]
	pub num_workers: Option<usize>,

	/// CORS origin patterns: `*`, `prefix*`, `*suffix`, `/regex/`, or an
	/// exact origin string.
	#[serde(default)]
	pub cors_origins: Vec<String>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn decodes_minimal_proxy() {
		let toml = r#"
            [[proxy]]
            name = "streets"
            tile_url = "http://up/{z}/{x}/{y}.pbf"
            key_template = "{z}/{x}/{y}"
            mem_enabled = true
            mem_cap_mb = 64
        "#;
		let cfg: RawConfig = toml::from_str(toml).unwrap();
		assert_eq!(cfg.proxies.len(), 1);
		assert_eq!(cfg.proxies[0].name, "streets");
	}

	#[test]
	fn rejects_unknown_field() {
		let toml = r#"
            [[proxy]]
            name = "streets"
            tile_url = "http://up/{z}/{x}/{y}.pbf"
            key_template = "{z}/{x}/{y}"
            bogus_field = true
        "#;
		assert!(toml::from_str::<RawConfig>(toml).is_err());
	}
}
