//! Decodes a TOML config file into the validated shapes the rest of the
//! binary depends on: env-token substitution, default resolution, and
//! `${PORT}`/`${MAX_ENTRY_SIZE}`/`LOD_ADMIN_TOKEN` environment overrides
//! (§6).

use super::duration::parse_duration;
use super::env::substitute_env;
use super::toml_types::RawConfig;
use anyhow::{Context, Result};
use lod_core::ProxyConfig;
use std::path::Path;
use std::time::Duration;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_IP: &str = "0.0.0.0";
const DEFAULT_MEM_TTL: &str = "1h";
const DEFAULT_REDIS_TTL: &str = "0s";
const DEFAULT_NUM_WORKERS: usize = 4;
const ALWAYS_PULLED_HEADERS: [&str; 2] = ["Content-Type", "Content-Encoding"];

/// The fully resolved, validated application configuration.
#[derive(Clone, Debug)]
pub struct AppConfig {
	pub ip: String,
	pub port: u16,
	pub admin_token: Option<String>,
	pub metrics_enabled: bool,
	/// Global per-entry byte cap override for every proxy's memory tier,
	/// from `MAX_ENTRY_SIZE` (megabytes). `None` means each proxy's
	/// memory tier allows a single entry as large as its whole budget.
	pub max_entry_size_mb: Option<u64>,
	pub proxies: Vec<ProxyConfig>,
}

impl AppConfig {
	/// Reads, env-substitutes, decodes, validates and defaults the config
	/// at `path`.
	pub fn from_path(path: &Path) -> Result<Self> {
		let text = std::fs::read_to_string(path).with_context(|| format!("reading config file '{}'", path.display()))?;
		Self::from_str(&text).with_context(|| format!("loading config file '{}'", path.display()))
	}

	/// Parses already-read config text. Exposed separately so tests don't
	/// need a file on disk.
	pub fn from_str(text: &str) -> Result<Self> {
		let substituted = substitute_env(text).context("substituting ${VAR} environment tokens")?;
		let raw: RawConfig = toml::from_str(&substituted).context("parsing TOML config")?;

		let mut proxies = Vec::with_capacity(raw.proxies.len());
		for raw_proxy in &raw.proxies {
			let name = raw_proxy.name.clone();
			let config = build_proxy_config(raw_proxy).with_context(|| format!("proxy '{name}'"))?;
			config.validate().with_context(|| format!("proxy '{name}'"))?;
			proxies.push(config);
		}

		let mut config = Self {
			ip: raw.server.ip.unwrap_or_else(|| DEFAULT_IP.to_string()),
			port: raw.server.port.unwrap_or(DEFAULT_PORT),
			admin_token: raw.admin_token,
			metrics_enabled: raw.metrics_enabled,
			max_entry_size_mb: None,
			proxies,
		};
		config.apply_env_overrides();
		Ok(config)
	}

	fn apply_env_overrides(&mut self) {
		if let Ok(port) = std::env::var("PORT") {
			if let Ok(port) = port.parse() {
				self.port = port;
			}
		}
		if let Ok(max_entry) = std::env::var("MAX_ENTRY_SIZE") {
			if let Ok(max_entry) = max_entry.parse() {
				self.max_entry_size_mb = Some(max_entry);
			}
		}
		if let Ok(admin_token) = std::env::var("LOD_ADMIN_TOKEN") {
			self.admin_token = Some(admin_token);
		}
	}
}

fn build_proxy_config(raw: &super::toml_types::RawProxyConfig) -> Result<ProxyConfig> {
	let mut pull_headers = raw.pull_headers.clone();
	for always in ALWAYS_PULLED_HEADERS {
		if !pull_headers.iter().any(|h| h.eq_ignore_ascii_case(always)) {
			pull_headers.push(always.to_string());
		}
	}

	let params = raw
		.params
		.iter()
		.map(|(name, def)| (name.clone(), lod_core::ParamDef { default: def.default.clone() }))
		.collect();

	let add_headers = raw.add_headers.iter().map(|(k, v)| (k.clone(), v.clone())).collect();

	let mem_ttl = parse_duration(raw.mem_ttl.as_deref().unwrap_or(DEFAULT_MEM_TTL)).context("mem_ttl")?;
	let redis_ttl = parse_duration(raw.redis_ttl.as_deref().unwrap_or(DEFAULT_REDIS_TTL)).context("redis_ttl")?;

	Ok(ProxyConfig {
		name: raw.name.clone(),
		tile_url: raw.tile_url.clone(),
		key_template: raw.key_template.clone(),
		pull_headers,
		delete_headers: raw.delete_headers.clone(),
		add_headers,
		params,
		access_token: raw.access_token.clone(),
		mem_enabled: raw.mem_enabled.unwrap_or(false),
		mem_cap_mb: raw.mem_cap_mb.unwrap_or(0),
		mem_ttl,
		redis_enabled: raw.redis_enabled.unwrap_or(false),
		redis_url: raw.redis_url.clone(),
		redis_ttl,
		redis_tls: raw.redis_tls.unwrap_or(false),
		num_workers: raw.num_workers.filter(|&n| n != 0).unwrap_or(DEFAULT_NUM_WORKERS),
		cors_origins: if raw.cors_origins.is_empty() { vec!["*".to_string()] } else { raw.cors_origins.clone() },
	})
}

/// The memory tier's per-entry byte cap for a given proxy, honoring the
/// `MAX_ENTRY_SIZE` override (§6).
#[must_use]
pub fn max_entry_bytes(app: &AppConfig, proxy: &ProxyConfig) -> u64 {
	let mb = app.max_entry_size_mb.unwrap_or(proxy.mem_cap_mb);
	mb * 1024 * 1024
}

#[cfg(test)]
mod tests {
	use super::*;

	const MINIMAL: &str = r#"
        [[proxy]]
        name = "streets"
        tile_url = "http://up/{z}/{x}/{y}.pbf"
        key_template = "{z}/{x}/{y}"
        mem_enabled = true
        mem_cap_mb = 64
    "#;

	#[test]
	fn defaults_resolve() {
		let cfg = AppConfig::from_str(MINIMAL).unwrap();
		assert_eq!(cfg.port, DEFAULT_PORT);
		assert_eq!(cfg.ip, DEFAULT_IP);
		let proxy = &cfg.proxies[0];
		assert_eq!(proxy.mem_ttl, Duration::from_secs(3600));
		assert_eq!(proxy.num_workers, DEFAULT_NUM_WORKERS);
		assert_eq!(proxy.cors_origins, vec!["*".to_string()]);
	}

	#[test]
	fn explicit_zero_num_workers_falls_back_to_default() {
		let toml = r#"
            [[proxy]]
            name = "streets"
            tile_url = "http://up/{z}/{x}/{y}.pbf"
            key_template = "{z}/{x}/{y}"
            mem_enabled = true
            mem_cap_mb = 64
            num_workers = 0
        "#;
		let cfg = AppConfig::from_str(toml).unwrap();
		assert_eq!(cfg.proxies[0].num_workers, DEFAULT_NUM_WORKERS);
	}

	#[test]
	fn always_pulls_content_headers() {
		let cfg = AppConfig::from_str(MINIMAL).unwrap();
		let pulled = &cfg.proxies[0].pull_headers;
		assert!(pulled.iter().any(|h| h.eq_ignore_ascii_case("Content-Type")));
		assert!(pulled.iter().any(|h| h.eq_ignore_ascii_case("Content-Encoding")));
	}

	#[test]
	fn rejects_invalid_proxy_config() {
		let toml = r#"
            [[proxy]]
            name = "streets"
            tile_url = "http://up/{x}/{y}.pbf"
            key_template = "{z}/{x}/{y}"
            mem_enabled = true
            mem_cap_mb = 64
        "#;
		assert!(AppConfig::from_str(toml).is_err());
	}

	#[test]
	fn missing_env_var_fails_load() {
		unsafe { std::env::remove_var("LOD_TEST_LOADER_MISSING") };
		let toml = r#"
            [[proxy]]
            name = "streets"
            tile_url = "http://up/{z}/{x}/{y}.pbf"
            key_template = "{z}/{x}/{y}"
            redis_enabled = true
            redis_url = "${LOD_TEST_LOADER_MISSING}"
        "#;
		assert!(AppConfig::from_str(toml).is_err());
	}

	#[test]
	fn port_env_override_applies() {
		unsafe { std::env::set_var("PORT", "9999") };
		let cfg = AppConfig::from_str(MINIMAL).unwrap();
		assert_eq!(cfg.port, 9999);
		unsafe { std::env::remove_var("PORT") };
	}
}
