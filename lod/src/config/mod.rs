//! TOML configuration ingestion: environment-token substitution, duration
//! parsing, default resolution, and the `config-doc`/`config-check` CLI
//! subcommands' supporting types.

mod duration;
mod env;
mod loader;
mod toml_types;

pub use duration::parse_duration;
pub use env::substitute_env;
pub use loader::{AppConfig, max_entry_bytes};
pub use toml_types::{RawConfig, RawParamDef, RawProxyConfig, RawServerConfig};
