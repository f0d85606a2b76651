//! Redis-backed implementation of [`RemoteTier`].
//!
//! TTL semantics (§9 of the design notes): a zero `ttl` makes written keys
//! persistent (`SET` with no expiry, `GETEX PERSIST` on read); a non-zero
//! `ttl` is reapplied on every read via `GETEX ... EX seconds`, giving the
//! "extend on hit" behavior the two-tier cache relies on for already-hot
//! remote-only keys.

use crate::Blob;
use crate::cache::RemoteTier;
use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;

pub struct RedisTier {
	conn: ConnectionManager,
	ttl: Duration,
}

impl RedisTier {
	/// Connects to `url`. `ttl` of zero means written keys never expire.
	/// Callers pick the `redis://`/`rediss://` scheme based on `redisTls`
	/// before calling this — see [`crate::redis_url_for`].
	pub async fn connect(url: &str, ttl: Duration) -> Result<Self> {
		let client = redis::Client::open(url).with_context(|| format!("parsing redis url '{url}'"))?;
		let conn = client
			.get_connection_manager()
			.await
			.with_context(|| format!("connecting to redis at '{url}'"))?;
		Ok(Self { conn, ttl })
	}
}

#[async_trait]
impl RemoteTier for RedisTier {
	async fn get_extend(&self, key: &str) -> Result<Option<Blob>> {
		let mut conn = self.conn.clone();
		let bytes: Option<Vec<u8>> = if self.ttl.is_zero() {
			redis::cmd("GETEX")
				.arg(key)
				.arg("PERSIST")
				.query_async(&mut conn)
				.await
				.with_context(|| format!("GETEX PERSIST for key '{key}'"))?
		} else {
			redis::cmd("GETEX")
				.arg(key)
				.arg("EX")
				.arg(self.ttl.as_secs())
				.query_async(&mut conn)
				.await
				.with_context(|| format!("GETEX EX for key '{key}'"))?
		};
		Ok(bytes.map(Blob::from))
	}

	async fn set(&self, key: &str, value: &Blob) -> Result<()> {
		let mut conn = self.conn.clone();
		if self.ttl.is_zero() {
			conn.set::<_, _, ()>(key, value.as_slice())
				.await
				.with_context(|| format!("SET for key '{key}'"))?;
		} else {
			conn.set_ex::<_, _, ()>(key, value.as_slice(), self.ttl.as_secs())
				.await
				.with_context(|| format!("SET EX for key '{key}'"))?;
		}
		Ok(())
	}

	async fn delete(&self, key: &str) -> Result<()> {
		let mut conn = self.conn.clone();
		conn.del::<_, ()>(key).await.with_context(|| format!("DEL for key '{key}'"))?;
		Ok(())
	}
}

/// Rewrites `url`'s scheme to `rediss://` when `tls` is set and it isn't
/// already, or to `redis://` when it isn't set and the url was forced to
/// `rediss://`. Leaves any other scheme (e.g. `unix://`) untouched.
#[must_use]
pub fn redis_url_for(url: &str, tls: bool) -> String {
	if tls {
		if let Some(rest) = url.strip_prefix("redis://") {
			return format!("rediss://{rest}");
		}
	} else if let Some(rest) = url.strip_prefix("rediss://") {
		return format!("redis://{rest}");
	}
	url.to_string()
}

#[cfg(test)]
mod url_tests {
	use super::redis_url_for;

	#[test]
	fn upgrades_scheme_when_tls_enabled() {
		assert_eq!(redis_url_for("redis://cache:6379", true), "rediss://cache:6379");
	}

	#[test]
	fn downgrades_scheme_when_tls_disabled() {
		assert_eq!(redis_url_for("rediss://cache:6379", false), "redis://cache:6379");
	}

	#[test]
	fn leaves_other_schemes_alone() {
		assert_eq!(redis_url_for("unix:///tmp/redis.sock", true), "unix:///tmp/redis.sock");
	}
}
