//! Parses the `ns|us|ms|s|m|h` duration suffix grammar used by every
//! duration-valued config field (§6).

use anyhow::{Context, Result, bail};
use std::time::Duration;

/// Parses strings like `"500ms"`, `"1h"`, `"0s"` into a [`Duration`].
pub fn parse_duration(input: &str) -> Result<Duration> {
	let input = input.trim();
	let split_at = input
		.find(|c: char| !c.is_ascii_digit())
		.with_context(|| format!("duration '{input}' has no unit (expected ns|us|ms|s|m|h)"))?;
	let (number, unit) = input.split_at(split_at);
	let n: u64 = number.parse().with_context(|| format!("invalid duration '{input}'"))?;

	let duration = match unit {
		"ns" => Duration::from_nanos(n),
		"us" => Duration::from_micros(n),
		"ms" => Duration::from_millis(n),
		"s" => Duration::from_secs(n),
		"m" => Duration::from_secs(n * 60),
		"h" => Duration::from_secs(n * 3600),
		other => bail!("unknown duration unit '{other}' in '{input}' (expected ns|us|ms|s|m|h)"),
	};
	Ok(duration)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_every_unit() {
		assert_eq!(parse_duration("10ns").unwrap(), Duration::from_nanos(10));
		assert_eq!(parse_duration("10us").unwrap(), Duration::from_micros(10));
		assert_eq!(parse_duration("10ms").unwrap(), Duration::from_millis(10));
		assert_eq!(parse_duration("10s").unwrap(), Duration::from_secs(10));
		assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
		assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
	}

	#[test]
	fn zero_is_valid() {
		assert_eq!(parse_duration("0s").unwrap(), Duration::from_secs(0));
	}

	#[test]
	fn rejects_unknown_unit() {
		assert!(parse_duration("10x").is_err());
	}

	#[test]
	fn rejects_missing_unit() {
		assert!(parse_duration("10").is_err());
	}

	#[test]
	fn rejects_non_numeric() {
		assert!(parse_duration("abc").is_err());
	}
}
