//! Expands `${VAR}` / `${VAR:-default}` tokens against the process
//! environment, run over the raw TOML source text before it is parsed
//! (§6, §9 S7).

use anyhow::{Result, bail};

/// Replaces every `${NAME}` or `${NAME:-default}` token in `input` with the
/// corresponding environment variable. A token with no default whose
/// variable is unset is a hard error — the caller should never silently
/// embed the literal `${NAME}` string into a config value such as a Redis
/// URL.
pub fn substitute_env(input: &str) -> Result<String> {
	let mut out = String::with_capacity(input.len());
	let mut rest = input;

	while let Some(start) = rest.find("${") {
		out.push_str(&rest[..start]);
		let after = &rest[start + 2..];
		let Some(end) = after.find('}') else {
			bail!("unterminated \"${{\" in config");
		};
		let token = &after[..end];
		let (name, default) = match token.split_once(":-") {
			Some((name, default)) => (name, Some(default)),
			None => (token, None),
		};

		let value = match std::env::var(name) {
			Ok(value) => value,
			Err(_) => match default {
				Some(default) => default.to_string(),
				None => bail!("environment variable '{name}' referenced by config is not set"),
			},
		};
		out.push_str(&value);
		rest = &after[end + 1..];
	}

	out.push_str(rest);
	Ok(out)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn substitutes_set_variable() {
		unsafe { std::env::set_var("LOD_TEST_ENV_A", "hello") };
		assert_eq!(substitute_env("value = \"${LOD_TEST_ENV_A}\"").unwrap(), "value = \"hello\"");
		unsafe { std::env::remove_var("LOD_TEST_ENV_A") };
	}

	#[test]
	fn falls_back_to_default_when_unset() {
		unsafe { std::env::remove_var("LOD_TEST_ENV_B") };
		assert_eq!(substitute_env("x = \"${LOD_TEST_ENV_B:-fallback}\"").unwrap(), "x = \"fallback\"");
	}

	#[test]
	fn fails_when_unset_and_no_default() {
		unsafe { std::env::remove_var("LOD_TEST_ENV_C") };
		let err = substitute_env("x = \"${LOD_TEST_ENV_C}\"").unwrap_err();
		assert!(err.to_string().contains("LOD_TEST_ENV_C"));
	}

	#[test]
	fn leaves_plain_text_untouched() {
		assert_eq!(substitute_env("name = \"streets\"").unwrap(), "name = \"streets\"");
	}

	#[test]
	fn substitutes_multiple_tokens() {
		unsafe { std::env::set_var("LOD_TEST_ENV_D", "a") };
		unsafe { std::env::set_var("LOD_TEST_ENV_E", "b") };
		assert_eq!(substitute_env("${LOD_TEST_ENV_D}-${LOD_TEST_ENV_E}").unwrap(), "a-b");
		unsafe { std::env::remove_var("LOD_TEST_ENV_D") };
		unsafe { std::env::remove_var("LOD_TEST_ENV_E") };
	}
}
