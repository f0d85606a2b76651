//! Key/URL templater: substitutes `{z}`, `{x}`, `{y}`, `{e}`, and named
//! parameter tokens into a proxy's `tileUrl` and `keyTemplate` strings.
//!
//! This module only deals with string substitution; it knows nothing about
//! HTTP or query-string encoding. The `lod` binary crate builds the final
//! upstream URL by substituting the `tileUrl` template with [`substitute`]
//! and then appending any recognized parameters the template didn't
//! reference as a URL-encoded query string (§4.3 of the design).

use std::collections::{BTreeMap, BTreeSet};

/// The tile coordinate plus the optional dynamic endpoint and recognized
/// parameter values a request contributes to template substitution.
pub struct RequestContext<'a> {
	pub z: u8,
	pub x: u32,
	pub y: u32,
	pub endpoint: Option<&'a str>,
	pub params: &'a BTreeMap<String, String>,
}

/// Substitutes every `{z}`, `{x}`, `{y}`, `{e}`, and recognized `{name}`
/// token in `template`. Tokens that don't name a reserved coordinate or a
/// key of `ctx.params` are left untouched — config validation is
/// responsible for ensuring templates only reference known tokens.
#[must_use]
pub fn substitute(template: &str, ctx: &RequestContext) -> String {
	let mut out = String::with_capacity(template.len());
	let mut rest = template;
	while let Some(start) = rest.find('{') {
		let Some(end) = rest[start..].find('}') else {
			out.push_str(rest);
			return out;
		};
		let end = start + end;
		out.push_str(&rest[..start]);
		let name = &rest[start + 1..end];
		match name {
			"z" => out.push_str(&ctx.z.to_string()),
			"x" => out.push_str(&ctx.x.to_string()),
			"y" => out.push_str(&ctx.y.to_string()),
			"e" => out.push_str(ctx.endpoint.unwrap_or("")),
			name => {
				if let Some(value) = ctx.params.get(name) {
					out.push_str(value);
				} else {
					out.push('{');
					out.push_str(name);
					out.push('}');
				}
			}
		}
		rest = &rest[end + 1..];
	}
	out.push_str(rest);
	out
}

/// Builds the cache key for a request: `keyTemplate` with every reserved
/// and recognized token substituted. A `keyTemplate` that never mentions a
/// given `{name}` simply never includes that parameter's value in the
/// resulting key — this is the documented knob for widening cache
/// granularity (§4.3, §9).
#[must_use]
pub fn build_key(key_template: &str, ctx: &RequestContext) -> String {
	substitute(key_template, ctx)
}

/// Every `{name}` token appearing in `template`, reserved or not. Used by
/// the URL builder to figure out which recognized parameters the template
/// didn't consume, so they can be appended as a query string instead.
#[must_use]
pub fn tokens_in(template: &str) -> BTreeSet<String> {
	let mut tokens = BTreeSet::new();
	let mut rest = template;
	while let Some(start) = rest.find('{') {
		let Some(end) = rest[start..].find('}') else { break };
		let end = start + end;
		tokens.insert(rest[start + 1..end].to_string());
		rest = &rest[end + 1..];
	}
	tokens
}
