#![allow(dead_code, unused_variables)]

mod args;
mod config_doc;

use crate::{args::*, config_doc::*};
use proc_macro::TokenStream;
use proc_macro2::{Ident, Span};
use quote::{ToTokens, quote};
use syn::{Fields, parse_macro_input, spanned::Spanned};

/// Derives a `md()` associated function that renders a field reference table
/// from a struct's doc comments, for config structs decoded from TOML.
#[proc_macro_derive(ConfigDoc, attributes(config))]
pub fn derive_config_doc(input: TokenStream) -> TokenStream {
	let input = parse_macro_input!(input as syn::DeriveInput);
	let name = &input.ident;

	let struct_doc = collect_doc(&input.attrs);

	let data = match &input.data {
		syn::Data::Struct(ds) => ds,
		_ => {
			return syn::Error::new(
				input.span(),
				"ConfigDoc can only be derived for structs with named fields",
			)
			.to_compile_error()
			.into();
		}
	};

	let fields = match &data.fields {
		Fields::Named(named) => &named.named,
		_ => {
			return syn::Error::new(
				data.struct_token.span(),
				"ConfigDoc requires a struct with named fields",
			)
			.to_compile_error()
			.into();
		}
	};

	struct Row {
		key: String,
		ty_tokens: String,
		doc: String,
		is_option: bool,
	}

	let rows: Vec<Row> = fields
		.iter()
		.map(|f| {
			let ident = f.ident.clone().expect("named field");
			let key = serde_rename(&f.attrs).unwrap_or_else(|| ident.to_string());
			Row {
				key,
				ty_tokens: f.ty.to_token_stream().to_string(),
				doc: collect_doc(&f.attrs),
				is_option: is_option(&f.ty),
			}
		})
		.collect();

	let keys: Vec<_> = rows.iter().map(|r| r.key.as_str()).collect();
	let tys: Vec<_> = rows.iter().map(|r| r.ty_tokens.as_str()).collect();
	let docs: Vec<_> = rows.iter().map(|r| r.doc.as_str()).collect();
	let optionals: Vec<_> = rows.iter().map(|r| if r.is_option { "yes" } else { "no" }).collect();
	let struct_doc = struct_doc.as_str();

	let expanded = quote! {
		impl #name {
			/// Renders a markdown reference table for this config struct's fields.
			pub fn md() -> String {
				let mut s = String::new();
				s.push_str(&format!("# {}\n\n", stringify!(#name)));
				if !#struct_doc.is_empty() {
					s.push_str(#struct_doc);
					s.push_str("\n\n");
				}
				s.push_str("| Key | Type | Optional | Description |\n");
				s.push_str("| --- | ---- | -------- | ----------- |\n");
				#( {
					s.push_str("| `");
					s.push_str(#keys);
					s.push_str("` | `");
					s.push_str(#tys);
					s.push_str("` | ");
					s.push_str(#optionals);
					s.push_str(" | ");
					if !#docs.is_empty() {
						s.push_str(#docs);
					} else {
						s.push_str("—");
					}
					s.push_str(" |\n");
				} )*
				s
			}
		}
	};

	TokenStream::from(expanded)
}

/// Wraps a fallible function body so any returned error gains a formatted
/// context message, via `anyhow::Context`. Works on both sync and async
/// functions returning `anyhow::Result<_>`.
#[proc_macro_attribute]
pub fn context(args: TokenStream, input: TokenStream) -> TokenStream {
	let Args(move_token, format_args) = parse_macro_input!(args);
	let mut input = parse_macro_input!(input as syn::ItemFn);

	let body = &input.block;
	let return_type = &input.sig.output;
	let err = Ident::new("err", Span::mixed_site());

	let new_body = if input.sig.asyncness.is_some() {
		let return_type = match return_type {
			syn::ReturnType::Default => {
				return syn::Error::new_spanned(input, "function should return Result")
					.to_compile_error()
					.into();
			}
			syn::ReturnType::Type(_, return_type) => return_type,
		};
		let result = Ident::new("result", Span::mixed_site());
		quote! {
			let #result: #return_type = async #move_token { #body }.await;
			#result.map_err(|#err| #err.context(format!(#format_args)).into())
		}
	} else {
		let force_fn_once = Ident::new("force_fn_once", Span::mixed_site());
		quote! {
			// Moving a non-`Copy` value into the closure tells borrowck to always treat the closure
			// as a `FnOnce`, preventing some borrowing errors.
			let #force_fn_once = ::core::iter::empty::<()>();
			(#move_token || #return_type {
				::core::mem::drop(#force_fn_once);
				#body
			})().map_err(|#err| #err.context(format!(#format_args)).into())
		}
	};
	input.block.stmts = vec![syn::Stmt::Expr(syn::Expr::Verbatim(new_body), None)];

	input.into_token_stream().into()
}
