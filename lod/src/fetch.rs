//! Upstream fetcher: a single shared `reqwest::Client` per process (§4.4),
//! analogous to how this crate's existing HTTP data readers keep one
//! client per reader.

use anyhow::{Context, Result};
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// The result of one upstream GET: status code, body bytes, and whatever
/// `pullHeaders` entries were present on the response.
#[derive(Clone, Debug)]
pub struct FetchOutcome {
	pub status: u16,
	pub body: Vec<u8>,
	pub pulled_headers: Vec<(Vec<u8>, Vec<u8>)>,
}

impl FetchOutcome {
	#[must_use]
	pub fn is_cacheable(&self) -> bool {
		(self.status == 200 && !self.body.is_empty()) || (self.status == 204 && self.body.is_empty())
	}
}

#[derive(Clone)]
pub struct UpstreamFetcher {
	client: reqwest::Client,
}

impl UpstreamFetcher {
	pub fn new() -> Result<Self> {
		let client = reqwest::Client::builder()
			.connect_timeout(CONNECT_TIMEOUT)
			.timeout(REQUEST_TIMEOUT)
			.build()
			.context("building upstream HTTP client")?;
		Ok(Self { client })
	}

	/// Performs the GET, injecting `add_headers` and pulling out
	/// `pull_headers` from the response. A transport or read error is
	/// returned as-is; status-code interpretation is the caller's job.
	pub async fn fetch(&self, url: &str, add_headers: &[(String, String)], pull_headers: &[String]) -> Result<FetchOutcome> {
		let mut request = self.client.get(url);
		for (name, value) in add_headers {
			request = request.header(name, value);
		}

		let response = request.send().await.with_context(|| format!("requesting upstream url '{url}'"))?;
		let status = response.status().as_u16();

		let mut pulled_headers = Vec::with_capacity(pull_headers.len());
		for name in pull_headers {
			if let Some(value) = response.headers().get(name) {
				pulled_headers.push((name.as_bytes().to_vec(), value.as_bytes().to_vec()));
			}
		}

		let body = response.bytes().await.with_context(|| format!("reading upstream response body from '{url}'"))?.to_vec();

		Ok(FetchOutcome { status, body, pulled_headers })
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use wiremock::matchers::{method, path};
	use wiremock::{Mock, MockServer, ResponseTemplate};

	#[tokio::test]
	async fn fetches_and_pulls_configured_headers() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/7/37/47.pbf"))
			.respond_with(ResponseTemplate::new(200).insert_header("content-type", "application/x-protobuf").set_body_bytes(b"tile-bytes".to_vec()))
			.mount(&server)
			.await;

		let fetcher = UpstreamFetcher::new().unwrap();
		let outcome = fetcher
			.fetch(&format!("{}/7/37/47.pbf", server.uri()), &[], &["Content-Type".to_string()])
			.await
			.unwrap();

		assert_eq!(outcome.status, 200);
		assert_eq!(outcome.body, b"tile-bytes");
		assert!(outcome.is_cacheable());
		assert_eq!(outcome.pulled_headers[0].1, b"application/x-protobuf");
	}

	#[tokio::test]
	async fn injects_add_headers() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/t"))
			.respond_with(ResponseTemplate::new(200).set_body_bytes(b"x".to_vec()))
			.mount(&server)
			.await;

		let fetcher = UpstreamFetcher::new().unwrap();
		let outcome = fetcher
			.fetch(&format!("{}/t", server.uri()), &[("X-Api-Key".to_string(), "secret".to_string())], &[])
			.await
			.unwrap();
		assert_eq!(outcome.status, 200);
	}

	#[tokio::test]
	async fn empty_204_is_cacheable() {
		let server = MockServer::start().await;
		Mock::given(method("GET")).and(path("/empty")).respond_with(ResponseTemplate::new(204)).mount(&server).await;

		let fetcher = UpstreamFetcher::new().unwrap();
		let outcome = fetcher.fetch(&format!("{}/empty", server.uri()), &[], &[]).await.unwrap();
		assert_eq!(outcome.status, 204);
		assert!(outcome.body.is_empty());
		assert!(outcome.is_cacheable());
	}

	#[tokio::test]
	async fn server_error_is_not_cacheable() {
		let server = MockServer::start().await;
		Mock::given(method("GET")).and(path("/boom")).respond_with(ResponseTemplate::new(500)).mount(&server).await;

		let fetcher = UpstreamFetcher::new().unwrap();
		let outcome = fetcher.fetch(&format!("{}/boom", server.uri()), &[], &[]).await.unwrap();
		assert!(!outcome.is_cacheable());
	}
}
