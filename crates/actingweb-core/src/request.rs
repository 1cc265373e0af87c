//! Outbound peer HTTP client.
//!
//! All peer-to-peer traffic (trust handshakes, subscription management,
//! callback delivery, capability fetches) and the OAuth2 upstream exchanges
//! go through this client. Requests carry an `X-Parent-Request-ID` header
//! when a request id is in scope, and bodies over the compression threshold
//! can be gzip-encoded for peers that advertise support.

use flate2::{Compression, write::GzEncoder};
use http_body_util::{BodyExt, Empty, Full, combinators::BoxBody};
use hyper::http::{HeaderMap, StatusCode};
use hyper::{Method, body::Body, body::Bytes};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::{Client, connect::HttpConnector};
use hyper_util::rt::TokioExecutor;
use serde::{Serialize, de::DeserializeOwned};
use std::io::Write;
use std::time::Duration;
use tokio::time::timeout;

use crate::prelude::*;
use actingweb_types::utils::mask_token;

/// Connect timeout for new peer connections.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Overall timeout for one request including body collection.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

fn to_boxed<B>(body: B) -> BoxBody<Bytes, Error>
where
	B: Body<Data = Bytes> + Send + Sync + 'static,
	B::Error: Send + 'static,
{
	body.map_err(|_err| Error::PeerUnavailable("body stream error".into())).boxed()
}

/// Extra headers applied to one outbound request.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta<'a> {
	pub bearer: Option<&'a str>,
	pub parent_request_id: Option<&'a str>,
}

/// Raw outcome of a callback delivery, interpreted by the fan-out manager.
#[derive(Debug, Clone)]
pub struct DeliveryOutcome {
	pub status: u16,
	pub retry_after: Option<u32>,
}

impl DeliveryOutcome {
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}
}

#[derive(Clone)]
pub struct PeerClient {
	client: Client<HttpsConnector<HttpConnector>, BoxBody<Bytes, Error>>,
}

impl std::fmt::Debug for PeerClient {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("PeerClient").finish_non_exhaustive()
	}
}

impl PeerClient {
	pub fn new() -> AwResult<Self> {
		let mut http = HttpConnector::new();
		http.set_connect_timeout(Some(CONNECT_TIMEOUT));
		http.enforce_http(false);

		let connector = HttpsConnectorBuilder::new()
			.with_native_roots()
			.map_err(|_| Error::ConfigError("no native root CA certificates found".into()))?
			.https_or_http()
			.enable_http1()
			.wrap_connector(http);

		Ok(PeerClient { client: Client::builder(TokioExecutor::new()).build(connector) })
	}

	/// Execute an HTTP request with timeout wrapper
	async fn timed_request(
		&self,
		req: hyper::Request<BoxBody<Bytes, Error>>,
	) -> AwResult<hyper::Response<hyper::body::Incoming>> {
		timeout(REQUEST_TIMEOUT, self.client.request(req)).await.map_err(|_| Error::Timeout)?.map_err(
			|err| {
				warn!("peer request failed: {}", err);
				Error::PeerUnavailable("connection failed".into())
			},
		)
	}

	/// Collect response body with timeout
	async fn collect_body(body: hyper::body::Incoming) -> AwResult<Bytes> {
		timeout(REQUEST_TIMEOUT, body.collect())
			.await
			.map_err(|_| Error::Timeout)?
			.map_err(|_| Error::PeerUnavailable("body collection error".into()))
			.map(|collected| collected.to_bytes())
	}

	fn builder(
		method: Method,
		url: &str,
		meta: &RequestMeta<'_>,
	) -> hyper::http::request::Builder {
		let mut builder = hyper::Request::builder()
			.method(method)
			.uri(url)
			.header("User-Agent", concat!("actingweb-rs/", env!("CARGO_PKG_VERSION")));
		if let Some(bearer) = meta.bearer {
			builder = builder.header("Authorization", format!("Bearer {}", bearer));
		}
		if let Some(req_id) = meta.parent_request_id {
			builder = builder.header("X-Parent-Request-ID", req_id);
		}
		builder
	}

	fn map_status<T>(status: StatusCode, ok: T) -> AwResult<T> {
		match status {
			s if s.is_success() => Ok(ok),
			StatusCode::NOT_FOUND => Err(Error::NotFound),
			StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => Err(Error::PermissionDenied),
			s if s.is_server_error() => {
				Err(Error::PeerUnavailable(format!("peer returned {}", s)))
			}
			s => Err(Error::ValidationError(format!("unexpected HTTP status: {}", s))),
		}
	}

	pub async fn get_json<Res>(&self, url: &str, meta: &RequestMeta<'_>) -> AwResult<Res>
	where
		Res: DeserializeOwned,
	{
		let req = Self::builder(Method::GET, url, meta).body(to_boxed(Empty::new()))?;
		let res = self.timed_request(req).await?;
		let status = res.status();
		let body = Self::collect_body(res.into_body()).await?;
		Self::map_status(status, ())?;
		Ok(serde_json::from_slice(&body)?)
	}

	/// GET returning the raw body. Used for baseline fetches and
	/// low-granularity callback resolution where the payload is opaque.
	pub async fn get_raw(&self, url: &str, meta: &RequestMeta<'_>) -> AwResult<Bytes> {
		let req = Self::builder(Method::GET, url, meta).body(to_boxed(Empty::new()))?;
		let res = self.timed_request(req).await?;
		let status = res.status();
		let body = Self::collect_body(res.into_body()).await?;
		Self::map_status(status, ())?;
		Ok(body)
	}

	pub async fn post_json<Req, Res>(
		&self,
		url: &str,
		data: &Req,
		meta: &RequestMeta<'_>,
	) -> AwResult<Res>
	where
		Req: Serialize,
		Res: DeserializeOwned,
	{
		let json = serde_json::to_vec(data)?;
		let req = Self::builder(Method::POST, url, meta)
			.header("Content-Type", "application/json")
			.body(to_boxed(Full::from(json)))?;
		let res = self.timed_request(req).await?;
		let status = res.status();
		let body = Self::collect_body(res.into_body()).await?;
		Self::map_status(status, ())?;
		if body.is_empty() {
			return serde_json::from_slice(b"null").map_err(Into::into);
		}
		Ok(serde_json::from_slice(&body)?)
	}

	/// POST whose response body is irrelevant; only the status matters.
	pub async fn post_status<Req>(
		&self,
		url: &str,
		data: &Req,
		meta: &RequestMeta<'_>,
	) -> AwResult<StatusCode>
	where
		Req: Serialize,
	{
		let json = serde_json::to_vec(data)?;
		let req = Self::builder(Method::POST, url, meta)
			.header("Content-Type", "application/json")
			.body(to_boxed(Full::from(json)))?;
		let res = self.timed_request(req).await?;
		Ok(res.status())
	}

	pub async fn put_json<Req>(&self, url: &str, data: &Req, meta: &RequestMeta<'_>) -> AwResult<()>
	where
		Req: Serialize,
	{
		let json = serde_json::to_vec(data)?;
		let req = Self::builder(Method::PUT, url, meta)
			.header("Content-Type", "application/json")
			.body(to_boxed(Full::from(json)))?;
		let res = self.timed_request(req).await?;
		Self::map_status(res.status(), ())
	}

	pub async fn delete(&self, url: &str, meta: &RequestMeta<'_>) -> AwResult<()> {
		let req = Self::builder(Method::DELETE, url, meta).body(to_boxed(Empty::new()))?;
		let res = self.timed_request(req).await?;
		Self::map_status(res.status(), ())
	}

	/// Form-encoded POST against an upstream OAuth2 token endpoint.
	pub async fn post_form<Res>(&self, url: &str, params: &[(&str, &str)]) -> AwResult<Res>
	where
		Res: DeserializeOwned,
	{
		let body = serde_urlencoded::to_string(params)
			.map_err(|_| Error::ValidationError("form encoding failed".into()))?;
		let req = hyper::Request::builder()
			.method(Method::POST)
			.uri(url)
			.header("Content-Type", "application/x-www-form-urlencoded")
			.header("Accept", "application/json")
			.body(to_boxed(Full::from(Bytes::from(body))))?;
		let res = self.timed_request(req).await?;
		let status = res.status();
		let body = Self::collect_body(res.into_body()).await?;
		Self::map_status(status, ())?;
		Ok(serde_json::from_slice(&body)?)
	}

	/// Deliver one callback payload. Never maps statuses to errors; the
	/// fan-out manager interprets the outcome (breaker, retention, backoff).
	pub async fn deliver_callback(
		&self,
		url: &str,
		payload: Bytes,
		gzip: bool,
		downgraded: bool,
		meta: &RequestMeta<'_>,
	) -> AwResult<DeliveryOutcome> {
		let mut builder = Self::builder(Method::POST, url, meta)
			.header("Content-Type", "application/json");
		if downgraded {
			builder = builder.header("X-ActingWeb-Granularity-Downgraded", "true");
		}

		let body = if gzip {
			let mut encoder = GzEncoder::new(Vec::with_capacity(payload.len() / 2), Compression::default());
			encoder.write_all(&payload)?;
			builder = builder.header("Content-Encoding", "gzip");
			Bytes::from(encoder.finish()?)
		} else {
			payload
		};

		let req = builder.body(to_boxed(Full::from(body)))?;
		let res = self.timed_request(req).await?;
		let status = res.status();
		let retry_after = parse_retry_after(res.headers());
		debug!(
			"callback delivery to {} -> {} (auth {})",
			url,
			status,
			meta.bearer.map(mask_token).unwrap_or_default()
		);
		Ok(DeliveryOutcome { status: status.as_u16(), retry_after })
	}
}

fn parse_retry_after(headers: &HeaderMap) -> Option<u32> {
	headers.get("Retry-After").and_then(|v| v.to_str().ok()).and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_retry_after_parse() {
		let mut headers = HeaderMap::new();
		headers.insert("Retry-After", "30".parse().unwrap());
		assert_eq!(parse_retry_after(&headers), Some(30));
		headers.insert("Retry-After", "soon".parse().unwrap());
		assert_eq!(parse_retry_after(&headers), None);
	}

	#[test]
	fn test_outcome_success() {
		assert!(DeliveryOutcome { status: 204, retry_after: None }.is_success());
		assert!(!DeliveryOutcome { status: 429, retry_after: Some(5) }.is_success());
	}
}

// vim: ts=4
