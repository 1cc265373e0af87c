//! Error handling subsystem. Implements a custom Error type.

use axum::{Json, http::StatusCode, http::header, response::IntoResponse};

use crate::types::ErrorResponse;
use tracing::warn;

pub type AwResult<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
	// Core errors
	NotFound,
	PermissionDenied,
	Unauthorized,       // 401 - missing/invalid credential
	InvalidToken,       // 401 - bad OAuth2 bearer, adds WWW-Authenticate
	DbError,
	Parse,

	// Input validation and constraints
	ValidationError(String), // 400 - invalid input data
	Conflict(String),        // 409 - CAS exhausted, name collision, etc
	TrustState(String),      // 409 - illegal trust state transition
	RateLimited(u32),        // 429 - seconds until retry

	// Network and peers
	PeerUnavailable(String), // network failure / 5xx after retries
	PeerGone,                // peer answered 404 on /meta
	Timeout,

	// System and configuration
	ConfigError(String), // Missing or invalid configuration
	Internal(String),    // Internal invariant violations, for debugging

	// externals
	Io(std::io::Error),
}

impl From<std::io::Error> for Error {
	fn from(err: std::io::Error) -> Self {
		warn!("io error: {}", err);
		Self::Io(err)
	}
}

impl std::fmt::Display for Error {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		write!(f, "{:?}", self)
	}
}

impl std::error::Error for Error {}

impl Error {
	/// True for failures worth retrying with backoff (network weather,
	/// transient storage trouble). Permission and validation failures are not.
	pub fn is_retryable(&self) -> bool {
		matches!(self, Error::PeerUnavailable(_) | Error::Timeout | Error::DbError)
	}
}

impl IntoResponse for Error {
	fn into_response(self) -> axum::response::Response {
		let (status, code, message) = match self {
			Error::NotFound => (
				StatusCode::NOT_FOUND,
				"E-CORE-NOTFOUND",
				"Resource not found".to_string(),
			),
			Error::PermissionDenied => (
				StatusCode::FORBIDDEN,
				"E-AUTH-NOPERM",
				"You do not have permission to access this resource".to_string(),
			),
			Error::Unauthorized => (
				StatusCode::UNAUTHORIZED,
				"E-AUTH-UNAUTH",
				"Authentication required or invalid credential".to_string(),
			),
			Error::InvalidToken => {
				let body = ErrorResponse::new(
					"E-AUTH-TOKEN".into(),
					"The access token is expired, revoked, or malformed".into(),
				);
				return (
					StatusCode::UNAUTHORIZED,
					[(header::WWW_AUTHENTICATE, "Bearer error=\"invalid_token\"")],
					Json(body),
				)
					.into_response();
			}
			Error::ValidationError(msg) => (
				StatusCode::BAD_REQUEST,
				"E-VAL-INVALID",
				format!("Request validation failed: {}", msg),
			),
			Error::Conflict(msg) => (
				StatusCode::CONFLICT,
				"E-CORE-CONFLICT",
				format!("Resource conflict: {}", msg),
			),
			Error::TrustState(msg) => (
				StatusCode::CONFLICT,
				"E-TRUST-STATE",
				format!("Illegal trust state transition: {}", msg),
			),
			Error::RateLimited(secs) => {
				let body = ErrorResponse::new(
					"E-CORE-RATELIMIT".into(),
					"Too many pending callbacks, retry later".into(),
				);
				return (
					StatusCode::TOO_MANY_REQUESTS,
					[(header::RETRY_AFTER, secs.to_string())],
					Json(body),
				)
					.into_response();
			}
			Error::Timeout => (
				StatusCode::REQUEST_TIMEOUT,
				"E-NET-TIMEOUT",
				"Request timeout".to_string(),
			),
			Error::PeerUnavailable(_) => (
				StatusCode::BAD_GATEWAY,
				"E-PEER-UNAVAIL",
				"Peer actor is unreachable".to_string(),
			),
			Error::PeerGone => (
				StatusCode::BAD_GATEWAY,
				"E-PEER-GONE",
				"Peer actor no longer exists".to_string(),
			),
			// Server errors (5xx) - no message exposure for security
			Error::DbError => (
				StatusCode::INTERNAL_SERVER_ERROR,
				"E-CORE-DBERR",
				"Internal server error".to_string(),
			),
			Error::Internal(msg) => {
				warn!("internal error: {}", msg);
				(
					StatusCode::INTERNAL_SERVER_ERROR,
					"E-CORE-INTERNAL",
					"Internal server error".to_string(),
				)
			}
			Error::Parse => (
				StatusCode::INTERNAL_SERVER_ERROR,
				"E-CORE-PARSE",
				"Internal server error".to_string(),
			),
			Error::ConfigError(_) => (
				StatusCode::INTERNAL_SERVER_ERROR,
				"E-CONF-CFGERR",
				"Internal server error".to_string(),
			),
			Error::Io(_) => (
				StatusCode::INTERNAL_SERVER_ERROR,
				"E-SYS-IO",
				"Internal server error".to_string(),
			),
		};

		let error_response = ErrorResponse::new(code.to_string(), message);
		(status, Json(error_response)).into_response()
	}
}

impl From<std::num::ParseIntError> for Error {
	fn from(_err: std::num::ParseIntError) -> Self {
		warn!("parse int error: {}", _err);
		Error::Parse
	}
}

impl From<serde_json::Error> for Error {
	fn from(_err: serde_json::Error) -> Self {
		warn!("json error: {}", _err);
		Error::Parse
	}
}

impl From<axum::http::Error> for Error {
	fn from(_err: axum::http::Error) -> Self {
		warn!("http error: {}", _err);
		Error::PeerUnavailable("http error".into())
	}
}

impl From<axum::http::header::ToStrError> for Error {
	fn from(_err: axum::http::header::ToStrError) -> Self {
		warn!("header to str error: {}", _err);
		Error::Parse
	}
}

/// Helper macro for locking mutexes with automatic internal error handling.
///
/// Converts poisoning errors to `Error::Internal`, optionally adding context
/// about which mutex was poisoned:
///
/// ```ignore
/// let mut data = lock!(my_mutex)?;
/// let mut data = lock!(my_mutex, "pending_queue")?;
/// ```
#[macro_export]
macro_rules! lock {
	($mutex:expr) => {
		$mutex
			.lock()
			.map_err(|_| $crate::error::Error::Internal("mutex poisoned".into()))
	};
	($mutex:expr, $context:expr) => {
		$mutex
			.lock()
			.map_err(|_| $crate::error::Error::Internal(format!("mutex poisoned: {}", $context)))
	};
}

// vim: ts=4
