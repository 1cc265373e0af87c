//! Runtime configuration, resolved once from the environment by the builder.

use crate::prelude::*;

/// All tunables of the runtime. Defaults match the protocol's documented
/// values; every field can be overridden through an `AW_*` environment
/// variable (see `from_env`).
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
	/// Public base URI of this instance, without trailing slash
	/// (actor roots are `{base_uri}/{actor_id}`).
	pub base_uri: Box<str>,
	/// URN identifying this application, exchanged in trust handshakes and
	/// advertised under `/meta/type`.
	pub aw_type: Box<str>,
	/// Property names mirrored into the reverse-lookup table.
	pub indexed_properties: Vec<Box<str>>,
	/// Require a unique creator per actor on the factory.
	pub unique_creator: bool,
	/// Rewrite the creator to the `email` property once it exists.
	pub force_email_as_creator: bool,
	/// Enables `/devtest/*` and the `passphrase` token grant.
	pub devtest: bool,
	/// Deliver callbacks inside the request handler instead of a background
	/// task (serverless platforms freeze workers after responding).
	pub synchronous_callbacks: bool,

	// Fan-out
	pub fanout_concurrency: usize,
	pub max_high_granularity_bytes: usize,
	pub compression_threshold_bytes: usize,
	pub breaker_threshold: u32,
	pub breaker_cooldown_secs: i64,

	// Inbound callbacks
	pub max_pending: usize,
	pub gap_timeout_secs: i64,

	// Trust
	pub capabilities_ttl_secs: i64,

	// OAuth2 upstream identity providers
	pub google_client_id: Option<Box<str>>,
	pub google_client_secret: Option<Box<str>>,
	pub github_client_id: Option<Box<str>>,
	pub github_client_secret: Option<Box<str>>,

	/// Bearer token accepted on the app-level `/bot` callback.
	pub bot_token: Option<Box<str>>,
}

impl Default for RuntimeConfig {
	fn default() -> Self {
		Self {
			base_uri: "http://localhost:5000".into(),
			aw_type: "urn:actingweb:example.org:unconfigured".into(),
			indexed_properties: vec!["email".into(), "oauthId".into()],
			unique_creator: false,
			force_email_as_creator: false,
			devtest: false,
			synchronous_callbacks: false,
			fanout_concurrency: 10,
			max_high_granularity_bytes: 64 * 1024,
			compression_threshold_bytes: 1024,
			breaker_threshold: 5,
			breaker_cooldown_secs: 60,
			max_pending: 100,
			gap_timeout_secs: 5,
			capabilities_ttl_secs: 3600,
			google_client_id: None,
			google_client_secret: None,
			github_client_id: None,
			github_client_secret: None,
			bot_token: None,
		}
	}
}

fn env_str(name: &str) -> Option<Box<str>> {
	std::env::var(name).ok().filter(|v| !v.is_empty()).map(Into::into)
}

fn env_bool(name: &str) -> Option<bool> {
	std::env::var(name).ok().map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
	std::env::var(name).ok().and_then(|v| v.parse().ok())
}

impl RuntimeConfig {
	pub fn from_env() -> AwResult<Self> {
		let mut cfg = Self::default();

		if let Some(v) = env_str("AW_BASE_URI") {
			cfg.base_uri = v.trim_end_matches('/').into();
		}
		if let Some(v) = env_str("AW_TYPE") {
			cfg.aw_type = v;
		}
		if let Some(v) = env_str("AW_INDEXED_PROPERTIES") {
			cfg.indexed_properties = v.split(',').map(|s| s.trim().into()).collect();
		}
		if let Some(v) = env_bool("AW_UNIQUE_CREATOR") {
			cfg.unique_creator = v;
		}
		if let Some(v) = env_bool("AW_FORCE_EMAIL_AS_CREATOR") {
			cfg.force_email_as_creator = v;
		}
		if let Some(v) = env_bool("AW_DEVTEST") {
			cfg.devtest = v;
		}
		if let Some(v) = env_bool("AW_SYNCHRONOUS_CALLBACKS") {
			cfg.synchronous_callbacks = v;
		}
		if let Some(v) = env_parse("AW_FANOUT_CONCURRENCY") {
			cfg.fanout_concurrency = v;
		}
		if let Some(v) = env_parse("AW_MAX_HIGH_GRANULARITY_BYTES") {
			cfg.max_high_granularity_bytes = v;
		}
		if let Some(v) = env_parse("AW_COMPRESSION_THRESHOLD_BYTES") {
			cfg.compression_threshold_bytes = v;
		}
		if let Some(v) = env_parse("AW_BREAKER_THRESHOLD") {
			cfg.breaker_threshold = v;
		}
		if let Some(v) = env_parse("AW_BREAKER_COOLDOWN_SECS") {
			cfg.breaker_cooldown_secs = v;
		}
		if let Some(v) = env_parse("AW_MAX_PENDING") {
			cfg.max_pending = v;
		}
		if let Some(v) = env_parse("AW_GAP_TIMEOUT_SECS") {
			cfg.gap_timeout_secs = v;
		}
		if let Some(v) = env_parse("AW_CAPABILITIES_TTL_SECS") {
			cfg.capabilities_ttl_secs = v;
		}
		cfg.google_client_id = env_str("AW_OAUTH_GOOGLE_CLIENT_ID");
		cfg.google_client_secret = env_str("AW_OAUTH_GOOGLE_CLIENT_SECRET");
		cfg.github_client_id = env_str("AW_OAUTH_GITHUB_CLIENT_ID");
		cfg.github_client_secret = env_str("AW_OAUTH_GITHUB_CLIENT_SECRET");
		cfg.bot_token = env_str("AW_BOT_TOKEN");

		if cfg.base_uri.is_empty() {
			return Err(Error::ConfigError("AW_BASE_URI must not be empty".into()));
		}
		Ok(cfg)
	}

	/// Root URL of one actor on this instance.
	pub fn actor_root(&self, actor_id: &str) -> String {
		format!("{}/{}", self.base_uri, actor_id)
	}

	pub fn is_indexed(&self, name: &str) -> bool {
		self.indexed_properties.iter().any(|p| p.as_ref() == name)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_defaults() {
		let cfg = RuntimeConfig::default();
		assert_eq!(cfg.fanout_concurrency, 10);
		assert_eq!(cfg.max_high_granularity_bytes, 65536);
		assert_eq!(cfg.max_pending, 100);
		assert!(cfg.is_indexed("email"));
		assert!(!cfg.is_indexed("note"));
	}

	#[test]
	fn test_actor_root() {
		let cfg = RuntimeConfig::default();
		assert_eq!(cfg.actor_root("abc123"), "http://localhost:5000/abc123");
	}
}

// vim: ts=4
