//! Adapter that manages and stores OAuth2 server state: client registrations,
//! authorization codes, access tokens, and refresh tokens, together with the
//! request-scoped authentication context types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::fmt::Debug;

use crate::{error::AwResult, types::Timestamp};

pub const ACCESS_TOKEN_EXPIRY: i64 = 3600;
pub const REFRESH_TOKEN_EXPIRY: i64 = 30 * 24 * 3600;
pub const AUTH_CODE_EXPIRY: i64 = 600;

/// Who is making the request, established by the authentication pipeline.
#[derive(Clone, Debug)]
pub enum Accessor {
	/// Creator basic auth (or trustee). Bypasses permission evaluation.
	Owner { creator: Box<str> },
	/// Peer bearer auth via a trust secret.
	Peer { peer_id: Box<str>, relationship: Box<str> },
	/// OAuth2 bearer auth via an access token bound to a trust.
	Client { client_id: Box<str>, peer_id: Box<str>, relationship: Box<str> },
}

impl Accessor {
	pub fn kind(&self) -> &'static str {
		match self {
			Self::Owner { .. } => "owner",
			Self::Peer { .. } => "peer",
			Self::Client { .. } => "client",
		}
	}

	pub fn is_owner(&self) -> bool {
		matches!(self, Self::Owner { .. })
	}

	/// The peer id whose trust governs this accessor, if any.
	pub fn peer_id(&self) -> Option<&str> {
		match self {
			Self::Owner { .. } => None,
			Self::Peer { peer_id, .. } | Self::Client { peer_id, .. } => Some(peer_id),
		}
	}

	pub fn relationship(&self) -> Option<&str> {
		match self {
			Self::Owner { .. } => None,
			Self::Peer { relationship, .. } | Self::Client { relationship, .. } => {
				Some(relationship)
			}
		}
	}
}

/// Context struct for an authenticated request against one actor.
#[derive(Clone, Debug)]
pub struct AuthCtx {
	pub actor_id: Box<str>,
	pub accessor: Accessor,
}

// OAuth2 rows
//*************

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ClientRecord {
	pub client_id: Box<str>,
	pub client_secret: Box<str>,
	pub client_name: Box<str>,
	pub client_version: Option<Box<str>>,
	pub client_platform: Option<Box<str>>,
	pub redirect_uris: Vec<Box<str>>,
	pub trust_type: Box<str>,
	pub created_at: Timestamp,
}

#[derive(Debug, Clone)]
pub struct AuthCodeRecord {
	pub code: Box<str>,
	pub client_id: Box<str>,
	pub actor_id: Box<str>,
	pub peer_id: Box<str>,
	pub redirect_uri: Box<str>,
	pub code_challenge: Option<Box<str>>,
	pub scope: Option<Box<str>>,
	pub expires_at: Timestamp,
}

#[derive(Debug, Clone)]
pub struct AccessTokenRecord {
	pub token: Box<str>,
	pub client_id: Box<str>,
	pub actor_id: Box<str>,
	/// Peer id of the trust this token acts under.
	pub peer_id: Box<str>,
	pub scope: Option<Box<str>>,
	pub created_at: Timestamp,
	pub expires_at: Timestamp,
}

#[derive(Debug, Clone)]
pub struct RefreshTokenRecord {
	pub token: Box<str>,
	pub client_id: Box<str>,
	pub actor_id: Box<str>,
	pub peer_id: Box<str>,
	pub scope: Option<Box<str>>,
	pub created_at: Timestamp,
	pub expires_at: Timestamp,
	/// Set once this token has been rotated. Further uses are judged by
	/// `rotated_at` age (grace window vs theft).
	pub used: bool,
	pub rotated_at: Option<Timestamp>,
	pub replaced_by_access: Option<Box<str>>,
	pub replaced_by_refresh: Option<Box<str>>,
}

/// An ActingWeb OAuth2 storage adapter.
///
/// Responsible for all sensitive OAuth2 server state, with the reverse
/// indexes (`token → record`) the authentication pipeline depends on.
#[async_trait]
pub trait AuthAdapter: Debug + Send + Sync {
	// # Client registrations
	async fn create_client(&self, record: &ClientRecord) -> AwResult<()>;
	async fn read_client(&self, client_id: &str) -> AwResult<ClientRecord>;
	async fn delete_client(&self, client_id: &str) -> AwResult<()>;

	// # Authorization codes
	async fn create_auth_code(&self, record: &AuthCodeRecord) -> AwResult<()>;
	/// Single use: atomically removes and returns the code. Expired or absent
	/// codes yield `NotFound`.
	async fn consume_auth_code(&self, code: &str) -> AwResult<AuthCodeRecord>;

	// # Access tokens
	async fn create_access_token(&self, record: &AccessTokenRecord) -> AwResult<()>;
	/// Expired tokens yield `NotFound`.
	async fn read_access_token(&self, token: &str) -> AwResult<AccessTokenRecord>;
	async fn delete_access_token(&self, token: &str) -> AwResult<()>;

	// # Refresh tokens
	async fn create_refresh_token(&self, record: &RefreshTokenRecord) -> AwResult<()>;
	async fn read_refresh_token(&self, token: &str) -> AwResult<RefreshTokenRecord>;
	/// Compare-and-swap rotation: marks the token used and records its
	/// replacements iff it was unused. Returns false when the token was
	/// already rotated (caller applies the grace-window rules).
	async fn mark_refresh_rotated(
		&self,
		token: &str,
		replaced_by_access: &str,
		replaced_by_refresh: &str,
		rotated_at: Timestamp,
	) -> AwResult<bool>;
	async fn delete_refresh_token(&self, token: &str) -> AwResult<()>;

	// # Family operations
	/// Deletes every access and refresh token issued to `client_id` for
	/// `actor_id`. Returns the number of tokens removed.
	async fn revoke_token_family(&self, client_id: &str, actor_id: &str) -> AwResult<u32>;
	/// Deletes all tokens bound to a client regardless of actor (trust
	/// deletion path).
	async fn revoke_client_tokens(&self, client_id: &str) -> AwResult<u32>;
}

// vim: ts=4
