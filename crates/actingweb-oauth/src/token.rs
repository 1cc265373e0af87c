//! Token issuance, refresh rotation, and revocation.
//!
//! Refresh rotation is the security-critical piece: the old token's `used`
//! flag flips under a compare-and-swap, so exactly one of two racing
//! requests rotates. A reused token is then judged by the age of its
//! rotation: a short grace window covers benign client retries, anything
//! older is treated as theft and revokes the whole family.

use serde::Serialize;
use serde_with::skip_serializing_none;

use crate::prelude::*;
use actingweb_types::auth_adapter::{
	ACCESS_TOKEN_EXPIRY, AccessTokenRecord, AuthCodeRecord, REFRESH_TOKEN_EXPIRY,
	RefreshTokenRecord,
};
use actingweb_types::utils::{mask_token, random_token, s256_challenge};

/// Reuse within this window returns the already-issued replacement pair.
const REUSE_IDEMPOTENT_SECS: i64 = 10;
/// Reuse within this window gets a fresh access token but no new refresh.
const REUSE_DEGRADED_SECS: i64 = 60;

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
pub struct IssuedTokens {
	pub access_token: Box<str>,
	pub token_type: &'static str,
	pub expires_in: i64,
	pub refresh_token: Option<Box<str>>,
	pub scope: Option<Box<str>>,
}

/// Mint and persist a fresh access+refresh pair.
pub async fn issue_pair(
	app: &App,
	client_id: &str,
	actor_id: &str,
	peer_id: &str,
	scope: Option<&str>,
) -> AwResult<IssuedTokens> {
	let now = Timestamp::now();
	let access = AccessTokenRecord {
		token: random_token("aw_at_"),
		client_id: client_id.into(),
		actor_id: actor_id.into(),
		peer_id: peer_id.into(),
		scope: scope.map(Into::into),
		created_at: now,
		expires_at: now.add_seconds(ACCESS_TOKEN_EXPIRY),
	};
	let refresh = RefreshTokenRecord {
		token: random_token("aw_rt_"),
		client_id: client_id.into(),
		actor_id: actor_id.into(),
		peer_id: peer_id.into(),
		scope: scope.map(Into::into),
		created_at: now,
		expires_at: now.add_seconds(REFRESH_TOKEN_EXPIRY),
		used: false,
		rotated_at: None,
		replaced_by_access: None,
		replaced_by_refresh: None,
	};
	app.auth_store.create_access_token(&access).await?;
	app.auth_store.create_refresh_token(&refresh).await?;
	debug!("issued token pair {} for client {}", mask_token(&access.token), client_id);

	Ok(IssuedTokens {
		access_token: access.token,
		token_type: "Bearer",
		expires_in: ACCESS_TOKEN_EXPIRY,
		refresh_token: Some(refresh.token),
		scope: scope.map(Into::into),
	})
}

/// Redeem a single-use authorization code, verifying the client binding,
/// the redirect uri, and the PKCE verifier when a challenge was recorded.
pub async fn redeem_auth_code(
	app: &App,
	code: &str,
	client_id: &str,
	redirect_uri: &str,
	code_verifier: Option<&str>,
) -> AwResult<IssuedTokens> {
	let record: AuthCodeRecord = app.auth_store.consume_auth_code(code).await?;
	if record.client_id.as_ref() != client_id {
		return Err(Error::Unauthorized);
	}
	if record.redirect_uri.as_ref() != redirect_uri {
		return Err(Error::ValidationError("redirect_uri mismatch".into()));
	}
	match (&record.code_challenge, code_verifier) {
		(None, _) => {}
		(Some(challenge), Some(verifier)) => {
			if s256_challenge(verifier) != challenge.as_ref() {
				return Err(Error::Unauthorized);
			}
		}
		(Some(_), None) => {
			return Err(Error::ValidationError("code_verifier is required".into()));
		}
	}

	issue_pair(app, client_id, &record.actor_id, &record.peer_id, record.scope.as_deref()).await
}

/// Rotate a refresh token, applying the reuse policy.
pub async fn rotate_refresh(
	app: &App,
	refresh_token: &str,
	client_id: &str,
) -> AwResult<IssuedTokens> {
	let record = app.auth_store.read_refresh_token(refresh_token).await.map_err(|_| {
		debug!("unknown refresh token {}", mask_token(refresh_token));
		Error::Unauthorized
	})?;
	if record.client_id.as_ref() != client_id {
		return Err(Error::Unauthorized);
	}

	if !record.used {
		// Mint the replacement pair, then CAS the old token. The loser of a
		// race discards its candidates and re-reads.
		let pair = issue_pair(
			app,
			client_id,
			&record.actor_id,
			&record.peer_id,
			record.scope.as_deref(),
		)
		.await?;
		let new_refresh = pair.refresh_token.clone().unwrap_or_default();
		let won = app
			.auth_store
			.mark_refresh_rotated(refresh_token, &pair.access_token, &new_refresh, Timestamp::now())
			.await?;
		if won {
			return Ok(pair);
		}
		// Lost the race: retract our candidates and fall through to reuse
		// handling against the winner's rotation.
		let _unused = app.auth_store.delete_access_token(&pair.access_token).await;
		let _unused = app.auth_store.delete_refresh_token(&new_refresh).await;
	}

	let record = app.auth_store.read_refresh_token(refresh_token).await?;
	let age = record.rotated_at.map_or(i64::MAX, |t| t.age_seconds());

	if age <= REUSE_IDEMPOTENT_SECS {
		// Benign concurrent retry: hand back the pair the winner minted.
		if let (Some(access), Some(refresh)) =
			(&record.replaced_by_access, &record.replaced_by_refresh)
		{
			if let Ok(access_record) = app.auth_store.read_access_token(access).await {
				return Ok(IssuedTokens {
					access_token: access_record.token,
					token_type: "Bearer",
					expires_in: (access_record.expires_at.0 - Timestamp::now().0).max(0),
					refresh_token: Some(refresh.clone()),
					scope: record.scope.clone(),
				});
			}
		}
	}

	if age <= REUSE_DEGRADED_SECS {
		// Likely a slow retry: fresh access token, no new refresh.
		let now = Timestamp::now();
		let access = AccessTokenRecord {
			token: random_token("aw_at_"),
			client_id: client_id.into(),
			actor_id: record.actor_id.clone(),
			peer_id: record.peer_id.clone(),
			scope: record.scope.clone(),
			created_at: now,
			expires_at: now.add_seconds(ACCESS_TOKEN_EXPIRY),
		};
		app.auth_store.create_access_token(&access).await?;
		return Ok(IssuedTokens {
			access_token: access.token,
			token_type: "Bearer",
			expires_in: ACCESS_TOKEN_EXPIRY,
			refresh_token: None,
			scope: record.scope.clone(),
		});
	}

	// Reuse long after rotation: assume theft and burn the family.
	warn!(
		"refresh token {} reused {}s after rotation, revoking family of client {}",
		mask_token(refresh_token),
		age,
		client_id
	);
	let revoked = app.auth_store.revoke_token_family(client_id, &record.actor_id).await?;
	info!("revoked {} tokens in family", revoked);
	Err(Error::Unauthorized)
}

/// RFC 7009: revoke whichever kind of token this is. Unknown tokens are not
/// an error.
pub async fn revoke(app: &App, token: &str) -> AwResult<()> {
	match app.auth_store.delete_access_token(token).await {
		Ok(()) => return Ok(()),
		Err(Error::NotFound) => {}
		Err(err) => return Err(err),
	}
	match app.auth_store.delete_refresh_token(token).await {
		Ok(()) | Err(Error::NotFound) => Ok(()),
		Err(err) => Err(err),
	}
}

// vim: ts=4
