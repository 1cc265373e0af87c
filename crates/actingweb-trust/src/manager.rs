//! Trust lifecycle operations.

use std::time::Duration;

use crate::prelude::*;
use actingweb_core::hooks::{LifecycleEvent, LifecycleKind};
use actingweb_core::perm;
use actingweb_core::request::RequestMeta;
use actingweb_subscription::engine as subscriptions;
use actingweb_types::store_adapter::{EstablishedVia, TrustPatch, TrustRecord};
use actingweb_types::utils::random_hex;
use actingweb_types::wire::{TrustCreateBody, TrustUpdateBody};

/// Outbound handshake retry schedule on transient network errors.
const HANDSHAKE_BACKOFF_MS: [u64; 3] = [500, 1000, 2000];

fn peer_id_from_uri(peer_uri: &str) -> AwResult<Box<str>> {
	peer_uri
		.trim_end_matches('/')
		.rsplit('/')
		.next()
		.filter(|s| !s.is_empty())
		.map(Into::into)
		.ok_or_else(|| Error::ValidationError(format!("invalid peer uri: {}", peer_uri)))
}

async fn known_trust_type(app: &App, relationship: &str) -> bool {
	app.trust_types.read().await.get(relationship).is_some()
}

/// Initiate a trust with a remote actor: POST our secret and verification
/// token to the peer, and persist the relationship once the peer accepts.
/// Verification failures are fatal; nothing is persisted.
pub async fn create_reciprocal_trust(
	app: &App,
	actor_id: &str,
	peer_uri: &str,
	relationship: &str,
	desc: Option<&str>,
	parent_request_id: Option<&str>,
) -> AwResult<TrustRecord> {
	if !known_trust_type(app, relationship).await {
		return Err(Error::ValidationError(format!("unknown trust type: {}", relationship)));
	}
	let peer_uri = peer_uri.trim_end_matches('/');
	let peer_id = peer_id_from_uri(peer_uri)?;
	if app.store.read_trust(actor_id, &peer_id).await.is_ok() {
		return Err(Error::Conflict(format!("trust with {} already exists", peer_id)));
	}

	let secret = random_hex();
	let verification_token = random_hex();
	let body = TrustCreateBody {
		id: actor_id.into(),
		baseuri: app.config.actor_root(actor_id).into(),
		peer_type: app.config.aw_type.clone(),
		secret: secret.clone(),
		verification_token: Some(verification_token.clone()),
		desc: desc.map(Into::into),
	};

	let url = format!("{}/trust/{}", peer_uri, relationship);
	let meta = RequestMeta { bearer: None, parent_request_id };
	let mut last_err = Error::PeerUnavailable("handshake not attempted".into());
	let mut accepted: Option<serde_json::Value> = None;
	for (attempt, backoff) in HANDSHAKE_BACKOFF_MS.iter().enumerate() {
		match app.request.post_json::<_, serde_json::Value>(&url, &body, &meta).await {
			Ok(response) => {
				accepted = Some(response);
				break;
			}
			Err(err) if err.is_retryable() => {
				debug!("trust handshake attempt {} with {} failed: {}", attempt + 1, peer_id, err);
				last_err = err;
				tokio::time::sleep(Duration::from_millis(*backoff)).await;
			}
			Err(err) => return Err(err),
		}
	}
	let response = accepted.ok_or(last_err)?;

	let peer_type = response
		.get("type")
		.and_then(|v| v.as_str())
		.unwrap_or("urn:actingweb:unknown")
		.into();

	let record = TrustRecord {
		actor_id: actor_id.into(),
		peer_id: peer_id.clone(),
		baseuri: peer_uri.into(),
		peer_type,
		relationship: relationship.into(),
		secret,
		// We initiated, so our side's approval is implicit; the peer's
		// acceptance response proved reachability.
		approved: true,
		peer_approved: false,
		verified: true,
		verification_token,
		established_via: EstablishedVia::Actingweb,
		peer_identifier: None,
		desc: desc.map(Into::into),
		aw_supported: None,
		aw_version: None,
		capabilities_fetched_at: None,
		last_connected_at: None,
		last_connected_via: None,
		oauth_client_id: None,
		client_name: None,
		client_version: None,
		client_platform: None,
		created_at: Timestamp::now(),
	};
	app.store.create_trust(&record).await?;

	app.hooks
		.dispatch_lifecycle(
			app,
			LifecycleEvent::new(LifecycleKind::TrustInitiated, actor_id).with_peer(&peer_id),
		)
		.await;
	info!("initiated {} trust with {}", relationship, peer_id);
	Ok(record)
}

/// Inbound handshake: a remote actor POSTed its secret to us. Stored pending
/// local approval with the peer's side already committed.
pub async fn create_verified_trust(
	app: &App,
	actor_id: &str,
	relationship: &str,
	body: &TrustCreateBody,
	established_via: EstablishedVia,
) -> AwResult<TrustRecord> {
	if !known_trust_type(app, relationship).await {
		return Err(Error::ValidationError(format!("unknown trust type: {}", relationship)));
	}
	if body.id.is_empty() || body.baseuri.is_empty() || body.secret.is_empty() {
		return Err(Error::ValidationError("trust request missing id, baseuri, or secret".into()));
	}
	if app.store.read_trust(actor_id, &body.id).await.is_ok() {
		return Err(Error::Conflict(format!("trust with {} already exists", body.id)));
	}

	let record = TrustRecord {
		actor_id: actor_id.into(),
		peer_id: body.id.clone(),
		baseuri: body.baseuri.trim_end_matches('/').into(),
		peer_type: body.peer_type.clone(),
		relationship: relationship.into(),
		secret: body.secret.clone(),
		approved: false,
		peer_approved: true,
		verified: true,
		verification_token: body.verification_token.clone().unwrap_or_default(),
		established_via,
		peer_identifier: None,
		desc: body.desc.clone(),
		aw_supported: None,
		aw_version: None,
		capabilities_fetched_at: None,
		last_connected_at: None,
		last_connected_via: None,
		oauth_client_id: None,
		client_name: None,
		client_version: None,
		client_platform: None,
		created_at: Timestamp::now(),
	};
	app.store.create_trust(&record).await?;

	app.hooks
		.dispatch_lifecycle(
			app,
			LifecycleEvent::new(LifecycleKind::TrustRequestReceived, actor_id)
				.with_peer(&body.id),
		)
		.await;
	info!("received {} trust request from {}", relationship, body.id);
	Ok(record)
}

/// Approve a pending trust locally and notify the peer. Notification
/// failures are non-fatal; the peer converges on its next sync.
pub async fn approve(app: &App, actor_id: &str, peer_id: &str) -> AwResult<TrustRecord> {
	let trust = app.store.read_trust(actor_id, peer_id).await?;
	if trust.approved {
		return Err(Error::TrustState(format!("trust with {} is already approved", peer_id)));
	}

	let patch = TrustPatch { approved: Patch::Value(true), ..Default::default() };
	app.store.update_trust(actor_id, peer_id, &patch).await?;

	let url = format!("{}/trust/{}/{}", trust.baseuri, trust.relationship, actor_id);
	let body = TrustUpdateBody { approved: Some(true), ..Default::default() };
	let meta = RequestMeta { bearer: Some(&trust.secret), parent_request_id: None };
	if let Err(err) = app.request.put_json(&url, &body, &meta).await {
		warn!("approval notification to {} failed (will converge on sync): {}", peer_id, err);
	}

	// Learn what the peer supports, off the request path.
	{
		let app = app.clone();
		let actor_id = actor_id.to_string();
		let peer_id = peer_id.to_string();
		tokio::spawn(async move {
			if let Err(err) =
				crate::capabilities::fetch_capabilities(&app, &actor_id, &peer_id).await
			{
				debug!("capability fetch from {} failed: {}", peer_id, err);
			}
		});
	}

	app.hooks
		.dispatch_lifecycle(
			app,
			LifecycleEvent::new(LifecycleKind::TrustApproved, actor_id).with_peer(peer_id),
		)
		.await;
	if trust.peer_approved {
		app.hooks
			.dispatch_lifecycle(
				app,
				LifecycleEvent::new(LifecycleKind::TrustFullyApprovedLocal, actor_id)
					.with_peer(peer_id),
			)
			.await;
	}

	app.store.read_trust(actor_id, peer_id).await
}

/// Apply a PUT arriving from the peer side (its approval flag, description,
/// or a moved baseuri).
pub async fn handle_peer_update(
	app: &App,
	actor_id: &str,
	peer_id: &str,
	body: &TrustUpdateBody,
) -> AwResult<TrustRecord> {
	let trust = app.store.read_trust(actor_id, peer_id).await?;

	let patch = TrustPatch {
		peer_approved: body.approved.map_or(Patch::Undefined, Patch::Value),
		desc: body.desc.clone().map_or(Patch::Undefined, Patch::Value),
		baseuri: body.baseuri.clone().map_or(Patch::Undefined, Patch::Value),
		..Default::default()
	};
	app.store.update_trust(actor_id, peer_id, &patch).await?;

	if body.approved == Some(true) && trust.approved && !trust.peer_approved {
		app.hooks
			.dispatch_lifecycle(
				app,
				LifecycleEvent::new(LifecycleKind::TrustFullyApprovedRemote, actor_id)
					.with_peer(peer_id),
			)
			.await;
	}

	app.store.read_trust(actor_id, peer_id).await
}

/// Tear down a trust: cancel subscriptions in both directions, drop cached
/// peer state and permission overrides, revoke any bound OAuth2 client and
/// its tokens, notify the peer best-effort, and remove the row.
pub async fn delete_trust(
	app: &App,
	actor_id: &str,
	peer_id: &str,
	notify_peer: bool,
) -> AwResult<()> {
	let trust = app.store.read_trust(actor_id, peer_id).await?;

	subscriptions::purge_peer(app, actor_id, peer_id).await?;
	perm::delete_override(&app.store, actor_id, peer_id).await?;

	if let Some(client_id) = &trust.oauth_client_id {
		let revoked = app.auth_store.revoke_client_tokens(client_id).await?;
		let _unused = app.auth_store.delete_client(client_id).await;
		info!("revoked {} tokens of client {}", revoked, client_id);
	}

	if notify_peer {
		let url = format!("{}/trust/{}/{}", trust.baseuri, trust.relationship, actor_id);
		let meta = RequestMeta { bearer: Some(&trust.secret), parent_request_id: None };
		if let Err(err) = app.request.delete(&url, &meta).await {
			debug!("peer {} trust delete notification failed: {}", peer_id, err);
		}
	}

	app.store.delete_trust(actor_id, peer_id).await?;

	app.hooks
		.dispatch_lifecycle(
			app,
			LifecycleEvent::new(LifecycleKind::TrustDeleted, actor_id).with_peer(peer_id),
		)
		.await;
	info!("deleted trust with {}", peer_id);
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_peer_id_from_uri() {
		assert_eq!(
			peer_id_from_uri("https://aw.example.com/0123abcd").unwrap().as_ref(),
			"0123abcd"
		);
		assert_eq!(
			peer_id_from_uri("https://aw.example.com/0123abcd/").unwrap().as_ref(),
			"0123abcd"
		);
		assert!(peer_id_from_uri("").is_err());
	}
}

// vim: ts=4
