//! OAuth2 authorization server for the ActingWeb runtime.
//!
//! Implements dynamic client registration (RFC 7591), the authorization-code
//! grant with PKCE, refresh rotation with race and reuse handling, token
//! revocation, and RFC 8414 discovery. User authentication is delegated to
//! upstream identity providers; a successful flow binds (or creates) an
//! actor and establishes a trust for the client.

pub mod handler;
mod prelude;
pub mod provider;
pub mod registration;
pub mod state;
pub mod token;

use crate::prelude::*;
use actingweb_core::hooks::{LifecycleEvent, LifecycleKind};
use actingweb_types::auth_adapter::ClientRecord;
use actingweb_types::store_adapter::{EstablishedVia, TrustRecord};
use actingweb_types::utils::random_hex;

/// Peer id of the trust representing an OAuth2 client on an actor.
pub fn client_peer_id(client_id: &str) -> String {
	format!("oauth2:{}", client_id)
}

/// Find or create the trust binding an OAuth2 client to an actor. The trust
/// is active immediately: the user consented through the upstream IdP flow.
pub async fn bind_client_trust(
	app: &App,
	actor_id: &str,
	client: &ClientRecord,
	peer_identifier: &str,
	established_via: EstablishedVia,
) -> AwResult<TrustRecord> {
	let peer_id = client_peer_id(&client.client_id);
	match app.store.read_trust(actor_id, &peer_id).await {
		Ok(trust) => return Ok(trust),
		Err(Error::NotFound) => {}
		Err(err) => return Err(err),
	}

	let relationship = {
		let registry = app.trust_types.read().await;
		if registry.get(&client.trust_type).is_none() {
			return Err(Error::ValidationError(format!(
				"unknown trust type: {}",
				client.trust_type
			)));
		}
		client.trust_type.clone()
	};

	let record = TrustRecord {
		actor_id: actor_id.into(),
		peer_id: peer_id.clone().into(),
		// OAuth2 clients have no actor root of their own.
		baseuri: "".into(),
		peer_type: "urn:actingweb:oauth2:client".into(),
		relationship,
		secret: random_hex(),
		approved: true,
		peer_approved: true,
		verified: true,
		verification_token: "".into(),
		established_via,
		peer_identifier: Some(peer_identifier.into()),
		desc: Some(format!("OAuth2 client {}", client.client_name).into()),
		aw_supported: None,
		aw_version: None,
		capabilities_fetched_at: None,
		last_connected_at: None,
		last_connected_via: None,
		oauth_client_id: Some(client.client_id.clone()),
		client_name: Some(client.client_name.clone()),
		client_version: client.client_version.clone(),
		client_platform: client.client_platform.clone(),
		created_at: Timestamp::now(),
	};
	app.store.create_trust(&record).await?;

	app.hooks
		.dispatch_lifecycle(
			app,
			LifecycleEvent::new(LifecycleKind::OauthSuccess, actor_id)
				.with_peer(&peer_id)
				.with_detail(serde_json::json!({
					"clientId": client.client_id,
					"identifier": peer_identifier,
				})),
		)
		.await;
	info!("bound client {} to actor {} as {}", client.client_id, actor_id, record.relationship);
	Ok(record)
}

// vim: ts=4
