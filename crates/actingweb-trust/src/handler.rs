//! Axum handlers for `/trust` and `/permissions`.

use axum::{
	Json,
	extract::{Path, Query, State},
	http::{StatusCode, header},
	response::IntoResponse,
};
use serde::Deserialize;

use crate::manager;
use crate::prelude::*;
use actingweb_core::extract::{Auth, OptionalRequestId};
use actingweb_core::perm;
use actingweb_types::auth_adapter::Accessor;
use actingweb_types::permissions::{Category, Operation, PermissionSet, pattern_match};
use actingweb_types::store_adapter::{EstablishedVia, ListTrustOptions};
use actingweb_types::wire::{TrustCreateBody, TrustUpdateBody};

fn require_owner(auth: &Auth) -> AwResult<()> {
	if auth.0.accessor.is_owner() { Ok(()) } else { Err(Error::PermissionDenied) }
}

/// Owner, or the peer the row belongs to.
fn require_owner_or_peer(auth: &Auth, peer_id: &str) -> AwResult<()> {
	match &auth.0.accessor {
		Accessor::Owner { .. } => Ok(()),
		Accessor::Peer { peer_id: own, .. } | Accessor::Client { peer_id: own, .. } => {
			if own.as_ref() == peer_id { Ok(()) } else { Err(Error::PermissionDenied) }
		}
	}
}

#[derive(Debug, Default, Deserialize)]
pub struct TrustListQuery {
	pub relationship: Option<String>,
}

// GET /{actor_id}/trust
pub async fn get_trusts(
	State(app): State<App>,
	auth: Auth,
	Path(actor_id): Path<String>,
	Query(query): Query<TrustListQuery>,
) -> AwResult<impl IntoResponse> {
	let peer_scope = auth.0.accessor.peer_id().map(ToString::to_string);
	let opts = ListTrustOptions {
		relationship: query.relationship.as_deref(),
		peer_id: peer_scope.as_deref(),
	};
	let trusts = app.store.list_trusts(&actor_id, &opts).await?;
	Ok(Json(trusts))
}

#[derive(Debug, Deserialize)]
pub struct CreateTrustBody {
	pub url: Box<str>,
	#[serde(default = "default_relationship")]
	pub relationship: Box<str>,
	pub desc: Option<Box<str>>,
}

fn default_relationship() -> Box<str> {
	"friend".into()
}

// POST /{actor_id}/trust — owner initiates an outbound trust
pub async fn post_trust(
	State(app): State<App>,
	auth: Auth,
	req_id: OptionalRequestId,
	Path(actor_id): Path<String>,
	Json(body): Json<CreateTrustBody>,
) -> AwResult<impl IntoResponse> {
	require_owner(&auth)?;
	let record = manager::create_reciprocal_trust(
		&app,
		&actor_id,
		&body.url,
		&body.relationship,
		body.desc.as_deref(),
		req_id.0.as_deref(),
	)
	.await?;
	let location = format!(
		"{}/trust/{}/{}",
		app.config.actor_root(&actor_id),
		record.relationship,
		record.peer_id
	);
	Ok((StatusCode::CREATED, [(header::LOCATION, location)], Json(record)))
}

// POST /{actor_id}/trust/{relationship} — inbound handshake from a peer.
// Unauthenticated by design: the initiator has no credential with us yet.
pub async fn post_trust_relationship(
	State(app): State<App>,
	Path((actor_id, relationship)): Path<(String, String)>,
	Json(body): Json<TrustCreateBody>,
) -> AwResult<impl IntoResponse> {
	app.store.read_actor(&actor_id).await?;
	let record = manager::create_verified_trust(
		&app,
		&actor_id,
		&relationship,
		&body,
		EstablishedVia::Actingweb,
	)
	.await?;
	let location = format!(
		"{}/trust/{}/{}",
		app.config.actor_root(&actor_id),
		record.relationship,
		record.peer_id
	);
	let response = serde_json::json!({
		"id": actor_id,
		"type": app.config.aw_type,
		"relationship": record.relationship,
		"approved": record.approved,
		"peerApproved": record.peer_approved,
		"verified": record.verified,
	});
	Ok((StatusCode::CREATED, [(header::LOCATION, location)], Json(response)))
}

#[derive(Debug, Default, Deserialize)]
pub struct TrustGetQuery {
	#[serde(default)]
	pub permissions: Option<bool>,
}

// GET /{actor_id}/trust/{relationship}/{peerid}
pub async fn get_trust(
	State(app): State<App>,
	auth: Auth,
	Path((actor_id, relationship, peer_id)): Path<(String, String, String)>,
	Query(query): Query<TrustGetQuery>,
) -> AwResult<impl IntoResponse> {
	require_owner_or_peer(&auth, &peer_id)?;
	let trust = app.store.read_trust(&actor_id, &peer_id).await?;
	if trust.relationship.as_ref() != relationship {
		return Err(Error::NotFound);
	}

	let mut body = serde_json::to_value(&trust)?;
	if query.permissions == Some(true) {
		if let Some(over) = perm::read_override(&app.store, &actor_id, &peer_id).await? {
			body["permissions"] = serde_json::to_value(&over)?;
		}
	}
	Ok(Json(body))
}

// PUT /{actor_id}/trust/{relationship}/{peerid}
// From the owner this approves (or annotates); from the peer it carries the
// peer side's state.
pub async fn put_trust(
	State(app): State<App>,
	auth: Auth,
	Path((actor_id, relationship, peer_id)): Path<(String, String, String)>,
	Json(body): Json<TrustUpdateBody>,
) -> AwResult<impl IntoResponse> {
	require_owner_or_peer(&auth, &peer_id)?;
	let trust = app.store.read_trust(&actor_id, &peer_id).await?;
	if trust.relationship.as_ref() != relationship {
		return Err(Error::NotFound);
	}

	let updated = if auth.0.accessor.is_owner() {
		if body.approved == Some(true) && !trust.approved {
			manager::approve(&app, &actor_id, &peer_id).await?
		} else {
			let patch = actingweb_types::store_adapter::TrustPatch {
				desc: body.desc.clone().map_or(Patch::Undefined, Patch::Value),
				..Default::default()
			};
			app.store.update_trust(&actor_id, &peer_id, &patch).await?;
			app.store.read_trust(&actor_id, &peer_id).await?
		}
	} else {
		manager::handle_peer_update(&app, &actor_id, &peer_id, &body).await?
	};
	Ok(Json(updated))
}

// DELETE /{actor_id}/trust/{relationship}/{peerid}
pub async fn delete_trust(
	State(app): State<App>,
	auth: Auth,
	Path((actor_id, relationship, peer_id)): Path<(String, String, String)>,
) -> AwResult<impl IntoResponse> {
	require_owner_or_peer(&auth, &peer_id)?;
	let trust = app.store.read_trust(&actor_id, &peer_id).await?;
	if trust.relationship.as_ref() != relationship {
		return Err(Error::NotFound);
	}
	// The owner notifies the peer; a peer deleting its own side does not
	// loop the notification back.
	let notify = auth.0.accessor.is_owner();
	manager::delete_trust(&app, &actor_id, &peer_id, notify).await?;
	Ok(StatusCode::NO_CONTENT)
}

// Permission overrides
//**********************

// GET /{actor_id}/trust/{relationship}/{peerid}/permissions
pub async fn get_trust_permissions(
	State(app): State<App>,
	auth: Auth,
	Path((actor_id, _relationship, peer_id)): Path<(String, String, String)>,
) -> AwResult<impl IntoResponse> {
	require_owner_or_peer(&auth, &peer_id)?;
	let over =
		perm::read_override(&app.store, &actor_id, &peer_id).await?.ok_or(Error::NotFound)?;
	Ok(Json(over))
}

// PUT /{actor_id}/trust/{relationship}/{peerid}/permissions
pub async fn put_trust_permissions(
	State(app): State<App>,
	auth: Auth,
	Path((actor_id, _relationship, peer_id)): Path<(String, String, String)>,
	Json(body): Json<PermissionSet>,
) -> AwResult<impl IntoResponse> {
	require_owner(&auth)?;
	let trust = app.store.read_trust(&actor_id, &peer_id).await?;
	{
		let registry = app.trust_types.read().await;
		let tt = registry
			.get(&trust.relationship)
			.ok_or_else(|| Error::ValidationError("unknown trust type".into()))?;
		if !tt.allow_user_override {
			return Err(Error::ValidationError(format!(
				"trust type {} does not allow overrides",
				trust.relationship
			)));
		}
	}
	perm::write_override(&app.store, &actor_id, &peer_id, &body).await?;
	Ok(StatusCode::NO_CONTENT)
}

// DELETE /{actor_id}/trust/{relationship}/{peerid}/permissions
pub async fn delete_trust_permissions(
	State(app): State<App>,
	auth: Auth,
	Path((actor_id, _relationship, peer_id)): Path<(String, String, String)>,
) -> AwResult<impl IntoResponse> {
	require_owner(&auth)?;
	perm::delete_override(&app.store, &actor_id, &peer_id).await?;
	Ok(StatusCode::NO_CONTENT)
}

// GET /{actor_id}/trust/{relationship}/{peerid}/shared_properties
// The properties this peer can currently read, evaluated under the merged
// permission set.
pub async fn get_shared_properties(
	State(app): State<App>,
	auth: Auth,
	Path((actor_id, _relationship, peer_id)): Path<(String, String, String)>,
) -> AwResult<impl IntoResponse> {
	require_owner_or_peer(&auth, &peer_id)?;
	let trust = app.store.read_trust(&actor_id, &peer_id).await?;
	let merged =
		perm::effective_permissions(&app, &actor_id, &peer_id, &trust.relationship).await?;
	let rules = merged.category(Category::Properties);

	let mut shared = serde_json::Map::new();
	for item in app.store.list_properties(&actor_id).await? {
		let Some(rules) = rules else { break };
		if rules.excluded_patterns.iter().any(|p| pattern_match(p, &item.name)) {
			continue;
		}
		let readable = rules.operations.contains(&Operation::Read)
			&& rules.patterns.iter().any(|p| pattern_match(p, &item.name));
		if readable {
			let value: serde_json::Value = serde_json::from_str(&item.value)
				.unwrap_or_else(|_| serde_json::Value::String(item.value.to_string()));
			shared.insert(item.name.to_string(), value);
		}
	}
	Ok(Json(serde_json::Value::Object(shared)))
}

// GET /{actor_id}/permissions/{peerid} — merged permissions a peer holds
pub async fn get_effective_permissions(
	State(app): State<App>,
	auth: Auth,
	Path((actor_id, peer_id)): Path<(String, String)>,
) -> AwResult<impl IntoResponse> {
	require_owner_or_peer(&auth, &peer_id)?;
	let trust = app.store.read_trust(&actor_id, &peer_id).await?;
	let merged =
		perm::effective_permissions(&app, &actor_id, &peer_id, &trust.relationship).await?;
	Ok(Json(merged))
}

// vim: ts=4
