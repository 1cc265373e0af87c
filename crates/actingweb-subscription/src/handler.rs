//! Axum handlers for `/subscriptions` and `/callbacks`.

use axum::{
	Json,
	body::Bytes,
	extract::{Path, State},
	http::{HeaderMap, StatusCode, header},
	response::IntoResponse,
};
use serde::Deserialize;
use std::io::Read;

use crate::{callback, engine};
use crate::prelude::*;
use actingweb_core::extract::Auth;
use actingweb_core::hooks::CallbackHookCtx;
use actingweb_types::auth_adapter::Accessor;
use actingweb_types::wire::{CallbackEnvelope, SubscriptionCreateBody};

/// Owner sees everything; a peer only its own rows.
fn peer_scope<'a>(auth: &'a Auth, peer_id: Option<&'a str>) -> AwResult<Option<&'a str>> {
	match (&auth.0.accessor, peer_id) {
		(Accessor::Owner { .. }, scope) => Ok(scope),
		(Accessor::Peer { peer_id: own, .. } | Accessor::Client { peer_id: own, .. }, scope) => {
			match scope {
				Some(requested) if requested != own.as_ref() => Err(Error::PermissionDenied),
				_ => Ok(Some(own.as_ref())),
			}
		}
	}
}

// GET /{actor_id}/subscriptions
pub async fn get_subscriptions(
	State(app): State<App>,
	auth: Auth,
	Path(actor_id): Path<String>,
) -> AwResult<impl IntoResponse> {
	let scope = peer_scope(&auth, None)?;
	let subs = app.store.list_subscriptions(&actor_id, scope).await?;
	Ok(Json(subs))
}

#[derive(Debug, Deserialize)]
pub struct OutboundSubscriptionBody {
	#[serde(rename = "peerid")]
	pub peer_id: Box<str>,
	#[serde(flatten)]
	pub subscription: SubscriptionCreateBody,
}

// POST /{actor_id}/subscriptions — owner creates an outbound subscription
pub async fn post_subscription(
	State(app): State<App>,
	auth: Auth,
	Path(actor_id): Path<String>,
	Json(body): Json<OutboundSubscriptionBody>,
) -> AwResult<impl IntoResponse> {
	if !auth.0.accessor.is_owner() {
		return Err(Error::PermissionDenied);
	}
	let record =
		engine::subscribe_to_peer(&app, &actor_id, &body.peer_id, &body.subscription).await?;
	let location = format!(
		"{}/subscriptions/{}/{}",
		app.config.actor_root(&actor_id),
		record.peer_id,
		record.sub_id
	);
	Ok((StatusCode::CREATED, [(header::LOCATION, location)], Json(record)))
}

// GET /{actor_id}/subscriptions/{peerid}
pub async fn get_peer_subscriptions(
	State(app): State<App>,
	auth: Auth,
	Path((actor_id, peer_id)): Path<(String, String)>,
) -> AwResult<impl IntoResponse> {
	let scope = peer_scope(&auth, Some(&peer_id))?;
	let subs = app.store.list_subscriptions(&actor_id, scope).await?;
	Ok(Json(subs))
}

// POST /{actor_id}/subscriptions/{peerid} — inbound create from a peer
pub async fn post_peer_subscription(
	State(app): State<App>,
	auth: Auth,
	Path((actor_id, peer_id)): Path<(String, String)>,
	Json(body): Json<SubscriptionCreateBody>,
) -> AwResult<impl IntoResponse> {
	peer_scope(&auth, Some(&peer_id))?;
	let record = engine::create_inbound(&app, &actor_id, &peer_id, &body).await?;
	let location = format!(
		"{}/subscriptions/{}/{}",
		app.config.actor_root(&actor_id),
		peer_id,
		record.sub_id
	);
	Ok((StatusCode::CREATED, [(header::LOCATION, location)], Json(record)))
}

// GET /{actor_id}/subscriptions/{peerid}/{subid} — subscription + pending diffs
pub async fn get_subscription(
	State(app): State<App>,
	auth: Auth,
	Path((actor_id, peer_id, sub_id)): Path<(String, String, String)>,
) -> AwResult<impl IntoResponse> {
	peer_scope(&auth, Some(&peer_id))?;
	let sub = app.store.read_subscription(&actor_id, &peer_id, &sub_id).await?;
	let diffs = app.store.list_diffs(&actor_id, &sub_id).await?;

	let data: Vec<serde_json::Value> = diffs
		.iter()
		.map(|d| {
			Ok(serde_json::json!({
				"sequence": d.seqnr,
				"timestamp": d.timestamp.to_iso(),
				"data": serde_json::from_str::<serde_json::Value>(&d.blob)?,
			}))
		})
		.collect::<AwResult<_>>()?;

	let mut body = serde_json::to_value(&sub)?;
	body["data"] = serde_json::Value::Array(data);
	Ok(Json(body))
}

// GET /{actor_id}/subscriptions/{peerid}/{subid}/{seqnr} — fetch one diff and clear it
pub async fn get_diff(
	State(app): State<App>,
	auth: Auth,
	Path((actor_id, peer_id, sub_id, seqnr)): Path<(String, String, String, u32)>,
) -> AwResult<impl IntoResponse> {
	peer_scope(&auth, Some(&peer_id))?;
	app.store.read_subscription(&actor_id, &peer_id, &sub_id).await?;
	let diff = app.store.read_diff(&actor_id, &sub_id, seqnr).await?;
	let data: serde_json::Value = serde_json::from_str(&diff.blob)?;
	app.store.clear_diff(&actor_id, &sub_id, seqnr).await?;
	Ok(Json(serde_json::json!({
		"sequence": diff.seqnr,
		"timestamp": diff.timestamp.to_iso(),
		"data": data,
	})))
}

// DELETE /{actor_id}/subscriptions/{peerid}/{subid}
pub async fn delete_subscription(
	State(app): State<App>,
	auth: Auth,
	Path((actor_id, peer_id, sub_id)): Path<(String, String, String)>,
) -> AwResult<impl IntoResponse> {
	peer_scope(&auth, Some(&peer_id))?;
	// When the owner tears down an outbound subscription the peer is told;
	// a peer deleting its own inbound subscription needs no notification.
	let notify = auth.0.accessor.is_owner();
	engine::unsubscribe(&app, &actor_id, &peer_id, &sub_id, notify).await?;
	Ok(StatusCode::NO_CONTENT)
}

fn decode_body(headers: &HeaderMap, body: &Bytes) -> AwResult<Vec<u8>> {
	let gzipped = headers
		.get(header::CONTENT_ENCODING)
		.and_then(|v| v.to_str().ok())
		.is_some_and(|v| v.eq_ignore_ascii_case("gzip"));
	if gzipped {
		let mut decoder = flate2::read::GzDecoder::new(body.as_ref());
		let mut out = Vec::new();
		decoder
			.read_to_end(&mut out)
			.map_err(|_| Error::ValidationError("invalid gzip body".into()))?;
		Ok(out)
	} else {
		Ok(body.to_vec())
	}
}

// POST /{actor_id}/callbacks/subscriptions/{peerid}/{subid}
pub async fn post_subscription_callback(
	State(app): State<App>,
	auth: Auth,
	Path((actor_id, peer_id, sub_id)): Path<(String, String, String)>,
	headers: HeaderMap,
	body: Bytes,
) -> AwResult<impl IntoResponse> {
	peer_scope(&auth, Some(&peer_id))?;
	let decoded = decode_body(&headers, &body)?;
	let envelope: CallbackEnvelope =
		serde_json::from_slice(&decoded).map_err(|_| {
			Error::ValidationError("malformed callback envelope".into())
		})?;
	callback::process_callback(&app, &actor_id, &peer_id, &sub_id, envelope).await?;
	Ok(StatusCode::NO_CONTENT)
}

// DELETE /{actor_id}/callbacks/subscriptions/{peerid}/{subid}
// The publisher signals that the subscription no longer exists on its side.
pub async fn delete_subscription_callback(
	State(app): State<App>,
	auth: Auth,
	Path((actor_id, peer_id, sub_id)): Path<(String, String, String)>,
) -> AwResult<impl IntoResponse> {
	peer_scope(&auth, Some(&peer_id))?;
	engine::unsubscribe(&app, &actor_id, &peer_id, &sub_id, false).await?;
	Ok(StatusCode::NO_CONTENT)
}

// POST /{actor_id}/callbacks/{name}
pub async fn post_callback(
	State(app): State<App>,
	auth: Auth,
	Path((_actor_id, name)): Path<(String, String)>,
	Json(payload): Json<serde_json::Value>,
) -> AwResult<impl IntoResponse> {
	let Some(hook) = app.hooks.get_callback(&name) else {
		return Err(Error::NotFound);
	};
	let result = hook(
		app.clone(),
		CallbackHookCtx { auth: Some(auth.0), name: name.into(), payload },
	)
	.await?;
	Ok(Json(result))
}

// vim: ts=4
