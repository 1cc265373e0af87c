//! Authentication pipeline.
//!
//! Three credentials are accepted per request: creator basic auth (owner
//! mode), a trust secret bearer (peer mode), and an OAuth2 access token
//! bearer (client mode). The resolved `AuthCtx` is attached to the request
//! for the extractors in `extract.rs`.

use axum::{
	body::Body,
	extract::{Path, State},
	http::{Request, header, response::Response},
	middleware::Next,
};
use base64::Engine;
use std::collections::HashMap;

use crate::extract::{Auth, RequestId};
use crate::prelude::*;
use actingweb_types::auth_adapter::{Accessor, AuthCtx};
use actingweb_types::utils::{mask_token, verify_passphrase};

/// Username accepted in place of the creator for owner basic auth.
const TRUSTEE_USER: &str = "trustee";

/// Resolve the credential in `Authorization` against one actor. Does not
/// decide whether the accessor may do anything; that is the permission
/// engine's job.
async fn resolve_credential(
	app: &App,
	actor_id: &str,
	auth_header: &str,
) -> AwResult<AuthCtx> {
	let actor = app.store.read_actor(actor_id).await?;

	if let Some(basic) = auth_header.strip_prefix("Basic ") {
		let decoded = base64::engine::general_purpose::STANDARD
			.decode(basic.trim())
			.map_err(|_| Error::Unauthorized)?;
		let decoded = String::from_utf8(decoded).map_err(|_| Error::Unauthorized)?;
		let (user, pass) = decoded.split_once(':').ok_or(Error::Unauthorized)?;

		if user != actor.creator.as_ref() && user != TRUSTEE_USER {
			return Err(Error::Unauthorized);
		}
		if !verify_passphrase(pass, &actor.passphrase_hash) {
			return Err(Error::Unauthorized);
		}
		return Ok(AuthCtx {
			actor_id: actor.actor_id,
			accessor: Accessor::Owner { creator: actor.creator },
		});
	}

	if let Some(bearer) = auth_header.strip_prefix("Bearer ") {
		let token = bearer.trim();

		// Peer bearer: the shared secret of a trust row.
		match app.store.read_trust_by_secret(token).await {
			Ok(trust) if trust.actor_id.as_ref() == actor_id => {
				touch_trust(app, actor_id, &trust.peer_id, "secret").await;
				return Ok(AuthCtx {
					actor_id: actor.actor_id,
					accessor: Accessor::Peer {
						peer_id: trust.peer_id,
						relationship: trust.relationship,
					},
				});
			}
			Ok(_) | Err(Error::NotFound) => {}
			Err(err) => return Err(err),
		}

		// OAuth2 bearer: opaque access token resolved via the token index.
		match app.auth_store.read_access_token(token).await {
			Ok(record) if record.actor_id.as_ref() == actor_id => {
				let trust = app
					.store
					.read_trust(actor_id, &record.peer_id)
					.await
					.map_err(|_| Error::InvalidToken)?;
				touch_trust(app, actor_id, &trust.peer_id, "oauth2").await;
				return Ok(AuthCtx {
					actor_id: actor.actor_id,
					accessor: Accessor::Client {
						client_id: record.client_id,
						peer_id: trust.peer_id,
						relationship: trust.relationship,
					},
				});
			}
			Ok(_) | Err(Error::NotFound) => {
				debug!("bearer {} matched nothing on actor {}", mask_token(token), actor_id);
				return Err(Error::InvalidToken);
			}
			Err(err) => return Err(err),
		}
	}

	Err(Error::Unauthorized)
}

/// Record when and how a peer last connected. Best effort.
async fn touch_trust(app: &App, actor_id: &str, peer_id: &str, via: &str) {
	let patch = actingweb_types::store_adapter::TrustPatch {
		last_connected_at: Patch::Value(Timestamp::now()),
		last_connected_via: Patch::Value(via.into()),
		..Default::default()
	};
	if let Err(err) = app.store.update_trust(actor_id, peer_id, &patch).await {
		debug!("failed to record trust connection: {}", err);
	}
}

fn actor_id_from(params: &HashMap<String, String>) -> AwResult<&str> {
	params.get("actor_id").map(String::as_str).ok_or(Error::NotFound)
}

pub async fn require_auth(
	State(app): State<App>,
	Path(params): Path<HashMap<String, String>>,
	mut req: Request<Body>,
	next: Next,
) -> AwResult<Response<Body>> {
	let actor_id = actor_id_from(&params)?;
	let auth_header = req
		.headers()
		.get(header::AUTHORIZATION)
		.and_then(|h| h.to_str().ok())
		.ok_or(Error::Unauthorized)?
		.to_string();

	let ctx = resolve_credential(&app, actor_id, &auth_header).await?;
	req.extensions_mut().insert(Auth(ctx));

	Ok(next.run(req).await)
}

/// Attaches auth when a credential is present; anonymous requests pass
/// through. A present-but-invalid credential is still rejected.
pub async fn optional_auth(
	State(app): State<App>,
	Path(params): Path<HashMap<String, String>>,
	mut req: Request<Body>,
	next: Next,
) -> AwResult<Response<Body>> {
	let actor_id = actor_id_from(&params)?;
	if let Some(auth_header) =
		req.headers().get(header::AUTHORIZATION).and_then(|h| h.to_str().ok())
	{
		let header = auth_header.to_string();
		let ctx = resolve_credential(&app, actor_id, &header).await?;
		req.extensions_mut().insert(Auth(ctx));
	}

	Ok(next.run(req).await)
}

/// Preserves an inbound `X-Request-ID` or generates one, and echoes it on the
/// response for correlation.
pub async fn request_id_middleware(mut req: Request<Body>, next: Next) -> Response<Body> {
	let req_id = req
		.headers()
		.get("X-Request-ID")
		.and_then(|h| h.to_str().ok())
		.map(ToString::to_string)
		.unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());

	req.extensions_mut().insert(RequestId(req_id.clone()));
	let mut res = next.run(req).await;
	if let Ok(value) = req_id.parse() {
		res.headers_mut().insert("X-Request-ID", value);
	}
	res
}

// vim: ts=4
