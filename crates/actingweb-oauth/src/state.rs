//! Authorize-flow state handling.
//!
//! The `state` parameter sent to the upstream IdP is an opaque random handle
//! referencing a server-side stashed payload (client, the client's own
//! state, redirect uri, PKCE challenge). The stash lives in an attribute
//! bucket of the OAuth2 system actor with a 10-minute TTL and is consumed
//! exactly once.

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use crate::prelude::*;
use actingweb_types::OAUTH2_ACTOR;
use actingweb_types::utils::random_token;

const STATE_BUCKET: &str = "_oauth_state";
const STATE_TTL_SECS: i64 = 600;

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizeState {
	pub client_id: Box<str>,
	/// The client's own `state` parameter, echoed back on the final redirect.
	pub mcp_state: Option<Box<str>>,
	pub redirect_uri: Box<str>,
	pub email_hint: Option<Box<str>>,
	pub provider: Box<str>,
	pub trust_type: Option<Box<str>>,
	pub scope: Option<Box<str>>,
	pub code_challenge: Option<Box<str>>,
}

/// Stash the payload and return the opaque handle carried through the IdP.
pub async fn stash(app: &App, state: &AuthorizeState) -> AwResult<Box<str>> {
	let handle = random_token("aw_st_");
	let value = serde_json::to_value(state)?;
	app.store
		.write_attr(
			OAUTH2_ACTOR,
			STATE_BUCKET,
			&handle,
			&value,
			Some(Timestamp::from_now(STATE_TTL_SECS)),
		)
		.await?;
	Ok(handle)
}

/// Consume a handle. Unknown or expired handles yield `NotFound`.
pub async fn take(app: &App, handle: &str) -> AwResult<AuthorizeState> {
	let row = app.store.read_attr(OAUTH2_ACTOR, STATE_BUCKET, handle).await?;
	let _unused = app.store.delete_attr(OAUTH2_ACTOR, STATE_BUCKET, handle).await;
	Ok(serde_json::from_value(row.value)?)
}

// vim: ts=4
