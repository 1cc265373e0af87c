//! Test-only endpoints. Mounted only when `AW_DEVTEST=true`; MUST stay
//! disabled in production.

use axum::{
	Json,
	extract::{Path, State},
	http::StatusCode,
	response::IntoResponse,
};

use crate::prelude::*;

// GET /devtest/ping
pub async fn get_ping() -> impl IntoResponse {
	Json(serde_json::json!({ "pong": true }))
}

// GET /devtest/actors
pub async fn get_actors(State(app): State<App>) -> AwResult<impl IntoResponse> {
	let actors = app.store.list_actors(1000).await?;
	let ids: Vec<serde_json::Value> = actors
		.iter()
		.map(|a| serde_json::json!({ "id": a.actor_id, "creator": a.creator }))
		.collect();
	Ok(Json(ids))
}

// DELETE /devtest/wipe/{actor_id} — drop an actor's rows without peer notify
pub async fn delete_wipe(
	State(app): State<App>,
	Path(actor_id): Path<String>,
) -> AwResult<impl IntoResponse> {
	app.store.delete_actor(&actor_id).await?;
	warn!("devtest wiped actor {}", actor_id);
	Ok(StatusCode::NO_CONTENT)
}

// vim: ts=4
