//! Axum handlers for the factory, `/meta`, and `/properties`.

use axum::{
	Json,
	extract::{Path, Query, State},
	http::{StatusCode, header},
	response::IntoResponse,
};
use serde::Deserialize;

use crate::{actor, list, property};
use crate::prelude::*;
use actingweb_core::app::VERSION;
use actingweb_core::extract::Auth;
use actingweb_core::perm::{self, Decision, PermCache};
use actingweb_types::PROTOCOL_VERSION;
use actingweb_types::permissions::{Category, Operation};
use actingweb_types::wire::SUPPORTED_OPTIONS;

// Factory
//*********

#[derive(Debug, Deserialize)]
pub struct CreateActorBody {
	pub creator: Box<str>,
	pub passphrase: Option<Box<str>>,
	pub id: Option<Box<str>>,
}

// POST / — create an actor
pub async fn post_factory(
	State(app): State<App>,
	Json(body): Json<CreateActorBody>,
) -> AwResult<impl IntoResponse> {
	let created = actor::create_actor(
		&app,
		actor::CreateActorOptions {
			actor_id: body.id.as_deref(),
			creator: &body.creator,
			passphrase: body.passphrase.as_deref(),
		},
	)
	.await?;

	let location = app.config.actor_root(&created.record.actor_id);
	let response = serde_json::json!({
		"id": created.record.actor_id,
		"creator": created.record.creator,
		"passphrase": created.passphrase,
	});
	Ok((StatusCode::CREATED, [(header::LOCATION, location)], Json(response)))
}

#[derive(Debug, Default, Deserialize)]
pub struct FactoryLookupQuery {
	pub creator: Option<String>,
}

// GET /?creator= — factory lookup (devtest only; leaks actor ids otherwise)
pub async fn get_factory(
	State(app): State<App>,
	Query(query): Query<FactoryLookupQuery>,
) -> AwResult<impl IntoResponse> {
	if !app.config.devtest {
		return Err(Error::NotFound);
	}
	let creator = query.creator.ok_or(Error::NotFound)?;
	let actors = app.store.read_actors_by_creator(&creator).await?;
	if actors.is_empty() {
		return Err(Error::NotFound);
	}
	let ids: Vec<&str> = actors.iter().map(|a| a.actor_id.as_ref()).collect();
	Ok(Json(serde_json::json!({ "ids": ids })))
}

// Meta
//******

fn meta_document(app: &App, actor_id: &str) -> serde_json::Value {
	serde_json::json!({
		"id": actor_id,
		"type": app.config.aw_type,
		"version": VERSION,
		"actingweb": {
			"version": PROTOCOL_VERSION,
			"supported": SUPPORTED_OPTIONS.join(","),
			"formats": "json",
		},
	})
}

// GET /{actor_id}/meta
pub async fn get_meta(
	State(app): State<App>,
	Path(actor_id): Path<String>,
) -> AwResult<impl IntoResponse> {
	app.store.read_actor(&actor_id).await?;
	Ok(Json(meta_document(&app, &actor_id)))
}

// GET /{actor_id}/meta/{*path}
pub async fn get_meta_path(
	State(app): State<App>,
	Path((actor_id, path)): Path<(String, String)>,
) -> AwResult<axum::response::Response> {
	app.store.read_actor(&actor_id).await?;

	if path == "trusttypes" {
		let registry = app.trust_types.read().await;
		let types: Vec<serde_json::Value> = registry
			.list()
			.iter()
			.map(|tt| {
				serde_json::json!({
					"name": tt.name,
					"displayName": tt.display_name,
					"oauthScope": tt.oauth_scope,
				})
			})
			.collect();
		return Ok(Json(types).into_response());
	}

	let doc = meta_document(&app, &actor_id);
	let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
	let value = property::get_path(&doc, &segments).ok_or(Error::NotFound)?;

	// Leaf values are served as plain text, the protocol's discovery format.
	match value {
		serde_json::Value::String(s) => Ok(s.clone().into_response()),
		other => Ok(Json(other.clone()).into_response()),
	}
}

// Properties
//************

// GET /{actor_id}/properties — all readable properties, `200 {}` when empty
pub async fn get_properties(
	State(app): State<App>,
	auth: Auth,
	Path(actor_id): Path<String>,
) -> AwResult<impl IntoResponse> {
	let mut cache = PermCache::new();
	let mut out = serde_json::Map::new();

	for item in app.store.list_properties(&actor_id).await? {
		let decision = perm::evaluate(
			&app,
			&auth.0,
			&mut cache,
			Category::Properties,
			&item.name,
			Operation::Read,
		)
		.await?;
		if decision == Decision::Allowed {
			out.insert(item.name.to_string(), property::parse_stored(&item.value));
		}
	}
	for meta in app.store.list_lists(&actor_id).await? {
		let decision = perm::evaluate(
			&app,
			&auth.0,
			&mut cache,
			Category::Properties,
			&meta.list_name,
			Operation::Read,
		)
		.await?;
		if decision == Decision::Allowed {
			let items = app.store.read_list_items(&actor_id, &meta.list_name).await?;
			out.insert(
				meta.list_name.to_string(),
				serde_json::Value::Array(
					items.iter().map(|raw| property::parse_stored(raw)).collect(),
				),
			);
		}
	}
	Ok(Json(serde_json::Value::Object(out)))
}

// POST /{actor_id}/properties — bulk write of an object of properties
pub async fn post_properties(
	State(app): State<App>,
	auth: Auth,
	Path(_actor_id): Path<String>,
	Json(body): Json<serde_json::Map<String, serde_json::Value>>,
) -> AwResult<impl IntoResponse> {
	for (name, value) in body {
		property::set_property(&app, &auth.0, &name, value).await?;
	}
	Ok(StatusCode::CREATED)
}

// DELETE /{actor_id}/properties
pub async fn delete_properties(
	State(app): State<App>,
	auth: Auth,
	Path(actor_id): Path<String>,
) -> AwResult<impl IntoResponse> {
	property::delete_all_properties(&app, &auth.0).await?;
	for meta in app.store.list_lists(&actor_id).await? {
		list::delete_list(&app, &auth.0, &meta.list_name).await?;
	}
	Ok(StatusCode::NO_CONTENT)
}

// GET /{actor_id}/properties/{name} — scalar value or full list
pub async fn get_property(
	State(app): State<App>,
	auth: Auth,
	Path((_actor_id, name)): Path<(String, String)>,
) -> AwResult<impl IntoResponse> {
	match list::get_items(&app, &auth.0, &name).await {
		Ok(items) => Ok(Json(serde_json::Value::Array(items))),
		Err(Error::NotFound) => {
			let value = property::get_property(&app, &auth.0, &name).await?;
			Ok(Json(value))
		}
		Err(err) => Err(err),
	}
}

// PUT /{actor_id}/properties/{name}
pub async fn put_property(
	State(app): State<App>,
	auth: Auth,
	Path((_actor_id, name)): Path<(String, String)>,
	Json(value): Json<serde_json::Value>,
) -> AwResult<impl IntoResponse> {
	property::set_property(&app, &auth.0, &name, value).await?;
	Ok(StatusCode::NO_CONTENT)
}

// DELETE /{actor_id}/properties/{name}
pub async fn delete_property(
	State(app): State<App>,
	auth: Auth,
	Path((actor_id, name)): Path<(String, String)>,
) -> AwResult<impl IntoResponse> {
	match app.store.read_list_meta(&actor_id, &name).await {
		Ok(_) => list::delete_list(&app, &auth.0, &name).await?,
		Err(Error::NotFound) => property::delete_property(&app, &auth.0, &name).await?,
		Err(err) => return Err(err),
	}
	Ok(StatusCode::NO_CONTENT)
}

// GET /{actor_id}/properties/{name}/{*path} — nested read
pub async fn get_property_path(
	State(app): State<App>,
	auth: Auth,
	Path((_actor_id, name, path)): Path<(String, String, String)>,
) -> AwResult<impl IntoResponse> {
	let value = property::get_property(&app, &auth.0, &name).await?;
	let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
	let nested = property::get_path(&value, &segments).ok_or(Error::NotFound)?;
	Ok(Json(nested.clone()))
}

// PUT /{actor_id}/properties/{name}/{*path} — nested write
pub async fn put_property_path(
	State(app): State<App>,
	auth: Auth,
	Path((_actor_id, name, path)): Path<(String, String, String)>,
	Json(value): Json<serde_json::Value>,
) -> AwResult<impl IntoResponse> {
	let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
	property::set_property_path(&app, &auth.0, &name, &segments, value).await?;
	Ok(StatusCode::NO_CONTENT)
}

// DELETE /{actor_id}/properties/{name}/{*path} — nested delete
pub async fn delete_property_path(
	State(app): State<App>,
	auth: Auth,
	Path((_actor_id, name, path)): Path<(String, String, String)>,
) -> AwResult<impl IntoResponse> {
	let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
	property::delete_property_path(&app, &auth.0, &name, &segments).await?;
	Ok(StatusCode::NO_CONTENT)
}

// List items
//************

#[derive(Debug, Default, Deserialize)]
pub struct ItemQuery {
	pub index: Option<u32>,
}

// POST /{actor_id}/properties/{name}/items[?index=] — append, or insert at index
pub async fn post_list_items(
	State(app): State<App>,
	auth: Auth,
	Path((_actor_id, name)): Path<(String, String)>,
	Query(query): Query<ItemQuery>,
	Json(item): Json<serde_json::Value>,
) -> AwResult<impl IntoResponse> {
	let (index, length) = match query.index {
		Some(index) => {
			let length = list::insert_at(&app, &auth.0, &name, index, item).await?;
			(index, length)
		}
		None => list::append(&app, &auth.0, &name, item).await?,
	};
	Ok((StatusCode::CREATED, Json(serde_json::json!({ "index": index, "length": length }))))
}

// PUT /{actor_id}/properties/{name}/items?index= — update one item
pub async fn put_list_item(
	State(app): State<App>,
	auth: Auth,
	Path((_actor_id, name)): Path<(String, String)>,
	Query(query): Query<ItemQuery>,
	Json(item): Json<serde_json::Value>,
) -> AwResult<impl IntoResponse> {
	let index =
		query.index.ok_or_else(|| Error::ValidationError("index query is required".into()))?;
	list::update_at(&app, &auth.0, &name, index, item).await?;
	Ok(StatusCode::NO_CONTENT)
}

// DELETE /{actor_id}/properties/{name}/items[?index=] — one item, or clear
pub async fn delete_list_items(
	State(app): State<App>,
	auth: Auth,
	Path((_actor_id, name)): Path<(String, String)>,
	Query(query): Query<ItemQuery>,
) -> AwResult<impl IntoResponse> {
	match query.index {
		Some(index) => {
			list::delete_at(&app, &auth.0, &name, index).await?;
		}
		None => list::clear(&app, &auth.0, &name).await?,
	}
	Ok(StatusCode::NO_CONTENT)
}

// GET /{actor_id}/properties/{name}/metadata
pub async fn get_list_metadata(
	State(app): State<App>,
	auth: Auth,
	Path((_actor_id, name)): Path<(String, String)>,
) -> AwResult<impl IntoResponse> {
	let meta = list::get_meta(&app, &auth.0, &name).await?;
	Ok(Json(meta))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListMetadataBody {
	#[serde(default)]
	pub description: Patch<Box<str>>,
	#[serde(default)]
	pub explanation: Patch<Box<str>>,
}

// PUT /{actor_id}/properties/{name}/metadata
pub async fn put_list_metadata(
	State(app): State<App>,
	auth: Auth,
	Path((_actor_id, name)): Path<(String, String)>,
	Json(body): Json<ListMetadataBody>,
) -> AwResult<impl IntoResponse> {
	let meta =
		list::update_meta(&app, &auth.0, &name, body.description, body.explanation).await?;
	Ok(Json(meta))
}

// Actor resource
//****************

// GET /{actor_id} — basic actor document for the owner
pub async fn get_actor(
	State(app): State<App>,
	auth: Auth,
	Path(actor_id): Path<String>,
) -> AwResult<impl IntoResponse> {
	if !auth.0.accessor.is_owner() {
		return Err(Error::PermissionDenied);
	}
	let record = actor::get_actor(&app, &actor_id).await?;
	Ok(Json(serde_json::json!({
		"id": record.actor_id,
		"creator": record.creator,
	})))
}

// DELETE /{actor_id}
pub async fn delete_actor(
	State(app): State<App>,
	auth: Auth,
	Path(actor_id): Path<String>,
) -> AwResult<impl IntoResponse> {
	if !auth.0.accessor.is_owner() {
		return Err(Error::PermissionDenied);
	}
	actor::delete_actor(&app, &actor_id).await?;
	Ok(StatusCode::NO_CONTENT)
}

// vim: ts=4
