//! List property store.
//!
//! Lists share the public property namespace but are stored as individual
//! item rows to bypass single-item size limits. Every mutation produces a
//! list diff carrying the operation, the affected item(s), and the resulting
//! length.

use crate::prelude::*;
use crate::property::parse_stored;
use actingweb_core::perm;
use actingweb_subscription::engine as subscriptions;
use actingweb_types::auth_adapter::AuthCtx;
use actingweb_types::permissions::{Category, Operation};
use actingweb_types::store_adapter::ListMeta;
use actingweb_types::wire::{ListDiff, ListOperation};

async fn ensure_no_scalar_collision(app: &App, actor_id: &str, name: &str) -> AwResult<()> {
	match app.store.read_property(actor_id, name).await {
		Ok(_) => Err(Error::ValidationError(format!(
			"{} is a scalar property; scalar and list names are disjoint",
			name
		))),
		Err(Error::NotFound) => Ok(()),
		Err(err) => Err(err),
	}
}

/// Create the list on first use.
async fn ensure_list(app: &App, actor_id: &str, name: &str) -> AwResult<()> {
	match app.store.read_list_meta(actor_id, name).await {
		Ok(_) => Ok(()),
		Err(Error::NotFound) => app.store.create_list(actor_id, name, None, None).await,
		Err(err) => Err(err),
	}
}

async fn register_list_diff(app: &App, actor_id: &str, name: &str, diff: ListDiff) -> AwResult<()> {
	let value = serde_json::to_value(&diff)?;
	subscriptions::register_diff(app, actor_id, "properties", Some(name), &value).await
}

pub async fn get_items(
	app: &App,
	auth: &AuthCtx,
	name: &str,
) -> AwResult<Vec<serde_json::Value>> {
	perm::require(app, auth, Category::Properties, name, Operation::Read).await?;
	app.store.read_list_meta(&auth.actor_id, name).await?;
	let items = app.store.read_list_items(&auth.actor_id, name).await?;
	Ok(items.iter().map(|raw| parse_stored(raw)).collect())
}

pub async fn get_meta(app: &App, auth: &AuthCtx, name: &str) -> AwResult<ListMeta> {
	perm::require(app, auth, Category::Properties, name, Operation::Read).await?;
	app.store.read_list_meta(&auth.actor_id, name).await
}

pub async fn update_meta(
	app: &App,
	auth: &AuthCtx,
	name: &str,
	description: Patch<Box<str>>,
	explanation: Patch<Box<str>>,
) -> AwResult<ListMeta> {
	perm::require(app, auth, Category::Properties, name, Operation::Write).await?;
	let actor_id = auth.actor_id.as_ref();
	app.store.update_list_meta(actor_id, name, description, explanation).await?;
	let meta = app.store.read_list_meta(actor_id, name).await?;

	let diff = ListDiff {
		list: name.into(),
		operation: ListOperation::Metadata,
		item: None,
		items: None,
		index: None,
		length: meta.length,
	};
	register_list_diff(app, actor_id, name, diff).await?;
	Ok(meta)
}

/// Append one item. Returns `(index, length)`.
pub async fn append(
	app: &App,
	auth: &AuthCtx,
	name: &str,
	item: serde_json::Value,
) -> AwResult<(u32, u32)> {
	let actor_id = auth.actor_id.as_ref();
	ensure_no_scalar_collision(app, actor_id, name).await?;
	perm::require(app, auth, Category::Properties, name, Operation::Write).await?;
	ensure_list(app, actor_id, name).await?;

	let raw = serde_json::to_string(&item)?;
	let (index, length) = app.store.append_list_item(actor_id, name, &raw).await?;

	let diff = ListDiff {
		list: name.into(),
		operation: ListOperation::Append,
		item: Some(item),
		items: None,
		index: Some(index),
		length,
	};
	register_list_diff(app, actor_id, name, diff).await?;
	Ok((index, length))
}

pub async fn insert_at(
	app: &App,
	auth: &AuthCtx,
	name: &str,
	index: u32,
	item: serde_json::Value,
) -> AwResult<u32> {
	let actor_id = auth.actor_id.as_ref();
	ensure_no_scalar_collision(app, actor_id, name).await?;
	perm::require(app, auth, Category::Properties, name, Operation::Write).await?;
	ensure_list(app, actor_id, name).await?;

	let raw = serde_json::to_string(&item)?;
	let length = app.store.insert_list_item(actor_id, name, index, &raw).await?;

	let diff = ListDiff {
		list: name.into(),
		operation: ListOperation::Insert,
		item: Some(item),
		items: None,
		index: Some(index),
		length,
	};
	register_list_diff(app, actor_id, name, diff).await?;
	Ok(length)
}

pub async fn update_at(
	app: &App,
	auth: &AuthCtx,
	name: &str,
	index: u32,
	item: serde_json::Value,
) -> AwResult<()> {
	let actor_id = auth.actor_id.as_ref();
	perm::require(app, auth, Category::Properties, name, Operation::Write).await?;

	let raw = serde_json::to_string(&item)?;
	app.store.update_list_item(actor_id, name, index, &raw).await?;
	let meta = app.store.read_list_meta(actor_id, name).await?;

	let diff = ListDiff {
		list: name.into(),
		operation: ListOperation::Update,
		item: Some(item),
		items: None,
		index: Some(index),
		length: meta.length,
	};
	register_list_diff(app, actor_id, name, diff).await
}

pub async fn delete_at(app: &App, auth: &AuthCtx, name: &str, index: u32) -> AwResult<u32> {
	let actor_id = auth.actor_id.as_ref();
	perm::require(app, auth, Category::Properties, name, Operation::Delete).await?;

	let length = app.store.delete_list_item(actor_id, name, index).await?;

	let diff = ListDiff {
		list: name.into(),
		operation: ListOperation::Delete,
		item: None,
		items: None,
		index: Some(index),
		length,
	};
	register_list_diff(app, actor_id, name, diff).await?;
	Ok(length)
}

pub async fn extend(
	app: &App,
	auth: &AuthCtx,
	name: &str,
	items: Vec<serde_json::Value>,
) -> AwResult<(u32, u32)> {
	let actor_id = auth.actor_id.as_ref();
	ensure_no_scalar_collision(app, actor_id, name).await?;
	perm::require(app, auth, Category::Properties, name, Operation::Write).await?;
	ensure_list(app, actor_id, name).await?;

	let raws: Vec<String> =
		items.iter().map(serde_json::to_string).collect::<Result<_, _>>()?;
	let raw_refs: Vec<&str> = raws.iter().map(String::as_str).collect();
	let (first, length) = app.store.extend_list(actor_id, name, &raw_refs).await?;

	let diff = ListDiff {
		list: name.into(),
		operation: ListOperation::Extend,
		item: None,
		items: Some(items),
		index: Some(first),
		length,
	};
	register_list_diff(app, actor_id, name, diff).await?;
	Ok((first, length))
}

pub async fn clear(app: &App, auth: &AuthCtx, name: &str) -> AwResult<()> {
	let actor_id = auth.actor_id.as_ref();
	perm::require(app, auth, Category::Properties, name, Operation::Delete).await?;
	app.store.clear_list(actor_id, name).await?;

	let diff = ListDiff {
		list: name.into(),
		operation: ListOperation::Clear,
		item: None,
		items: None,
		index: None,
		length: 0,
	};
	register_list_diff(app, actor_id, name, diff).await
}

/// Remove the list and its metadata entirely.
pub async fn delete_list(app: &App, auth: &AuthCtx, name: &str) -> AwResult<()> {
	let actor_id = auth.actor_id.as_ref();
	perm::require(app, auth, Category::Properties, name, Operation::Delete).await?;
	app.store.delete_list(actor_id, name).await?;

	let diff = ListDiff {
		list: name.into(),
		operation: ListOperation::DeleteAll,
		item: None,
		items: None,
		index: None,
		length: 0,
	};
	register_list_diff(app, actor_id, name, diff).await
}

// vim: ts=4
