//! Scalar property store.
//!
//! Property values are opaque UTF-8 at the storage layer; this module works
//! in JSON above it. Every write runs the access-control check, the property
//! hooks, the reverse-lookup index maintenance, and finally the subscription
//! diff registration.

use crate::prelude::*;
use actingweb_core::hooks::{HookOutcome, PropertyHookCtx, PropertyOp};
use actingweb_core::perm;
use actingweb_subscription::engine as subscriptions;
use actingweb_types::auth_adapter::AuthCtx;
use actingweb_types::permissions::{Category, Operation};

/// Parse a stored property as JSON, falling back to a plain string for
/// values written before the JSON convention.
pub fn parse_stored(raw: &str) -> serde_json::Value {
	serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

// Nested path helpers
//*********************

pub fn get_path<'a>(value: &'a serde_json::Value, path: &[&str]) -> Option<&'a serde_json::Value> {
	let mut current = value;
	for segment in path {
		current = current.get(segment)?;
	}
	Some(current)
}

/// Set a nested path, creating intermediate objects as needed.
pub fn set_path(value: &mut serde_json::Value, path: &[&str], new: serde_json::Value) {
	let Some((last, rest)) = path.split_last() else {
		*value = new;
		return;
	};
	let mut current = value;
	for segment in rest {
		if !current.is_object() {
			*current = serde_json::json!({});
		}
		current = match current {
			serde_json::Value::Object(map) => {
				map.entry(segment.to_string()).or_insert(serde_json::json!({}))
			}
			_ => return,
		};
	}
	if !current.is_object() {
		*current = serde_json::json!({});
	}
	if let Some(obj) = current.as_object_mut() {
		obj.insert(last.to_string(), new);
	}
}

/// Remove a nested path. Returns false when the path did not exist.
pub fn delete_path(value: &mut serde_json::Value, path: &[&str]) -> bool {
	let Some((last, rest)) = path.split_last() else {
		return false;
	};
	let mut current = value;
	for segment in rest {
		match current.get_mut(segment) {
			Some(next) => current = next,
			None => return false,
		}
	}
	current.as_object_mut().is_some_and(|o| o.remove(*last).is_some())
}

// Store operations
//******************

async fn ensure_no_list_collision(app: &App, actor_id: &str, name: &str) -> AwResult<()> {
	match app.store.read_list_meta(actor_id, name).await {
		Ok(_) => Err(Error::ValidationError(format!(
			"{} is a list property; scalar and list names are disjoint",
			name
		))),
		Err(Error::NotFound) => Ok(()),
		Err(err) => Err(err),
	}
}

pub async fn get_property(
	app: &App,
	auth: &AuthCtx,
	name: &str,
) -> AwResult<serde_json::Value> {
	perm::require(app, auth, Category::Properties, name, Operation::Read).await?;

	let raw = app.store.read_property(&auth.actor_id, name).await?;
	let mut value = parse_stored(&raw);

	let ctx = PropertyHookCtx {
		auth: auth.clone(),
		name: name.into(),
		op: PropertyOp::Get,
		value: Some(value.clone()),
	};
	match app.hooks.dispatch_property(app, ctx).await? {
		HookOutcome::Continue(Some(transformed)) => value = transformed,
		HookOutcome::Continue(None) => {}
		HookOutcome::Reject => return Err(Error::PermissionDenied),
	}
	Ok(value)
}

pub async fn set_property(
	app: &App,
	auth: &AuthCtx,
	name: &str,
	value: serde_json::Value,
) -> AwResult<()> {
	ensure_no_list_collision(app, &auth.actor_id, name).await?;
	perm::require(app, auth, Category::Properties, name, Operation::Write).await?;

	let ctx = PropertyHookCtx {
		auth: auth.clone(),
		name: name.into(),
		op: PropertyOp::Put,
		value: Some(value),
	};
	let value = match app.hooks.dispatch_property(app, ctx).await? {
		HookOutcome::Continue(Some(value)) => value,
		HookOutcome::Continue(None) => {
			return Err(Error::ValidationError("property hook dropped the value".into()));
		}
		HookOutcome::Reject => return Err(Error::PermissionDenied),
	};

	let actor_id = auth.actor_id.as_ref();
	if app.config.is_indexed(name) {
		refresh_index(app, actor_id, name, Some(&value)).await?;
	}

	let raw = serde_json::to_string(&value)?;
	app.store.write_property(actor_id, name, &raw).await?;
	debug!("property {} written ({} bytes)", name, raw.len());

	if name == "email" && app.config.force_email_as_creator {
		if let Some(email) = value.as_str() {
			app.store.update_actor_creator(actor_id, &email.to_lowercase()).await?;
		}
	}

	subscriptions::register_diff(app, actor_id, "properties", Some(name), &value).await
}

/// Write below a nested path inside a property, creating it when absent.
pub async fn set_property_path(
	app: &App,
	auth: &AuthCtx,
	name: &str,
	path: &[&str],
	new: serde_json::Value,
) -> AwResult<()> {
	let mut value = match app.store.read_property(&auth.actor_id, name).await {
		Ok(raw) => parse_stored(&raw),
		Err(Error::NotFound) => serde_json::json!({}),
		Err(err) => return Err(err),
	};
	set_path(&mut value, path, new);
	set_property(app, auth, name, value).await
}

/// Remove a nested path inside a property; the property itself survives.
pub async fn delete_property_path(
	app: &App,
	auth: &AuthCtx,
	name: &str,
	path: &[&str],
) -> AwResult<()> {
	perm::require(app, auth, Category::Properties, name, Operation::Delete).await?;
	let raw = app.store.read_property(&auth.actor_id, name).await?;
	let mut value = parse_stored(&raw);
	if !delete_path(&mut value, path) {
		return Err(Error::NotFound);
	}
	set_property(app, auth, name, value).await
}

pub async fn delete_property(app: &App, auth: &AuthCtx, name: &str) -> AwResult<()> {
	perm::require(app, auth, Category::Properties, name, Operation::Delete).await?;

	let actor_id = auth.actor_id.as_ref();
	let ctx = PropertyHookCtx {
		auth: auth.clone(),
		name: name.into(),
		op: PropertyOp::Delete,
		value: None,
	};
	if let HookOutcome::Reject = app.hooks.dispatch_property(app, ctx).await? {
		return Err(Error::PermissionDenied);
	}

	if app.config.is_indexed(name) {
		refresh_index(app, actor_id, name, None).await?;
	}
	app.store.delete_property(actor_id, name).await?;

	// Deletion diff: the empty string.
	subscriptions::register_diff(
		app,
		actor_id,
		"properties",
		Some(name),
		&serde_json::Value::String(String::new()),
	)
	.await
}

pub async fn delete_all_properties(app: &App, auth: &AuthCtx) -> AwResult<()> {
	if !auth.accessor.is_owner() {
		return Err(Error::PermissionDenied);
	}
	let actor_id = auth.actor_id.as_ref();
	for item in app.store.list_properties(actor_id).await? {
		if app.config.is_indexed(&item.name) {
			let _unused = app.store.delete_property_index(&item.name, &item.value).await;
		}
		subscriptions::register_diff(
			app,
			actor_id,
			"properties",
			Some(&item.name),
			&serde_json::Value::String(String::new()),
		)
		.await?;
	}
	app.store.delete_all_properties(actor_id).await
}

/// Keep the reverse-lookup table in step with an indexed property: drop the
/// row for the old value, write one for the new.
async fn refresh_index(
	app: &App,
	actor_id: &str,
	name: &str,
	new_value: Option<&serde_json::Value>,
) -> AwResult<()> {
	if let Ok(old_raw) = app.store.read_property(actor_id, name).await {
		let old = parse_stored(&old_raw);
		if let Some(old_str) = index_key(&old) {
			let _unused = app.store.delete_property_index(name, &old_str).await;
		}
	}
	if let Some(new_str) = new_value.and_then(index_key) {
		app.store.write_property_index(name, &new_str, actor_id).await?;
	}
	Ok(())
}

/// Indexed values are matched as bare strings, not JSON literals.
fn index_key(value: &serde_json::Value) -> Option<String> {
	match value {
		serde_json::Value::String(s) => Some(s.clone()),
		serde_json::Value::Null => None,
		other => Some(other.to_string()),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_get_set_path() {
		let mut v = serde_json::json!({});
		set_path(&mut v, &["a", "b", "c"], serde_json::json!(1));
		assert_eq!(get_path(&v, &["a", "b", "c"]), Some(&serde_json::json!(1)));
		assert_eq!(get_path(&v, &["a", "x"]), None);

		set_path(&mut v, &["a", "b"], serde_json::json!("flat"));
		assert_eq!(get_path(&v, &["a", "b"]), Some(&serde_json::json!("flat")));
	}

	#[test]
	fn test_delete_path() {
		let mut v = serde_json::json!({"a": {"b": 1, "c": 2}});
		assert!(delete_path(&mut v, &["a", "b"]));
		assert!(!delete_path(&mut v, &["a", "b"]));
		assert_eq!(v, serde_json::json!({"a": {"c": 2}}));
	}

	#[test]
	fn test_parse_stored_fallback() {
		assert_eq!(parse_stored("\"hello\""), serde_json::json!("hello"));
		assert_eq!(parse_stored("{\"a\":1}"), serde_json::json!({"a": 1}));
		// Pre-JSON plain text round-trips as a string
		assert_eq!(parse_stored("plain text"), serde_json::json!("plain text"));
	}

	#[test]
	fn test_index_key() {
		assert_eq!(index_key(&serde_json::json!("x@y.z")), Some("x@y.z".to_string()));
		assert_eq!(index_key(&serde_json::json!(42)), Some("42".to_string()));
		assert_eq!(index_key(&serde_json::Value::Null), None);
	}
}

// vim: ts=4
