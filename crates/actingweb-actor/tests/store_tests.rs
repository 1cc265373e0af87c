//! Actor factory and property/list store behavior.

mod common;

use common::{build_app, build_app_with, owner};

use actingweb_actor::{actor, list, property};
use actingweb_core::config::RuntimeConfig;
use actingweb_types::error::Error;

async fn seed(app: &actingweb_core::app::App, id: &str) {
	actor::create_actor(
		app,
		actor::CreateActorOptions {
			actor_id: Some(id),
			creator: &format!("{}@example.com", id),
			passphrase: Some("pass"),
		},
	)
	.await
	.unwrap();
}

#[tokio::test]
async fn generated_actor_ids_are_32_hex() {
	let app = build_app();
	let created = actor::create_actor(
		&app,
		actor::CreateActorOptions {
			actor_id: None,
			creator: "alice@example.com",
			passphrase: None,
		},
	)
	.await
	.unwrap();
	assert_eq!(created.record.actor_id.len(), 32);
	assert!(!created.passphrase.is_empty());
}

#[tokio::test]
async fn unique_creator_is_enforced_when_configured() {
	let config = RuntimeConfig { unique_creator: true, ..Default::default() };
	let app = build_app_with(config);
	seed(&app, "a1").await;

	let err = actor::create_actor(
		&app,
		actor::CreateActorOptions {
			actor_id: None,
			creator: "a1@example.com",
			passphrase: None,
		},
	)
	.await
	.unwrap_err();
	assert!(matches!(err, Error::Conflict(_)));
}

#[tokio::test]
async fn reserved_actor_ids_are_rejected() {
	let app = build_app();
	let err = actor::create_actor(
		&app,
		actor::CreateActorOptions {
			actor_id: Some("_sneaky"),
			creator: "x@example.com",
			passphrase: None,
		},
	)
	.await
	.unwrap_err();
	assert!(matches!(err, Error::ValidationError(_)));
}

#[tokio::test]
async fn property_roundtrip_preserves_json() {
	let app = build_app();
	seed(&app, "a1").await;
	let auth = owner("a1");

	let value = serde_json::json!({"nested": {"n": 1}, "arr": [1, 2, 3]});
	property::set_property(&app, &auth, "doc", value.clone()).await.unwrap();
	assert_eq!(property::get_property(&app, &auth, "doc").await.unwrap(), value);
}

#[tokio::test]
async fn scalar_and_list_names_are_disjoint() {
	let app = build_app();
	seed(&app, "a1").await;
	let auth = owner("a1");

	property::set_property(&app, &auth, "note", serde_json::json!("x")).await.unwrap();
	let err =
		list::append(&app, &auth, "note", serde_json::json!("item")).await.unwrap_err();
	assert!(matches!(err, Error::ValidationError(_)));

	list::append(&app, &auth, "memories", serde_json::json!("item")).await.unwrap();
	let err =
		property::set_property(&app, &auth, "memories", serde_json::json!("x")).await.unwrap_err();
	assert!(matches!(err, Error::ValidationError(_)));
}

#[tokio::test]
async fn indexed_property_supports_reverse_lookup() {
	let app = build_app();
	seed(&app, "a1").await;
	let auth = owner("a1");

	property::set_property(&app, &auth, "email", serde_json::json!("Alice@Example.com"))
		.await
		.unwrap();
	let found = actor::get_from_property(&app, "email", "Alice@Example.com").await.unwrap();
	assert_eq!(found.actor_id.as_ref(), "a1");

	// Rewriting moves the index row.
	property::set_property(&app, &auth, "email", serde_json::json!("new@example.com"))
		.await
		.unwrap();
	assert!(matches!(
		actor::get_from_property(&app, "email", "Alice@Example.com").await,
		Err(Error::NotFound)
	));
	assert!(actor::get_from_property(&app, "email", "new@example.com").await.is_ok());
}

#[tokio::test]
async fn force_email_as_creator_rewrites_lowercased() {
	let config = RuntimeConfig { force_email_as_creator: true, ..Default::default() };
	let app = build_app_with(config);
	seed(&app, "a1").await;
	let auth = owner("a1");

	property::set_property(&app, &auth, "email", serde_json::json!("Alice@Example.COM"))
		.await
		.unwrap();
	let record = actor::get_actor(&app, "a1").await.unwrap();
	assert_eq!(record.creator.as_ref(), "alice@example.com");
}

#[tokio::test]
async fn nested_path_write_creates_intermediate_objects() {
	let app = build_app();
	seed(&app, "a1").await;
	let auth = owner("a1");

	property::set_property_path(&app, &auth, "settings", &["ui", "theme"], serde_json::json!("dark"))
		.await
		.unwrap();
	let value = property::get_property(&app, &auth, "settings").await.unwrap();
	assert_eq!(value, serde_json::json!({"ui": {"theme": "dark"}}));
}

#[tokio::test]
async fn list_operations_update_metadata() {
	let app = build_app();
	seed(&app, "a1").await;
	let auth = owner("a1");

	list::append(&app, &auth, "travel", serde_json::json!({"place": "Paris"})).await.unwrap();
	list::append(&app, &auth, "travel", serde_json::json!({"place": "Oslo"})).await.unwrap();
	list::insert_at(&app, &auth, "travel", 1, serde_json::json!({"place": "Rome"}))
		.await
		.unwrap();

	let meta = list::get_meta(&app, &auth, "travel").await.unwrap();
	assert_eq!(meta.length, 3);

	let items = list::get_items(&app, &auth, "travel").await.unwrap();
	assert_eq!(items[1], serde_json::json!({"place": "Rome"}));

	list::delete_at(&app, &auth, "travel", 0).await.unwrap();
	let meta = list::get_meta(&app, &auth, "travel").await.unwrap();
	assert_eq!(meta.length, 2);
}

#[tokio::test]
async fn friend_reads_note_but_not_private() {
	let app = build_app();
	seed(&app, "a1").await;
	let auth = owner("a1");
	property::set_property(&app, &auth, "note", serde_json::json!("hello")).await.unwrap();
	property::set_property(&app, &auth, "private/keys", serde_json::json!("s3cret"))
		.await
		.unwrap();

	app.store
		.create_trust(&actingweb_types::store_adapter::TrustRecord {
			actor_id: "a1".into(),
			peer_id: "b1".into(),
			baseuri: "http://127.0.0.1:9/b1".into(),
			peer_type: "urn:actingweb:test".into(),
			relationship: "friend".into(),
			secret: "s".into(),
			approved: true,
			peer_approved: true,
			verified: true,
			verification_token: "v".into(),
			established_via: actingweb_types::store_adapter::EstablishedVia::Actingweb,
			peer_identifier: None,
			desc: None,
			aw_supported: None,
			aw_version: None,
			capabilities_fetched_at: None,
			last_connected_at: None,
			last_connected_via: None,
			oauth_client_id: None,
			client_name: None,
			client_version: None,
			client_platform: None,
			created_at: actingweb_types::types::Timestamp::now(),
		})
		.await
		.unwrap();

	let peer_auth = common::peer("a1", "b1", "friend");
	assert_eq!(
		property::get_property(&app, &peer_auth, "note").await.unwrap(),
		serde_json::json!("hello")
	);
	assert!(matches!(
		property::get_property(&app, &peer_auth, "private/keys").await,
		Err(Error::PermissionDenied)
	));
	// friend is read-only by default
	assert!(matches!(
		property::set_property(&app, &peer_auth, "note", serde_json::json!("bye")).await,
		Err(Error::PermissionDenied)
	));
}

#[tokio::test]
async fn actor_delete_cascades() {
	let app = build_app();
	seed(&app, "a1").await;
	let auth = owner("a1");
	property::set_property(&app, &auth, "email", serde_json::json!("a@b.c")).await.unwrap();
	list::append(&app, &auth, "l", serde_json::json!(1)).await.unwrap();

	actor::delete_actor(&app, "a1").await.unwrap();
	assert!(matches!(actor::get_actor(&app, "a1").await, Err(Error::NotFound)));
	assert!(matches!(app.store.read_property("a1", "email").await, Err(Error::NotFound)));
	assert!(matches!(app.store.read_list_meta("a1", "l").await, Err(Error::NotFound)));
	assert!(matches!(
		app.store.read_property_index("email", "a@b.c").await,
		Err(Error::NotFound)
	));
}

// vim: ts=4
