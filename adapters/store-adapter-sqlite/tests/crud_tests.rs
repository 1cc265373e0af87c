//! SQLite adapter CRUD and invariant tests.

use actingweb_store_adapter_sqlite::SqliteStore;
use actingweb_types::auth_adapter::{AuthAdapter, RefreshTokenRecord};
use actingweb_types::error::Error;
use actingweb_types::store_adapter::{
	ActorRecord, CallbackState, StoreAdapter, SubscriptionRecord,
};
use actingweb_types::types::{Granularity, Timestamp};
use tempfile::TempDir;

async fn create_test_store() -> (SqliteStore, TempDir) {
	let temp_dir = TempDir::new().expect("Failed to create temp directory");
	let store = SqliteStore::new(temp_dir.path()).await.expect("Failed to create store");
	(store, temp_dir)
}

async fn seed_actor(store: &SqliteStore, actor_id: &str) {
	store
		.create_actor(&ActorRecord {
			actor_id: actor_id.into(),
			creator: format!("{}@example.com", actor_id).into(),
			passphrase_hash: "salt$hash".into(),
			created_at: Timestamp::now(),
		})
		.await
		.expect("Should create actor");
}

#[tokio::test]
async fn test_actor_create_read_delete() {
	let (store, _temp) = create_test_store().await;
	seed_actor(&store, "a1").await;

	let actor = store.read_actor("a1").await.expect("Should read actor");
	assert_eq!(actor.creator.as_ref(), "a1@example.com");

	let by_creator = store.read_actors_by_creator("a1@example.com").await.unwrap();
	assert_eq!(by_creator.len(), 1);

	store.delete_actor("a1").await.unwrap();
	assert!(matches!(store.read_actor("a1").await, Err(Error::NotFound)));
	// Deleting twice is NotFound, not a silent success
	assert!(matches!(store.delete_actor("a1").await, Err(Error::NotFound)));
}

#[tokio::test]
async fn test_duplicate_actor_conflicts() {
	let (store, _temp) = create_test_store().await;
	seed_actor(&store, "a1").await;

	let result = store
		.create_actor(&ActorRecord {
			actor_id: "a1".into(),
			creator: "other@example.com".into(),
			passphrase_hash: "x$y".into(),
			created_at: Timestamp::now(),
		})
		.await;
	assert!(matches!(result, Err(Error::Conflict(_))));
}

#[tokio::test]
async fn test_property_roundtrip_and_index() {
	let (store, _temp) = create_test_store().await;
	seed_actor(&store, "a1").await;

	store.write_property("a1", "note", "\"hello\"").await.unwrap();
	assert_eq!(store.read_property("a1", "note").await.unwrap().as_ref(), "\"hello\"");

	store.write_property_index("email", "a@b.c", "a1").await.unwrap();
	assert_eq!(store.read_property_index("email", "a@b.c").await.unwrap().as_ref(), "a1");

	store.delete_actor("a1").await.unwrap();
	assert!(matches!(store.read_property_index("email", "a@b.c").await, Err(Error::NotFound)));
}

#[tokio::test]
async fn test_list_insert_shifts_indexes() {
	let (store, _temp) = create_test_store().await;
	seed_actor(&store, "a1").await;
	store.create_list("a1", "l", Some("test list"), None).await.unwrap();

	assert_eq!(store.append_list_item("a1", "l", "\"a\"").await.unwrap(), (0, 1));
	assert_eq!(store.append_list_item("a1", "l", "\"c\"").await.unwrap(), (1, 2));
	assert_eq!(store.insert_list_item("a1", "l", 1, "\"b\"").await.unwrap(), 3);

	let items = store.read_list_items("a1", "l").await.unwrap();
	assert_eq!(items, vec![Box::from("\"a\""), Box::from("\"b\""), Box::from("\"c\"")]);

	assert_eq!(store.delete_list_item("a1", "l", 1).await.unwrap(), 2);
	let items = store.read_list_items("a1", "l").await.unwrap();
	assert_eq!(items, vec![Box::from("\"a\""), Box::from("\"c\"")]);

	let meta = store.read_list_meta("a1", "l").await.unwrap();
	assert_eq!(meta.length, 2);
	assert_eq!(meta.description.as_deref(), Some("test list"));
	assert!(meta.version > 1);
}

#[tokio::test]
async fn test_attribute_ttl_expiry() {
	let (store, _temp) = create_test_store().await;
	seed_actor(&store, "a1").await;

	store
		.write_attr("a1", "_cache", "fresh", &serde_json::json!(1), Some(Timestamp::from_now(60)))
		.await
		.unwrap();
	store
		.write_attr("a1", "_cache", "stale", &serde_json::json!(2), Some(Timestamp::from_now(-60)))
		.await
		.unwrap();

	assert!(store.read_attr("a1", "_cache", "fresh").await.is_ok());
	assert!(matches!(store.read_attr("a1", "_cache", "stale").await, Err(Error::NotFound)));

	let bucket = store.read_bucket("a1", "_cache").await.unwrap();
	assert_eq!(bucket.len(), 1);

	let purged = store.purge_expired_attrs().await.unwrap();
	assert_eq!(purged, 1);
}

#[tokio::test]
async fn test_diff_sequence_allocation_is_atomic_per_subscription() {
	let (store, _temp) = create_test_store().await;
	seed_actor(&store, "a1").await;
	store
		.create_subscription(&SubscriptionRecord {
			actor_id: "a1".into(),
			peer_id: "p1".into(),
			sub_id: "s1".into(),
			target: "properties".into(),
			subtarget: None,
			resource: None,
			granularity: Granularity::High,
			seqnr: 0,
			callback: false,
			created_at: Timestamp::now(),
		})
		.await
		.unwrap();

	for expected in 1..=5u32 {
		let seq = store.create_diff("a1", "p1", "s1", "{}").await.unwrap();
		assert_eq!(seq, expected);
	}

	let sub = store.read_subscription("a1", "p1", "s1").await.unwrap();
	assert_eq!(sub.seqnr, 5);

	store.clear_diff("a1", "s1", 3).await.unwrap();
	let seqs: Vec<u32> =
		store.list_diffs("a1", "s1").await.unwrap().iter().map(|d| d.seqnr).collect();
	assert_eq!(seqs, vec![1, 2, 4, 5]);
}

#[tokio::test]
async fn test_suspension_scope_matching() {
	let (store, _temp) = create_test_store().await;
	seed_actor(&store, "a1").await;

	store.create_suspension("a1", "properties", Some("memory_travel")).await.unwrap();
	assert!(store.read_suspension("a1", "properties", Some("memory_travel")).await.unwrap());
	assert!(!store.read_suspension("a1", "properties", Some("note")).await.unwrap());
	assert!(!store.read_suspension("a1", "properties", None).await.unwrap());

	store.create_suspension("a1", "properties", None).await.unwrap();
	assert!(store.read_suspension("a1", "properties", Some("note")).await.unwrap());

	store.delete_suspension("a1", "properties", None).await.unwrap();
	store.delete_suspension("a1", "properties", Some("memory_travel")).await.unwrap();
	assert!(!store.read_suspension("a1", "properties", Some("memory_travel")).await.unwrap());
}

#[tokio::test]
async fn test_callback_state_conditional_write() {
	let (store, _temp) = create_test_store().await;
	seed_actor(&store, "a1").await;

	let v1 = CallbackState { last_processed_seq: 1, pending: "[]".into(), version: 1 };
	store.write_callback_state("a1", "p1", "s1", &v1, None).await.unwrap();

	// Create-if-absent fails when the row exists
	assert!(matches!(
		store.write_callback_state("a1", "p1", "s1", &v1, None).await,
		Err(Error::Conflict(_))
	));

	let v2 = CallbackState { last_processed_seq: 2, pending: "[]".into(), version: 2 };
	store.write_callback_state("a1", "p1", "s1", &v2, Some(1)).await.unwrap();

	// Stale version loses
	assert!(matches!(
		store.write_callback_state("a1", "p1", "s1", &v2, Some(1)).await,
		Err(Error::Conflict(_))
	));

	let stored = store.read_callback_state("a1", "p1", "s1").await.unwrap().unwrap();
	assert_eq!(stored.last_processed_seq, 2);
	assert_eq!(stored.version, 2);
}

#[tokio::test]
async fn test_refresh_rotation_cas_single_winner() {
	let (store, _temp) = create_test_store().await;

	store
		.create_refresh_token(&RefreshTokenRecord {
			token: "r1".into(),
			client_id: "c1".into(),
			actor_id: "a1".into(),
			peer_id: "oauth2:c1".into(),
			scope: None,
			created_at: Timestamp::now(),
			expires_at: Timestamp::from_now(1000),
			used: false,
			rotated_at: None,
			replaced_by_access: None,
			replaced_by_refresh: None,
		})
		.await
		.unwrap();

	assert!(store.mark_refresh_rotated("r1", "at2", "r2", Timestamp::now()).await.unwrap());
	assert!(!store.mark_refresh_rotated("r1", "at3", "r3", Timestamp::now()).await.unwrap());

	let record = store.read_refresh_token("r1").await.unwrap();
	assert!(record.used);
	assert_eq!(record.replaced_by_access.as_deref(), Some("at2"));
	assert_eq!(record.replaced_by_refresh.as_deref(), Some("r2"));
}

// vim: ts=4
