//! Diff registration and suspension behavior.

mod common;

use common::{build_app, seed_actor, seed_subscription, seed_trust};

use actingweb_subscription::engine;
use actingweb_types::types::Granularity;

#[tokio::test]
async fn diffs_get_strictly_increasing_sequence_numbers() {
	let app = build_app();
	seed_actor(&app, "a1").await;
	seed_trust(&app, "a1", "p1", "friend").await;
	seed_subscription(&app, "a1", "p1", "s1", Some("note"), Granularity::None, false).await;

	for value in ["one", "two", "three"] {
		engine::register_diff(&app, "a1", "properties", Some("note"), &serde_json::json!(value))
			.await
			.unwrap();
	}

	let diffs = app.store.list_diffs("a1", "s1").await.unwrap();
	let seqs: Vec<u32> = diffs.iter().map(|d| d.seqnr).collect();
	assert_eq!(seqs, vec![1, 2, 3]);
}

#[tokio::test]
async fn broader_subscription_receives_specific_writes() {
	let app = build_app();
	seed_actor(&app, "a1").await;
	seed_trust(&app, "a1", "p1", "friend").await;
	// Subscribed to all properties, no subtarget.
	seed_subscription(&app, "a1", "p1", "s1", None, Granularity::None, false).await;

	engine::register_diff(&app, "a1", "properties", Some("note"), &serde_json::json!("hello"))
		.await
		.unwrap();

	assert_eq!(app.store.list_diffs("a1", "s1").await.unwrap().len(), 1);
}

#[tokio::test]
async fn mismatched_subtarget_gets_nothing() {
	let app = build_app();
	seed_actor(&app, "a1").await;
	seed_trust(&app, "a1", "p1", "friend").await;
	seed_subscription(&app, "a1", "p1", "s1", Some("other"), Granularity::None, false).await;

	engine::register_diff(&app, "a1", "properties", Some("note"), &serde_json::json!("hello"))
		.await
		.unwrap();

	assert!(app.store.list_diffs("a1", "s1").await.unwrap().is_empty());
}

#[tokio::test]
async fn excluded_property_is_not_leaked_to_subscribers() {
	let app = build_app();
	seed_actor(&app, "a1").await;
	// friend excludes private/* by default
	seed_trust(&app, "a1", "p1", "friend").await;
	seed_subscription(&app, "a1", "p1", "s1", None, Granularity::None, false).await;

	engine::register_diff(
		&app,
		"a1",
		"properties",
		Some("private/keys"),
		&serde_json::json!("secret"),
	)
	.await
	.unwrap();

	assert!(app.store.list_diffs("a1", "s1").await.unwrap().is_empty());
}

#[tokio::test]
async fn unapproved_trust_gets_no_diffs() {
	let app = build_app();
	seed_actor(&app, "a1").await;
	seed_trust(&app, "a1", "p1", "friend").await;
	let patch = actingweb_types::store_adapter::TrustPatch {
		peer_approved: actingweb_types::types::Patch::Value(false),
		..Default::default()
	};
	app.store.update_trust("a1", "p1", &patch).await.unwrap();
	seed_subscription(&app, "a1", "p1", "s1", None, Granularity::None, false).await;

	engine::register_diff(&app, "a1", "properties", Some("note"), &serde_json::json!("x"))
		.await
		.unwrap();

	assert!(app.store.list_diffs("a1", "s1").await.unwrap().is_empty());
}

#[tokio::test]
async fn suspension_skips_diffs_and_resume_emits_one_resync() {
	let app = build_app();
	seed_actor(&app, "a1").await;
	seed_trust(&app, "a1", "p1", "friend").await;
	seed_subscription(&app, "a1", "p1", "s1", Some("memory_travel"), Granularity::None, false)
		.await;

	engine::suspend(&app, "a1", "properties", Some("memory_travel")).await.unwrap();
	for i in 0..100 {
		engine::register_diff(
			&app,
			"a1",
			"properties",
			Some("memory_travel"),
			&serde_json::json!({ "i": i }),
		)
		.await
		.unwrap();
	}
	assert!(app.store.list_diffs("a1", "s1").await.unwrap().is_empty());

	engine::resume(&app, "a1", "properties", Some("memory_travel")).await.unwrap();
	let diffs = app.store.list_diffs("a1", "s1").await.unwrap();
	assert_eq!(diffs.len(), 1, "resume emits exactly one resync diff");
	assert_eq!(diffs[0].seqnr, 1);
	let blob: serde_json::Value = serde_json::from_str(&diffs[0].blob).unwrap();
	assert!(blob.get("__resync_url").is_some());
}

#[tokio::test]
async fn whole_target_suspension_covers_subtargets() {
	let app = build_app();
	seed_actor(&app, "a1").await;
	seed_trust(&app, "a1", "p1", "friend").await;
	seed_subscription(&app, "a1", "p1", "s1", None, Granularity::None, false).await;

	engine::suspend(&app, "a1", "properties", None).await.unwrap();
	engine::register_diff(&app, "a1", "properties", Some("note"), &serde_json::json!("x"))
		.await
		.unwrap();
	assert!(app.store.list_diffs("a1", "s1").await.unwrap().is_empty());
}

#[tokio::test]
async fn purge_peer_removes_all_peer_rows() {
	let app = build_app();
	seed_actor(&app, "a1").await;
	seed_trust(&app, "a1", "p1", "friend").await;
	seed_subscription(&app, "a1", "p1", "s1", None, Granularity::None, false).await;
	engine::register_diff(&app, "a1", "properties", Some("note"), &serde_json::json!("x"))
		.await
		.unwrap();

	engine::purge_peer(&app, "a1", "p1").await.unwrap();
	assert!(app.store.list_subscriptions("a1", Some("p1")).await.unwrap().is_empty());
	assert!(app.store.list_diffs("a1", "s1").await.unwrap().is_empty());
}

// vim: ts=4
