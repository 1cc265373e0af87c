//! Inbound callback processor: ordering, dedup, gaps, and back-pressure.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use common::{build_app, build_app_with, seed_actor, seed_subscription, seed_trust};

use actingweb_core::config::RuntimeConfig;
use actingweb_core::hooks::{CallbackHook, HookRegistry};
use actingweb_subscription::{callback, engine};
use actingweb_types::error::Error;
use actingweb_types::types::Granularity;
use actingweb_types::wire::{CallbackEnvelope, CallbackType};

fn envelope(sub_id: &str, sequence: u32, data: serde_json::Value) -> CallbackEnvelope {
	CallbackEnvelope {
		id: sub_id.into(),
		target: "properties".into(),
		subtarget: Some("note".into()),
		resource: None,
		subscription_id: sub_id.into(),
		sequence,
		timestamp: "2025-06-01T10:00:00Z".into(),
		granularity: Granularity::High,
		typ: CallbackType::Diff,
		data: Some(data),
		url: None,
	}
}

async fn seed_mirror(app: &actingweb_core::app::App) {
	seed_actor(app, "a1").await;
	seed_trust(app, "a1", "p1", "friend").await;
	seed_subscription(app, "a1", "p1", "s1", Some("note"), Granularity::High, true).await;
}

#[tokio::test]
async fn in_order_delivery_advances_state_and_cache() {
	let app = build_app();
	seed_mirror(&app).await;

	for seq in 1..=3 {
		callback::process_callback(
			&app,
			"a1",
			"p1",
			"s1",
			envelope("s1", seq, serde_json::json!(format!("v{}", seq))),
		)
		.await
		.unwrap();
	}

	let state = app.store.read_callback_state("a1", "p1", "s1").await.unwrap().unwrap();
	assert_eq!(state.last_processed_seq, 3);

	let cached = engine::read_cache(&app, "a1", "p1", "properties", Some("note")).await.unwrap();
	assert_eq!(cached, serde_json::json!("v3"));
}

#[tokio::test]
async fn duplicate_callbacks_are_acknowledged_once() {
	let counter = Arc::new(AtomicU32::new(0));
	let hook_counter = counter.clone();
	let hook: CallbackHook = Arc::new(move |_, _| {
		let c = hook_counter.clone();
		Box::pin(async move {
			c.fetch_add(1, Ordering::SeqCst);
			Ok(serde_json::Value::Null)
		})
	});
	let mut hooks = HookRegistry::new();
	hooks.on_callback("subscription", hook);
	let app = build_app_with(RuntimeConfig::default(), hooks);
	seed_mirror(&app).await;

	let env = envelope("s1", 1, serde_json::json!("once"));
	callback::process_callback(&app, "a1", "p1", "s1", env.clone()).await.unwrap();
	callback::process_callback(&app, "a1", "p1", "s1", env).await.unwrap();

	assert_eq!(counter.load(Ordering::SeqCst), 1, "handler ran exactly once");
	let state = app.store.read_callback_state("a1", "p1", "s1").await.unwrap().unwrap();
	assert_eq!(state.last_processed_seq, 1);
}

#[tokio::test]
async fn gap_parks_callback_until_missing_sequence_arrives() {
	let app = build_app();
	seed_mirror(&app).await;

	// seq 2 arrives first: parked, nothing applied.
	callback::process_callback(&app, "a1", "p1", "s1", envelope("s1", 2, serde_json::json!("b")))
		.await
		.unwrap();
	let state = app.store.read_callback_state("a1", "p1", "s1").await.unwrap().unwrap();
	assert_eq!(state.last_processed_seq, 0);
	assert!(state.pending.contains("\"sequence\":2"));

	// seq 1 arrives: both apply in order.
	callback::process_callback(&app, "a1", "p1", "s1", envelope("s1", 1, serde_json::json!("a")))
		.await
		.unwrap();
	let state = app.store.read_callback_state("a1", "p1", "s1").await.unwrap().unwrap();
	assert_eq!(state.last_processed_seq, 2);
	assert_eq!(state.pending.as_ref(), "[]");

	let cached = engine::read_cache(&app, "a1", "p1", "properties", Some("note")).await.unwrap();
	assert_eq!(cached, serde_json::json!("b"));
}

#[tokio::test]
async fn full_pending_queue_returns_rate_limited() {
	let config = RuntimeConfig { max_pending: 2, gap_timeout_secs: 3600, ..Default::default() };
	let app = build_app_with(config, HookRegistry::new());
	seed_mirror(&app).await;

	// Three gapped callbacks; the third exceeds max_pending.
	for seq in [5, 6] {
		callback::process_callback(
			&app,
			"a1",
			"p1",
			"s1",
			envelope("s1", seq, serde_json::json!(seq)),
		)
		.await
		.unwrap();
	}
	let err = callback::process_callback(
		&app,
		"a1",
		"p1",
		"s1",
		envelope("s1", 7, serde_json::json!(7)),
	)
	.await
	.unwrap_err();
	assert!(matches!(err, Error::RateLimited(_)));
}

#[tokio::test]
async fn list_diffs_fold_into_cached_array() {
	let app = build_app();
	seed_actor(&app, "a1").await;
	seed_trust(&app, "a1", "p1", "friend").await;
	seed_subscription(&app, "a1", "p1", "s1", Some("memory_travel"), Granularity::High, true)
		.await;

	let mk = |seq: u32, place: &str, index: u32, length: u32| {
		envelope(
			"s1",
			seq,
			serde_json::json!({
				"list": "memory_travel",
				"operation": "append",
				"item": { "place": place },
				"index": index,
				"length": length,
			}),
		)
	};

	callback::process_callback(&app, "a1", "p1", "s1", mk(1, "Paris", 0, 1)).await.unwrap();
	callback::process_callback(&app, "a1", "p1", "s1", mk(2, "Oslo", 1, 2)).await.unwrap();

	let cached =
		engine::read_cache(&app, "a1", "p1", "properties", Some("memory_travel")).await.unwrap();
	assert_eq!(
		cached,
		serde_json::json!([{ "place": "Paris" }, { "place": "Oslo" }])
	);
}

#[tokio::test]
async fn unknown_subscription_is_not_found() {
	let app = build_app();
	seed_actor(&app, "a1").await;
	seed_trust(&app, "a1", "p1", "friend").await;

	let err = callback::process_callback(
		&app,
		"a1",
		"p1",
		"nope",
		envelope("nope", 1, serde_json::json!("x")),
	)
	.await
	.unwrap_err();
	assert!(matches!(err, Error::NotFound));
}

// vim: ts=4
