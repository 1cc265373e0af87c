//! Trust state machine and teardown cascade.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use common::{build_app, build_app_with, seed_actor};

use actingweb_core::hooks::{HookRegistry, LifecycleHook, LifecycleKind};
use actingweb_core::perm;
use actingweb_trust::manager;
use actingweb_types::auth_adapter::{AccessTokenRecord, RefreshTokenRecord};
use actingweb_types::error::Error;
use actingweb_types::permissions::PermissionSet;
use actingweb_types::store_adapter::{EstablishedVia, TrustPatch};
use actingweb_types::types::{Patch, Timestamp};
use actingweb_types::wire::TrustCreateBody;

fn handshake_body(peer_id: &str) -> TrustCreateBody {
	TrustCreateBody {
		id: peer_id.into(),
		baseuri: format!("http://127.0.0.1:9/{}", peer_id).into(),
		peer_type: "urn:actingweb:example:peer".into(),
		secret: format!("secret-{}", peer_id).into(),
		verification_token: Some("vtoken".into()),
		desc: None,
	}
}

#[tokio::test]
async fn inbound_trust_starts_unapproved_but_verified() {
	let app = build_app();
	seed_actor(&app, "a1").await;

	let record = manager::create_verified_trust(
		&app,
		"a1",
		"friend",
		&handshake_body("p1"),
		EstablishedVia::Actingweb,
	)
	.await
	.unwrap();

	assert!(!record.approved);
	assert!(record.peer_approved);
	assert!(record.verified);
	assert!(!record.is_active());
}

#[tokio::test]
async fn unknown_trust_type_is_rejected() {
	let app = build_app();
	seed_actor(&app, "a1").await;

	let err = manager::create_verified_trust(
		&app,
		"a1",
		"soulmate",
		&handshake_body("p1"),
		EstablishedVia::Actingweb,
	)
	.await
	.unwrap_err();
	assert!(matches!(err, Error::ValidationError(_)));
}

#[tokio::test]
async fn duplicate_inbound_trust_conflicts() {
	let app = build_app();
	seed_actor(&app, "a1").await;
	let body = handshake_body("p1");

	manager::create_verified_trust(&app, "a1", "friend", &body, EstablishedVia::Actingweb)
		.await
		.unwrap();
	let err =
		manager::create_verified_trust(&app, "a1", "friend", &body, EstablishedVia::Actingweb)
			.await
			.unwrap_err();
	assert!(matches!(err, Error::Conflict(_)));
}

#[tokio::test]
async fn approval_activates_trust_and_fires_hook() {
	let fired = Arc::new(AtomicU32::new(0));
	let hook_fired = fired.clone();
	let hook: LifecycleHook = Arc::new(move |_, _| {
		let f = hook_fired.clone();
		Box::pin(async move {
			f.fetch_add(1, Ordering::SeqCst);
			Ok(())
		})
	});
	let mut hooks = HookRegistry::new();
	hooks.on_lifecycle(LifecycleKind::TrustFullyApprovedLocal, hook);
	let app = build_app_with(hooks);
	seed_actor(&app, "a1").await;

	manager::create_verified_trust(
		&app,
		"a1",
		"friend",
		&handshake_body("p1"),
		EstablishedVia::Actingweb,
	)
	.await
	.unwrap();

	// Peer side already approved; local approval completes the pair.
	let record = manager::approve(&app, "a1", "p1").await.unwrap();
	assert!(record.is_active());
	assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn double_approval_is_a_state_machine_violation() {
	let app = build_app();
	seed_actor(&app, "a1").await;
	manager::create_verified_trust(
		&app,
		"a1",
		"friend",
		&handshake_body("p1"),
		EstablishedVia::Actingweb,
	)
	.await
	.unwrap();

	manager::approve(&app, "a1", "p1").await.unwrap();
	let err = manager::approve(&app, "a1", "p1").await.unwrap_err();
	assert!(matches!(err, Error::TrustState(_)));
}

#[tokio::test]
async fn fresh_capability_cache_is_served_without_refetch() {
	let app = build_app();
	seed_actor(&app, "a1").await;
	manager::create_verified_trust(
		&app,
		"a1",
		"friend",
		&handshake_body("p1"),
		EstablishedVia::Actingweb,
	)
	.await
	.unwrap();

	// Prime the cache as a recent fetch would.
	let patch = TrustPatch {
		aw_supported: Patch::Value("trust,subscriptions,callbackcompression".into()),
		capabilities_fetched_at: Patch::Value(Timestamp::now()),
		..Default::default()
	};
	app.store.update_trust("a1", "p1", &patch).await.unwrap();

	// The peer baseuri is unreachable; a cache hit is the only way this
	// returns Ok.
	let tags = actingweb_trust::capabilities::fetch_capabilities(&app, "a1", "p1").await.unwrap();
	assert!(tags.contains("callbackcompression"));
}

#[tokio::test]
async fn delete_revokes_bound_oauth_client_and_overrides() {
	let app = build_app();
	seed_actor(&app, "a1").await;
	manager::create_verified_trust(
		&app,
		"a1",
		"mcp_client",
		&handshake_body("oauth2:client-1"),
		EstablishedVia::Oauth2Interactive,
	)
	.await
	.unwrap();

	// Bind an OAuth2 client with live tokens to the trust.
	let patch =
		TrustPatch { oauth_client_id: Patch::Value("client-1".into()), ..Default::default() };
	app.store.update_trust("a1", "oauth2:client-1", &patch).await.unwrap();

	app.auth_store
		.create_access_token(&AccessTokenRecord {
			token: "at1".into(),
			client_id: "client-1".into(),
			actor_id: "a1".into(),
			peer_id: "oauth2:client-1".into(),
			scope: None,
			created_at: Timestamp::now(),
			expires_at: Timestamp::from_now(3600),
		})
		.await
		.unwrap();
	app.auth_store
		.create_refresh_token(&RefreshTokenRecord {
			token: "rt1".into(),
			client_id: "client-1".into(),
			actor_id: "a1".into(),
			peer_id: "oauth2:client-1".into(),
			scope: None,
			created_at: Timestamp::now(),
			expires_at: Timestamp::from_now(3600),
			used: false,
			rotated_at: None,
			replaced_by_access: None,
			replaced_by_refresh: None,
		})
		.await
		.unwrap();
	perm::write_override(&app.store, "a1", "oauth2:client-1", &PermissionSet::default())
		.await
		.unwrap();

	manager::delete_trust(&app, "a1", "oauth2:client-1", false).await.unwrap();

	assert!(matches!(app.store.read_trust("a1", "oauth2:client-1").await, Err(Error::NotFound)));
	assert!(matches!(app.auth_store.read_access_token("at1").await, Err(Error::NotFound)));
	assert!(matches!(app.auth_store.read_refresh_token("rt1").await, Err(Error::NotFound)));
	assert!(
		perm::read_override(&app.store, "a1", "oauth2:client-1").await.unwrap().is_none()
	);
}

// vim: ts=4
