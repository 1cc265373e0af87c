//! Token issuance, PKCE, and refresh rotation (including races and reuse).

mod common;

use common::{build_app, seed_actor, seed_client};

use actingweb_oauth::{bind_client_trust, client_peer_id, token};
use actingweb_types::auth_adapter::AuthCodeRecord;
use actingweb_types::error::Error;
use actingweb_types::store_adapter::EstablishedVia;
use actingweb_types::types::Timestamp;
use actingweb_types::utils::s256_challenge;

async fn seed_code(
	app: &actingweb_core::app::App,
	code: &str,
	client_id: &str,
	challenge: Option<&str>,
) {
	app.auth_store
		.create_auth_code(&AuthCodeRecord {
			code: code.into(),
			client_id: client_id.into(),
			actor_id: "a1".into(),
			peer_id: client_peer_id(client_id).into(),
			redirect_uri: "https://client.example.com/cb".into(),
			code_challenge: challenge.map(Into::into),
			scope: None,
			expires_at: Timestamp::from_now(600),
		})
		.await
		.unwrap();
}

#[tokio::test]
async fn auth_code_is_single_use() {
	let app = build_app();
	seed_actor(&app, "a1").await;
	let client = seed_client(&app, "c1").await;
	seed_code(&app, "code1", &client.client_id, None).await;

	let tokens = token::redeem_auth_code(
		&app,
		"code1",
		&client.client_id,
		"https://client.example.com/cb",
		None,
	)
	.await
	.unwrap();
	assert!(tokens.access_token.starts_with("aw_at_"));
	assert!(tokens.refresh_token.as_deref().is_some_and(|t| t.starts_with("aw_rt_")));

	let err = token::redeem_auth_code(
		&app,
		"code1",
		&client.client_id,
		"https://client.example.com/cb",
		None,
	)
	.await
	.unwrap_err();
	assert!(matches!(err, Error::NotFound));
}

#[tokio::test]
async fn pkce_verifier_is_enforced() {
	let app = build_app();
	seed_actor(&app, "a1").await;
	let client = seed_client(&app, "c1").await;
	let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
	seed_code(&app, "code1", &client.client_id, Some(&s256_challenge(verifier))).await;

	// Wrong verifier fails closed.
	let err = token::redeem_auth_code(
		&app,
		"code1",
		&client.client_id,
		"https://client.example.com/cb",
		Some("wrong"),
	)
	.await
	.unwrap_err();
	assert!(matches!(err, Error::Unauthorized));

	// The code was consumed by the failed attempt: single use.
	seed_code(&app, "code2", &client.client_id, Some(&s256_challenge(verifier))).await;
	token::redeem_auth_code(
		&app,
		"code2",
		&client.client_id,
		"https://client.example.com/cb",
		Some(verifier),
	)
	.await
	.unwrap();
}

#[tokio::test]
async fn refresh_rotation_issues_new_pair_and_marks_old() {
	let app = build_app();
	seed_actor(&app, "a1").await;
	let client = seed_client(&app, "c1").await;
	let first =
		token::issue_pair(&app, &client.client_id, "a1", &client_peer_id("c1"), None).await.unwrap();
	let old_refresh = first.refresh_token.unwrap();

	let second = token::rotate_refresh(&app, &old_refresh, &client.client_id).await.unwrap();
	assert_ne!(second.access_token, first.access_token);
	let new_refresh = second.refresh_token.unwrap();
	assert_ne!(new_refresh, old_refresh);

	let stored = app.auth_store.read_refresh_token(&old_refresh).await.unwrap();
	assert!(stored.used);
	assert_eq!(stored.replaced_by_refresh.as_deref(), Some(new_refresh.as_ref()));
}

#[tokio::test]
async fn concurrent_rotation_is_idempotent_within_grace() {
	let app = build_app();
	seed_actor(&app, "a1").await;
	let client = seed_client(&app, "c1").await;
	let first =
		token::issue_pair(&app, &client.client_id, "a1", &client_peer_id("c1"), None).await.unwrap();
	let refresh = first.refresh_token.unwrap();

	// Two racing requests: both succeed and both end up with the winner's pair.
	let (r1, r2) = tokio::join!(
		token::rotate_refresh(&app, &refresh, &client.client_id),
		token::rotate_refresh(&app, &refresh, &client.client_id),
	);
	let t1 = r1.unwrap();
	let t2 = r2.unwrap();
	assert_eq!(t1.access_token, t2.access_token);
	assert_eq!(t1.refresh_token, t2.refresh_token);
}

#[tokio::test]
async fn reuse_in_degraded_window_gets_access_only() {
	let app = build_app();
	seed_actor(&app, "a1").await;
	let client = seed_client(&app, "c1").await;
	let first =
		token::issue_pair(&app, &client.client_id, "a1", &client_peer_id("c1"), None).await.unwrap();
	let refresh = first.refresh_token.unwrap();

	token::rotate_refresh(&app, &refresh, &client.client_id).await.unwrap();

	// Age the rotation past the idempotent window but inside the degraded one.
	let record = app.auth_store.read_refresh_token(&refresh).await.unwrap();
	let mut aged = record.clone();
	aged.rotated_at = Some(Timestamp::from_now(-30));
	app.auth_store.delete_refresh_token(&refresh).await.unwrap();
	app.auth_store.create_refresh_token(&aged).await.unwrap();

	let degraded = token::rotate_refresh(&app, &refresh, &client.client_id).await.unwrap();
	assert!(degraded.refresh_token.is_none(), "no new refresh inside the degraded window");
}

#[tokio::test]
async fn reuse_after_grace_revokes_the_family() {
	let app = build_app();
	seed_actor(&app, "a1").await;
	let client = seed_client(&app, "c1").await;
	let first =
		token::issue_pair(&app, &client.client_id, "a1", &client_peer_id("c1"), None).await.unwrap();
	let refresh = first.refresh_token.unwrap();

	let rotated = token::rotate_refresh(&app, &refresh, &client.client_id).await.unwrap();
	let live_refresh = rotated.refresh_token.unwrap();

	// Age the rotation past 60 s.
	let record = app.auth_store.read_refresh_token(&refresh).await.unwrap();
	let mut aged = record.clone();
	aged.rotated_at = Some(Timestamp::from_now(-120));
	app.auth_store.delete_refresh_token(&refresh).await.unwrap();
	app.auth_store.create_refresh_token(&aged).await.unwrap();

	let err = token::rotate_refresh(&app, &refresh, &client.client_id).await.unwrap_err();
	assert!(matches!(err, Error::Unauthorized));

	// The whole family is gone, including the live replacement.
	assert!(matches!(
		app.auth_store.read_access_token(&rotated.access_token).await,
		Err(Error::NotFound)
	));
	assert!(matches!(
		app.auth_store.read_refresh_token(&live_refresh).await,
		Err(Error::NotFound)
	));
}

#[tokio::test]
async fn binding_creates_an_active_mcp_trust() {
	let app = build_app();
	seed_actor(&app, "a1").await;
	let client = seed_client(&app, "c1").await;

	let trust = bind_client_trust(
		&app,
		"a1",
		&client,
		"alice@example.com",
		EstablishedVia::Oauth2Interactive,
	)
	.await
	.unwrap();
	assert!(trust.is_active());
	assert_eq!(trust.relationship.as_ref(), "mcp_client");
	assert_eq!(trust.oauth_client_id.as_deref(), Some("c1"));

	// Binding is idempotent.
	let again = bind_client_trust(
		&app,
		"a1",
		&client,
		"alice@example.com",
		EstablishedVia::Oauth2Interactive,
	)
	.await
	.unwrap();
	assert_eq!(again.peer_id, trust.peer_id);

	let by_client = app.store.read_trust_by_client_id("c1").await.unwrap();
	assert_eq!(by_client.actor_id.as_ref(), "a1");
}

// vim: ts=4
