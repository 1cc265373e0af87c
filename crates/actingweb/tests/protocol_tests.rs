//! End-to-end protocol tests against the composed router.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use base64::Engine;
use http_body_util::BodyExt;
use tower::ServiceExt;

use actingweb::Builder;
use actingweb_store_adapter_memory::MemoryStore;

async fn build_router() -> (actingweb::App, Router) {
	let store = Arc::new(MemoryStore::new());
	let app = Builder::new()
		.config(actingweb::config::RuntimeConfig::default())
		.store_adapter(store.clone())
		.auth_adapter(store)
		.build()
		.await
		.expect("build");
	let router = actingweb::routes::init(app.clone());
	(app, router)
}

fn basic(creator: &str, passphrase: &str) -> String {
	format!(
		"Basic {}",
		base64::engine::general_purpose::STANDARD.encode(format!("{}:{}", creator, passphrase))
	)
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
	let bytes = response.into_body().collect().await.expect("body").to_bytes();
	serde_json::from_slice(&bytes).expect("json body")
}

async fn create_actor(router: &Router, creator: &str) -> (String, String) {
	let req = Request::builder()
		.method("POST")
		.uri("/")
		.header(header::CONTENT_TYPE, "application/json")
		.body(Body::from(format!("{{\"creator\": \"{}\"}}", creator)))
		.expect("request");
	let res = router.clone().oneshot(req).await.expect("response");
	assert_eq!(res.status(), StatusCode::CREATED);
	assert!(res.headers().contains_key(header::LOCATION));
	let body = body_json(res).await;
	(
		body["id"].as_str().expect("id").to_string(),
		body["passphrase"].as_str().expect("passphrase").to_string(),
	)
}

#[tokio::test]
async fn factory_creates_actor_and_properties_roundtrip() {
	let (_app, router) = build_router().await;
	let (id, passphrase) = create_actor(&router, "alice@example.com").await;
	let auth = basic("alice@example.com", &passphrase);

	// Empty collection is 200 {}
	let res = router
		.clone()
		.oneshot(
			Request::builder()
				.uri(format!("/{}/properties", id))
				.header(header::AUTHORIZATION, &auth)
				.body(Body::empty())
				.expect("request"),
		)
		.await
		.expect("response");
	assert_eq!(res.status(), StatusCode::OK);
	assert_eq!(body_json(res).await, serde_json::json!({}));

	// PUT then GET round-trips the bytes
	let res = router
		.clone()
		.oneshot(
			Request::builder()
				.method("PUT")
				.uri(format!("/{}/properties/note", id))
				.header(header::AUTHORIZATION, &auth)
				.header(header::CONTENT_TYPE, "application/json")
				.body(Body::from("\"hello\""))
				.expect("request"),
		)
		.await
		.expect("response");
	assert_eq!(res.status(), StatusCode::NO_CONTENT);

	let res = router
		.clone()
		.oneshot(
			Request::builder()
				.uri(format!("/{}/properties/note", id))
				.header(header::AUTHORIZATION, &auth)
				.body(Body::empty())
				.expect("request"),
		)
		.await
		.expect("response");
	assert_eq!(res.status(), StatusCode::OK);
	assert_eq!(body_json(res).await, serde_json::json!("hello"));
}

#[tokio::test]
async fn meta_is_public_discovery() {
	let (_app, router) = build_router().await;
	let (id, _passphrase) = create_actor(&router, "alice@example.com").await;

	let res = router
		.clone()
		.oneshot(
			Request::builder()
				.uri(format!("/{}/meta/actingweb/version", id))
				.body(Body::empty())
				.expect("request"),
		)
		.await
		.expect("response");
	assert_eq!(res.status(), StatusCode::OK);
	let bytes = res.into_body().collect().await.expect("body").to_bytes();
	assert_eq!(&bytes[..], b"1.4");
}

#[tokio::test]
async fn missing_credential_is_401_and_bad_bearer_names_the_scheme() {
	let (_app, router) = build_router().await;
	let (id, _passphrase) = create_actor(&router, "alice@example.com").await;

	let res = router
		.clone()
		.oneshot(
			Request::builder()
				.uri(format!("/{}/properties", id))
				.body(Body::empty())
				.expect("request"),
		)
		.await
		.expect("response");
	assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

	let res = router
		.clone()
		.oneshot(
			Request::builder()
				.uri(format!("/{}/properties", id))
				.header(header::AUTHORIZATION, "Bearer bogus")
				.body(Body::empty())
				.expect("request"),
		)
		.await
		.expect("response");
	assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
	let www = res
		.headers()
		.get(header::WWW_AUTHENTICATE)
		.and_then(|v| v.to_str().ok())
		.expect("www-authenticate");
	assert!(www.contains("invalid_token"));
}

#[tokio::test]
async fn trust_handshake_approval_and_peer_read() {
	let (_app, router) = build_router().await;
	let (id, passphrase) = create_actor(&router, "alice@example.com").await;
	let owner = basic("alice@example.com", &passphrase);

	// Owner writes a public note and a protected value.
	for (name, value) in [("note", "\"hello\""), ("private/keys", "\"s3cret\"")] {
		let res = router
			.clone()
			.oneshot(
				Request::builder()
					.method("PUT")
					.uri(format!("/{}/properties/{}", id, name))
					.header(header::AUTHORIZATION, &owner)
					.header(header::CONTENT_TYPE, "application/json")
					.body(Body::from(value))
					.expect("request"),
			)
			.await
			.expect("response");
		assert_eq!(res.status(), StatusCode::NO_CONTENT);
	}

	// Peer B initiates the trust without any credential.
	let handshake = serde_json::json!({
		"id": "peer-b",
		"baseuri": "http://127.0.0.1:9/peer-b",
		"type": "urn:actingweb:example:peer",
		"secret": "peer-b-secret",
		"verificationToken": "vt",
	});
	let res = router
		.clone()
		.oneshot(
			Request::builder()
				.method("POST")
				.uri(format!("/{}/trust/friend", id))
				.header(header::CONTENT_TYPE, "application/json")
				.body(Body::from(handshake.to_string()))
				.expect("request"),
		)
		.await
		.expect("response");
	assert_eq!(res.status(), StatusCode::CREATED);

	// Before approval, the peer's secret opens nothing.
	let res = router
		.clone()
		.oneshot(
			Request::builder()
				.uri(format!("/{}/properties/note", id))
				.header(header::AUTHORIZATION, "Bearer peer-b-secret")
				.body(Body::empty())
				.expect("request"),
		)
		.await
		.expect("response");
	assert_eq!(res.status(), StatusCode::FORBIDDEN);

	// Owner approves (peer notification fails silently; peer is offline).
	let res = router
		.clone()
		.oneshot(
			Request::builder()
				.method("PUT")
				.uri(format!("/{}/trust/friend/peer-b", id))
				.header(header::AUTHORIZATION, &owner)
				.header(header::CONTENT_TYPE, "application/json")
				.body(Body::from("{\"approved\": true}"))
				.expect("request"),
		)
		.await
		.expect("response");
	assert_eq!(res.status(), StatusCode::OK);

	// friend may read the note but not the protected scope.
	let res = router
		.clone()
		.oneshot(
			Request::builder()
				.uri(format!("/{}/properties/note", id))
				.header(header::AUTHORIZATION, "Bearer peer-b-secret")
				.body(Body::empty())
				.expect("request"),
		)
		.await
		.expect("response");
	assert_eq!(res.status(), StatusCode::OK);
	assert_eq!(body_json(res).await, serde_json::json!("hello"));

	let res = router
		.clone()
		.oneshot(
			Request::builder()
				.uri(format!("/{}/properties/private/keys", id))
				.header(header::AUTHORIZATION, "Bearer peer-b-secret")
				.body(Body::empty())
				.expect("request"),
		)
		.await
		.expect("response");
	assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn subscription_diffs_are_pollable_and_cleared_on_fetch() {
	let (_app, router) = build_router().await;
	let (id, passphrase) = create_actor(&router, "alice@example.com").await;
	let owner = basic("alice@example.com", &passphrase);

	// Establish an approved trust for peer-b.
	let handshake = serde_json::json!({
		"id": "peer-b",
		"baseuri": "http://127.0.0.1:9/peer-b",
		"type": "urn:actingweb:example:peer",
		"secret": "peer-b-secret",
	});
	router
		.clone()
		.oneshot(
			Request::builder()
				.method("POST")
				.uri(format!("/{}/trust/friend", id))
				.header(header::CONTENT_TYPE, "application/json")
				.body(Body::from(handshake.to_string()))
				.expect("request"),
		)
		.await
		.expect("response");
	router
		.clone()
		.oneshot(
			Request::builder()
				.method("PUT")
				.uri(format!("/{}/trust/friend/peer-b", id))
				.header(header::AUTHORIZATION, &owner)
				.header(header::CONTENT_TYPE, "application/json")
				.body(Body::from("{\"approved\": true}"))
				.expect("request"),
		)
		.await
		.expect("response");

	// Peer subscribes to memory_travel with polling-only granularity.
	let res = router
		.clone()
		.oneshot(
			Request::builder()
				.method("POST")
				.uri(format!("/{}/subscriptions/peer-b", id))
				.header(header::AUTHORIZATION, "Bearer peer-b-secret")
				.header(header::CONTENT_TYPE, "application/json")
				.body(Body::from(
					"{\"target\": \"properties\", \"subtarget\": \"memory_travel\", \"granularity\": \"none\"}",
				))
				.expect("request"),
		)
		.await
		.expect("response");
	assert_eq!(res.status(), StatusCode::CREATED);
	let sub = body_json(res).await;
	let sub_id = sub["subscriptionid"].as_str().expect("subscriptionid").to_string();

	// Owner appends a list item.
	let res = router
		.clone()
		.oneshot(
			Request::builder()
				.method("POST")
				.uri(format!("/{}/properties/memory_travel/items", id))
				.header(header::AUTHORIZATION, &owner)
				.header(header::CONTENT_TYPE, "application/json")
				.body(Body::from("{\"place\": \"Paris\"}"))
				.expect("request"),
		)
		.await
		.expect("response");
	assert_eq!(res.status(), StatusCode::CREATED);

	// The diff is waiting at sequence 1 with the list envelope shape.
	let res = router
		.clone()
		.oneshot(
			Request::builder()
				.uri(format!("/{}/subscriptions/peer-b/{}", id, sub_id))
				.header(header::AUTHORIZATION, "Bearer peer-b-secret")
				.body(Body::empty())
				.expect("request"),
		)
		.await
		.expect("response");
	assert_eq!(res.status(), StatusCode::OK);
	let body = body_json(res).await;
	let diffs = body["data"].as_array().expect("diff array");
	assert_eq!(diffs.len(), 1);
	assert_eq!(diffs[0]["sequence"], 1);
	assert_eq!(diffs[0]["data"]["operation"], "append");
	assert_eq!(diffs[0]["data"]["list"], "memory_travel");
	assert_eq!(diffs[0]["data"]["length"], 1);

	// Fetching the specific sequence clears it.
	let res = router
		.clone()
		.oneshot(
			Request::builder()
				.uri(format!("/{}/subscriptions/peer-b/{}/1", id, sub_id))
				.header(header::AUTHORIZATION, "Bearer peer-b-secret")
				.body(Body::empty())
				.expect("request"),
		)
		.await
		.expect("response");
	assert_eq!(res.status(), StatusCode::OK);

	let res = router
		.clone()
		.oneshot(
			Request::builder()
				.uri(format!("/{}/subscriptions/peer-b/{}/1", id, sub_id))
				.header(header::AUTHORIZATION, "Bearer peer-b-secret")
				.body(Body::empty())
				.expect("request"),
		)
		.await
		.expect("response");
	assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn empty_trust_and_subscription_collections_are_200() {
	let (_app, router) = build_router().await;
	let (id, passphrase) = create_actor(&router, "alice@example.com").await;
	let owner = basic("alice@example.com", &passphrase);

	for path in ["trust", "subscriptions"] {
		let res = router
			.clone()
			.oneshot(
				Request::builder()
					.uri(format!("/{}/{}", id, path))
					.header(header::AUTHORIZATION, &owner)
					.body(Body::empty())
					.expect("request"),
			)
			.await
			.expect("response");
		assert_eq!(res.status(), StatusCode::OK);
		assert_eq!(body_json(res).await, serde_json::json!([]));
	}
}

#[tokio::test]
async fn oauth_discovery_document_lists_endpoints() {
	let (_app, router) = build_router().await;
	let res = router
		.clone()
		.oneshot(
			Request::builder()
				.uri("/.well-known/oauth-authorization-server")
				.body(Body::empty())
				.expect("request"),
		)
		.await
		.expect("response");
	assert_eq!(res.status(), StatusCode::OK);
	let body = body_json(res).await;
	assert!(body["token_endpoint"].as_str().expect("token endpoint").ends_with("/oauth/token"));
	assert_eq!(body["code_challenge_methods_supported"], serde_json::json!(["S256"]));
}

#[tokio::test]
async fn bootstrap_registers_builtin_trust_types() {
	let (app, router) = build_router().await;
	{
		let registry = app.trust_types.read().await;
		assert!(registry.get("friend").is_some());
		assert!(registry.get("mcp_client").is_some());
	}

	let (id, _passphrase) = create_actor(&router, "alice@example.com").await;
	let res = router
		.clone()
		.oneshot(
			Request::builder()
				.uri(format!("/{}/meta/trusttypes", id))
				.body(Body::empty())
				.expect("request"),
		)
		.await
		.expect("response");
	assert_eq!(res.status(), StatusCode::OK);
	let body = body_json(res).await;
	let names: Vec<&str> =
		body.as_array().expect("array").iter().filter_map(|t| t["name"].as_str()).collect();
	assert!(names.contains(&"friend"));
	assert!(names.contains(&"mcp_client"));
}

// vim: ts=4
