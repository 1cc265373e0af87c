//! Shared fixtures for subscription engine tests.
#![allow(dead_code)]

use std::sync::Arc;

use actingweb_core::app::{App, AppState};
use actingweb_core::config::RuntimeConfig;
use actingweb_core::extensions::Extensions;
use actingweb_core::hooks::HookRegistry;
use actingweb_core::request::PeerClient;
use actingweb_core::trust_types::{TrustTypeRegistry, builtin_trust_types};
use actingweb_store_adapter_memory::MemoryStore;
use actingweb_subscription::FanoutManager;
use actingweb_types::auth_adapter::AuthAdapter;
use actingweb_types::store_adapter::{
	ActorRecord, StoreAdapter, SubscriptionRecord, TrustRecord,
};
use actingweb_types::types::{Granularity, Timestamp};

pub fn build_app() -> App {
	build_app_with(RuntimeConfig::default(), HookRegistry::new())
}

pub fn build_app_with(config: RuntimeConfig, hooks: HookRegistry) -> App {
	let store = Arc::new(MemoryStore::new());
	let mut registry = TrustTypeRegistry::new();
	for tt in builtin_trust_types() {
		registry.register(tt);
	}
	let mut extensions = Extensions::new();
	extensions.insert(FanoutManager::new(&config));

	Arc::new(AppState {
		config,
		request: PeerClient::new().expect("client"),
		trust_types: Arc::new(tokio::sync::RwLock::new(registry)),
		hooks: Arc::new(hooks),
		store: store.clone() as Arc<dyn StoreAdapter>,
		auth_store: store as Arc<dyn AuthAdapter>,
		extensions,
	})
}

pub async fn seed_actor(app: &App, actor_id: &str) {
	app.store
		.create_actor(&ActorRecord {
			actor_id: actor_id.into(),
			creator: format!("{}@example.com", actor_id).into(),
			passphrase_hash: "salt$hash".into(),
			created_at: Timestamp::now(),
		})
		.await
		.expect("actor");
}

pub async fn seed_trust(app: &App, actor_id: &str, peer_id: &str, relationship: &str) {
	app.store
		.create_trust(&TrustRecord {
			actor_id: actor_id.into(),
			peer_id: peer_id.into(),
			baseuri: format!("http://127.0.0.1:9/{}", peer_id).into(),
			peer_type: "urn:actingweb:example:test".into(),
			relationship: relationship.into(),
			secret: format!("secret-{}-{}", actor_id, peer_id).into(),
			approved: true,
			peer_approved: true,
			verified: true,
			verification_token: "vt".into(),
			established_via: actingweb_types::store_adapter::EstablishedVia::Actingweb,
			peer_identifier: None,
			desc: None,
			aw_supported: None,
			aw_version: Some("1.4".into()),
			capabilities_fetched_at: None,
			last_connected_at: None,
			last_connected_via: None,
			oauth_client_id: None,
			client_name: None,
			client_version: None,
			client_platform: None,
			created_at: Timestamp::now(),
		})
		.await
		.expect("trust");
}

pub async fn seed_subscription(
	app: &App,
	actor_id: &str,
	peer_id: &str,
	sub_id: &str,
	subtarget: Option<&str>,
	granularity: Granularity,
	callback: bool,
) {
	app.store
		.create_subscription(&SubscriptionRecord {
			actor_id: actor_id.into(),
			peer_id: peer_id.into(),
			sub_id: sub_id.into(),
			target: "properties".into(),
			subtarget: subtarget.map(Into::into),
			resource: None,
			granularity,
			seqnr: 0,
			callback,
			created_at: Timestamp::now(),
		})
		.await
		.expect("subscription");
}

// vim: ts=4
