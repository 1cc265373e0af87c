//! Shared fixtures for trust manager tests.
#![allow(dead_code)]

use std::sync::Arc;

use actingweb_core::app::{App, AppState};
use actingweb_core::config::RuntimeConfig;
use actingweb_core::extensions::Extensions;
use actingweb_core::hooks::HookRegistry;
use actingweb_core::request::PeerClient;
use actingweb_core::trust_types::{TrustTypeRegistry, builtin_trust_types};
use actingweb_store_adapter_memory::MemoryStore;
use actingweb_types::auth_adapter::AuthAdapter;
use actingweb_types::store_adapter::{ActorRecord, StoreAdapter};
use actingweb_types::types::Timestamp;

pub fn build_app() -> App {
	build_app_with(HookRegistry::new())
}

pub fn build_app_with(hooks: HookRegistry) -> App {
	let store = Arc::new(MemoryStore::new());
	let mut registry = TrustTypeRegistry::new();
	for tt in builtin_trust_types() {
		registry.register(tt);
	}

	Arc::new(AppState {
		config: RuntimeConfig::default(),
		request: PeerClient::new().expect("client"),
		trust_types: Arc::new(tokio::sync::RwLock::new(registry)),
		hooks: Arc::new(hooks),
		store: store.clone() as Arc<dyn StoreAdapter>,
		auth_store: store as Arc<dyn AuthAdapter>,
		extensions: Extensions::new(),
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

// vim: ts=4
