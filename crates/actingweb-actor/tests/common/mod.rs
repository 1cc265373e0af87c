//! Shared fixtures for actor core tests.
#![allow(dead_code)]

use std::sync::Arc;

use actingweb_core::app::{App, AppState};
use actingweb_core::config::RuntimeConfig;
use actingweb_core::extensions::Extensions;
use actingweb_core::hooks::HookRegistry;
use actingweb_core::request::PeerClient;
use actingweb_core::trust_types::{TrustTypeRegistry, builtin_trust_types};
use actingweb_store_adapter_memory::MemoryStore;
use actingweb_types::auth_adapter::{Accessor, AuthAdapter, AuthCtx};
use actingweb_types::store_adapter::StoreAdapter;

pub fn build_app() -> App {
	build_app_with(RuntimeConfig::default())
}

pub fn build_app_with(config: RuntimeConfig) -> App {
	let store = Arc::new(MemoryStore::new());
	let mut registry = TrustTypeRegistry::new();
	for tt in builtin_trust_types() {
		registry.register(tt);
	}

	Arc::new(AppState {
		config,
		request: PeerClient::new().expect("client"),
		trust_types: Arc::new(tokio::sync::RwLock::new(registry)),
		hooks: Arc::new(HookRegistry::new()),
		store: store.clone() as Arc<dyn StoreAdapter>,
		auth_store: store as Arc<dyn AuthAdapter>,
		extensions: Extensions::new(),
	})
}

pub fn owner(actor_id: &str) -> AuthCtx {
	AuthCtx {
		actor_id: actor_id.into(),
		accessor: Accessor::Owner { creator: format!("{}@example.com", actor_id).into() },
	}
}

pub fn peer(actor_id: &str, peer_id: &str, relationship: &str) -> AuthCtx {
	AuthCtx {
		actor_id: actor_id.into(),
		accessor: Accessor::Peer { peer_id: peer_id.into(), relationship: relationship.into() },
	}
}

// vim: ts=4
