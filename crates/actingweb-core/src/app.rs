//! App state type

use std::sync::Arc;

use crate::extensions::Extensions;
use crate::prelude::*;
use crate::{config::RuntimeConfig, hooks::HookRegistry, request::PeerClient, trust_types};

use actingweb_types::auth_adapter::AuthAdapter;
use actingweb_types::store_adapter::StoreAdapter;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub struct AppState {
	pub config: RuntimeConfig,
	pub request: PeerClient,
	pub trust_types: Arc<tokio::sync::RwLock<trust_types::TrustTypeRegistry>>,
	pub hooks: Arc<HookRegistry>,

	pub store: Arc<dyn StoreAdapter>,
	pub auth_store: Arc<dyn AuthAdapter>,

	// Type-erased extension map for feature-specific state
	pub extensions: Extensions,
}

impl AppState {
	/// Get a registered extension by type. Returns error if not found.
	pub fn ext<T: Send + Sync + 'static>(&self) -> AwResult<&T> {
		self.extensions.get::<T>().ok_or_else(|| {
			Error::Internal(format!("Extension {} not registered", std::any::type_name::<T>()))
		})
	}
}

impl std::fmt::Debug for AppState {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("AppState").field("config", &self.config).finish_non_exhaustive()
	}
}

pub type App = Arc<AppState>;

// vim: ts=4
