//! Runtime builder: the composition root.
//!
//! All components receive their dependencies here, and the singletons the
//! permission engine relies on (trust-type registry, fan-out manager) are
//! initialized eagerly before the first request is served.

use std::sync::Arc;

use crate::bootstrap;
use crate::prelude::*;
use crate::routes;

use actingweb_core::config::RuntimeConfig;
use actingweb_core::extensions::Extensions;
use actingweb_core::hooks::HookRegistry;
use actingweb_core::request::PeerClient;
use actingweb_core::trust_types::TrustTypeRegistry;
use actingweb_types::auth_adapter::AuthAdapter;
use actingweb_types::store_adapter::StoreAdapter;

pub struct Builder {
	config: Option<RuntimeConfig>,
	store: Option<Arc<dyn StoreAdapter>>,
	auth_store: Option<Arc<dyn AuthAdapter>>,
	hooks: HookRegistry,
}

impl Builder {
	pub fn new() -> Self {
		Builder { config: None, store: None, auth_store: None, hooks: HookRegistry::new() }
	}

	/// Explicit configuration; `AW_*` environment variables otherwise.
	pub fn config(mut self, config: RuntimeConfig) -> Self {
		self.config = Some(config);
		self
	}

	pub fn store_adapter(mut self, store: Arc<dyn StoreAdapter>) -> Self {
		self.store = Some(store);
		self
	}

	pub fn auth_adapter(mut self, auth_store: Arc<dyn AuthAdapter>) -> Self {
		self.auth_store = Some(auth_store);
		self
	}

	/// Register application hooks before the registry is frozen.
	pub fn hooks(mut self, f: impl FnOnce(&mut HookRegistry)) -> Self {
		f(&mut self.hooks);
		self
	}

	/// Assemble the application state and run the bootstrap sequence.
	pub async fn build(self) -> AwResult<App> {
		let config = match self.config {
			Some(config) => config,
			None => RuntimeConfig::from_env()?,
		};
		let store = self.store.ok_or(Error::ConfigError("no storage adapter".into()))?;
		let auth_store = self.auth_store.ok_or(Error::ConfigError("no auth adapter".into()))?;

		let mut extensions = Extensions::new();
		extensions.insert(actingweb_subscription::FanoutManager::new(&config));

		let app: App = Arc::new(AppState {
			config,
			request: PeerClient::new()?,
			trust_types: Arc::new(tokio::sync::RwLock::new(TrustTypeRegistry::new())),
			hooks: Arc::new(self.hooks),
			store,
			auth_store,
			extensions,
		});

		bootstrap::init(&app).await?;
		Ok(app)
	}

	/// Build, then serve the composed router until the process is stopped.
	pub async fn run(self, listen: &str) -> AwResult<()> {
		tracing_subscriber::fmt()
			.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
			.with_target(false)
			.init();

		let app = self.build().await?;
		bootstrap::spawn_maintenance(&app);

		let router = routes::init(app.clone());
		let listener = tokio::net::TcpListener::bind(listen).await?;
		info!("Listening on {}", listen);
		axum::serve(listener, router)
			.await
			.map_err(|err| Error::Internal(format!("server error: {}", err)))?;
		Ok(())
	}
}

impl Default for Builder {
	fn default() -> Self {
		Self::new()
	}
}

// vim: ts=4
