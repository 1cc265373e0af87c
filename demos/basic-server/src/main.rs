//! Minimal ActingWeb server: SQLite storage, default configuration, and a
//! couple of application hooks to show the registration points.

use std::sync::Arc;

use actingweb::Builder;
use actingweb::hooks::{LifecycleHook, LifecycleKind};
use actingweb_store_adapter_sqlite::SqliteStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let data_dir = std::env::var("AW_DB_PATH").unwrap_or_else(|_| "./data".to_string());
	std::fs::create_dir_all(&data_dir)?;
	let store = Arc::new(SqliteStore::new(&data_dir).await?);

	let created_hook: LifecycleHook = Arc::new(|_app, event| {
		Box::pin(async move {
			println!("actor created: {}", event.actor_id);
			Ok(())
		})
	});

	Builder::new()
		.store_adapter(store.clone())
		.auth_adapter(store)
		.hooks(move |hooks| {
			hooks.on_lifecycle(LifecycleKind::ActorCreated, created_hook);
		})
		.run("127.0.0.1:5000")
		.await?;
	Ok(())
}

// vim: ts=4
