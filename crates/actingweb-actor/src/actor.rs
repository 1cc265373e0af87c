//! Actor factory: create, look up, and delete actors.

use crate::prelude::*;
use actingweb_core::hooks::{LifecycleEvent, LifecycleKind};
use actingweb_trust::manager as trust;
use actingweb_types::store_adapter::ActorRecord;
use actingweb_types::utils::{hash_passphrase, new_actor_id, random_hex};

#[derive(Debug, Default)]
pub struct CreateActorOptions<'a> {
	/// Explicit id; derived from the actor URL when absent.
	pub actor_id: Option<&'a str>,
	pub creator: &'a str,
	/// Generated when absent; the plaintext is returned exactly once.
	pub passphrase: Option<&'a str>,
}

#[derive(Debug)]
pub struct CreatedActor {
	pub record: ActorRecord,
	pub passphrase: Box<str>,
}

fn is_reserved(actor_id: &str) -> bool {
	actor_id.starts_with('_')
}

/// Create a new actor. With `unique_creator` set, a second actor for the
/// same creator is refused.
pub async fn create_actor(app: &App, opts: CreateActorOptions<'_>) -> AwResult<CreatedActor> {
	if opts.creator.is_empty() {
		return Err(Error::ValidationError("creator must not be empty".into()));
	}
	if app.config.unique_creator
		&& !app.store.read_actors_by_creator(opts.creator).await?.is_empty()
	{
		return Err(Error::Conflict(format!("creator {} already has an actor", opts.creator)));
	}

	let actor_id: Box<str> = match opts.actor_id {
		Some(id) if is_reserved(id) => {
			return Err(Error::ValidationError("actor ids may not start with '_'".into()));
		}
		Some(id) => id.into(),
		None => new_actor_id(&app.config.base_uri),
	};
	let passphrase: Box<str> = match opts.passphrase {
		Some(p) => p.into(),
		None => random_hex(),
	};

	let record = ActorRecord {
		actor_id: actor_id.clone(),
		creator: opts.creator.into(),
		passphrase_hash: hash_passphrase(&passphrase),
		created_at: Timestamp::now(),
	};
	app.store.create_actor(&record).await?;

	app.hooks
		.dispatch_lifecycle(app, LifecycleEvent::new(LifecycleKind::ActorCreated, &actor_id))
		.await;
	info!("created actor {} for {}", actor_id, record.creator);
	Ok(CreatedActor { record, passphrase })
}

pub async fn get_actor(app: &App, actor_id: &str) -> AwResult<ActorRecord> {
	app.store.read_actor(actor_id).await
}

/// Reverse lookup through the indexed-property table.
pub async fn get_from_property(app: &App, name: &str, value: &str) -> AwResult<ActorRecord> {
	let actor_id = app.store.read_property_index(name, value).await?;
	app.store.read_actor(&actor_id).await
}

/// Delete an actor: tear down every trust (notifying peers), then cascade
/// the storage rows.
pub async fn delete_actor(app: &App, actor_id: &str) -> AwResult<()> {
	app.store.read_actor(actor_id).await?;

	let trusts = app.store.list_trusts(actor_id, &Default::default()).await?;
	for t in trusts {
		if let Err(err) = trust::delete_trust(app, actor_id, &t.peer_id, true).await {
			warn!("trust teardown with {} during actor delete failed: {}", t.peer_id, err);
		}
	}

	// Drop reverse-lookup rows before the cascade removes the properties.
	for name in &app.config.indexed_properties {
		if let Ok(value) = app.store.read_property(actor_id, name).await {
			let _unused = app.store.delete_property_index(name, &value).await;
		}
	}

	app.store.delete_actor(actor_id).await?;
	info!("deleted actor {}", actor_id);
	Ok(())
}

// vim: ts=4
