//! Bootstrap sequence: reserved system actors, eager trust-type registry
//! load, and background maintenance.

use std::time::Duration;

use crate::prelude::*;
use actingweb_types::store_adapter::ActorRecord;
use actingweb_types::utils::{hash_passphrase, random_hex};
use actingweb_types::{OAUTH2_ACTOR, SYSTEM_ACTOR};

async fn ensure_system_actor(app: &App, actor_id: &str) -> AwResult<()> {
	match app.store.read_actor(actor_id).await {
		Ok(_) => Ok(()),
		Err(Error::NotFound) => {
			info!("Creating reserved system actor {}", actor_id);
			app.store
				.create_actor(&ActorRecord {
					actor_id: actor_id.into(),
					creator: "system".into(),
					passphrase_hash: hash_passphrase(&random_hex()),
					created_at: Timestamp::now(),
				})
				.await
		}
		Err(err) => Err(err),
	}
}

/// Run once at startup, before the first request. Cold-loading the
/// trust-type registry during an OAuth2 callback is a documented multi-minute
/// stall; eager initialization here is a hard requirement.
pub async fn init(app: &App) -> AwResult<()> {
	ensure_system_actor(app, SYSTEM_ACTOR).await?;
	ensure_system_actor(app, OAUTH2_ACTOR).await?;

	let mut registry = app.trust_types.write().await;
	let loaded = registry.load(&app.store).await?;
	registry.ensure_defaults(&app.store).await?;
	info!("trust-type registry ready ({} persisted, {} total)", loaded, registry.names().len());
	Ok(())
}

/// Periodic housekeeping: expired attribute rows (OAuth2 state stashes,
/// capability caches) are purged, and retained diffs are offered to peers
/// again once their circuit breakers allow it.
pub fn spawn_maintenance(app: &App) {
	let app = app.clone();
	tokio::spawn(async move {
		let mut interval = tokio::time::interval(Duration::from_secs(300));
		loop {
			interval.tick().await;
			match app.store.purge_expired_attrs().await {
				Ok(0) => {}
				Ok(n) => debug!("purged {} expired attribute rows", n),
				Err(err) => warn!("attribute purge failed: {}", err),
			}

			let actors = match app.store.list_actors(1000).await {
				Ok(actors) => actors,
				Err(err) => {
					warn!("actor sweep failed: {}", err);
					continue;
				}
			};
			for actor in actors {
				match actingweb_subscription::fanout::deliver_pending(&app, &actor.actor_id).await
				{
					Ok(0) => {}
					Ok(n) => debug!("redelivered {} diffs for {}", n, actor.actor_id),
					Err(err) => warn!("redelivery for {} failed: {}", actor.actor_id, err),
				}
			}
		}
	});
}

// vim: ts=4
