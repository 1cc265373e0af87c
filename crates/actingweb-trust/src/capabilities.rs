//! Peer capability exchange.
//!
//! A peer's option tags (`/meta/actingweb/supported`) are cached on the
//! trust row with a TTL so fan-out decisions (compression, resync support)
//! don't hit the network.

use crate::prelude::*;
use actingweb_core::request::RequestMeta;
use actingweb_types::store_adapter::TrustPatch;

/// Fetch (or return cached) option tags of a peer. A 404 from the peer's
/// `/meta` surfaces as `PeerGone` so the caller can drive trust cleanup.
pub async fn fetch_capabilities(
	app: &App,
	actor_id: &str,
	peer_id: &str,
) -> AwResult<Box<str>> {
	let trust = app.store.read_trust(actor_id, peer_id).await?;

	if let (Some(tags), Some(fetched_at)) = (&trust.aw_supported, trust.capabilities_fetched_at) {
		if fetched_at.age_seconds() < app.config.capabilities_ttl_secs {
			return Ok(tags.clone());
		}
	}

	let meta = RequestMeta { bearer: Some(&trust.secret), parent_request_id: None };
	let url = format!("{}/meta/actingweb/supported", trust.baseuri);
	let tags: Box<str> = match app.request.get_raw(&url, &meta).await {
		Ok(raw) => String::from_utf8_lossy(&raw).trim().trim_matches('"').into(),
		Err(Error::NotFound) => return Err(Error::PeerGone),
		Err(err) => return Err(err),
	};

	let version_url = format!("{}/meta/actingweb/version", trust.baseuri);
	let version: Option<Box<str>> = app
		.request
		.get_raw(&version_url, &meta)
		.await
		.ok()
		.map(|raw| String::from_utf8_lossy(&raw).trim().trim_matches('"').into());

	let patch = TrustPatch {
		aw_supported: Patch::Value(tags.clone()),
		aw_version: version.map_or(Patch::Undefined, Patch::Value),
		capabilities_fetched_at: Patch::Value(Timestamp::now()),
		..Default::default()
	};
	app.store.update_trust(actor_id, peer_id, &patch).await?;
	debug!("cached capabilities of {}: {}", peer_id, tags);
	Ok(tags)
}

// vim: ts=4
