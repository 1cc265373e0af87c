//! Subscription lifecycle and diff registration.
//!
//! Writes to properties and lists call `register_diff`, which matches the
//! write against the actor's inbound subscriptions, allocates the next
//! sequence number atomically, and hands the diff to the fan-out manager.

use crate::fanout;
use crate::prelude::*;
use actingweb_core::hooks::{LifecycleEvent, LifecycleKind};
use actingweb_core::perm;
use actingweb_core::request::RequestMeta;
use actingweb_types::auth_adapter::{Accessor, AuthCtx};
use actingweb_types::permissions::{Category, Operation};
use actingweb_types::store_adapter::SubscriptionRecord;
use actingweb_types::wire::SubscriptionCreateBody;

/// Attribute bucket caching the last known state of a peer's subscribed
/// resources, keyed by `target` or `target/subtarget`.
pub(crate) fn peer_bucket(peer_id: &str) -> String {
	format!("_peer_data:{}", peer_id)
}

pub(crate) fn cache_key(target: &str, subtarget: Option<&str>) -> String {
	match subtarget {
		Some(sub) => format!("{}/{}", target, sub),
		None => target.to_string(),
	}
}

/// Marker wrapping stored resync diffs. Internal to the runtime; the wire
/// envelope carries `type="resync"` and a plain URL instead.
const RESYNC_KEY: &str = "__resync_url";

pub(crate) fn resync_blob(url: &str) -> serde_json::Value {
	serde_json::json!({ RESYNC_KEY: url })
}

pub(crate) fn as_resync(value: &serde_json::Value) -> Option<&str> {
	value.get(RESYNC_KEY).and_then(|v| v.as_str())
}

fn category_for_target(target: &str) -> Category {
	match target {
		"methods" => Category::Methods,
		"actions" => Category::Actions,
		"resources" => Category::Resources,
		_ => Category::Properties,
	}
}

/// Scope match between a write and a subscription: exact, broader, or more
/// specific. `None` on either side widens the match.
fn scope_matches(sub: &SubscriptionRecord, target: &str, subtarget: Option<&str>) -> bool {
	if sub.target.as_ref() != target {
		return false;
	}
	match (&sub.subtarget, subtarget) {
		(None, _) | (_, None) => true,
		(Some(s), Some(w)) => s.as_ref() == w,
	}
}

/// Register one change for every matching inbound subscription and queue
/// delivery. Never raises delivery errors to the writer.
pub async fn register_diff(
	app: &App,
	actor_id: &str,
	target: &str,
	subtarget: Option<&str>,
	value: &serde_json::Value,
) -> AwResult<()> {
	if app.store.read_suspension(actor_id, target, subtarget).await? {
		debug!("diff registration suspended for {}/{:?}", target, subtarget);
		return Ok(());
	}

	let subs = app.store.list_subscriptions(actor_id, None).await?;
	let eval_target = subtarget.unwrap_or("*");

	for sub in subs.into_iter().filter(|s| !s.callback) {
		if !scope_matches(&sub, target, subtarget) {
			continue;
		}
		if !subscriber_may_read(app, actor_id, &sub, eval_target).await {
			continue;
		}

		let blob = serde_json::to_string(value)?;
		let seqnr = app.store.create_diff(actor_id, &sub.peer_id, &sub.sub_id, &blob).await?;
		debug!(
			"diff seq={} registered on {}/{} for peer {} ({} bytes)",
			seqnr,
			target,
			eval_target,
			sub.peer_id,
			blob.len()
		);

		queue_delivery(app, sub, seqnr, value.clone()).await;
	}
	Ok(())
}

async fn subscriber_may_read(
	app: &App,
	actor_id: &str,
	sub: &SubscriptionRecord,
	eval_target: &str,
) -> bool {
	let trust = match app.store.read_trust(actor_id, &sub.peer_id).await {
		Ok(trust) => trust,
		Err(_) => return false,
	};
	if !trust.is_active() {
		return false;
	}
	let auth = AuthCtx {
		actor_id: actor_id.into(),
		accessor: Accessor::Peer { peer_id: trust.peer_id, relationship: trust.relationship },
	};
	perm::require(app, &auth, category_for_target(&sub.target), eval_target, Operation::Read)
		.await
		.is_ok()
}

/// Hand one diff to the fan-out manager, inline when synchronous callbacks
/// are configured (serverless mode), otherwise in a background task.
pub(crate) async fn queue_delivery(
	app: &App,
	sub: SubscriptionRecord,
	seqnr: u32,
	value: serde_json::Value,
) {
	if sub.granularity == Granularity::None {
		return;
	}
	if app.config.synchronous_callbacks {
		if let Err(err) = fanout::deliver_diff(app, &sub, seqnr, &value).await {
			warn!("synchronous delivery of seq={} to {} failed: {}", seqnr, sub.peer_id, err);
		}
	} else {
		let app = app.clone();
		tokio::spawn(async move {
			if let Err(err) = fanout::deliver_diff(&app, &sub, seqnr, &value).await {
				warn!("delivery of seq={} to {} failed: {}", seqnr, sub.peer_id, err);
			}
		});
	}
}

/// Accept an inbound subscription request from `peer_id`. The peer's trust
/// must grant `subscribe` on the target scope.
pub async fn create_inbound(
	app: &App,
	actor_id: &str,
	peer_id: &str,
	body: &SubscriptionCreateBody,
) -> AwResult<SubscriptionRecord> {
	let trust = app.store.read_trust(actor_id, peer_id).await?;
	if !trust.is_active() {
		return Err(Error::PermissionDenied);
	}
	let auth = AuthCtx {
		actor_id: actor_id.into(),
		accessor: Accessor::Peer {
			peer_id: trust.peer_id.clone(),
			relationship: trust.relationship.clone(),
		},
	};
	let eval_target = body.subtarget.as_deref().unwrap_or("*");
	perm::require(
		app,
		&auth,
		category_for_target(&body.target),
		eval_target,
		Operation::Subscribe,
	)
	.await?;

	let record = SubscriptionRecord {
		actor_id: actor_id.into(),
		peer_id: peer_id.into(),
		sub_id: uuid::Uuid::new_v4().simple().to_string().into(),
		target: body.target.clone(),
		subtarget: body.subtarget.clone(),
		resource: body.resource.clone(),
		granularity: body.granularity,
		seqnr: 0,
		callback: false,
		created_at: Timestamp::now(),
	};
	app.store.create_subscription(&record).await?;
	info!(
		"inbound subscription {} from {} on {}/{}",
		record.sub_id, peer_id, record.target, eval_target
	);
	Ok(record)
}

/// Create an outbound subscription on a peer: POST to the peer, mirror it
/// locally with `callback=true`, then perform the baseline GET so pre-existing
/// data is not silently missed.
pub async fn subscribe_to_peer(
	app: &App,
	actor_id: &str,
	peer_id: &str,
	body: &SubscriptionCreateBody,
) -> AwResult<SubscriptionRecord> {
	let trust = app.store.read_trust(actor_id, peer_id).await?;
	if !trust.is_active() {
		return Err(Error::TrustState("trust is not approved on both sides".into()));
	}

	let url = format!("{}/subscriptions/{}", trust.baseuri, actor_id);
	let meta = RequestMeta { bearer: Some(&trust.secret), ..Default::default() };
	let created: serde_json::Value =
		app.request.post_json(&url, body, &meta).await.map_err(|err| {
			warn!("peer {} rejected subscription: {}", peer_id, err);
			err
		})?;
	let sub_id: Box<str> = created
		.get("subscriptionid")
		.and_then(|v| v.as_str())
		.ok_or_else(|| Error::ValidationError("peer response lacks subscriptionid".into()))?
		.into();

	let mirror = SubscriptionRecord {
		actor_id: actor_id.into(),
		peer_id: peer_id.into(),
		sub_id,
		target: body.target.clone(),
		subtarget: body.subtarget.clone(),
		resource: body.resource.clone(),
		granularity: body.granularity,
		seqnr: 0,
		callback: true,
		created_at: Timestamp::now(),
	};
	app.store.create_subscription(&mirror).await?;

	// Baseline: peers may have pre-existing data in the subscribed scope.
	let baseline_url = match &body.subtarget {
		Some(sub) => format!("{}/{}/{}", trust.baseuri, body.target, sub),
		None => format!("{}/{}", trust.baseuri, body.target),
	};
	match app.request.get_json::<serde_json::Value>(&baseline_url, &meta).await {
		Ok(baseline) => {
			write_cache(app, actor_id, peer_id, &body.target, body.subtarget.as_deref(), &baseline)
				.await;
		}
		Err(err) => {
			warn!("baseline fetch from {} failed: {}", peer_id, err);
		}
	}

	info!("subscribed to {} on {} (sub {})", peer_id, body.target, mirror.sub_id);
	Ok(mirror)
}

/// Remove an outbound subscription: delete the local mirror, best-effort
/// DELETE on the peer, and drop cached peer data when it was the last one.
pub async fn unsubscribe(
	app: &App,
	actor_id: &str,
	peer_id: &str,
	sub_id: &str,
	notify_peer: bool,
) -> AwResult<()> {
	let sub = app.store.read_subscription(actor_id, peer_id, sub_id).await?;
	app.store.delete_subscription(actor_id, peer_id, sub_id).await?;
	app.store.clear_diffs(actor_id, sub_id).await?;
	app.store.delete_callback_state(actor_id, peer_id, sub_id).await?;

	if notify_peer && sub.callback {
		if let Ok(trust) = app.store.read_trust(actor_id, peer_id).await {
			let url = format!("{}/subscriptions/{}/{}", trust.baseuri, actor_id, sub_id);
			let meta = RequestMeta { bearer: Some(&trust.secret), ..Default::default() };
			if let Err(err) = app.request.delete(&url, &meta).await {
				debug!("peer {} subscription delete failed: {}", peer_id, err);
			}
		}
	}

	// Last outbound subscription to this peer: clean up the cached remote data.
	let remaining = app.store.list_subscriptions(actor_id, Some(peer_id)).await?;
	if sub.callback && !remaining.iter().any(|s| s.callback) {
		let _unused = app.store.delete_bucket(actor_id, &peer_bucket(peer_id)).await;
	}

	app.hooks
		.dispatch_lifecycle(
			app,
			LifecycleEvent::new(LifecycleKind::SubscriptionDeleted, actor_id)
				.with_peer(peer_id)
				.with_detail(serde_json::json!({ "subscriptionid": sub_id })),
		)
		.await;
	Ok(())
}

/// Remove every subscription-related row shared with a peer, in both
/// directions. Used on trust teardown and when a peer is gone.
pub async fn purge_peer(app: &App, actor_id: &str, peer_id: &str) -> AwResult<()> {
	let subs = app.store.list_subscriptions(actor_id, Some(peer_id)).await?;
	for sub in subs {
		app.store.delete_subscription(actor_id, peer_id, &sub.sub_id).await.ok();
		app.store.clear_diffs(actor_id, &sub.sub_id).await.ok();
		app.store.delete_callback_state(actor_id, peer_id, &sub.sub_id).await.ok();
	}
	let _unused = app.store.delete_bucket(actor_id, &peer_bucket(peer_id)).await;
	Ok(())
}

// Suspension
//************

/// Pause diff registration for a scope. Developer-facing; peers keep their
/// subscriptions and simply receive nothing until `resume`.
pub async fn suspend(
	app: &App,
	actor_id: &str,
	target: &str,
	subtarget: Option<&str>,
) -> AwResult<()> {
	app.store.create_suspension(actor_id, target, subtarget).await?;
	info!("suspended diff registration on {}/{:?}", target, subtarget);
	Ok(())
}

/// Resume a suspended scope, emitting exactly one resync callback per
/// affected subscription at a freshly allocated sequence number.
pub async fn resume(
	app: &App,
	actor_id: &str,
	target: &str,
	subtarget: Option<&str>,
) -> AwResult<()> {
	app.store.delete_suspension(actor_id, target, subtarget).await?;

	let subs = app.store.list_subscriptions(actor_id, None).await?;
	for sub in subs.into_iter().filter(|s| !s.callback) {
		if !scope_matches(&sub, target, subtarget) {
			continue;
		}
		let url = match subtarget.or(sub.subtarget.as_deref()) {
			Some(s) => format!("{}/{}/{}", app.config.actor_root(actor_id), target, s),
			None => format!("{}/{}", app.config.actor_root(actor_id), target),
		};
		let blob = resync_blob(&url);
		let seqnr = app
			.store
			.create_diff(actor_id, &sub.peer_id, &sub.sub_id, &serde_json::to_string(&blob)?)
			.await?;
		queue_delivery(app, sub, seqnr, blob).await;
	}
	info!("resumed diff registration on {}/{:?}", target, subtarget);
	Ok(())
}

// Peer data cache
//*****************

pub(crate) async fn write_cache(
	app: &App,
	actor_id: &str,
	peer_id: &str,
	target: &str,
	subtarget: Option<&str>,
	value: &serde_json::Value,
) {
	let bucket = peer_bucket(peer_id);
	let key = cache_key(target, subtarget);
	if let Err(err) = app.store.write_attr(actor_id, &bucket, &key, value, None).await {
		warn!("peer cache write for {} failed: {}", key, err);
	}
}

pub async fn read_cache(
	app: &App,
	actor_id: &str,
	peer_id: &str,
	target: &str,
	subtarget: Option<&str>,
) -> AwResult<serde_json::Value> {
	let row =
		app.store.read_attr(actor_id, &peer_bucket(peer_id), &cache_key(target, subtarget)).await?;
	Ok(row.value)
}

// vim: ts=4
