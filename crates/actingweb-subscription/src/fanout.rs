//! Outbound callback delivery.
//!
//! One fan-out manager per process bounds in-flight deliveries with a
//! semaphore and keeps a circuit breaker per peer. Delivery failures never
//! propagate to the writer that registered the diff: the diff row stays
//! behind for polling and the breaker absorbs repeated failures.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::breaker::CircuitBreaker;
use crate::engine;
use crate::prelude::*;
use actingweb_core::config::RuntimeConfig;
use actingweb_core::hooks::{LifecycleEvent, LifecycleKind};
use actingweb_core::perm;
use actingweb_core::request::RequestMeta;
use actingweb_types::store_adapter::{SubscriptionRecord, TrustPatch, TrustRecord};
use actingweb_types::wire::{CallbackEnvelope, CallbackType};

/// Registered as an app extension at bootstrap.
pub struct FanoutManager {
	semaphore: Arc<Semaphore>,
	breaker_threshold: u32,
	breaker_cooldown_secs: i64,
	breakers: Mutex<HashMap<Box<str>, CircuitBreaker>>,
	backoff_until: Mutex<HashMap<Box<str>, Timestamp>>,
}

impl std::fmt::Debug for FanoutManager {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("FanoutManager")
			.field("available_permits", &self.semaphore.available_permits())
			.finish_non_exhaustive()
	}
}

impl FanoutManager {
	pub fn new(config: &RuntimeConfig) -> Self {
		Self {
			semaphore: Arc::new(Semaphore::new(config.fanout_concurrency)),
			breaker_threshold: config.breaker_threshold,
			breaker_cooldown_secs: config.breaker_cooldown_secs,
			breakers: Mutex::new(HashMap::new()),
			backoff_until: Mutex::new(HashMap::new()),
		}
	}

	/// Whether delivery to this peer may be attempted right now.
	pub fn allows(&self, peer_id: &str) -> bool {
		if let Some(until) = self.backoff_until.lock().get(peer_id) {
			if *until > Timestamp::now() {
				return false;
			}
		}
		self.breakers.lock().get(peer_id).is_none_or(CircuitBreaker::allows)
	}

	pub fn on_success(&self, peer_id: &str) {
		if let Some(b) = self.breakers.lock().get_mut(peer_id) {
			b.on_success();
		}
		self.backoff_until.lock().remove(peer_id);
	}

	pub fn on_failure(&self, peer_id: &str) {
		let mut breakers = self.breakers.lock();
		breakers
			.entry(peer_id.into())
			.or_insert_with(|| {
				CircuitBreaker::new(self.breaker_threshold, self.breaker_cooldown_secs)
			})
			.on_failure();
	}

	/// Honor a `Retry-After` without tripping the breaker.
	pub fn on_backoff(&self, peer_id: &str, secs: u32) {
		self.backoff_until.lock().insert(peer_id.into(), Timestamp::from_now(i64::from(secs)));
	}
}

fn peer_supports_compression(trust: &TrustRecord) -> bool {
	trust
		.aw_supported
		.as_deref()
		.is_some_and(|tags| tags.split(',').any(|t| t.trim() == "callbackcompression"))
}

/// Deliver one diff to one subscriber. A 2xx clears the stored diff row
/// (at-most-once); anything else retains it for polling.
pub async fn deliver_diff(
	app: &App,
	sub: &SubscriptionRecord,
	seqnr: u32,
	value: &serde_json::Value,
) -> AwResult<()> {
	let actor_id = sub.actor_id.as_ref();
	let fanout = app.ext::<FanoutManager>()?;
	if !fanout.allows(&sub.peer_id) {
		debug!("circuit open for {}, retaining diff seq={}", sub.peer_id, seqnr);
		return Ok(());
	}

	let trust = app.store.read_trust(actor_id, &sub.peer_id).await?;

	let _permit = fanout
		.semaphore
		.acquire()
		.await
		.map_err(|_| Error::Internal("fanout semaphore closed".into()))?;

	let actor_root = app.config.actor_root(actor_id);
	let diff_url =
		format!("{}/subscriptions/{}/{}/{}", actor_root, sub.peer_id, sub.sub_id, seqnr);

	let mut envelope = CallbackEnvelope {
		id: sub.sub_id.clone(),
		target: sub.target.clone(),
		subtarget: sub.subtarget.clone(),
		resource: sub.resource.clone(),
		subscription_id: sub.sub_id.clone(),
		sequence: seqnr,
		timestamp: Timestamp::now().to_iso().into(),
		granularity: sub.granularity,
		typ: CallbackType::Diff,
		data: None,
		url: None,
	};

	let mut downgraded = false;
	if let Some(url) = engine::as_resync(value) {
		envelope.typ = CallbackType::Resync;
		envelope.url = Some(url.into());
	} else {
		match sub.granularity {
			Granularity::High => {
				let size = serde_json::to_string(value)?.len();
				if size > app.config.max_high_granularity_bytes {
					downgraded = true;
					envelope.url = Some(diff_url.clone().into());
					debug!(
						"downgrading diff seq={} for {} ({} bytes)",
						seqnr, sub.peer_id, size
					);
				} else {
					envelope.data = Some(value.clone());
				}
			}
			Granularity::Low => envelope.url = Some(diff_url.clone().into()),
			Granularity::None => return Ok(()),
		}
	}

	let payload = serde_json::to_vec(&envelope)?;
	let gzip = peer_supports_compression(&trust)
		&& payload.len() > app.config.compression_threshold_bytes;

	let callback_url =
		format!("{}/callbacks/subscriptions/{}/{}", trust.baseuri, actor_id, sub.sub_id);
	let meta = RequestMeta { bearer: Some(&trust.secret), parent_request_id: None };

	let outcome = app
		.request
		.deliver_callback(&callback_url, payload.into(), gzip, downgraded, &meta)
		.await;

	match outcome {
		Ok(outcome) if outcome.is_success() => {
			app.store.clear_diff(actor_id, &sub.sub_id, seqnr).await?;
			fanout.on_success(&sub.peer_id);
			Ok(())
		}
		Ok(outcome) if outcome.status == 429 || (outcome.status == 503 && outcome.retry_after.is_some()) => {
			let secs = outcome.retry_after.unwrap_or(60);
			info!("peer {} asked to retry after {}s", sub.peer_id, secs);
			fanout.on_backoff(&sub.peer_id, secs);
			Ok(())
		}
		Ok(outcome) => {
			warn!(
				"callback seq={} to {} failed with status {}",
				seqnr, sub.peer_id, outcome.status
			);
			fanout.on_failure(&sub.peer_id);
			if outcome.status == 404 {
				verify_peer(app, actor_id, &trust).await;
			}
			Ok(())
		}
		Err(err) => {
			warn!("callback seq={} to {} failed: {}", seqnr, sub.peer_id, err);
			fanout.on_failure(&sub.peer_id);
			Ok(())
		}
	}
}

/// Re-deliver every retained diff of an actor's inbound subscriptions.
/// Driven opportunistically (breaker half-open probes, background sweeps).
pub async fn deliver_pending(app: &App, actor_id: &str) -> AwResult<u32> {
	let subs = app.store.list_subscriptions(actor_id, None).await?;
	let mut delivered = 0;
	for sub in subs.into_iter().filter(|s| !s.callback && s.granularity != Granularity::None) {
		for diff in app.store.list_diffs(actor_id, &sub.sub_id).await? {
			let value: serde_json::Value = serde_json::from_str(&diff.blob)?;
			deliver_diff(app, &sub, diff.seqnr, &value).await?;
			delivered += 1;
		}
	}
	Ok(delivered)
}

/// A peer answered 404 on its callback endpoint: check whether the peer is
/// gone entirely, and clean up or mark the trust accordingly.
async fn verify_peer(app: &App, actor_id: &str, trust: &TrustRecord) {
	let meta = RequestMeta { bearer: Some(&trust.secret), parent_request_id: None };
	let url = format!("{}/meta", trust.baseuri);
	match app.request.get_raw(&url, &meta).await {
		Ok(_) => {}
		Err(Error::NotFound) => {
			info!("peer {} is gone, removing trust", trust.peer_id);
			if let Err(err) = purge_gone_peer(app, actor_id, trust).await {
				warn!("cleanup of gone peer {} failed: {}", trust.peer_id, err);
			}
		}
		Err(Error::PermissionDenied) => {
			info!("peer {} revoked access, marking trust unapproved", trust.peer_id);
			let patch =
				TrustPatch { peer_approved: Patch::Value(false), ..Default::default() };
			if let Err(err) = app.store.update_trust(actor_id, &trust.peer_id, &patch).await {
				warn!("failed to mark trust revoked: {}", err);
			}
		}
		Err(err) => debug!("peer {} verification inconclusive: {}", trust.peer_id, err),
	}
}

async fn purge_gone_peer(app: &App, actor_id: &str, trust: &TrustRecord) -> AwResult<()> {
	engine::purge_peer(app, actor_id, &trust.peer_id).await?;
	perm::delete_override(&app.store, actor_id, &trust.peer_id).await?;
	if let Some(client_id) = &trust.oauth_client_id {
		app.auth_store.revoke_client_tokens(client_id).await?;
		let _unused = app.auth_store.delete_client(client_id).await;
	}
	app.store.delete_trust(actor_id, &trust.peer_id).await?;
	app.hooks
		.dispatch_lifecycle(
			app,
			LifecycleEvent::new(LifecycleKind::TrustDeleted, actor_id).with_peer(&trust.peer_id),
		)
		.await;
	Ok(())
}

// vim: ts=4
