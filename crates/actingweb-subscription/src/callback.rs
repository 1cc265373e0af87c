//! Inbound callback processor.
//!
//! Applies arriving diffs strictly in order per subscription, parking
//! out-of-order arrivals in a bounded pending queue. Duplicates are
//! acknowledged without reprocessing, sustained gaps trigger a resync, and
//! all state updates go through a conditional write with bounded retries.

use serde::{Deserialize, Serialize};

use crate::engine;
use crate::prelude::*;
use actingweb_core::hooks::CallbackHookCtx;
use actingweb_core::request::RequestMeta;
use actingweb_types::store_adapter::{CallbackState, SubscriptionRecord, TrustRecord};
use actingweb_types::wire::{CallbackEnvelope, CallbackType, ListOperation};

/// Conditional-write attempts before giving up with `Conflict`.
const CAS_RETRIES: u32 = 3;

/// Retry-After reported when the pending queue is full.
const PENDING_FULL_RETRY_SECS: u32 = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PendingEntry {
	sequence: u32,
	data: Option<serde_json::Value>,
	url: Option<Box<str>>,
	#[serde(rename = "receivedAt")]
	received_at: i64,
}

fn decode_pending(state: &CallbackState) -> Vec<PendingEntry> {
	serde_json::from_str(&state.pending).unwrap_or_default()
}

fn encode_pending(pending: &[PendingEntry]) -> AwResult<Box<str>> {
	Ok(serde_json::to_string(pending)?.into())
}

/// Process one arriving callback. `Ok(())` means the sender may clear its
/// diff (we acknowledge with a 2xx); errors map to the appropriate status.
pub async fn process_callback(
	app: &App,
	actor_id: &str,
	peer_id: &str,
	sub_id: &str,
	envelope: CallbackEnvelope,
) -> AwResult<()> {
	let sub = app.store.read_subscription(actor_id, peer_id, sub_id).await?;
	if !sub.callback {
		// Callbacks only arrive on our mirror of a subscription we created.
		return Err(Error::NotFound);
	}
	let trust = app.store.read_trust(actor_id, peer_id).await?;

	if envelope.typ == CallbackType::Resync {
		return handle_resync(app, &sub, &trust, &envelope).await;
	}

	for _attempt in 0..CAS_RETRIES {
		let existing = app.store.read_callback_state(actor_id, peer_id, sub_id).await?;
		let expected = existing.as_ref().map(|s| s.version);
		let (last, mut pending) = match &existing {
			Some(state) => (state.last_processed_seq, decode_pending(state)),
			None => (0, Vec::new()),
		};

		if envelope.sequence <= last {
			debug!("duplicate callback seq={} on {} acknowledged", envelope.sequence, sub_id);
			return Ok(());
		}

		if envelope.sequence == last + 1 {
			apply_entry(
				app,
				&sub,
				&trust,
				&envelope,
				envelope.sequence,
				envelope.data.clone(),
				envelope.url.as_deref(),
			)
			.await?;
			let mut new_last = envelope.sequence;

			// Drain any directly following parked entries.
			pending.sort_by_key(|e| e.sequence);
			let mut drained = Vec::new();
			for entry in pending {
				if entry.sequence == new_last + 1 {
					apply_entry(
						app,
						&sub,
						&trust,
						&envelope,
						entry.sequence,
						entry.data,
						entry.url.as_deref(),
					)
					.await?;
					new_last = entry.sequence;
				} else if entry.sequence > new_last {
					drained.push(entry);
				}
			}

			let state = CallbackState {
				last_processed_seq: new_last,
				pending: encode_pending(&drained)?,
				version: expected.unwrap_or(0) + 1,
			};
			match app.store.write_callback_state(actor_id, peer_id, sub_id, &state, expected).await
			{
				Ok(()) => return Ok(()),
				Err(Error::Conflict(_)) => continue,
				Err(err) => return Err(err),
			}
		}

		// Gap: park the callback and acknowledge.
		if pending.len() >= app.config.max_pending {
			warn!(
				"pending queue full ({}) on {}, rejecting seq={}",
				pending.len(),
				sub_id,
				envelope.sequence
			);
			return Err(Error::RateLimited(PENDING_FULL_RETRY_SECS));
		}
		if !pending.iter().any(|e| e.sequence == envelope.sequence) {
			pending.push(PendingEntry {
				sequence: envelope.sequence,
				data: envelope.data.clone(),
				url: envelope.url.clone(),
				received_at: Timestamp::now().0,
			});
		}
		let oldest = pending.iter().map(|e| e.received_at).min().unwrap_or(Timestamp::now().0);
		let highest = pending.iter().map(|e| e.sequence).max().unwrap_or(envelope.sequence);

		let state = CallbackState {
			last_processed_seq: last,
			pending: encode_pending(&pending)?,
			version: expected.unwrap_or(0) + 1,
		};
		match app.store.write_callback_state(actor_id, peer_id, sub_id, &state, expected).await {
			Ok(()) => {
				if Timestamp(oldest).age_seconds() > app.config.gap_timeout_secs {
					info!("gap on {} exceeded timeout, triggering resync", sub_id);
					trigger_resync(app, &sub, &trust, highest).await?;
				}
				return Ok(());
			}
			Err(Error::Conflict(_)) => continue,
			Err(err) => return Err(err),
		}
	}

	Err(Error::Conflict("callback state update retries exhausted".into()))
}

/// Apply one diff: resolve low-granularity URLs, fold the change into the
/// cached peer state, and hand it to the application's subscription hook.
async fn apply_entry(
	app: &App,
	sub: &SubscriptionRecord,
	trust: &TrustRecord,
	envelope: &CallbackEnvelope,
	sequence: u32,
	data: Option<serde_json::Value>,
	url: Option<&str>,
) -> AwResult<()> {
	let data = match (data, url) {
		(Some(data), _) => data,
		(None, Some(url)) => {
			let meta = RequestMeta { bearer: Some(&trust.secret), parent_request_id: None };
			let raw = app.request.get_raw(url, &meta).await?;
			serde_json::from_slice(&raw)?
		}
		(None, None) => {
			return Err(Error::ValidationError("callback carries neither data nor url".into()));
		}
	};

	fold_into_cache(app, sub, envelope, &data).await;

	if let Some(hook) = app.hooks.get_callback("subscription") {
		let ctx = CallbackHookCtx {
			auth: None,
			name: "subscription".into(),
			payload: serde_json::json!({
				"peerid": sub.peer_id,
				"subscriptionid": sub.sub_id,
				"target": sub.target,
				"subtarget": envelope.subtarget.as_deref().or(sub.subtarget.as_deref()),
				"sequence": sequence,
				"data": data,
			}),
		};
		if let Err(err) = hook(app.clone(), ctx).await {
			warn!("subscription hook failed on seq={}: {}", sequence, err);
		}
	}
	Ok(())
}

/// Maintain the local cache of the peer's subscribed resources. Scalar diffs
/// replace the cached value; list diffs replay the operation on the cached
/// array.
async fn fold_into_cache(
	app: &App,
	sub: &SubscriptionRecord,
	envelope: &CallbackEnvelope,
	data: &serde_json::Value,
) {
	let actor_id = sub.actor_id.as_ref();
	let list_diff = data
		.as_object()
		.filter(|o| o.contains_key("list") && o.contains_key("operation"))
		.map(|_| serde_json::from_value::<actingweb_types::wire::ListDiff>(data.clone()));

	match list_diff {
		Some(Ok(diff)) => {
			let mut items = engine::read_cache(app, actor_id, &sub.peer_id, &sub.target, Some(&diff.list))
				.await
				.ok()
				.and_then(|v| v.as_array().cloned())
				.unwrap_or_default();
			apply_list_op(&mut items, &diff);
			engine::write_cache(
				app,
				actor_id,
				&sub.peer_id,
				&sub.target,
				Some(&diff.list),
				&serde_json::Value::Array(items),
			)
			.await;
		}
		Some(Err(err)) => {
			warn!("malformed list diff on {}: {}", sub.sub_id, err);
		}
		None => {
			let subtarget = envelope.subtarget.as_deref().or(sub.subtarget.as_deref());
			engine::write_cache(app, actor_id, &sub.peer_id, &sub.target, subtarget, data).await;
		}
	}
}

fn apply_list_op(items: &mut Vec<serde_json::Value>, diff: &actingweb_types::wire::ListDiff) {
	use ListOperation::{Append, Clear, Delete, DeleteAll, Extend, Insert, Metadata, Pop, Update};
	match diff.operation {
		Append => {
			if let Some(item) = &diff.item {
				items.push(item.clone());
			}
		}
		Insert => {
			if let (Some(item), Some(index)) = (&diff.item, diff.index) {
				let index = (index as usize).min(items.len());
				items.insert(index, item.clone());
			}
		}
		Update => {
			if let (Some(item), Some(index)) = (&diff.item, diff.index) {
				if let Some(slot) = items.get_mut(index as usize) {
					*slot = item.clone();
				}
			}
		}
		Extend => {
			if let Some(new_items) = &diff.items {
				items.extend(new_items.iter().cloned());
			}
		}
		Delete | Pop => {
			if let Some(index) = diff.index {
				if (index as usize) < items.len() {
					items.remove(index as usize);
				}
			}
		}
		Clear | DeleteAll => items.clear(),
		Metadata => {}
	}
}

/// A resync instruction replaces the cached scope wholesale.
async fn handle_resync(
	app: &App,
	sub: &SubscriptionRecord,
	trust: &TrustRecord,
	envelope: &CallbackEnvelope,
) -> AwResult<()> {
	let url = envelope
		.url
		.as_deref()
		.ok_or_else(|| Error::ValidationError("resync callback without url".into()))?;
	let meta = RequestMeta { bearer: Some(&trust.secret), parent_request_id: None };
	let fetched: serde_json::Value = serde_json::from_slice(&app.request.get_raw(url, &meta).await?)?;

	let subtarget = envelope.subtarget.as_deref().or(sub.subtarget.as_deref());
	engine::write_cache(app, sub.actor_id.as_ref(), &sub.peer_id, &sub.target, subtarget, &fetched)
		.await;

	write_state_reset(app, sub, envelope.sequence).await
}

/// Fetch the full scope from the peer ourselves (gap timeout path) and fast
/// forward past everything parked.
async fn trigger_resync(
	app: &App,
	sub: &SubscriptionRecord,
	trust: &TrustRecord,
	new_last: u32,
) -> AwResult<()> {
	let url = match sub.subtarget.as_deref() {
		Some(s) => format!("{}/{}/{}", trust.baseuri, sub.target, s),
		None => format!("{}/{}", trust.baseuri, sub.target),
	};
	let meta = RequestMeta { bearer: Some(&trust.secret), parent_request_id: None };
	let fetched: serde_json::Value =
		serde_json::from_slice(&app.request.get_raw(&url, &meta).await?)?;
	engine::write_cache(
		app,
		sub.actor_id.as_ref(),
		&sub.peer_id,
		&sub.target,
		sub.subtarget.as_deref(),
		&fetched,
	)
	.await;

	write_state_reset(app, sub, new_last).await
}

async fn write_state_reset(app: &App, sub: &SubscriptionRecord, new_last: u32) -> AwResult<()> {
	let actor_id = sub.actor_id.as_ref();
	for _attempt in 0..CAS_RETRIES {
		let existing =
			app.store.read_callback_state(actor_id, &sub.peer_id, &sub.sub_id).await?;
		let expected = existing.as_ref().map(|s| s.version);
		let state = CallbackState {
			last_processed_seq: new_last,
			pending: "[]".into(),
			version: expected.unwrap_or(0) + 1,
		};
		match app
			.store
			.write_callback_state(actor_id, &sub.peer_id, &sub.sub_id, &state, expected)
			.await
		{
			Ok(()) => return Ok(()),
			Err(Error::Conflict(_)) => continue,
			Err(err) => return Err(err),
		}
	}
	Err(Error::Conflict("callback state reset retries exhausted".into()))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_apply_list_ops() {
		use actingweb_types::wire::{ListDiff, ListOperation};

		let mut items = Vec::new();
		let mut diff = ListDiff {
			list: "l".into(),
			operation: ListOperation::Append,
			item: Some(serde_json::json!("a")),
			items: None,
			index: None,
			length: 1,
		};
		apply_list_op(&mut items, &diff);
		diff.item = Some(serde_json::json!("c"));
		apply_list_op(&mut items, &diff);
		assert_eq!(items.len(), 2);

		diff.operation = ListOperation::Insert;
		diff.item = Some(serde_json::json!("b"));
		diff.index = Some(1);
		apply_list_op(&mut items, &diff);
		assert_eq!(items, vec![
			serde_json::json!("a"),
			serde_json::json!("b"),
			serde_json::json!("c")
		]);

		diff.operation = ListOperation::Delete;
		diff.index = Some(0);
		apply_list_op(&mut items, &diff);
		assert_eq!(items.len(), 2);

		diff.operation = ListOperation::Clear;
		apply_list_op(&mut items, &diff);
		assert!(items.is_empty());
	}

	#[test]
	fn test_pending_roundtrip() {
		let entries = vec![PendingEntry {
			sequence: 4,
			data: Some(serde_json::json!({"x": 1})),
			url: None,
			received_at: 1000,
		}];
		let encoded = encode_pending(&entries).unwrap();
		let state =
			CallbackState { last_processed_seq: 1, pending: encoded, version: 1 };
		let decoded = decode_pending(&state);
		assert_eq!(decoded.len(), 1);
		assert_eq!(decoded[0].sequence, 4);
	}
}

// vim: ts=4
