//! In-process implementation of the ActingWeb storage adapters.
//!
//! Keeps every row in hash maps behind a single mutex. Used by the test
//! suites of the engine crates and for embedded single-process deployments;
//! it implements the same semantics as the SQLite adapter, including the
//! conditional writes the callback processor and OAuth2 refresh rotation
//! depend on.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use actingweb_types::auth_adapter::{
	AccessTokenRecord, AuthAdapter, AuthCodeRecord, ClientRecord, RefreshTokenRecord,
};
use actingweb_types::error::{AwResult, Error};
use actingweb_types::lock;
use actingweb_types::store_adapter::{
	ActorRecord, AttributeRow, CallbackState, DiffRecord, ListMeta, ListTrustOptions,
	PropertyItem, StoreAdapter, SubscriptionRecord, SuspensionRow, TrustPatch, TrustRecord,
};
use actingweb_types::types::{Patch, Timestamp};

type Key2 = (Box<str>, Box<str>);
type Key3 = (Box<str>, Box<str>, Box<str>);

#[derive(Debug)]
struct ListState {
	meta: ListMeta,
	items: Vec<Box<str>>,
}

#[derive(Debug, Default)]
struct State {
	actors: HashMap<Box<str>, ActorRecord>,
	properties: HashMap<Key2, Box<str>>,
	prop_index: HashMap<Key2, Box<str>>,
	lists: HashMap<Key2, ListState>,
	attrs: HashMap<Key3, AttributeRow>,
	trusts: HashMap<Key2, TrustRecord>,
	subscriptions: HashMap<Key3, SubscriptionRecord>,
	diffs: HashMap<Key2, Vec<DiffRecord>>,
	suspensions: HashMap<(Box<str>, Box<str>), Vec<Option<Box<str>>>>,
	callback_states: HashMap<Key3, CallbackState>,

	clients: HashMap<Box<str>, ClientRecord>,
	auth_codes: HashMap<Box<str>, AuthCodeRecord>,
	access_tokens: HashMap<Box<str>, AccessTokenRecord>,
	refresh_tokens: HashMap<Box<str>, RefreshTokenRecord>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
	state: Mutex<State>,
}

impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}
}

fn apply<T>(field: &mut T, patch: &Patch<T>)
where
	T: Clone,
{
	if let Patch::Value(v) = patch {
		*field = v.clone();
	}
}

fn apply_opt<T>(field: &mut Option<T>, patch: &Patch<T>)
where
	T: Clone,
{
	match patch {
		Patch::Undefined => {}
		Patch::Null => *field = None,
		Patch::Value(v) => *field = Some(v.clone()),
	}
}

fn expired(row: &AttributeRow) -> bool {
	row.ttl_epoch.is_some_and(|ttl| ttl < Timestamp::now())
}

#[async_trait]
impl StoreAdapter for MemoryStore {
	// # Actors
	async fn create_actor(&self, record: &ActorRecord) -> AwResult<()> {
		let mut state = lock!(self.state)?;
		if state.actors.contains_key(&record.actor_id) {
			return Err(Error::Conflict(format!("actor {} already exists", record.actor_id)));
		}
		state.actors.insert(record.actor_id.clone(), record.clone());
		Ok(())
	}

	async fn read_actor(&self, actor_id: &str) -> AwResult<ActorRecord> {
		let state = lock!(self.state)?;
		state.actors.get(actor_id).cloned().ok_or(Error::NotFound)
	}

	async fn read_actors_by_creator(&self, creator: &str) -> AwResult<Vec<ActorRecord>> {
		let state = lock!(self.state)?;
		Ok(state.actors.values().filter(|a| a.creator.as_ref() == creator).cloned().collect())
	}

	async fn update_actor_creator(&self, actor_id: &str, creator: &str) -> AwResult<()> {
		let mut state = lock!(self.state)?;
		let actor = state.actors.get_mut(actor_id).ok_or(Error::NotFound)?;
		actor.creator = creator.into();
		Ok(())
	}

	async fn delete_actor(&self, actor_id: &str) -> AwResult<()> {
		let mut state = lock!(self.state)?;
		if state.actors.remove(actor_id).is_none() {
			return Err(Error::NotFound);
		}
		state.properties.retain(|(a, _), _| a.as_ref() != actor_id);
		state.prop_index.retain(|_, a| a.as_ref() != actor_id);
		state.lists.retain(|(a, _), _| a.as_ref() != actor_id);
		state.attrs.retain(|(a, _, _), _| a.as_ref() != actor_id);
		state.trusts.retain(|(a, _), _| a.as_ref() != actor_id);
		state.subscriptions.retain(|(a, _, _), _| a.as_ref() != actor_id);
		state.diffs.retain(|(a, _), _| a.as_ref() != actor_id);
		state.suspensions.retain(|(a, _), _| a.as_ref() != actor_id);
		state.callback_states.retain(|(a, _, _), _| a.as_ref() != actor_id);
		Ok(())
	}

	async fn list_actors(&self, limit: u32) -> AwResult<Vec<ActorRecord>> {
		let state = lock!(self.state)?;
		let mut actors: Vec<ActorRecord> = state.actors.values().cloned().collect();
		actors.sort_by(|a, b| a.actor_id.cmp(&b.actor_id));
		actors.truncate(limit as usize);
		Ok(actors)
	}

	// # Properties
	async fn read_property(&self, actor_id: &str, name: &str) -> AwResult<Box<str>> {
		let state = lock!(self.state)?;
		state
			.properties
			.get(&(actor_id.into(), name.into()))
			.cloned()
			.ok_or(Error::NotFound)
	}

	async fn write_property(&self, actor_id: &str, name: &str, value: &str) -> AwResult<()> {
		let mut state = lock!(self.state)?;
		if !state.actors.contains_key(actor_id) {
			return Err(Error::NotFound);
		}
		state.properties.insert((actor_id.into(), name.into()), value.into());
		Ok(())
	}

	async fn delete_property(&self, actor_id: &str, name: &str) -> AwResult<()> {
		let mut state = lock!(self.state)?;
		state
			.properties
			.remove(&(actor_id.into(), name.into()))
			.map(|_| ())
			.ok_or(Error::NotFound)
	}

	async fn list_properties(&self, actor_id: &str) -> AwResult<Vec<PropertyItem>> {
		let state = lock!(self.state)?;
		let mut items: Vec<PropertyItem> = state
			.properties
			.iter()
			.filter(|((a, _), _)| a.as_ref() == actor_id)
			.map(|((_, name), value)| PropertyItem { name: name.clone(), value: value.clone() })
			.collect();
		items.sort_by(|a, b| a.name.cmp(&b.name));
		Ok(items)
	}

	async fn delete_all_properties(&self, actor_id: &str) -> AwResult<()> {
		let mut state = lock!(self.state)?;
		state.properties.retain(|(a, _), _| a.as_ref() != actor_id);
		state.prop_index.retain(|_, a| a.as_ref() != actor_id);
		Ok(())
	}

	async fn write_property_index(&self, name: &str, value: &str, actor_id: &str) -> AwResult<()> {
		let mut state = lock!(self.state)?;
		state.prop_index.insert((name.into(), value.into()), actor_id.into());
		Ok(())
	}

	async fn delete_property_index(&self, name: &str, value: &str) -> AwResult<()> {
		let mut state = lock!(self.state)?;
		state.prop_index.remove(&(name.into(), value.into()));
		Ok(())
	}

	async fn read_property_index(&self, name: &str, value: &str) -> AwResult<Box<str>> {
		let state = lock!(self.state)?;
		state.prop_index.get(&(name.into(), value.into())).cloned().ok_or(Error::NotFound)
	}

	// # List properties
	async fn create_list(
		&self,
		actor_id: &str,
		list_name: &str,
		description: Option<&str>,
		explanation: Option<&str>,
	) -> AwResult<()> {
		let mut state = lock!(self.state)?;
		if !state.actors.contains_key(actor_id) {
			return Err(Error::NotFound);
		}
		let key = (Box::from(actor_id), Box::from(list_name));
		if state.lists.contains_key(&key) {
			return Err(Error::Conflict(format!("list {} already exists", list_name)));
		}
		let now = Timestamp::now();
		state.lists.insert(
			key,
			ListState {
				meta: ListMeta {
					list_name: list_name.into(),
					description: description.map(Into::into),
					explanation: explanation.map(Into::into),
					created_at: now,
					updated_at: now,
					version: 1,
					length: 0,
				},
				items: Vec::new(),
			},
		);
		Ok(())
	}

	async fn read_list_meta(&self, actor_id: &str, list_name: &str) -> AwResult<ListMeta> {
		let state = lock!(self.state)?;
		state
			.lists
			.get(&(actor_id.into(), list_name.into()))
			.map(|l| l.meta.clone())
			.ok_or(Error::NotFound)
	}

	async fn update_list_meta(
		&self,
		actor_id: &str,
		list_name: &str,
		description: Patch<Box<str>>,
		explanation: Patch<Box<str>>,
	) -> AwResult<()> {
		let mut state = lock!(self.state)?;
		let list =
			state.lists.get_mut(&(actor_id.into(), list_name.into())).ok_or(Error::NotFound)?;
		apply_opt(&mut list.meta.description, &description);
		apply_opt(&mut list.meta.explanation, &explanation);
		list.meta.version += 1;
		list.meta.updated_at = Timestamp::now();
		Ok(())
	}

	async fn list_lists(&self, actor_id: &str) -> AwResult<Vec<ListMeta>> {
		let state = lock!(self.state)?;
		let mut metas: Vec<ListMeta> = state
			.lists
			.iter()
			.filter(|((a, _), _)| a.as_ref() == actor_id)
			.map(|(_, l)| l.meta.clone())
			.collect();
		metas.sort_by(|a, b| a.list_name.cmp(&b.list_name));
		Ok(metas)
	}

	async fn read_list_items(&self, actor_id: &str, list_name: &str) -> AwResult<Vec<Box<str>>> {
		let state = lock!(self.state)?;
		state
			.lists
			.get(&(actor_id.into(), list_name.into()))
			.map(|l| l.items.clone())
			.ok_or(Error::NotFound)
	}

	async fn read_list_item(
		&self,
		actor_id: &str,
		list_name: &str,
		index: u32,
	) -> AwResult<Box<str>> {
		let state = lock!(self.state)?;
		state
			.lists
			.get(&(actor_id.into(), list_name.into()))
			.and_then(|l| l.items.get(index as usize))
			.cloned()
			.ok_or(Error::NotFound)
	}

	async fn append_list_item(
		&self,
		actor_id: &str,
		list_name: &str,
		item: &str,
	) -> AwResult<(u32, u32)> {
		let mut state = lock!(self.state)?;
		let list =
			state.lists.get_mut(&(actor_id.into(), list_name.into())).ok_or(Error::NotFound)?;
		list.items.push(item.into());
		let length = list.items.len() as u32;
		list.meta.length = length;
		list.meta.version += 1;
		list.meta.updated_at = Timestamp::now();
		Ok((length - 1, length))
	}

	async fn insert_list_item(
		&self,
		actor_id: &str,
		list_name: &str,
		index: u32,
		item: &str,
	) -> AwResult<u32> {
		let mut state = lock!(self.state)?;
		let list =
			state.lists.get_mut(&(actor_id.into(), list_name.into())).ok_or(Error::NotFound)?;
		if index as usize > list.items.len() {
			return Err(Error::ValidationError(format!("index {} out of range", index)));
		}
		list.items.insert(index as usize, item.into());
		let length = list.items.len() as u32;
		list.meta.length = length;
		list.meta.version += 1;
		list.meta.updated_at = Timestamp::now();
		Ok(length)
	}

	async fn update_list_item(
		&self,
		actor_id: &str,
		list_name: &str,
		index: u32,
		item: &str,
	) -> AwResult<()> {
		let mut state = lock!(self.state)?;
		let list =
			state.lists.get_mut(&(actor_id.into(), list_name.into())).ok_or(Error::NotFound)?;
		let slot = list.items.get_mut(index as usize).ok_or(Error::NotFound)?;
		*slot = item.into();
		list.meta.version += 1;
		list.meta.updated_at = Timestamp::now();
		Ok(())
	}

	async fn delete_list_item(
		&self,
		actor_id: &str,
		list_name: &str,
		index: u32,
	) -> AwResult<u32> {
		let mut state = lock!(self.state)?;
		let list =
			state.lists.get_mut(&(actor_id.into(), list_name.into())).ok_or(Error::NotFound)?;
		if index as usize >= list.items.len() {
			return Err(Error::NotFound);
		}
		list.items.remove(index as usize);
		let length = list.items.len() as u32;
		list.meta.length = length;
		list.meta.version += 1;
		list.meta.updated_at = Timestamp::now();
		Ok(length)
	}

	async fn extend_list(
		&self,
		actor_id: &str,
		list_name: &str,
		items: &[&str],
	) -> AwResult<(u32, u32)> {
		let mut state = lock!(self.state)?;
		let list =
			state.lists.get_mut(&(actor_id.into(), list_name.into())).ok_or(Error::NotFound)?;
		let first = list.items.len() as u32;
		list.items.extend(items.iter().map(|i| Box::from(*i)));
		let length = list.items.len() as u32;
		list.meta.length = length;
		list.meta.version += 1;
		list.meta.updated_at = Timestamp::now();
		Ok((first, length))
	}

	async fn clear_list(&self, actor_id: &str, list_name: &str) -> AwResult<()> {
		let mut state = lock!(self.state)?;
		let list =
			state.lists.get_mut(&(actor_id.into(), list_name.into())).ok_or(Error::NotFound)?;
		list.items.clear();
		list.meta.length = 0;
		list.meta.version += 1;
		list.meta.updated_at = Timestamp::now();
		Ok(())
	}

	async fn delete_list(&self, actor_id: &str, list_name: &str) -> AwResult<()> {
		let mut state = lock!(self.state)?;
		state
			.lists
			.remove(&(actor_id.into(), list_name.into()))
			.map(|_| ())
			.ok_or(Error::NotFound)
	}

	// # Attributes
	async fn read_attr(&self, actor_id: &str, bucket: &str, name: &str) -> AwResult<AttributeRow> {
		let state = lock!(self.state)?;
		let row = state
			.attrs
			.get(&(actor_id.into(), bucket.into(), name.into()))
			.ok_or(Error::NotFound)?;
		if expired(row) {
			return Err(Error::NotFound);
		}
		Ok(row.clone())
	}

	async fn write_attr(
		&self,
		actor_id: &str,
		bucket: &str,
		name: &str,
		value: &serde_json::Value,
		ttl_epoch: Option<Timestamp>,
	) -> AwResult<()> {
		let mut state = lock!(self.state)?;
		state.attrs.insert(
			(actor_id.into(), bucket.into(), name.into()),
			AttributeRow {
				bucket: bucket.into(),
				name: name.into(),
				value: value.clone(),
				ttl_epoch,
			},
		);
		Ok(())
	}

	async fn delete_attr(&self, actor_id: &str, bucket: &str, name: &str) -> AwResult<()> {
		let mut state = lock!(self.state)?;
		state
			.attrs
			.remove(&(actor_id.into(), bucket.into(), name.into()))
			.map(|_| ())
			.ok_or(Error::NotFound)
	}

	async fn read_bucket(&self, actor_id: &str, bucket: &str) -> AwResult<Vec<AttributeRow>> {
		let state = lock!(self.state)?;
		let mut rows: Vec<AttributeRow> = state
			.attrs
			.iter()
			.filter(|((a, b, _), row)| {
				a.as_ref() == actor_id && b.as_ref() == bucket && !expired(row)
			})
			.map(|(_, row)| row.clone())
			.collect();
		rows.sort_by(|a, b| a.name.cmp(&b.name));
		Ok(rows)
	}

	async fn delete_bucket(&self, actor_id: &str, bucket: &str) -> AwResult<()> {
		let mut state = lock!(self.state)?;
		state.attrs.retain(|(a, b, _), _| !(a.as_ref() == actor_id && b.as_ref() == bucket));
		Ok(())
	}

	async fn purge_expired_attrs(&self) -> AwResult<u32> {
		let mut state = lock!(self.state)?;
		let before = state.attrs.len();
		state.attrs.retain(|_, row| !expired(row));
		Ok((before - state.attrs.len()) as u32)
	}

	// # Trusts
	async fn create_trust(&self, record: &TrustRecord) -> AwResult<()> {
		let mut state = lock!(self.state)?;
		let key = (record.actor_id.clone(), record.peer_id.clone());
		if state.trusts.contains_key(&key) {
			return Err(Error::Conflict(format!("trust with {} already exists", record.peer_id)));
		}
		state.trusts.insert(key, record.clone());
		Ok(())
	}

	async fn read_trust(&self, actor_id: &str, peer_id: &str) -> AwResult<TrustRecord> {
		let state = lock!(self.state)?;
		state.trusts.get(&(actor_id.into(), peer_id.into())).cloned().ok_or(Error::NotFound)
	}

	async fn read_trust_by_secret(&self, secret: &str) -> AwResult<TrustRecord> {
		let state = lock!(self.state)?;
		state
			.trusts
			.values()
			.find(|t| t.secret.as_ref() == secret)
			.cloned()
			.ok_or(Error::NotFound)
	}

	async fn read_trust_by_client_id(&self, client_id: &str) -> AwResult<TrustRecord> {
		let state = lock!(self.state)?;
		state
			.trusts
			.values()
			.find(|t| t.oauth_client_id.as_deref() == Some(client_id))
			.cloned()
			.ok_or(Error::NotFound)
	}

	async fn list_trusts(
		&self,
		actor_id: &str,
		opts: &ListTrustOptions<'_>,
	) -> AwResult<Vec<TrustRecord>> {
		let state = lock!(self.state)?;
		let mut trusts: Vec<TrustRecord> = state
			.trusts
			.values()
			.filter(|t| t.actor_id.as_ref() == actor_id)
			.filter(|t| opts.relationship.is_none_or(|r| t.relationship.as_ref() == r))
			.filter(|t| opts.peer_id.is_none_or(|p| t.peer_id.as_ref() == p))
			.cloned()
			.collect();
		trusts.sort_by(|a, b| a.peer_id.cmp(&b.peer_id));
		Ok(trusts)
	}

	async fn update_trust(
		&self,
		actor_id: &str,
		peer_id: &str,
		patch: &TrustPatch,
	) -> AwResult<()> {
		let mut state = lock!(self.state)?;
		let trust =
			state.trusts.get_mut(&(actor_id.into(), peer_id.into())).ok_or(Error::NotFound)?;
		apply(&mut trust.baseuri, &patch.baseuri);
		apply(&mut trust.approved, &patch.approved);
		apply(&mut trust.peer_approved, &patch.peer_approved);
		apply(&mut trust.verified, &patch.verified);
		apply_opt(&mut trust.desc, &patch.desc);
		apply_opt(&mut trust.peer_identifier, &patch.peer_identifier);
		apply_opt(&mut trust.aw_supported, &patch.aw_supported);
		apply_opt(&mut trust.aw_version, &patch.aw_version);
		apply_opt(&mut trust.capabilities_fetched_at, &patch.capabilities_fetched_at);
		apply_opt(&mut trust.last_connected_at, &patch.last_connected_at);
		apply_opt(&mut trust.last_connected_via, &patch.last_connected_via);
		apply_opt(&mut trust.oauth_client_id, &patch.oauth_client_id);
		Ok(())
	}

	async fn delete_trust(&self, actor_id: &str, peer_id: &str) -> AwResult<()> {
		let mut state = lock!(self.state)?;
		state
			.trusts
			.remove(&(actor_id.into(), peer_id.into()))
			.map(|_| ())
			.ok_or(Error::NotFound)
	}

	// # Subscriptions
	async fn create_subscription(&self, record: &SubscriptionRecord) -> AwResult<()> {
		let mut state = lock!(self.state)?;
		let key = (record.actor_id.clone(), record.peer_id.clone(), record.sub_id.clone());
		if state.subscriptions.contains_key(&key) {
			return Err(Error::Conflict(format!("subscription {} already exists", record.sub_id)));
		}
		state.subscriptions.insert(key, record.clone());
		Ok(())
	}

	async fn read_subscription(
		&self,
		actor_id: &str,
		peer_id: &str,
		sub_id: &str,
	) -> AwResult<SubscriptionRecord> {
		let state = lock!(self.state)?;
		state
			.subscriptions
			.get(&(actor_id.into(), peer_id.into(), sub_id.into()))
			.cloned()
			.ok_or(Error::NotFound)
	}

	async fn list_subscriptions(
		&self,
		actor_id: &str,
		peer_id: Option<&str>,
	) -> AwResult<Vec<SubscriptionRecord>> {
		let state = lock!(self.state)?;
		let mut subs: Vec<SubscriptionRecord> = state
			.subscriptions
			.values()
			.filter(|s| s.actor_id.as_ref() == actor_id)
			.filter(|s| peer_id.is_none_or(|p| s.peer_id.as_ref() == p))
			.cloned()
			.collect();
		subs.sort_by(|a, b| a.sub_id.cmp(&b.sub_id));
		Ok(subs)
	}

	async fn delete_subscription(
		&self,
		actor_id: &str,
		peer_id: &str,
		sub_id: &str,
	) -> AwResult<()> {
		let mut state = lock!(self.state)?;
		state
			.subscriptions
			.remove(&(actor_id.into(), peer_id.into(), sub_id.into()))
			.map(|_| ())
			.ok_or(Error::NotFound)
	}

	// # Subscription diffs
	async fn create_diff(
		&self,
		actor_id: &str,
		peer_id: &str,
		sub_id: &str,
		blob: &str,
	) -> AwResult<u32> {
		let mut state = lock!(self.state)?;
		let sub = state
			.subscriptions
			.get_mut(&(actor_id.into(), peer_id.into(), sub_id.into()))
			.ok_or(Error::NotFound)?;
		sub.seqnr += 1;
		let seqnr = sub.seqnr;
		state.diffs.entry((actor_id.into(), sub_id.into())).or_default().push(DiffRecord {
			sub_id: sub_id.into(),
			seqnr,
			timestamp: Timestamp::now(),
			blob: blob.into(),
		});
		Ok(seqnr)
	}

	async fn list_diffs(&self, actor_id: &str, sub_id: &str) -> AwResult<Vec<DiffRecord>> {
		let state = lock!(self.state)?;
		let mut diffs = state
			.diffs
			.get(&(actor_id.into(), sub_id.into()))
			.cloned()
			.unwrap_or_default();
		diffs.sort_by_key(|d| d.seqnr);
		Ok(diffs)
	}

	async fn read_diff(&self, actor_id: &str, sub_id: &str, seqnr: u32) -> AwResult<DiffRecord> {
		let state = lock!(self.state)?;
		state
			.diffs
			.get(&(actor_id.into(), sub_id.into()))
			.and_then(|v| v.iter().find(|d| d.seqnr == seqnr))
			.cloned()
			.ok_or(Error::NotFound)
	}

	async fn clear_diff(&self, actor_id: &str, sub_id: &str, seqnr: u32) -> AwResult<()> {
		let mut state = lock!(self.state)?;
		if let Some(diffs) = state.diffs.get_mut(&(actor_id.into(), sub_id.into())) {
			diffs.retain(|d| d.seqnr != seqnr);
		}
		Ok(())
	}

	async fn clear_diffs(&self, actor_id: &str, sub_id: &str) -> AwResult<()> {
		let mut state = lock!(self.state)?;
		state.diffs.remove(&(actor_id.into(), sub_id.into()));
		Ok(())
	}

	// # Suspensions
	async fn create_suspension(
		&self,
		actor_id: &str,
		target: &str,
		subtarget: Option<&str>,
	) -> AwResult<()> {
		let mut state = lock!(self.state)?;
		let entry =
			state.suspensions.entry((actor_id.into(), target.into())).or_default();
		let subtarget = subtarget.map(Box::from);
		if !entry.contains(&subtarget) {
			entry.push(subtarget);
		}
		Ok(())
	}

	async fn delete_suspension(
		&self,
		actor_id: &str,
		target: &str,
		subtarget: Option<&str>,
	) -> AwResult<()> {
		let mut state = lock!(self.state)?;
		if let Some(entry) = state.suspensions.get_mut(&(actor_id.into(), target.into())) {
			let subtarget = subtarget.map(Box::from);
			entry.retain(|s| *s != subtarget);
		}
		Ok(())
	}

	async fn read_suspension(
		&self,
		actor_id: &str,
		target: &str,
		subtarget: Option<&str>,
	) -> AwResult<bool> {
		let state = lock!(self.state)?;
		let Some(entry) = state.suspensions.get(&(actor_id.into(), target.into())) else {
			return Ok(false);
		};
		// A whole-target suspension also covers every subtarget.
		if entry.contains(&None) {
			return Ok(true);
		}
		Ok(subtarget.is_some_and(|s| entry.iter().any(|e| e.as_deref() == Some(s))))
	}

	async fn list_suspensions(&self, actor_id: &str) -> AwResult<Vec<SuspensionRow>> {
		let state = lock!(self.state)?;
		let mut rows = Vec::new();
		for ((a, target), subtargets) in &state.suspensions {
			if a.as_ref() != actor_id {
				continue;
			}
			for subtarget in subtargets {
				rows.push(SuspensionRow { target: target.clone(), subtarget: subtarget.clone() });
			}
		}
		rows.sort_by(|a, b| (&a.target, &a.subtarget).cmp(&(&b.target, &b.subtarget)));
		Ok(rows)
	}

	// # Inbound callback state
	async fn read_callback_state(
		&self,
		actor_id: &str,
		peer_id: &str,
		sub_id: &str,
	) -> AwResult<Option<CallbackState>> {
		let state = lock!(self.state)?;
		Ok(state.callback_states.get(&(actor_id.into(), peer_id.into(), sub_id.into())).cloned())
	}

	async fn write_callback_state(
		&self,
		actor_id: &str,
		peer_id: &str,
		sub_id: &str,
		cb_state: &CallbackState,
		expected_version: Option<u32>,
	) -> AwResult<()> {
		let mut state = lock!(self.state)?;
		let key = (Box::from(actor_id), Box::from(peer_id), Box::from(sub_id));
		let current = state.callback_states.get(&key).map(|s| s.version);
		if current != expected_version {
			return Err(Error::Conflict(format!(
				"callback state version mismatch: expected {:?}, found {:?}",
				expected_version, current
			)));
		}
		state.callback_states.insert(key, cb_state.clone());
		Ok(())
	}

	async fn delete_callback_state(
		&self,
		actor_id: &str,
		peer_id: &str,
		sub_id: &str,
	) -> AwResult<()> {
		let mut state = lock!(self.state)?;
		state.callback_states.remove(&(actor_id.into(), peer_id.into(), sub_id.into()));
		Ok(())
	}
}

#[async_trait]
impl AuthAdapter for MemoryStore {
	// # Client registrations
	async fn create_client(&self, record: &ClientRecord) -> AwResult<()> {
		let mut state = lock!(self.state)?;
		if state.clients.contains_key(&record.client_id) {
			return Err(Error::Conflict(format!("client {} already exists", record.client_id)));
		}
		state.clients.insert(record.client_id.clone(), record.clone());
		Ok(())
	}

	async fn read_client(&self, client_id: &str) -> AwResult<ClientRecord> {
		let state = lock!(self.state)?;
		state.clients.get(client_id).cloned().ok_or(Error::NotFound)
	}

	async fn delete_client(&self, client_id: &str) -> AwResult<()> {
		let mut state = lock!(self.state)?;
		state.clients.remove(client_id).map(|_| ()).ok_or(Error::NotFound)
	}

	// # Authorization codes
	async fn create_auth_code(&self, record: &AuthCodeRecord) -> AwResult<()> {
		let mut state = lock!(self.state)?;
		state.auth_codes.insert(record.code.clone(), record.clone());
		Ok(())
	}

	async fn consume_auth_code(&self, code: &str) -> AwResult<AuthCodeRecord> {
		let mut state = lock!(self.state)?;
		let record = state.auth_codes.remove(code).ok_or(Error::NotFound)?;
		if record.expires_at < Timestamp::now() {
			return Err(Error::NotFound);
		}
		Ok(record)
	}

	// # Access tokens
	async fn create_access_token(&self, record: &AccessTokenRecord) -> AwResult<()> {
		let mut state = lock!(self.state)?;
		state.access_tokens.insert(record.token.clone(), record.clone());
		Ok(())
	}

	async fn read_access_token(&self, token: &str) -> AwResult<AccessTokenRecord> {
		let state = lock!(self.state)?;
		let record = state.access_tokens.get(token).ok_or(Error::NotFound)?;
		if record.expires_at < Timestamp::now() {
			return Err(Error::NotFound);
		}
		Ok(record.clone())
	}

	async fn delete_access_token(&self, token: &str) -> AwResult<()> {
		let mut state = lock!(self.state)?;
		state.access_tokens.remove(token).map(|_| ()).ok_or(Error::NotFound)
	}

	// # Refresh tokens
	async fn create_refresh_token(&self, record: &RefreshTokenRecord) -> AwResult<()> {
		let mut state = lock!(self.state)?;
		state.refresh_tokens.insert(record.token.clone(), record.clone());
		Ok(())
	}

	async fn read_refresh_token(&self, token: &str) -> AwResult<RefreshTokenRecord> {
		let state = lock!(self.state)?;
		let record = state.refresh_tokens.get(token).ok_or(Error::NotFound)?;
		if record.expires_at < Timestamp::now() {
			return Err(Error::NotFound);
		}
		Ok(record.clone())
	}

	async fn mark_refresh_rotated(
		&self,
		token: &str,
		replaced_by_access: &str,
		replaced_by_refresh: &str,
		rotated_at: Timestamp,
	) -> AwResult<bool> {
		let mut state = lock!(self.state)?;
		let record = state.refresh_tokens.get_mut(token).ok_or(Error::NotFound)?;
		if record.used {
			return Ok(false);
		}
		record.used = true;
		record.rotated_at = Some(rotated_at);
		record.replaced_by_access = Some(replaced_by_access.into());
		record.replaced_by_refresh = Some(replaced_by_refresh.into());
		Ok(true)
	}

	async fn delete_refresh_token(&self, token: &str) -> AwResult<()> {
		let mut state = lock!(self.state)?;
		state.refresh_tokens.remove(token).map(|_| ()).ok_or(Error::NotFound)
	}

	// # Family operations
	async fn revoke_token_family(&self, client_id: &str, actor_id: &str) -> AwResult<u32> {
		let mut state = lock!(self.state)?;
		let before = state.access_tokens.len() + state.refresh_tokens.len();
		state
			.access_tokens
			.retain(|_, t| !(t.client_id.as_ref() == client_id && t.actor_id.as_ref() == actor_id));
		state
			.refresh_tokens
			.retain(|_, t| !(t.client_id.as_ref() == client_id && t.actor_id.as_ref() == actor_id));
		Ok((before - state.access_tokens.len() - state.refresh_tokens.len()) as u32)
	}

	async fn revoke_client_tokens(&self, client_id: &str) -> AwResult<u32> {
		let mut state = lock!(self.state)?;
		let before = state.access_tokens.len() + state.refresh_tokens.len();
		state.access_tokens.retain(|_, t| t.client_id.as_ref() != client_id);
		state.refresh_tokens.retain(|_, t| t.client_id.as_ref() != client_id);
		Ok((before - state.access_tokens.len() - state.refresh_tokens.len()) as u32)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn actor(id: &str) -> ActorRecord {
		ActorRecord {
			actor_id: id.into(),
			creator: "alice@example.com".into(),
			passphrase_hash: "x$y".into(),
			created_at: Timestamp::now(),
		}
	}

	#[tokio::test]
	async fn test_actor_cascade() {
		let store = MemoryStore::new();
		store.create_actor(&actor("a1")).await.unwrap();
		store.write_property("a1", "note", "hi").await.unwrap();
		store.write_property_index("email", "alice@example.com", "a1").await.unwrap();
		store.create_list("a1", "memories", None, None).await.unwrap();

		store.delete_actor("a1").await.unwrap();
		assert!(matches!(store.read_property("a1", "note").await, Err(Error::NotFound)));
		assert!(matches!(
			store.read_property_index("email", "alice@example.com").await,
			Err(Error::NotFound)
		));
		assert!(matches!(store.read_list_meta("a1", "memories").await, Err(Error::NotFound)));
	}

	#[tokio::test]
	async fn test_list_shift_semantics() {
		let store = MemoryStore::new();
		store.create_actor(&actor("a1")).await.unwrap();
		store.create_list("a1", "l", None, None).await.unwrap();

		assert_eq!(store.append_list_item("a1", "l", "\"a\"").await.unwrap(), (0, 1));
		assert_eq!(store.append_list_item("a1", "l", "\"c\"").await.unwrap(), (1, 2));
		assert_eq!(store.insert_list_item("a1", "l", 1, "\"b\"").await.unwrap(), 3);
		assert_eq!(
			store.read_list_items("a1", "l").await.unwrap(),
			vec![Box::from("\"a\""), Box::from("\"b\""), Box::from("\"c\"")]
		);
		assert_eq!(store.delete_list_item("a1", "l", 0).await.unwrap(), 2);
		assert_eq!(store.read_list_item("a1", "l", 0).await.unwrap(), Box::from("\"b\""));

		let meta = store.read_list_meta("a1", "l").await.unwrap();
		assert_eq!(meta.length, 2);
		assert!(meta.version > 1);
	}

	#[tokio::test]
	async fn test_diff_seq_allocation() {
		let store = MemoryStore::new();
		store.create_actor(&actor("a1")).await.unwrap();
		store
			.create_subscription(&SubscriptionRecord {
				actor_id: "a1".into(),
				peer_id: "p1".into(),
				sub_id: "s1".into(),
				target: "properties".into(),
				subtarget: None,
				resource: None,
				granularity: actingweb_types::types::Granularity::High,
				seqnr: 0,
				callback: false,
				created_at: Timestamp::now(),
			})
			.await
			.unwrap();

		assert_eq!(store.create_diff("a1", "p1", "s1", "one").await.unwrap(), 1);
		assert_eq!(store.create_diff("a1", "p1", "s1", "two").await.unwrap(), 2);
		assert_eq!(store.create_diff("a1", "p1", "s1", "three").await.unwrap(), 3);

		store.clear_diff("a1", "s1", 2).await.unwrap();
		let remaining: Vec<u32> =
			store.list_diffs("a1", "s1").await.unwrap().iter().map(|d| d.seqnr).collect();
		assert_eq!(remaining, vec![1, 3]);
	}

	#[tokio::test]
	async fn test_callback_state_cas() {
		let store = MemoryStore::new();
		store.create_actor(&actor("a1")).await.unwrap();

		let st = CallbackState { last_processed_seq: 1, pending: "[]".into(), version: 1 };
		store.write_callback_state("a1", "p1", "s1", &st, None).await.unwrap();

		// Stale expected version is rejected
		let stale = CallbackState { last_processed_seq: 2, pending: "[]".into(), version: 2 };
		assert!(matches!(
			store.write_callback_state("a1", "p1", "s1", &stale, None).await,
			Err(Error::Conflict(_))
		));
		store.write_callback_state("a1", "p1", "s1", &stale, Some(1)).await.unwrap();
	}

	#[tokio::test]
	async fn test_refresh_rotation_cas() {
		let store = MemoryStore::new();
		let record = RefreshTokenRecord {
			token: "r1".into(),
			client_id: "c1".into(),
			actor_id: "a1".into(),
			peer_id: "oauth2:c1".into(),
			scope: None,
			created_at: Timestamp::now(),
			expires_at: Timestamp::from_now(1000),
			used: false,
			rotated_at: None,
			replaced_by_access: None,
			replaced_by_refresh: None,
		};
		store.create_refresh_token(&record).await.unwrap();

		assert!(store.mark_refresh_rotated("r1", "at2", "r2", Timestamp::now()).await.unwrap());
		// Second rotation of the same token loses the race
		assert!(!store.mark_refresh_rotated("r1", "at3", "r3", Timestamp::now()).await.unwrap());
		let stored = store.read_refresh_token("r1").await.unwrap();
		assert_eq!(stored.replaced_by_refresh.as_deref(), Some("r2"));
	}
}

// vim: ts=4
