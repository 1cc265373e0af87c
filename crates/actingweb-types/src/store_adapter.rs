//! Adapter that persists all per-actor state: actors, properties, lists,
//! attributes, trusts, subscriptions, diffs, suspensions, and inbound
//! callback state.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::fmt::Debug;

use crate::{
	error::AwResult,
	types::{Granularity, Patch, Timestamp},
};

// Actors
//********

#[derive(Debug, Clone)]
pub struct ActorRecord {
	pub actor_id: Box<str>,
	pub creator: Box<str>,
	pub passphrase_hash: Box<str>,
	pub created_at: Timestamp,
}

// Properties
//************

#[derive(Debug, Clone, Serialize)]
pub struct PropertyItem {
	pub name: Box<str>,
	pub value: Box<str>,
}

// List properties
//*****************

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListMeta {
	pub list_name: Box<str>,
	pub description: Option<Box<str>>,
	pub explanation: Option<Box<str>>,
	pub created_at: Timestamp,
	pub updated_at: Timestamp,
	pub version: u32,
	pub length: u32,
}

// Attributes
//************

#[derive(Debug, Clone)]
pub struct AttributeRow {
	pub bucket: Box<str>,
	pub name: Box<str>,
	pub value: serde_json::Value,
	pub ttl_epoch: Option<Timestamp>,
}

// Trusts
//********

/// How a trust relationship came into existence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstablishedVia {
	Actingweb,
	Oauth2Interactive,
	Oauth2Client,
}

impl EstablishedVia {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Actingweb => "actingweb",
			Self::Oauth2Interactive => "oauth2_interactive",
			Self::Oauth2Client => "oauth2_client",
		}
	}

	pub fn parse(s: &str) -> Option<Self> {
		match s {
			"actingweb" => Some(Self::Actingweb),
			"oauth2_interactive" => Some(Self::Oauth2Interactive),
			"oauth2_client" => Some(Self::Oauth2Client),
			_ => None,
		}
	}
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustRecord {
	#[serde(skip_serializing)]
	pub actor_id: Box<str>,
	pub peer_id: Box<str>,
	pub baseuri: Box<str>,
	#[serde(rename = "type")]
	pub peer_type: Box<str>,
	pub relationship: Box<str>,
	#[serde(skip_serializing)]
	pub secret: Box<str>,
	pub approved: bool,
	pub peer_approved: bool,
	pub verified: bool,
	#[serde(skip_serializing)]
	pub verification_token: Box<str>,
	pub established_via: EstablishedVia,
	pub peer_identifier: Option<Box<str>>,
	pub desc: Option<Box<str>>,
	pub aw_supported: Option<Box<str>>,
	pub aw_version: Option<Box<str>>,
	pub capabilities_fetched_at: Option<Timestamp>,
	pub last_connected_at: Option<Timestamp>,
	pub last_connected_via: Option<Box<str>>,
	pub oauth_client_id: Option<Box<str>>,
	pub client_name: Option<Box<str>>,
	pub client_version: Option<Box<str>>,
	pub client_platform: Option<Box<str>>,
	pub created_at: Timestamp,
}

impl TrustRecord {
	/// A trust is usable once both sides have approved it.
	pub fn is_active(&self) -> bool {
		self.approved && self.peer_approved
	}
}

#[derive(Debug, Default)]
pub struct TrustPatch {
	pub baseuri: Patch<Box<str>>,
	pub approved: Patch<bool>,
	pub peer_approved: Patch<bool>,
	pub verified: Patch<bool>,
	pub desc: Patch<Box<str>>,
	pub peer_identifier: Patch<Box<str>>,
	pub aw_supported: Patch<Box<str>>,
	pub aw_version: Patch<Box<str>>,
	pub capabilities_fetched_at: Patch<Timestamp>,
	pub last_connected_at: Patch<Timestamp>,
	pub last_connected_via: Patch<Box<str>>,
	pub oauth_client_id: Patch<Box<str>>,
}

#[derive(Debug, Default)]
pub struct ListTrustOptions<'a> {
	pub relationship: Option<&'a str>,
	pub peer_id: Option<&'a str>,
}

// Subscriptions
//***************

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionRecord {
	#[serde(skip_serializing)]
	pub actor_id: Box<str>,
	#[serde(rename = "peerid")]
	pub peer_id: Box<str>,
	#[serde(rename = "subscriptionid")]
	pub sub_id: Box<str>,
	pub target: Box<str>,
	pub subtarget: Option<Box<str>>,
	pub resource: Option<Box<str>>,
	pub granularity: Granularity,
	#[serde(rename = "sequence")]
	pub seqnr: u32,
	/// True iff this is our mirror of a subscription we created on the peer.
	pub callback: bool,
	pub created_at: Timestamp,
}

#[derive(Debug, Clone)]
pub struct DiffRecord {
	pub sub_id: Box<str>,
	pub seqnr: u32,
	pub timestamp: Timestamp,
	pub blob: Box<str>,
}

#[derive(Debug, Clone)]
pub struct SuspensionRow {
	pub target: Box<str>,
	pub subtarget: Option<Box<str>>,
}

/// Receiver-side state of one inbound subscription, updated with optimistic
/// concurrency (the version column).
#[derive(Debug, Clone, Default)]
pub struct CallbackState {
	pub last_processed_seq: u32,
	/// JSON-serialized pending queue: `[{"sequence": n, "data": ..., "receivedAt": ts}]`
	pub pending: Box<str>,
	pub version: u32,
}

/// An ActingWeb storage adapter.
///
/// Every backend implements this trait. All methods operate on one actor's
/// rows except the reverse-lookup index, which is global. Deleting an actor
/// cascades to every row keyed by its id.
#[async_trait]
pub trait StoreAdapter: Debug + Send + Sync {
	// # Actors
	async fn create_actor(&self, record: &ActorRecord) -> AwResult<()>;
	async fn read_actor(&self, actor_id: &str) -> AwResult<ActorRecord>;
	async fn read_actors_by_creator(&self, creator: &str) -> AwResult<Vec<ActorRecord>>;
	async fn update_actor_creator(&self, actor_id: &str, creator: &str) -> AwResult<()>;
	async fn delete_actor(&self, actor_id: &str) -> AwResult<()>;
	async fn list_actors(&self, limit: u32) -> AwResult<Vec<ActorRecord>>;

	// # Properties
	async fn read_property(&self, actor_id: &str, name: &str) -> AwResult<Box<str>>;
	async fn write_property(&self, actor_id: &str, name: &str, value: &str) -> AwResult<()>;
	async fn delete_property(&self, actor_id: &str, name: &str) -> AwResult<()>;
	async fn list_properties(&self, actor_id: &str) -> AwResult<Vec<PropertyItem>>;
	async fn delete_all_properties(&self, actor_id: &str) -> AwResult<()>;

	// Reverse lookup table for indexed properties (global)
	async fn write_property_index(&self, name: &str, value: &str, actor_id: &str) -> AwResult<()>;
	async fn delete_property_index(&self, name: &str, value: &str) -> AwResult<()>;
	async fn read_property_index(&self, name: &str, value: &str) -> AwResult<Box<str>>;

	// # List properties
	async fn create_list(
		&self,
		actor_id: &str,
		list_name: &str,
		description: Option<&str>,
		explanation: Option<&str>,
	) -> AwResult<()>;
	async fn read_list_meta(&self, actor_id: &str, list_name: &str) -> AwResult<ListMeta>;
	async fn update_list_meta(
		&self,
		actor_id: &str,
		list_name: &str,
		description: Patch<Box<str>>,
		explanation: Patch<Box<str>>,
	) -> AwResult<()>;
	async fn list_lists(&self, actor_id: &str) -> AwResult<Vec<ListMeta>>;
	async fn read_list_items(&self, actor_id: &str, list_name: &str) -> AwResult<Vec<Box<str>>>;
	async fn read_list_item(&self, actor_id: &str, list_name: &str, index: u32)
	-> AwResult<Box<str>>;
	/// Returns `(index, new_length)`.
	async fn append_list_item(
		&self,
		actor_id: &str,
		list_name: &str,
		item: &str,
	) -> AwResult<(u32, u32)>;
	/// Inserts before `index`, shifting subsequent items. Returns new length.
	async fn insert_list_item(
		&self,
		actor_id: &str,
		list_name: &str,
		index: u32,
		item: &str,
	) -> AwResult<u32>;
	async fn update_list_item(
		&self,
		actor_id: &str,
		list_name: &str,
		index: u32,
		item: &str,
	) -> AwResult<()>;
	/// Removes `index`, shifting subsequent items down. Returns new length.
	async fn delete_list_item(&self, actor_id: &str, list_name: &str, index: u32) -> AwResult<u32>;
	/// Returns `(first_new_index, new_length)`.
	async fn extend_list(
		&self,
		actor_id: &str,
		list_name: &str,
		items: &[&str],
	) -> AwResult<(u32, u32)>;
	async fn clear_list(&self, actor_id: &str, list_name: &str) -> AwResult<()>;
	async fn delete_list(&self, actor_id: &str, list_name: &str) -> AwResult<()>;

	// # Attributes
	async fn read_attr(&self, actor_id: &str, bucket: &str, name: &str) -> AwResult<AttributeRow>;
	async fn write_attr(
		&self,
		actor_id: &str,
		bucket: &str,
		name: &str,
		value: &serde_json::Value,
		ttl_epoch: Option<Timestamp>,
	) -> AwResult<()>;
	async fn delete_attr(&self, actor_id: &str, bucket: &str, name: &str) -> AwResult<()>;
	async fn read_bucket(&self, actor_id: &str, bucket: &str) -> AwResult<Vec<AttributeRow>>;
	async fn delete_bucket(&self, actor_id: &str, bucket: &str) -> AwResult<()>;
	/// Removes rows whose ttl has passed. Returns the number purged.
	async fn purge_expired_attrs(&self) -> AwResult<u32>;

	// # Trusts
	async fn create_trust(&self, record: &TrustRecord) -> AwResult<()>;
	async fn read_trust(&self, actor_id: &str, peer_id: &str) -> AwResult<TrustRecord>;
	async fn read_trust_by_secret(&self, secret: &str) -> AwResult<TrustRecord>;
	async fn read_trust_by_client_id(&self, client_id: &str) -> AwResult<TrustRecord>;
	async fn list_trusts(
		&self,
		actor_id: &str,
		opts: &ListTrustOptions<'_>,
	) -> AwResult<Vec<TrustRecord>>;
	async fn update_trust(&self, actor_id: &str, peer_id: &str, patch: &TrustPatch)
	-> AwResult<()>;
	async fn delete_trust(&self, actor_id: &str, peer_id: &str) -> AwResult<()>;

	// # Subscriptions
	async fn create_subscription(&self, record: &SubscriptionRecord) -> AwResult<()>;
	async fn read_subscription(
		&self,
		actor_id: &str,
		peer_id: &str,
		sub_id: &str,
	) -> AwResult<SubscriptionRecord>;
	async fn list_subscriptions(
		&self,
		actor_id: &str,
		peer_id: Option<&str>,
	) -> AwResult<Vec<SubscriptionRecord>>;
	async fn delete_subscription(
		&self,
		actor_id: &str,
		peer_id: &str,
		sub_id: &str,
	) -> AwResult<()>;

	// # Subscription diffs
	/// Stores a diff under the subscription's next sequence number, atomically
	/// incrementing it. Returns the allocated seqnr.
	async fn create_diff(
		&self,
		actor_id: &str,
		peer_id: &str,
		sub_id: &str,
		blob: &str,
	) -> AwResult<u32>;
	async fn list_diffs(&self, actor_id: &str, sub_id: &str) -> AwResult<Vec<DiffRecord>>;
	async fn read_diff(&self, actor_id: &str, sub_id: &str, seqnr: u32) -> AwResult<DiffRecord>;
	async fn clear_diff(&self, actor_id: &str, sub_id: &str, seqnr: u32) -> AwResult<()>;
	async fn clear_diffs(&self, actor_id: &str, sub_id: &str) -> AwResult<()>;

	// # Suspensions
	async fn create_suspension(
		&self,
		actor_id: &str,
		target: &str,
		subtarget: Option<&str>,
	) -> AwResult<()>;
	async fn delete_suspension(
		&self,
		actor_id: &str,
		target: &str,
		subtarget: Option<&str>,
	) -> AwResult<()>;
	async fn read_suspension(
		&self,
		actor_id: &str,
		target: &str,
		subtarget: Option<&str>,
	) -> AwResult<bool>;
	async fn list_suspensions(&self, actor_id: &str) -> AwResult<Vec<SuspensionRow>>;

	// # Inbound callback state
	async fn read_callback_state(
		&self,
		actor_id: &str,
		peer_id: &str,
		sub_id: &str,
	) -> AwResult<Option<CallbackState>>;
	/// Conditional write: succeeds only if the stored version still equals
	/// `expected_version` (`None` means the row must not exist yet). On
	/// success the stored version is `state.version`. Mismatch returns
	/// `Error::Conflict`.
	async fn write_callback_state(
		&self,
		actor_id: &str,
		peer_id: &str,
		sub_id: &str,
		state: &CallbackState,
		expected_version: Option<u32>,
	) -> AwResult<()>;
	async fn delete_callback_state(
		&self,
		actor_id: &str,
		peer_id: &str,
		sub_id: &str,
	) -> AwResult<()>;
}

// vim: ts=4
