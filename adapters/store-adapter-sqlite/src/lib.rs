//! SQLite implementation of the ActingWeb storage adapters.
//!
//! One writer pool (WAL keeps readers unblocked) plus a read-only pool for
//! queries, matching the single-writer model SQLite enforces anyway.

use async_trait::async_trait;
use sqlx::sqlite::{self, SqlitePool, SqliteRow};
use std::{fmt::Debug, path::Path};

use actingweb_types::auth_adapter::{
	AccessTokenRecord, AuthAdapter, AuthCodeRecord, ClientRecord, RefreshTokenRecord,
};
use actingweb_types::error::{AwResult, Error};
use actingweb_types::store_adapter::{
	ActorRecord, AttributeRow, CallbackState, DiffRecord, ListMeta, ListTrustOptions,
	PropertyItem, StoreAdapter, SubscriptionRecord, SuspensionRow, TrustPatch, TrustRecord,
};
use actingweb_types::types::{Patch, Timestamp};
use tracing::warn;

mod actor;
mod attribute;
mod list;
mod oauth;
mod property;
mod schema;
mod subscription;
mod trust;

// Helper functions
//******************

fn inspect(err: &sqlx::Error) {
	warn!("DB: {:#?}", err);
}

pub(crate) fn map_res<T, F>(row: Result<SqliteRow, sqlx::Error>, f: F) -> AwResult<T>
where
	F: FnOnce(SqliteRow) -> Result<T, sqlx::Error>,
{
	match row {
		Ok(row) => f(row).inspect_err(inspect).map_err(|_| Error::DbError),
		Err(sqlx::Error::RowNotFound) => Err(Error::NotFound),
		Err(err) => {
			inspect(&err);
			Err(Error::DbError)
		}
	}
}

pub(crate) fn map_exec(res: Result<sqlite::SqliteQueryResult, sqlx::Error>) -> AwResult<u64> {
	match res {
		Ok(done) => Ok(done.rows_affected()),
		Err(err) => {
			if matches!(&err, sqlx::Error::Database(db) if db.is_unique_violation()) {
				return Err(Error::Conflict("unique constraint violated".into()));
			}
			inspect(&err);
			Err(Error::DbError)
		}
	}
}

pub(crate) fn collect_rows<T, F>(
	rows: Result<Vec<SqliteRow>, sqlx::Error>,
	f: F,
) -> AwResult<Vec<T>>
where
	F: Fn(SqliteRow) -> Result<T, sqlx::Error>,
{
	match rows {
		Ok(rows) => rows
			.into_iter()
			.map(|row| f(row).inspect_err(inspect).map_err(|_| Error::DbError))
			.collect(),
		Err(err) => {
			inspect(&err);
			Err(Error::DbError)
		}
	}
}

#[derive(Debug)]
pub struct SqliteStore {
	db: SqlitePool,
	dbr: SqlitePool,
}

impl SqliteStore {
	pub async fn new(path: impl AsRef<Path>) -> AwResult<Self> {
		let db_path = path.as_ref().join("actingweb.db");
		let opts = sqlite::SqliteConnectOptions::new()
			.filename(&db_path)
			.create_if_missing(true)
			.journal_mode(sqlite::SqliteJournalMode::Wal);

		let db = sqlite::SqlitePoolOptions::new()
			.max_connections(1)
			.connect_with(opts.clone())
			.await
			.inspect_err(|err| warn!("DbError: {:#?}", err))
			.map_err(|_| Error::DbError)?;
		let dbr = sqlite::SqlitePoolOptions::new()
			.max_connections(5)
			.connect_with(opts.read_only(true))
			.await
			.inspect_err(|err| warn!("DbError: {:#?}", err))
			.map_err(|_| Error::DbError)?;

		schema::init(&db).await?;
		Ok(Self { db, dbr })
	}
}

#[async_trait]
impl StoreAdapter for SqliteStore {
	// # Actors
	async fn create_actor(&self, record: &ActorRecord) -> AwResult<()> {
		actor::create(&self.db, record).await
	}

	async fn read_actor(&self, actor_id: &str) -> AwResult<ActorRecord> {
		actor::read(&self.dbr, actor_id).await
	}

	async fn read_actors_by_creator(&self, creator: &str) -> AwResult<Vec<ActorRecord>> {
		actor::read_by_creator(&self.dbr, creator).await
	}

	async fn update_actor_creator(&self, actor_id: &str, creator: &str) -> AwResult<()> {
		actor::update_creator(&self.db, actor_id, creator).await
	}

	async fn delete_actor(&self, actor_id: &str) -> AwResult<()> {
		actor::delete(&self.db, actor_id).await
	}

	async fn list_actors(&self, limit: u32) -> AwResult<Vec<ActorRecord>> {
		actor::list(&self.dbr, limit).await
	}

	// # Properties
	async fn read_property(&self, actor_id: &str, name: &str) -> AwResult<Box<str>> {
		property::read(&self.dbr, actor_id, name).await
	}

	async fn write_property(&self, actor_id: &str, name: &str, value: &str) -> AwResult<()> {
		property::write(&self.db, actor_id, name, value).await
	}

	async fn delete_property(&self, actor_id: &str, name: &str) -> AwResult<()> {
		property::delete(&self.db, actor_id, name).await
	}

	async fn list_properties(&self, actor_id: &str) -> AwResult<Vec<PropertyItem>> {
		property::list(&self.dbr, actor_id).await
	}

	async fn delete_all_properties(&self, actor_id: &str) -> AwResult<()> {
		property::delete_all(&self.db, actor_id).await
	}

	async fn write_property_index(&self, name: &str, value: &str, actor_id: &str) -> AwResult<()> {
		property::index_write(&self.db, name, value, actor_id).await
	}

	async fn delete_property_index(&self, name: &str, value: &str) -> AwResult<()> {
		property::index_delete(&self.db, name, value).await
	}

	async fn read_property_index(&self, name: &str, value: &str) -> AwResult<Box<str>> {
		property::index_read(&self.dbr, name, value).await
	}

	// # List properties
	async fn create_list(
		&self,
		actor_id: &str,
		list_name: &str,
		description: Option<&str>,
		explanation: Option<&str>,
	) -> AwResult<()> {
		list::create(&self.db, actor_id, list_name, description, explanation).await
	}

	async fn read_list_meta(&self, actor_id: &str, list_name: &str) -> AwResult<ListMeta> {
		list::read_meta(&self.dbr, actor_id, list_name).await
	}

	async fn update_list_meta(
		&self,
		actor_id: &str,
		list_name: &str,
		description: Patch<Box<str>>,
		explanation: Patch<Box<str>>,
	) -> AwResult<()> {
		list::update_meta(&self.db, actor_id, list_name, description, explanation).await
	}

	async fn list_lists(&self, actor_id: &str) -> AwResult<Vec<ListMeta>> {
		list::list_all(&self.dbr, actor_id).await
	}

	async fn read_list_items(&self, actor_id: &str, list_name: &str) -> AwResult<Vec<Box<str>>> {
		list::read_items(&self.dbr, actor_id, list_name).await
	}

	async fn read_list_item(
		&self,
		actor_id: &str,
		list_name: &str,
		index: u32,
	) -> AwResult<Box<str>> {
		list::read_item(&self.dbr, actor_id, list_name, index).await
	}

	async fn append_list_item(
		&self,
		actor_id: &str,
		list_name: &str,
		item: &str,
	) -> AwResult<(u32, u32)> {
		list::append(&self.db, actor_id, list_name, item).await
	}

	async fn insert_list_item(
		&self,
		actor_id: &str,
		list_name: &str,
		index: u32,
		item: &str,
	) -> AwResult<u32> {
		list::insert(&self.db, actor_id, list_name, index, item).await
	}

	async fn update_list_item(
		&self,
		actor_id: &str,
		list_name: &str,
		index: u32,
		item: &str,
	) -> AwResult<()> {
		list::update(&self.db, actor_id, list_name, index, item).await
	}

	async fn delete_list_item(&self, actor_id: &str, list_name: &str, index: u32) -> AwResult<u32> {
		list::delete_item(&self.db, actor_id, list_name, index).await
	}

	async fn extend_list(
		&self,
		actor_id: &str,
		list_name: &str,
		items: &[&str],
	) -> AwResult<(u32, u32)> {
		list::extend(&self.db, actor_id, list_name, items).await
	}

	async fn clear_list(&self, actor_id: &str, list_name: &str) -> AwResult<()> {
		list::clear(&self.db, actor_id, list_name).await
	}

	async fn delete_list(&self, actor_id: &str, list_name: &str) -> AwResult<()> {
		list::delete(&self.db, actor_id, list_name).await
	}

	// # Attributes
	async fn read_attr(&self, actor_id: &str, bucket: &str, name: &str) -> AwResult<AttributeRow> {
		attribute::read(&self.dbr, actor_id, bucket, name).await
	}

	async fn write_attr(
		&self,
		actor_id: &str,
		bucket: &str,
		name: &str,
		value: &serde_json::Value,
		ttl_epoch: Option<Timestamp>,
	) -> AwResult<()> {
		attribute::write(&self.db, actor_id, bucket, name, value, ttl_epoch).await
	}

	async fn delete_attr(&self, actor_id: &str, bucket: &str, name: &str) -> AwResult<()> {
		attribute::delete(&self.db, actor_id, bucket, name).await
	}

	async fn read_bucket(&self, actor_id: &str, bucket: &str) -> AwResult<Vec<AttributeRow>> {
		attribute::read_bucket(&self.dbr, actor_id, bucket).await
	}

	async fn delete_bucket(&self, actor_id: &str, bucket: &str) -> AwResult<()> {
		attribute::delete_bucket(&self.db, actor_id, bucket).await
	}

	async fn purge_expired_attrs(&self) -> AwResult<u32> {
		attribute::purge_expired(&self.db).await
	}

	// # Trusts
	async fn create_trust(&self, record: &TrustRecord) -> AwResult<()> {
		trust::create(&self.db, record).await
	}

	async fn read_trust(&self, actor_id: &str, peer_id: &str) -> AwResult<TrustRecord> {
		trust::read(&self.dbr, actor_id, peer_id).await
	}

	async fn read_trust_by_secret(&self, secret: &str) -> AwResult<TrustRecord> {
		trust::read_by_secret(&self.dbr, secret).await
	}

	async fn read_trust_by_client_id(&self, client_id: &str) -> AwResult<TrustRecord> {
		trust::read_by_client_id(&self.dbr, client_id).await
	}

	async fn list_trusts(
		&self,
		actor_id: &str,
		opts: &ListTrustOptions<'_>,
	) -> AwResult<Vec<TrustRecord>> {
		trust::list(&self.dbr, actor_id, opts).await
	}

	async fn update_trust(
		&self,
		actor_id: &str,
		peer_id: &str,
		patch: &TrustPatch,
	) -> AwResult<()> {
		trust::update(&self.db, actor_id, peer_id, patch).await
	}

	async fn delete_trust(&self, actor_id: &str, peer_id: &str) -> AwResult<()> {
		trust::delete(&self.db, actor_id, peer_id).await
	}

	// # Subscriptions
	async fn create_subscription(&self, record: &SubscriptionRecord) -> AwResult<()> {
		subscription::create(&self.db, record).await
	}

	async fn read_subscription(
		&self,
		actor_id: &str,
		peer_id: &str,
		sub_id: &str,
	) -> AwResult<SubscriptionRecord> {
		subscription::read(&self.dbr, actor_id, peer_id, sub_id).await
	}

	async fn list_subscriptions(
		&self,
		actor_id: &str,
		peer_id: Option<&str>,
	) -> AwResult<Vec<SubscriptionRecord>> {
		subscription::list(&self.dbr, actor_id, peer_id).await
	}

	async fn delete_subscription(
		&self,
		actor_id: &str,
		peer_id: &str,
		sub_id: &str,
	) -> AwResult<()> {
		subscription::delete(&self.db, actor_id, peer_id, sub_id).await
	}

	// # Subscription diffs
	async fn create_diff(
		&self,
		actor_id: &str,
		peer_id: &str,
		sub_id: &str,
		blob: &str,
	) -> AwResult<u32> {
		subscription::create_diff(&self.db, actor_id, peer_id, sub_id, blob).await
	}

	async fn list_diffs(&self, actor_id: &str, sub_id: &str) -> AwResult<Vec<DiffRecord>> {
		subscription::list_diffs(&self.dbr, actor_id, sub_id).await
	}

	async fn read_diff(&self, actor_id: &str, sub_id: &str, seqnr: u32) -> AwResult<DiffRecord> {
		subscription::read_diff(&self.dbr, actor_id, sub_id, seqnr).await
	}

	async fn clear_diff(&self, actor_id: &str, sub_id: &str, seqnr: u32) -> AwResult<()> {
		subscription::clear_diff(&self.db, actor_id, sub_id, seqnr).await
	}

	async fn clear_diffs(&self, actor_id: &str, sub_id: &str) -> AwResult<()> {
		subscription::clear_diffs(&self.db, actor_id, sub_id).await
	}

	// # Suspensions
	async fn create_suspension(
		&self,
		actor_id: &str,
		target: &str,
		subtarget: Option<&str>,
	) -> AwResult<()> {
		subscription::create_suspension(&self.db, actor_id, target, subtarget).await
	}

	async fn delete_suspension(
		&self,
		actor_id: &str,
		target: &str,
		subtarget: Option<&str>,
	) -> AwResult<()> {
		subscription::delete_suspension(&self.db, actor_id, target, subtarget).await
	}

	async fn read_suspension(
		&self,
		actor_id: &str,
		target: &str,
		subtarget: Option<&str>,
	) -> AwResult<bool> {
		subscription::read_suspension(&self.dbr, actor_id, target, subtarget).await
	}

	async fn list_suspensions(&self, actor_id: &str) -> AwResult<Vec<SuspensionRow>> {
		subscription::list_suspensions(&self.dbr, actor_id).await
	}

	// # Inbound callback state
	async fn read_callback_state(
		&self,
		actor_id: &str,
		peer_id: &str,
		sub_id: &str,
	) -> AwResult<Option<CallbackState>> {
		subscription::read_callback_state(&self.dbr, actor_id, peer_id, sub_id).await
	}

	async fn write_callback_state(
		&self,
		actor_id: &str,
		peer_id: &str,
		sub_id: &str,
		state: &CallbackState,
		expected_version: Option<u32>,
	) -> AwResult<()> {
		subscription::write_callback_state(&self.db, actor_id, peer_id, sub_id, state, expected_version)
			.await
	}

	async fn delete_callback_state(
		&self,
		actor_id: &str,
		peer_id: &str,
		sub_id: &str,
	) -> AwResult<()> {
		subscription::delete_callback_state(&self.db, actor_id, peer_id, sub_id).await
	}
}

#[async_trait]
impl AuthAdapter for SqliteStore {
	async fn create_client(&self, record: &ClientRecord) -> AwResult<()> {
		oauth::create_client(&self.db, record).await
	}

	async fn read_client(&self, client_id: &str) -> AwResult<ClientRecord> {
		oauth::read_client(&self.dbr, client_id).await
	}

	async fn delete_client(&self, client_id: &str) -> AwResult<()> {
		oauth::delete_client(&self.db, client_id).await
	}

	async fn create_auth_code(&self, record: &AuthCodeRecord) -> AwResult<()> {
		oauth::create_code(&self.db, record).await
	}

	async fn consume_auth_code(&self, code: &str) -> AwResult<AuthCodeRecord> {
		oauth::consume_code(&self.db, code).await
	}

	async fn create_access_token(&self, record: &AccessTokenRecord) -> AwResult<()> {
		oauth::create_access(&self.db, record).await
	}

	async fn read_access_token(&self, token: &str) -> AwResult<AccessTokenRecord> {
		oauth::read_access(&self.dbr, token).await
	}

	async fn delete_access_token(&self, token: &str) -> AwResult<()> {
		oauth::delete_access(&self.db, token).await
	}

	async fn create_refresh_token(&self, record: &RefreshTokenRecord) -> AwResult<()> {
		oauth::create_refresh(&self.db, record).await
	}

	async fn read_refresh_token(&self, token: &str) -> AwResult<RefreshTokenRecord> {
		oauth::read_refresh(&self.dbr, token).await
	}

	async fn mark_refresh_rotated(
		&self,
		token: &str,
		replaced_by_access: &str,
		replaced_by_refresh: &str,
		rotated_at: Timestamp,
	) -> AwResult<bool> {
		oauth::mark_refresh_rotated(&self.db, token, replaced_by_access, replaced_by_refresh, rotated_at)
			.await
	}

	async fn delete_refresh_token(&self, token: &str) -> AwResult<()> {
		oauth::delete_refresh(&self.db, token).await
	}

	async fn revoke_token_family(&self, client_id: &str, actor_id: &str) -> AwResult<u32> {
		oauth::revoke_family(&self.db, client_id, Some(actor_id)).await
	}

	async fn revoke_client_tokens(&self, client_id: &str) -> AwResult<u32> {
		oauth::revoke_family(&self.db, client_id, None).await
	}
}

// vim: ts=4
