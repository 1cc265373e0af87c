//! Trust rows. The shared secret and the OAuth2 client binding are indexed
//! for the authentication pipeline's reverse lookups.

use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool, sqlite::SqliteRow};

use crate::{collect_rows, map_exec, map_res};
use actingweb_types::error::{AwResult, Error};
use actingweb_types::store_adapter::{EstablishedVia, ListTrustOptions, TrustPatch, TrustRecord};
use actingweb_types::types::{Patch, Timestamp};

/// Apply one Patch field to a dynamic UPDATE. Returns the new has_updates.
macro_rules! push_patch {
	($query:expr, $has_updates:expr, $field:literal, $patch:expr, |$v:ident| $convert:expr) => {{
		match &$patch {
			Patch::Undefined => $has_updates,
			Patch::Null => {
				if $has_updates {
					$query.push(", ");
				}
				$query.push(concat!($field, "=NULL"));
				true
			}
			Patch::Value($v) => {
				if $has_updates {
					$query.push(", ");
				}
				$query.push(concat!($field, "=")).push_bind($convert);
				true
			}
		}
	}};
}

fn from_row(row: SqliteRow) -> Result<TrustRecord, sqlx::Error> {
	let via: String = row.get("established_via");
	Ok(TrustRecord {
		actor_id: row.get::<String, _>("actor_id").into(),
		peer_id: row.get::<String, _>("peer_id").into(),
		baseuri: row.get::<String, _>("baseuri").into(),
		peer_type: row.get::<String, _>("peer_type").into(),
		relationship: row.get::<String, _>("relationship").into(),
		secret: row.get::<String, _>("secret").into(),
		approved: row.get::<i64, _>("approved") != 0,
		peer_approved: row.get::<i64, _>("peer_approved") != 0,
		verified: row.get::<i64, _>("verified") != 0,
		verification_token: row.get::<String, _>("verification_token").into(),
		established_via: EstablishedVia::parse(&via).unwrap_or(EstablishedVia::Actingweb),
		peer_identifier: row.get::<Option<String>, _>("peer_identifier").map(Into::into),
		desc: row.get::<Option<String>, _>("descr").map(Into::into),
		aw_supported: row.get::<Option<String>, _>("aw_supported").map(Into::into),
		aw_version: row.get::<Option<String>, _>("aw_version").map(Into::into),
		capabilities_fetched_at: row
			.get::<Option<i64>, _>("capabilities_fetched_at")
			.map(Timestamp),
		last_connected_at: row.get::<Option<i64>, _>("last_connected_at").map(Timestamp),
		last_connected_via: row.get::<Option<String>, _>("last_connected_via").map(Into::into),
		oauth_client_id: row.get::<Option<String>, _>("oauth_client_id").map(Into::into),
		client_name: row.get::<Option<String>, _>("client_name").map(Into::into),
		client_version: row.get::<Option<String>, _>("client_version").map(Into::into),
		client_platform: row.get::<Option<String>, _>("client_platform").map(Into::into),
		created_at: Timestamp(row.get("created_at")),
	})
}

pub(crate) async fn create(db: &SqlitePool, record: &TrustRecord) -> AwResult<()> {
	map_exec(
		sqlx::query(
			"INSERT INTO trusts
			 (actor_id, peer_id, baseuri, peer_type, relationship, secret,
			  approved, peer_approved, verified, verification_token, established_via,
			  peer_identifier, descr, aw_supported, aw_version, capabilities_fetched_at,
			  last_connected_at, last_connected_via, oauth_client_id,
			  client_name, client_version, client_platform, created_at)
			 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
		)
		.bind(record.actor_id.as_ref())
		.bind(record.peer_id.as_ref())
		.bind(record.baseuri.as_ref())
		.bind(record.peer_type.as_ref())
		.bind(record.relationship.as_ref())
		.bind(record.secret.as_ref())
		.bind(i64::from(record.approved))
		.bind(i64::from(record.peer_approved))
		.bind(i64::from(record.verified))
		.bind(record.verification_token.as_ref())
		.bind(record.established_via.as_str())
		.bind(record.peer_identifier.as_deref())
		.bind(record.desc.as_deref())
		.bind(record.aw_supported.as_deref())
		.bind(record.aw_version.as_deref())
		.bind(record.capabilities_fetched_at.map(|t| t.0))
		.bind(record.last_connected_at.map(|t| t.0))
		.bind(record.last_connected_via.as_deref())
		.bind(record.oauth_client_id.as_deref())
		.bind(record.client_name.as_deref())
		.bind(record.client_version.as_deref())
		.bind(record.client_platform.as_deref())
		.bind(record.created_at.0)
		.execute(db)
		.await,
	)?;
	Ok(())
}

pub(crate) async fn read(db: &SqlitePool, actor_id: &str, peer_id: &str) -> AwResult<TrustRecord> {
	map_res(
		sqlx::query("SELECT * FROM trusts WHERE actor_id = ? AND peer_id = ?")
			.bind(actor_id)
			.bind(peer_id)
			.fetch_one(db)
			.await,
		from_row,
	)
}

pub(crate) async fn read_by_secret(db: &SqlitePool, secret: &str) -> AwResult<TrustRecord> {
	map_res(
		sqlx::query("SELECT * FROM trusts WHERE secret = ?").bind(secret).fetch_one(db).await,
		from_row,
	)
}

pub(crate) async fn read_by_client_id(db: &SqlitePool, client_id: &str) -> AwResult<TrustRecord> {
	map_res(
		sqlx::query("SELECT * FROM trusts WHERE oauth_client_id = ?")
			.bind(client_id)
			.fetch_one(db)
			.await,
		from_row,
	)
}

pub(crate) async fn list(
	db: &SqlitePool,
	actor_id: &str,
	opts: &ListTrustOptions<'_>,
) -> AwResult<Vec<TrustRecord>> {
	let mut query: QueryBuilder<Sqlite> =
		QueryBuilder::new("SELECT * FROM trusts WHERE actor_id = ");
	query.push_bind(actor_id);
	if let Some(relationship) = opts.relationship {
		query.push(" AND relationship = ").push_bind(relationship);
	}
	if let Some(peer_id) = opts.peer_id {
		query.push(" AND peer_id = ").push_bind(peer_id);
	}
	query.push(" ORDER BY peer_id");
	collect_rows(query.build().fetch_all(db).await, from_row)
}

pub(crate) async fn update(
	db: &SqlitePool,
	actor_id: &str,
	peer_id: &str,
	patch: &TrustPatch,
) -> AwResult<()> {
	let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE trusts SET ");
	let mut has_updates = false;
	has_updates = push_patch!(query, has_updates, "baseuri", patch.baseuri, |v| v.as_ref());
	has_updates = push_patch!(query, has_updates, "approved", patch.approved, |v| i64::from(*v));
	has_updates =
		push_patch!(query, has_updates, "peer_approved", patch.peer_approved, |v| i64::from(*v));
	has_updates = push_patch!(query, has_updates, "verified", patch.verified, |v| i64::from(*v));
	has_updates = push_patch!(query, has_updates, "descr", patch.desc, |v| v.as_ref());
	has_updates =
		push_patch!(query, has_updates, "peer_identifier", patch.peer_identifier, |v| v.as_ref());
	has_updates =
		push_patch!(query, has_updates, "aw_supported", patch.aw_supported, |v| v.as_ref());
	has_updates = push_patch!(query, has_updates, "aw_version", patch.aw_version, |v| v.as_ref());
	has_updates = push_patch!(
		query,
		has_updates,
		"capabilities_fetched_at",
		patch.capabilities_fetched_at,
		|v| v.0
	);
	has_updates =
		push_patch!(query, has_updates, "last_connected_at", patch.last_connected_at, |v| v.0);
	has_updates = push_patch!(
		query,
		has_updates,
		"last_connected_via",
		patch.last_connected_via,
		|v| v.as_ref()
	);
	has_updates =
		push_patch!(query, has_updates, "oauth_client_id", patch.oauth_client_id, |v| v.as_ref());
	if !has_updates {
		return Ok(());
	}

	query.push(" WHERE actor_id = ").push_bind(actor_id);
	query.push(" AND peer_id = ").push_bind(peer_id);
	let affected = map_exec(query.build().execute(db).await)?;
	if affected == 0 { Err(Error::NotFound) } else { Ok(()) }
}

pub(crate) async fn delete(db: &SqlitePool, actor_id: &str, peer_id: &str) -> AwResult<()> {
	let affected = map_exec(
		sqlx::query("DELETE FROM trusts WHERE actor_id = ? AND peer_id = ?")
			.bind(actor_id)
			.bind(peer_id)
			.execute(db)
			.await,
	)?;
	if affected == 0 { Err(Error::NotFound) } else { Ok(()) }
}

// vim: ts=4
