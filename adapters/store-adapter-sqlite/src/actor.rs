//! Actor row management, including the delete cascade.

use sqlx::{Row, SqlitePool, sqlite::SqliteRow};

use crate::{collect_rows, map_exec, map_res};
use actingweb_types::error::{AwResult, Error};
use actingweb_types::store_adapter::ActorRecord;
use actingweb_types::types::Timestamp;

fn from_row(row: SqliteRow) -> Result<ActorRecord, sqlx::Error> {
	Ok(ActorRecord {
		actor_id: row.get::<String, _>("actor_id").into(),
		creator: row.get::<String, _>("creator").into(),
		passphrase_hash: row.get::<String, _>("passphrase_hash").into(),
		created_at: Timestamp(row.get("created_at")),
	})
}

pub(crate) async fn create(db: &SqlitePool, record: &ActorRecord) -> AwResult<()> {
	map_exec(
		sqlx::query(
			"INSERT INTO actors (actor_id, creator, passphrase_hash, created_at)
			 VALUES (?, ?, ?, ?)",
		)
		.bind(record.actor_id.as_ref())
		.bind(record.creator.as_ref())
		.bind(record.passphrase_hash.as_ref())
		.bind(record.created_at.0)
		.execute(db)
		.await,
	)?;
	Ok(())
}

pub(crate) async fn read(db: &SqlitePool, actor_id: &str) -> AwResult<ActorRecord> {
	map_res(
		sqlx::query("SELECT * FROM actors WHERE actor_id = ?")
			.bind(actor_id)
			.fetch_one(db)
			.await,
		from_row,
	)
}

pub(crate) async fn read_by_creator(db: &SqlitePool, creator: &str) -> AwResult<Vec<ActorRecord>> {
	collect_rows(
		sqlx::query("SELECT * FROM actors WHERE creator = ? ORDER BY actor_id")
			.bind(creator)
			.fetch_all(db)
			.await,
		from_row,
	)
}

pub(crate) async fn update_creator(db: &SqlitePool, actor_id: &str, creator: &str) -> AwResult<()> {
	let affected = map_exec(
		sqlx::query("UPDATE actors SET creator = ? WHERE actor_id = ?")
			.bind(creator)
			.bind(actor_id)
			.execute(db)
			.await,
	)?;
	if affected == 0 { Err(Error::NotFound) } else { Ok(()) }
}

/// Deleting an actor removes every row keyed by its id.
pub(crate) async fn delete(db: &SqlitePool, actor_id: &str) -> AwResult<()> {
	let affected = map_exec(
		sqlx::query("DELETE FROM actors WHERE actor_id = ?").bind(actor_id).execute(db).await,
	)?;
	if affected == 0 {
		return Err(Error::NotFound);
	}

	for table in [
		"properties",
		"list_meta",
		"list_items",
		"attributes",
		"trusts",
		"subscriptions",
		"diffs",
		"suspensions",
		"callback_states",
	] {
		map_exec(
			sqlx::query(&format!("DELETE FROM {} WHERE actor_id = ?", table))
				.bind(actor_id)
				.execute(db)
				.await,
		)?;
	}
	map_exec(
		sqlx::query("DELETE FROM property_index WHERE actor_id = ?")
			.bind(actor_id)
			.execute(db)
			.await,
	)?;
	Ok(())
}

pub(crate) async fn list(db: &SqlitePool, limit: u32) -> AwResult<Vec<ActorRecord>> {
	collect_rows(
		sqlx::query("SELECT * FROM actors ORDER BY actor_id LIMIT ?")
			.bind(limit)
			.fetch_all(db)
			.await,
		from_row,
	)
}

// vim: ts=4
