//! Attribute bucket rows with TTL expiry.

use sqlx::{Row, SqlitePool, sqlite::SqliteRow};

use crate::{collect_rows, map_exec, map_res};
use actingweb_types::error::{AwResult, Error};
use actingweb_types::store_adapter::AttributeRow;
use actingweb_types::types::Timestamp;

fn from_row(row: SqliteRow) -> Result<AttributeRow, sqlx::Error> {
	let raw: String = row.get("value");
	Ok(AttributeRow {
		bucket: row.get::<String, _>("bucket").into(),
		name: row.get::<String, _>("name").into(),
		value: serde_json::from_str(&raw).unwrap_or(serde_json::Value::Null),
		ttl_epoch: row.get::<Option<i64>, _>("ttl_epoch").map(Timestamp),
	})
}

pub(crate) async fn read(
	db: &SqlitePool,
	actor_id: &str,
	bucket: &str,
	name: &str,
) -> AwResult<AttributeRow> {
	let row = map_res(
		sqlx::query("SELECT * FROM attributes WHERE actor_id = ? AND bucket = ? AND name = ?")
			.bind(actor_id)
			.bind(bucket)
			.bind(name)
			.fetch_one(db)
			.await,
		from_row,
	)?;
	// Expired rows are invisible; the purge sweep removes them later.
	if row.ttl_epoch.is_some_and(|ttl| ttl < Timestamp::now()) {
		return Err(Error::NotFound);
	}
	Ok(row)
}

pub(crate) async fn write(
	db: &SqlitePool,
	actor_id: &str,
	bucket: &str,
	name: &str,
	value: &serde_json::Value,
	ttl_epoch: Option<Timestamp>,
) -> AwResult<()> {
	map_exec(
		sqlx::query(
			"INSERT OR REPLACE INTO attributes (actor_id, bucket, name, value, ttl_epoch)
			 VALUES (?, ?, ?, ?, ?)",
		)
		.bind(actor_id)
		.bind(bucket)
		.bind(name)
		.bind(value.to_string())
		.bind(ttl_epoch.map(|t| t.0))
		.execute(db)
		.await,
	)?;
	Ok(())
}

pub(crate) async fn delete(
	db: &SqlitePool,
	actor_id: &str,
	bucket: &str,
	name: &str,
) -> AwResult<()> {
	let affected = map_exec(
		sqlx::query("DELETE FROM attributes WHERE actor_id = ? AND bucket = ? AND name = ?")
			.bind(actor_id)
			.bind(bucket)
			.bind(name)
			.execute(db)
			.await,
	)?;
	if affected == 0 { Err(Error::NotFound) } else { Ok(()) }
}

pub(crate) async fn read_bucket(
	db: &SqlitePool,
	actor_id: &str,
	bucket: &str,
) -> AwResult<Vec<AttributeRow>> {
	let now = Timestamp::now().0;
	collect_rows(
		sqlx::query(
			"SELECT * FROM attributes WHERE actor_id = ? AND bucket = ?
			 AND (ttl_epoch IS NULL OR ttl_epoch >= ?) ORDER BY name",
		)
		.bind(actor_id)
		.bind(bucket)
		.bind(now)
		.fetch_all(db)
		.await,
		from_row,
	)
}

pub(crate) async fn delete_bucket(db: &SqlitePool, actor_id: &str, bucket: &str) -> AwResult<()> {
	map_exec(
		sqlx::query("DELETE FROM attributes WHERE actor_id = ? AND bucket = ?")
			.bind(actor_id)
			.bind(bucket)
			.execute(db)
			.await,
	)?;
	Ok(())
}

pub(crate) async fn purge_expired(db: &SqlitePool) -> AwResult<u32> {
	let affected = map_exec(
		sqlx::query("DELETE FROM attributes WHERE ttl_epoch IS NOT NULL AND ttl_epoch < ?")
			.bind(Timestamp::now().0)
			.execute(db)
			.await,
	)?;
	Ok(affected as u32)
}

// vim: ts=4
