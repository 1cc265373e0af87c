//! Scalar property rows and the global reverse-lookup table.

use sqlx::{Row, SqlitePool};

use crate::{collect_rows, map_exec, map_res};
use actingweb_types::error::{AwResult, Error};
use actingweb_types::store_adapter::PropertyItem;

pub(crate) async fn read(db: &SqlitePool, actor_id: &str, name: &str) -> AwResult<Box<str>> {
	map_res(
		sqlx::query("SELECT value FROM properties WHERE actor_id = ? AND name = ?")
			.bind(actor_id)
			.bind(name)
			.fetch_one(db)
			.await,
		|row| Ok(row.get::<String, _>("value").into()),
	)
}

pub(crate) async fn write(
	db: &SqlitePool,
	actor_id: &str,
	name: &str,
	value: &str,
) -> AwResult<()> {
	map_exec(
		sqlx::query("INSERT OR REPLACE INTO properties (actor_id, name, value) VALUES (?, ?, ?)")
			.bind(actor_id)
			.bind(name)
			.bind(value)
			.execute(db)
			.await,
	)?;
	Ok(())
}

pub(crate) async fn delete(db: &SqlitePool, actor_id: &str, name: &str) -> AwResult<()> {
	let affected = map_exec(
		sqlx::query("DELETE FROM properties WHERE actor_id = ? AND name = ?")
			.bind(actor_id)
			.bind(name)
			.execute(db)
			.await,
	)?;
	if affected == 0 { Err(Error::NotFound) } else { Ok(()) }
}

pub(crate) async fn list(db: &SqlitePool, actor_id: &str) -> AwResult<Vec<PropertyItem>> {
	collect_rows(
		sqlx::query("SELECT name, value FROM properties WHERE actor_id = ? ORDER BY name")
			.bind(actor_id)
			.fetch_all(db)
			.await,
		|row| {
			Ok(PropertyItem {
				name: row.get::<String, _>("name").into(),
				value: row.get::<String, _>("value").into(),
			})
		},
	)
}

pub(crate) async fn delete_all(db: &SqlitePool, actor_id: &str) -> AwResult<()> {
	map_exec(
		sqlx::query("DELETE FROM properties WHERE actor_id = ?").bind(actor_id).execute(db).await,
	)?;
	map_exec(
		sqlx::query("DELETE FROM property_index WHERE actor_id = ?")
			.bind(actor_id)
			.execute(db)
			.await,
	)?;
	Ok(())
}

// Reverse lookup
//****************

pub(crate) async fn index_write(
	db: &SqlitePool,
	name: &str,
	value: &str,
	actor_id: &str,
) -> AwResult<()> {
	map_exec(
		sqlx::query(
			"INSERT OR REPLACE INTO property_index (name, value, actor_id) VALUES (?, ?, ?)",
		)
		.bind(name)
		.bind(value)
		.bind(actor_id)
		.execute(db)
		.await,
	)?;
	Ok(())
}

pub(crate) async fn index_delete(db: &SqlitePool, name: &str, value: &str) -> AwResult<()> {
	map_exec(
		sqlx::query("DELETE FROM property_index WHERE name = ? AND value = ?")
			.bind(name)
			.bind(value)
			.execute(db)
			.await,
	)?;
	Ok(())
}

pub(crate) async fn index_read(db: &SqlitePool, name: &str, value: &str) -> AwResult<Box<str>> {
	map_res(
		sqlx::query("SELECT actor_id FROM property_index WHERE name = ? AND value = ?")
			.bind(name)
			.bind(value)
			.fetch_one(db)
			.await,
		|row| Ok(row.get::<String, _>("actor_id").into()),
	)
}

// vim: ts=4
