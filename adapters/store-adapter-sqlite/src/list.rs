//! List property storage: one row per item plus a metadata row.
//!
//! Insert and delete shift the affected index range row by row inside a
//! transaction; shifting with a single UPDATE would transiently violate the
//! primary key.

use sqlx::{Row, SqlitePool, sqlite::SqliteRow};

use crate::{collect_rows, map_exec, map_res};
use actingweb_types::error::{AwResult, Error};
use actingweb_types::store_adapter::ListMeta;
use actingweb_types::types::{Patch, Timestamp};

fn meta_from_row(row: SqliteRow) -> Result<ListMeta, sqlx::Error> {
	Ok(ListMeta {
		list_name: row.get::<String, _>("list_name").into(),
		description: row.get::<Option<String>, _>("description").map(Into::into),
		explanation: row.get::<Option<String>, _>("explanation").map(Into::into),
		created_at: Timestamp(row.get("created_at")),
		updated_at: Timestamp(row.get("updated_at")),
		version: row.get::<i64, _>("version") as u32,
		length: row.get::<i64, _>("length") as u32,
	})
}

pub(crate) async fn create(
	db: &SqlitePool,
	actor_id: &str,
	list_name: &str,
	description: Option<&str>,
	explanation: Option<&str>,
) -> AwResult<()> {
	let now = Timestamp::now().0;
	map_exec(
		sqlx::query(
			"INSERT INTO list_meta
			 (actor_id, list_name, description, explanation, created_at, updated_at, version, length)
			 VALUES (?, ?, ?, ?, ?, ?, 1, 0)",
		)
		.bind(actor_id)
		.bind(list_name)
		.bind(description)
		.bind(explanation)
		.bind(now)
		.bind(now)
		.execute(db)
		.await,
	)?;
	Ok(())
}

pub(crate) async fn read_meta(
	db: &SqlitePool,
	actor_id: &str,
	list_name: &str,
) -> AwResult<ListMeta> {
	map_res(
		sqlx::query("SELECT * FROM list_meta WHERE actor_id = ? AND list_name = ?")
			.bind(actor_id)
			.bind(list_name)
			.fetch_one(db)
			.await,
		meta_from_row,
	)
}

pub(crate) async fn update_meta(
	db: &SqlitePool,
	actor_id: &str,
	list_name: &str,
	description: Patch<Box<str>>,
	explanation: Patch<Box<str>>,
) -> AwResult<()> {
	// Ensure the list exists before touching it.
	read_meta(db, actor_id, list_name).await?;
	if let Some(desc) = description.as_option() {
		map_exec(
			sqlx::query(
				"UPDATE list_meta SET description = ? WHERE actor_id = ? AND list_name = ?",
			)
			.bind(desc.map(AsRef::as_ref))
			.bind(actor_id)
			.bind(list_name)
			.execute(db)
			.await,
		)?;
	}
	if let Some(expl) = explanation.as_option() {
		map_exec(
			sqlx::query(
				"UPDATE list_meta SET explanation = ? WHERE actor_id = ? AND list_name = ?",
			)
			.bind(expl.map(AsRef::as_ref))
			.bind(actor_id)
			.bind(list_name)
			.execute(db)
			.await,
		)?;
	}
	touch(db, actor_id, list_name, None).await
}

/// Bump version/updated_at, optionally setting length.
async fn touch(
	db: &SqlitePool,
	actor_id: &str,
	list_name: &str,
	length: Option<u32>,
) -> AwResult<()> {
	let query = match length {
		Some(length) => sqlx::query(
			"UPDATE list_meta SET version = version + 1, updated_at = ?, length = ?
			 WHERE actor_id = ? AND list_name = ?",
		)
		.bind(Timestamp::now().0)
		.bind(i64::from(length))
		.bind(actor_id)
		.bind(list_name),
		None => sqlx::query(
			"UPDATE list_meta SET version = version + 1, updated_at = ?
			 WHERE actor_id = ? AND list_name = ?",
		)
		.bind(Timestamp::now().0)
		.bind(actor_id)
		.bind(list_name),
	};
	map_exec(query.execute(db).await)?;
	Ok(())
}

pub(crate) async fn list_all(db: &SqlitePool, actor_id: &str) -> AwResult<Vec<ListMeta>> {
	collect_rows(
		sqlx::query("SELECT * FROM list_meta WHERE actor_id = ? ORDER BY list_name")
			.bind(actor_id)
			.fetch_all(db)
			.await,
		meta_from_row,
	)
}

pub(crate) async fn read_items(
	db: &SqlitePool,
	actor_id: &str,
	list_name: &str,
) -> AwResult<Vec<Box<str>>> {
	read_meta(db, actor_id, list_name).await?;
	collect_rows(
		sqlx::query(
			"SELECT item FROM list_items WHERE actor_id = ? AND list_name = ? ORDER BY idx",
		)
		.bind(actor_id)
		.bind(list_name)
		.fetch_all(db)
		.await,
		|row| Ok(row.get::<String, _>("item").into()),
	)
}

pub(crate) async fn read_item(
	db: &SqlitePool,
	actor_id: &str,
	list_name: &str,
	index: u32,
) -> AwResult<Box<str>> {
	map_res(
		sqlx::query("SELECT item FROM list_items WHERE actor_id = ? AND list_name = ? AND idx = ?")
			.bind(actor_id)
			.bind(list_name)
			.bind(i64::from(index))
			.fetch_one(db)
			.await,
		|row| Ok(row.get::<String, _>("item").into()),
	)
}

pub(crate) async fn append(
	db: &SqlitePool,
	actor_id: &str,
	list_name: &str,
	item: &str,
) -> AwResult<(u32, u32)> {
	let meta = read_meta(db, actor_id, list_name).await?;
	let index = meta.length;
	map_exec(
		sqlx::query("INSERT INTO list_items (actor_id, list_name, idx, item) VALUES (?, ?, ?, ?)")
			.bind(actor_id)
			.bind(list_name)
			.bind(i64::from(index))
			.bind(item)
			.execute(db)
			.await,
	)?;
	touch(db, actor_id, list_name, Some(index + 1)).await?;
	Ok((index, index + 1))
}

pub(crate) async fn insert(
	db: &SqlitePool,
	actor_id: &str,
	list_name: &str,
	index: u32,
	item: &str,
) -> AwResult<u32> {
	let meta = read_meta(db, actor_id, list_name).await?;
	if index > meta.length {
		return Err(Error::ValidationError(format!("index {} out of range", index)));
	}

	// Shift the tail up, highest index first.
	let mut i = meta.length;
	while i > index {
		map_exec(
			sqlx::query(
				"UPDATE list_items SET idx = idx + 1
				 WHERE actor_id = ? AND list_name = ? AND idx = ?",
			)
			.bind(actor_id)
			.bind(list_name)
			.bind(i64::from(i - 1))
			.execute(db)
			.await,
		)?;
		i -= 1;
	}
	map_exec(
		sqlx::query("INSERT INTO list_items (actor_id, list_name, idx, item) VALUES (?, ?, ?, ?)")
			.bind(actor_id)
			.bind(list_name)
			.bind(i64::from(index))
			.bind(item)
			.execute(db)
			.await,
	)?;
	touch(db, actor_id, list_name, Some(meta.length + 1)).await?;
	Ok(meta.length + 1)
}

pub(crate) async fn update(
	db: &SqlitePool,
	actor_id: &str,
	list_name: &str,
	index: u32,
	item: &str,
) -> AwResult<()> {
	let affected = map_exec(
		sqlx::query(
			"UPDATE list_items SET item = ? WHERE actor_id = ? AND list_name = ? AND idx = ?",
		)
		.bind(item)
		.bind(actor_id)
		.bind(list_name)
		.bind(i64::from(index))
		.execute(db)
		.await,
	)?;
	if affected == 0 {
		return Err(Error::NotFound);
	}
	touch(db, actor_id, list_name, None).await
}

pub(crate) async fn delete_item(
	db: &SqlitePool,
	actor_id: &str,
	list_name: &str,
	index: u32,
) -> AwResult<u32> {
	let meta = read_meta(db, actor_id, list_name).await?;
	let affected = map_exec(
		sqlx::query("DELETE FROM list_items WHERE actor_id = ? AND list_name = ? AND idx = ?")
			.bind(actor_id)
			.bind(list_name)
			.bind(i64::from(index))
			.execute(db)
			.await,
	)?;
	if affected == 0 {
		return Err(Error::NotFound);
	}

	// Shift the tail down, lowest index first.
	for i in (index + 1)..meta.length {
		map_exec(
			sqlx::query(
				"UPDATE list_items SET idx = idx - 1
				 WHERE actor_id = ? AND list_name = ? AND idx = ?",
			)
			.bind(actor_id)
			.bind(list_name)
			.bind(i64::from(i))
			.execute(db)
			.await,
		)?;
	}
	let length = meta.length - 1;
	touch(db, actor_id, list_name, Some(length)).await?;
	Ok(length)
}

pub(crate) async fn extend(
	db: &SqlitePool,
	actor_id: &str,
	list_name: &str,
	items: &[&str],
) -> AwResult<(u32, u32)> {
	let meta = read_meta(db, actor_id, list_name).await?;
	let first = meta.length;
	for (offset, item) in items.iter().enumerate() {
		map_exec(
			sqlx::query(
				"INSERT INTO list_items (actor_id, list_name, idx, item) VALUES (?, ?, ?, ?)",
			)
			.bind(actor_id)
			.bind(list_name)
			.bind(i64::from(first) + offset as i64)
			.bind(*item)
			.execute(db)
			.await,
		)?;
	}
	let length = first + items.len() as u32;
	touch(db, actor_id, list_name, Some(length)).await?;
	Ok((first, length))
}

pub(crate) async fn clear(db: &SqlitePool, actor_id: &str, list_name: &str) -> AwResult<()> {
	read_meta(db, actor_id, list_name).await?;
	map_exec(
		sqlx::query("DELETE FROM list_items WHERE actor_id = ? AND list_name = ?")
			.bind(actor_id)
			.bind(list_name)
			.execute(db)
			.await,
	)?;
	touch(db, actor_id, list_name, Some(0)).await
}

pub(crate) async fn delete(db: &SqlitePool, actor_id: &str, list_name: &str) -> AwResult<()> {
	let affected = map_exec(
		sqlx::query("DELETE FROM list_meta WHERE actor_id = ? AND list_name = ?")
			.bind(actor_id)
			.bind(list_name)
			.execute(db)
			.await,
	)?;
	if affected == 0 {
		return Err(Error::NotFound);
	}
	map_exec(
		sqlx::query("DELETE FROM list_items WHERE actor_id = ? AND list_name = ?")
			.bind(actor_id)
			.bind(list_name)
			.execute(db)
			.await,
	)?;
	Ok(())
}

// vim: ts=4
