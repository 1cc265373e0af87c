//! Subscription rows, diffs with atomic sequence allocation, suspensions,
//! and the conditionally-updated inbound callback state.

use sqlx::{Row, SqlitePool, sqlite::SqliteRow};

use crate::{collect_rows, map_exec, map_res};
use actingweb_types::error::{AwResult, Error};
use actingweb_types::store_adapter::{
	CallbackState, DiffRecord, SubscriptionRecord, SuspensionRow,
};
use actingweb_types::types::{Granularity, Timestamp};

fn from_row(row: SqliteRow) -> Result<SubscriptionRecord, sqlx::Error> {
	let granularity: String = row.get("granularity");
	Ok(SubscriptionRecord {
		actor_id: row.get::<String, _>("actor_id").into(),
		peer_id: row.get::<String, _>("peer_id").into(),
		sub_id: row.get::<String, _>("sub_id").into(),
		target: row.get::<String, _>("target").into(),
		subtarget: row.get::<Option<String>, _>("subtarget").map(Into::into),
		resource: row.get::<Option<String>, _>("resource").map(Into::into),
		granularity: Granularity::parse(&granularity).unwrap_or_default(),
		seqnr: row.get::<i64, _>("seqnr") as u32,
		callback: row.get::<i64, _>("callback") != 0,
		created_at: Timestamp(row.get("created_at")),
	})
}

pub(crate) async fn create(db: &SqlitePool, record: &SubscriptionRecord) -> AwResult<()> {
	map_exec(
		sqlx::query(
			"INSERT INTO subscriptions
			 (actor_id, peer_id, sub_id, target, subtarget, resource, granularity,
			  seqnr, callback, created_at)
			 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
		)
		.bind(record.actor_id.as_ref())
		.bind(record.peer_id.as_ref())
		.bind(record.sub_id.as_ref())
		.bind(record.target.as_ref())
		.bind(record.subtarget.as_deref())
		.bind(record.resource.as_deref())
		.bind(record.granularity.as_str())
		.bind(i64::from(record.seqnr))
		.bind(i64::from(record.callback))
		.bind(record.created_at.0)
		.execute(db)
		.await,
	)?;
	Ok(())
}

pub(crate) async fn read(
	db: &SqlitePool,
	actor_id: &str,
	peer_id: &str,
	sub_id: &str,
) -> AwResult<SubscriptionRecord> {
	map_res(
		sqlx::query("SELECT * FROM subscriptions WHERE actor_id = ? AND peer_id = ? AND sub_id = ?")
			.bind(actor_id)
			.bind(peer_id)
			.bind(sub_id)
			.fetch_one(db)
			.await,
		from_row,
	)
}

pub(crate) async fn list(
	db: &SqlitePool,
	actor_id: &str,
	peer_id: Option<&str>,
) -> AwResult<Vec<SubscriptionRecord>> {
	let rows = match peer_id {
		Some(peer_id) => {
			sqlx::query(
				"SELECT * FROM subscriptions WHERE actor_id = ? AND peer_id = ? ORDER BY sub_id",
			)
			.bind(actor_id)
			.bind(peer_id)
			.fetch_all(db)
			.await
		}
		None => {
			sqlx::query("SELECT * FROM subscriptions WHERE actor_id = ? ORDER BY sub_id")
				.bind(actor_id)
				.fetch_all(db)
				.await
		}
	};
	collect_rows(rows, from_row)
}

pub(crate) async fn delete(
	db: &SqlitePool,
	actor_id: &str,
	peer_id: &str,
	sub_id: &str,
) -> AwResult<()> {
	let affected = map_exec(
		sqlx::query("DELETE FROM subscriptions WHERE actor_id = ? AND peer_id = ? AND sub_id = ?")
			.bind(actor_id)
			.bind(peer_id)
			.bind(sub_id)
			.execute(db)
			.await,
	)?;
	if affected == 0 { Err(Error::NotFound) } else { Ok(()) }
}

// Diffs
//*******

/// Allocate the next seqnr and store the diff in one transaction.
pub(crate) async fn create_diff(
	db: &SqlitePool,
	actor_id: &str,
	peer_id: &str,
	sub_id: &str,
	blob: &str,
) -> AwResult<u32> {
	let mut tx = db.begin().await.map_err(|_| Error::DbError)?;

	let affected = sqlx::query(
		"UPDATE subscriptions SET seqnr = seqnr + 1
		 WHERE actor_id = ? AND peer_id = ? AND sub_id = ?",
	)
	.bind(actor_id)
	.bind(peer_id)
	.bind(sub_id)
	.execute(&mut *tx)
	.await
	.map_err(|_| Error::DbError)?
	.rows_affected();
	if affected == 0 {
		return Err(Error::NotFound);
	}

	let seqnr: i64 = sqlx::query(
		"SELECT seqnr FROM subscriptions WHERE actor_id = ? AND peer_id = ? AND sub_id = ?",
	)
	.bind(actor_id)
	.bind(peer_id)
	.bind(sub_id)
	.fetch_one(&mut *tx)
	.await
	.map_err(|_| Error::DbError)?
	.get("seqnr");

	sqlx::query(
		"INSERT INTO diffs (actor_id, sub_id, seqnr, timestamp, blob) VALUES (?, ?, ?, ?, ?)",
	)
	.bind(actor_id)
	.bind(sub_id)
	.bind(seqnr)
	.bind(Timestamp::now().0)
	.bind(blob)
	.execute(&mut *tx)
	.await
	.map_err(|_| Error::DbError)?;

	tx.commit().await.map_err(|_| Error::DbError)?;
	Ok(seqnr as u32)
}

fn diff_from_row(row: SqliteRow) -> Result<DiffRecord, sqlx::Error> {
	Ok(DiffRecord {
		sub_id: row.get::<String, _>("sub_id").into(),
		seqnr: row.get::<i64, _>("seqnr") as u32,
		timestamp: Timestamp(row.get("timestamp")),
		blob: row.get::<String, _>("blob").into(),
	})
}

pub(crate) async fn list_diffs(
	db: &SqlitePool,
	actor_id: &str,
	sub_id: &str,
) -> AwResult<Vec<DiffRecord>> {
	collect_rows(
		sqlx::query("SELECT * FROM diffs WHERE actor_id = ? AND sub_id = ? ORDER BY seqnr")
			.bind(actor_id)
			.bind(sub_id)
			.fetch_all(db)
			.await,
		diff_from_row,
	)
}

pub(crate) async fn read_diff(
	db: &SqlitePool,
	actor_id: &str,
	sub_id: &str,
	seqnr: u32,
) -> AwResult<DiffRecord> {
	map_res(
		sqlx::query("SELECT * FROM diffs WHERE actor_id = ? AND sub_id = ? AND seqnr = ?")
			.bind(actor_id)
			.bind(sub_id)
			.bind(i64::from(seqnr))
			.fetch_one(db)
			.await,
		diff_from_row,
	)
}

pub(crate) async fn clear_diff(
	db: &SqlitePool,
	actor_id: &str,
	sub_id: &str,
	seqnr: u32,
) -> AwResult<()> {
	map_exec(
		sqlx::query("DELETE FROM diffs WHERE actor_id = ? AND sub_id = ? AND seqnr = ?")
			.bind(actor_id)
			.bind(sub_id)
			.bind(i64::from(seqnr))
			.execute(db)
			.await,
	)?;
	Ok(())
}

pub(crate) async fn clear_diffs(db: &SqlitePool, actor_id: &str, sub_id: &str) -> AwResult<()> {
	map_exec(
		sqlx::query("DELETE FROM diffs WHERE actor_id = ? AND sub_id = ?")
			.bind(actor_id)
			.bind(sub_id)
			.execute(db)
			.await,
	)?;
	Ok(())
}

// Suspensions
//*************

pub(crate) async fn create_suspension(
	db: &SqlitePool,
	actor_id: &str,
	target: &str,
	subtarget: Option<&str>,
) -> AwResult<()> {
	map_exec(
		sqlx::query(
			"INSERT OR REPLACE INTO suspensions (actor_id, target, subtarget) VALUES (?, ?, ?)",
		)
		.bind(actor_id)
		.bind(target)
		.bind(subtarget.unwrap_or(""))
		.execute(db)
		.await,
	)?;
	Ok(())
}

pub(crate) async fn delete_suspension(
	db: &SqlitePool,
	actor_id: &str,
	target: &str,
	subtarget: Option<&str>,
) -> AwResult<()> {
	map_exec(
		sqlx::query("DELETE FROM suspensions WHERE actor_id = ? AND target = ? AND subtarget = ?")
			.bind(actor_id)
			.bind(target)
			.bind(subtarget.unwrap_or(""))
			.execute(db)
			.await,
	)?;
	Ok(())
}

pub(crate) async fn read_suspension(
	db: &SqlitePool,
	actor_id: &str,
	target: &str,
	subtarget: Option<&str>,
) -> AwResult<bool> {
	// A whole-target suspension (subtarget = '') also covers every subtarget.
	let row = sqlx::query(
		"SELECT COUNT(*) AS n FROM suspensions
		 WHERE actor_id = ? AND target = ? AND (subtarget = '' OR subtarget = ?)",
	)
	.bind(actor_id)
	.bind(target)
	.bind(subtarget.unwrap_or(""))
	.fetch_one(db)
	.await;
	map_res(row, |row| Ok(row.get::<i64, _>("n") > 0))
}

pub(crate) async fn list_suspensions(
	db: &SqlitePool,
	actor_id: &str,
) -> AwResult<Vec<SuspensionRow>> {
	collect_rows(
		sqlx::query("SELECT * FROM suspensions WHERE actor_id = ? ORDER BY target, subtarget")
			.bind(actor_id)
			.fetch_all(db)
			.await,
		|row| {
			let subtarget: String = row.get("subtarget");
			Ok(SuspensionRow {
				target: row.get::<String, _>("target").into(),
				subtarget: if subtarget.is_empty() { None } else { Some(subtarget.into()) },
			})
		},
	)
}

// Callback state
//****************

pub(crate) async fn read_callback_state(
	db: &SqlitePool,
	actor_id: &str,
	peer_id: &str,
	sub_id: &str,
) -> AwResult<Option<CallbackState>> {
	let row = sqlx::query(
		"SELECT * FROM callback_states WHERE actor_id = ? AND peer_id = ? AND sub_id = ?",
	)
	.bind(actor_id)
	.bind(peer_id)
	.bind(sub_id)
	.fetch_optional(db)
	.await
	.map_err(|_| Error::DbError)?;

	Ok(row.map(|row| CallbackState {
		last_processed_seq: row.get::<i64, _>("last_seq") as u32,
		pending: row.get::<String, _>("pending").into(),
		version: row.get::<i64, _>("version") as u32,
	}))
}

/// Conditional write keyed on the version column.
pub(crate) async fn write_callback_state(
	db: &SqlitePool,
	actor_id: &str,
	peer_id: &str,
	sub_id: &str,
	state: &CallbackState,
	expected_version: Option<u32>,
) -> AwResult<()> {
	let affected = match expected_version {
		None => map_exec(
			sqlx::query(
				"INSERT INTO callback_states (actor_id, peer_id, sub_id, last_seq, pending, version)
				 VALUES (?, ?, ?, ?, ?, ?)
				 ON CONFLICT (actor_id, peer_id, sub_id) DO NOTHING",
			)
			.bind(actor_id)
			.bind(peer_id)
			.bind(sub_id)
			.bind(i64::from(state.last_processed_seq))
			.bind(state.pending.as_ref())
			.bind(i64::from(state.version))
			.execute(db)
			.await,
		)?,
		Some(version) => map_exec(
			sqlx::query(
				"UPDATE callback_states SET last_seq = ?, pending = ?, version = ?
				 WHERE actor_id = ? AND peer_id = ? AND sub_id = ? AND version = ?",
			)
			.bind(i64::from(state.last_processed_seq))
			.bind(state.pending.as_ref())
			.bind(i64::from(state.version))
			.bind(actor_id)
			.bind(peer_id)
			.bind(sub_id)
			.bind(i64::from(version))
			.execute(db)
			.await,
		)?,
	};
	if affected == 0 {
		return Err(Error::Conflict("callback state version mismatch".into()));
	}
	Ok(())
}

pub(crate) async fn delete_callback_state(
	db: &SqlitePool,
	actor_id: &str,
	peer_id: &str,
	sub_id: &str,
) -> AwResult<()> {
	map_exec(
		sqlx::query("DELETE FROM callback_states WHERE actor_id = ? AND peer_id = ? AND sub_id = ?")
			.bind(actor_id)
			.bind(peer_id)
			.bind(sub_id)
			.execute(db)
			.await,
	)?;
	Ok(())
}

// vim: ts=4
