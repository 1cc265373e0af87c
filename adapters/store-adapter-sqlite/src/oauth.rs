//! OAuth2 server rows: client registrations, single-use codes, and the two
//! token tables with their reverse indexes.

use sqlx::{Row, SqlitePool, sqlite::SqliteRow};

use crate::{map_exec, map_res};
use actingweb_types::auth_adapter::{
	AccessTokenRecord, AuthCodeRecord, ClientRecord, RefreshTokenRecord,
};
use actingweb_types::error::{AwResult, Error};
use actingweb_types::types::Timestamp;

// Clients
//*********

fn client_from_row(row: SqliteRow) -> Result<ClientRecord, sqlx::Error> {
	let uris: String = row.get("redirect_uris");
	Ok(ClientRecord {
		client_id: row.get::<String, _>("client_id").into(),
		client_secret: row.get::<String, _>("client_secret").into(),
		client_name: row.get::<String, _>("client_name").into(),
		client_version: row.get::<Option<String>, _>("client_version").map(Into::into),
		client_platform: row.get::<Option<String>, _>("client_platform").map(Into::into),
		redirect_uris: serde_json::from_str(&uris).unwrap_or_default(),
		trust_type: row.get::<String, _>("trust_type").into(),
		created_at: Timestamp(row.get("created_at")),
	})
}

pub(crate) async fn create_client(db: &SqlitePool, record: &ClientRecord) -> AwResult<()> {
	let uris = serde_json::to_string(&record.redirect_uris).map_err(|_| Error::Parse)?;
	map_exec(
		sqlx::query(
			"INSERT INTO oauth_clients
			 (client_id, client_secret, client_name, client_version, client_platform,
			  redirect_uris, trust_type, created_at)
			 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
		)
		.bind(record.client_id.as_ref())
		.bind(record.client_secret.as_ref())
		.bind(record.client_name.as_ref())
		.bind(record.client_version.as_deref())
		.bind(record.client_platform.as_deref())
		.bind(uris)
		.bind(record.trust_type.as_ref())
		.bind(record.created_at.0)
		.execute(db)
		.await,
	)?;
	Ok(())
}

pub(crate) async fn read_client(db: &SqlitePool, client_id: &str) -> AwResult<ClientRecord> {
	map_res(
		sqlx::query("SELECT * FROM oauth_clients WHERE client_id = ?")
			.bind(client_id)
			.fetch_one(db)
			.await,
		client_from_row,
	)
}

pub(crate) async fn delete_client(db: &SqlitePool, client_id: &str) -> AwResult<()> {
	let affected = map_exec(
		sqlx::query("DELETE FROM oauth_clients WHERE client_id = ?")
			.bind(client_id)
			.execute(db)
			.await,
	)?;
	if affected == 0 { Err(Error::NotFound) } else { Ok(()) }
}

// Authorization codes
//*********************

pub(crate) async fn create_code(db: &SqlitePool, record: &AuthCodeRecord) -> AwResult<()> {
	map_exec(
		sqlx::query(
			"INSERT INTO oauth_codes
			 (code, client_id, actor_id, peer_id, redirect_uri, code_challenge, scope, expires_at)
			 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
		)
		.bind(record.code.as_ref())
		.bind(record.client_id.as_ref())
		.bind(record.actor_id.as_ref())
		.bind(record.peer_id.as_ref())
		.bind(record.redirect_uri.as_ref())
		.bind(record.code_challenge.as_deref())
		.bind(record.scope.as_deref())
		.bind(record.expires_at.0)
		.execute(db)
		.await,
	)?;
	Ok(())
}

/// Single use: read and delete in one transaction.
pub(crate) async fn consume_code(db: &SqlitePool, code: &str) -> AwResult<AuthCodeRecord> {
	let mut tx = db.begin().await.map_err(|_| Error::DbError)?;

	let row = sqlx::query("SELECT * FROM oauth_codes WHERE code = ?")
		.bind(code)
		.fetch_one(&mut *tx)
		.await;
	let record = map_res(row, |row| {
		Ok(AuthCodeRecord {
			code: row.get::<String, _>("code").into(),
			client_id: row.get::<String, _>("client_id").into(),
			actor_id: row.get::<String, _>("actor_id").into(),
			peer_id: row.get::<String, _>("peer_id").into(),
			redirect_uri: row.get::<String, _>("redirect_uri").into(),
			code_challenge: row.get::<Option<String>, _>("code_challenge").map(Into::into),
			scope: row.get::<Option<String>, _>("scope").map(Into::into),
			expires_at: Timestamp(row.get("expires_at")),
		})
	})?;

	sqlx::query("DELETE FROM oauth_codes WHERE code = ?")
		.bind(code)
		.execute(&mut *tx)
		.await
		.map_err(|_| Error::DbError)?;
	tx.commit().await.map_err(|_| Error::DbError)?;

	if record.expires_at < Timestamp::now() {
		return Err(Error::NotFound);
	}
	Ok(record)
}

// Access tokens
//***************

pub(crate) async fn create_access(db: &SqlitePool, record: &AccessTokenRecord) -> AwResult<()> {
	map_exec(
		sqlx::query(
			"INSERT INTO oauth_access_tokens
			 (token, client_id, actor_id, peer_id, scope, created_at, expires_at)
			 VALUES (?, ?, ?, ?, ?, ?, ?)",
		)
		.bind(record.token.as_ref())
		.bind(record.client_id.as_ref())
		.bind(record.actor_id.as_ref())
		.bind(record.peer_id.as_ref())
		.bind(record.scope.as_deref())
		.bind(record.created_at.0)
		.bind(record.expires_at.0)
		.execute(db)
		.await,
	)?;
	Ok(())
}

pub(crate) async fn read_access(db: &SqlitePool, token: &str) -> AwResult<AccessTokenRecord> {
	let record = map_res(
		sqlx::query("SELECT * FROM oauth_access_tokens WHERE token = ?")
			.bind(token)
			.fetch_one(db)
			.await,
		|row| {
			Ok(AccessTokenRecord {
				token: row.get::<String, _>("token").into(),
				client_id: row.get::<String, _>("client_id").into(),
				actor_id: row.get::<String, _>("actor_id").into(),
				peer_id: row.get::<String, _>("peer_id").into(),
				scope: row.get::<Option<String>, _>("scope").map(Into::into),
				created_at: Timestamp(row.get("created_at")),
				expires_at: Timestamp(row.get("expires_at")),
			})
		},
	)?;
	if record.expires_at < Timestamp::now() {
		return Err(Error::NotFound);
	}
	Ok(record)
}

pub(crate) async fn delete_access(db: &SqlitePool, token: &str) -> AwResult<()> {
	let affected = map_exec(
		sqlx::query("DELETE FROM oauth_access_tokens WHERE token = ?")
			.bind(token)
			.execute(db)
			.await,
	)?;
	if affected == 0 { Err(Error::NotFound) } else { Ok(()) }
}

// Refresh tokens
//****************

fn refresh_from_row(row: SqliteRow) -> Result<RefreshTokenRecord, sqlx::Error> {
	Ok(RefreshTokenRecord {
		token: row.get::<String, _>("token").into(),
		client_id: row.get::<String, _>("client_id").into(),
		actor_id: row.get::<String, _>("actor_id").into(),
		peer_id: row.get::<String, _>("peer_id").into(),
		scope: row.get::<Option<String>, _>("scope").map(Into::into),
		created_at: Timestamp(row.get("created_at")),
		expires_at: Timestamp(row.get("expires_at")),
		used: row.get::<i64, _>("used") != 0,
		rotated_at: row.get::<Option<i64>, _>("rotated_at").map(Timestamp),
		replaced_by_access: row.get::<Option<String>, _>("replaced_by_access").map(Into::into),
		replaced_by_refresh: row.get::<Option<String>, _>("replaced_by_refresh").map(Into::into),
	})
}

pub(crate) async fn create_refresh(db: &SqlitePool, record: &RefreshTokenRecord) -> AwResult<()> {
	map_exec(
		sqlx::query(
			"INSERT INTO oauth_refresh_tokens
			 (token, client_id, actor_id, peer_id, scope, created_at, expires_at,
			  used, rotated_at, replaced_by_access, replaced_by_refresh)
			 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
		)
		.bind(record.token.as_ref())
		.bind(record.client_id.as_ref())
		.bind(record.actor_id.as_ref())
		.bind(record.peer_id.as_ref())
		.bind(record.scope.as_deref())
		.bind(record.created_at.0)
		.bind(record.expires_at.0)
		.bind(i64::from(record.used))
		.bind(record.rotated_at.map(|t| t.0))
		.bind(record.replaced_by_access.as_deref())
		.bind(record.replaced_by_refresh.as_deref())
		.execute(db)
		.await,
	)?;
	Ok(())
}

pub(crate) async fn read_refresh(db: &SqlitePool, token: &str) -> AwResult<RefreshTokenRecord> {
	let record = map_res(
		sqlx::query("SELECT * FROM oauth_refresh_tokens WHERE token = ?")
			.bind(token)
			.fetch_one(db)
			.await,
		refresh_from_row,
	)?;
	if record.expires_at < Timestamp::now() {
		return Err(Error::NotFound);
	}
	Ok(record)
}

/// Compare-and-swap on the used flag.
pub(crate) async fn mark_refresh_rotated(
	db: &SqlitePool,
	token: &str,
	replaced_by_access: &str,
	replaced_by_refresh: &str,
	rotated_at: Timestamp,
) -> AwResult<bool> {
	let affected = map_exec(
		sqlx::query(
			"UPDATE oauth_refresh_tokens
			 SET used = 1, rotated_at = ?, replaced_by_access = ?, replaced_by_refresh = ?
			 WHERE token = ? AND used = 0",
		)
		.bind(rotated_at.0)
		.bind(replaced_by_access)
		.bind(replaced_by_refresh)
		.bind(token)
		.execute(db)
		.await,
	)?;
	Ok(affected == 1)
}

pub(crate) async fn delete_refresh(db: &SqlitePool, token: &str) -> AwResult<()> {
	let affected = map_exec(
		sqlx::query("DELETE FROM oauth_refresh_tokens WHERE token = ?")
			.bind(token)
			.execute(db)
			.await,
	)?;
	if affected == 0 { Err(Error::NotFound) } else { Ok(()) }
}

/// Delete every token of a client, optionally scoped to one actor.
pub(crate) async fn revoke_family(
	db: &SqlitePool,
	client_id: &str,
	actor_id: Option<&str>,
) -> AwResult<u32> {
	let mut revoked = 0u64;
	for table in ["oauth_access_tokens", "oauth_refresh_tokens"] {
		revoked += match actor_id {
			Some(actor_id) => map_exec(
				sqlx::query(&format!(
					"DELETE FROM {} WHERE client_id = ? AND actor_id = ?",
					table
				))
				.bind(client_id)
				.bind(actor_id)
				.execute(db)
				.await,
			)?,
			None => map_exec(
				sqlx::query(&format!("DELETE FROM {} WHERE client_id = ?", table))
					.bind(client_id)
					.execute(db)
					.await,
			)?,
		};
	}
	Ok(revoked as u32)
}

// vim: ts=4
