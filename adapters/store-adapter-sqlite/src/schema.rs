//! Database schema.
//!
//! Column `descr` holds the trust description (`desc` is an SQL reserved
//! word). Suspension subtargets use the empty string for "whole target" so
//! the primary key stays total.

use sqlx::SqlitePool;

use actingweb_types::error::{AwResult, Error};
use tracing::warn;

const SCHEMA: &[&str] = &[
	"CREATE TABLE IF NOT EXISTS actors (
		actor_id TEXT PRIMARY KEY,
		creator TEXT NOT NULL,
		passphrase_hash TEXT NOT NULL,
		created_at INTEGER NOT NULL
	)",
	"CREATE INDEX IF NOT EXISTS idx_actors_creator ON actors (creator)",
	"CREATE TABLE IF NOT EXISTS properties (
		actor_id TEXT NOT NULL,
		name TEXT NOT NULL,
		value TEXT NOT NULL,
		PRIMARY KEY (actor_id, name)
	)",
	"CREATE TABLE IF NOT EXISTS property_index (
		name TEXT NOT NULL,
		value TEXT NOT NULL,
		actor_id TEXT NOT NULL,
		PRIMARY KEY (name, value)
	)",
	"CREATE TABLE IF NOT EXISTS list_meta (
		actor_id TEXT NOT NULL,
		list_name TEXT NOT NULL,
		description TEXT,
		explanation TEXT,
		created_at INTEGER NOT NULL,
		updated_at INTEGER NOT NULL,
		version INTEGER NOT NULL,
		length INTEGER NOT NULL,
		PRIMARY KEY (actor_id, list_name)
	)",
	"CREATE TABLE IF NOT EXISTS list_items (
		actor_id TEXT NOT NULL,
		list_name TEXT NOT NULL,
		idx INTEGER NOT NULL,
		item TEXT NOT NULL,
		PRIMARY KEY (actor_id, list_name, idx)
	)",
	"CREATE TABLE IF NOT EXISTS attributes (
		actor_id TEXT NOT NULL,
		bucket TEXT NOT NULL,
		name TEXT NOT NULL,
		value TEXT NOT NULL,
		ttl_epoch INTEGER,
		PRIMARY KEY (actor_id, bucket, name)
	)",
	"CREATE TABLE IF NOT EXISTS trusts (
		actor_id TEXT NOT NULL,
		peer_id TEXT NOT NULL,
		baseuri TEXT NOT NULL,
		peer_type TEXT NOT NULL,
		relationship TEXT NOT NULL,
		secret TEXT NOT NULL,
		approved INTEGER NOT NULL,
		peer_approved INTEGER NOT NULL,
		verified INTEGER NOT NULL,
		verification_token TEXT NOT NULL,
		established_via TEXT NOT NULL,
		peer_identifier TEXT,
		descr TEXT,
		aw_supported TEXT,
		aw_version TEXT,
		capabilities_fetched_at INTEGER,
		last_connected_at INTEGER,
		last_connected_via TEXT,
		oauth_client_id TEXT,
		client_name TEXT,
		client_version TEXT,
		client_platform TEXT,
		created_at INTEGER NOT NULL,
		PRIMARY KEY (actor_id, peer_id)
	)",
	"CREATE INDEX IF NOT EXISTS idx_trusts_secret ON trusts (secret)",
	"CREATE INDEX IF NOT EXISTS idx_trusts_client ON trusts (oauth_client_id)",
	"CREATE TABLE IF NOT EXISTS subscriptions (
		actor_id TEXT NOT NULL,
		peer_id TEXT NOT NULL,
		sub_id TEXT NOT NULL,
		target TEXT NOT NULL,
		subtarget TEXT,
		resource TEXT,
		granularity TEXT NOT NULL,
		seqnr INTEGER NOT NULL,
		callback INTEGER NOT NULL,
		created_at INTEGER NOT NULL,
		PRIMARY KEY (actor_id, peer_id, sub_id)
	)",
	"CREATE TABLE IF NOT EXISTS diffs (
		actor_id TEXT NOT NULL,
		sub_id TEXT NOT NULL,
		seqnr INTEGER NOT NULL,
		timestamp INTEGER NOT NULL,
		blob TEXT NOT NULL,
		PRIMARY KEY (actor_id, sub_id, seqnr)
	)",
	"CREATE TABLE IF NOT EXISTS suspensions (
		actor_id TEXT NOT NULL,
		target TEXT NOT NULL,
		subtarget TEXT NOT NULL DEFAULT '',
		PRIMARY KEY (actor_id, target, subtarget)
	)",
	"CREATE TABLE IF NOT EXISTS callback_states (
		actor_id TEXT NOT NULL,
		peer_id TEXT NOT NULL,
		sub_id TEXT NOT NULL,
		last_seq INTEGER NOT NULL,
		pending TEXT NOT NULL,
		version INTEGER NOT NULL,
		PRIMARY KEY (actor_id, peer_id, sub_id)
	)",
	"CREATE TABLE IF NOT EXISTS oauth_clients (
		client_id TEXT PRIMARY KEY,
		client_secret TEXT NOT NULL,
		client_name TEXT NOT NULL,
		client_version TEXT,
		client_platform TEXT,
		redirect_uris TEXT NOT NULL,
		trust_type TEXT NOT NULL,
		created_at INTEGER NOT NULL
	)",
	"CREATE TABLE IF NOT EXISTS oauth_codes (
		code TEXT PRIMARY KEY,
		client_id TEXT NOT NULL,
		actor_id TEXT NOT NULL,
		peer_id TEXT NOT NULL,
		redirect_uri TEXT NOT NULL,
		code_challenge TEXT,
		scope TEXT,
		expires_at INTEGER NOT NULL
	)",
	"CREATE TABLE IF NOT EXISTS oauth_access_tokens (
		token TEXT PRIMARY KEY,
		client_id TEXT NOT NULL,
		actor_id TEXT NOT NULL,
		peer_id TEXT NOT NULL,
		scope TEXT,
		created_at INTEGER NOT NULL,
		expires_at INTEGER NOT NULL
	)",
	"CREATE INDEX IF NOT EXISTS idx_access_client ON oauth_access_tokens (client_id, actor_id)",
	"CREATE TABLE IF NOT EXISTS oauth_refresh_tokens (
		token TEXT PRIMARY KEY,
		client_id TEXT NOT NULL,
		actor_id TEXT NOT NULL,
		peer_id TEXT NOT NULL,
		scope TEXT,
		created_at INTEGER NOT NULL,
		expires_at INTEGER NOT NULL,
		used INTEGER NOT NULL DEFAULT 0,
		rotated_at INTEGER,
		replaced_by_access TEXT,
		replaced_by_refresh TEXT
	)",
	"CREATE INDEX IF NOT EXISTS idx_refresh_client ON oauth_refresh_tokens (client_id, actor_id)",
];

pub(crate) async fn init(db: &SqlitePool) -> AwResult<()> {
	for statement in SCHEMA {
		sqlx::query(statement)
			.execute(db)
			.await
			.inspect_err(|err| warn!("DB schema: {:#?}", err))
			.map_err(|_| Error::DbError)?;
	}
	Ok(())
}

// vim: ts=4
