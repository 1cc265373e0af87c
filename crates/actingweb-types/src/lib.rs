//! Shared types, adapter traits, and core utilities for the ActingWeb runtime.
//!
//! This crate contains the foundational types that are shared between the
//! feature crates and all storage adapter implementations. Extracting these
//! into a separate crate allows adapter crates to compile in parallel with
//! the runtime's feature modules.

pub mod auth_adapter;
pub mod error;
pub mod permissions;
pub mod prelude;
pub mod store_adapter;
pub mod types;
pub mod utils;
pub mod wire;

/// Reserved system actor that owns global runtime state (trust types).
pub const SYSTEM_ACTOR: &str = "_actingweb_system";

/// Reserved system actor that owns OAuth2 server state.
pub const OAUTH2_ACTOR: &str = "_actingweb_oauth2";

/// Reserved prefix for library-internal attribute buckets.
pub const INTERNAL_BUCKET_PREFIX: &str = "_";

/// Protocol version advertised under `/meta/actingweb/version`.
pub const PROTOCOL_VERSION: &str = "1.4";

// vim: ts=4
