//! ActingWeb is a runtime for per-user micro-service actors that communicate
//! peer-to-peer over a standardized REST protocol.
//!
//! # Features
//!
//! - Per-actor isolated state
//!     - properties, list properties, internal attribute buckets
//!     - pluggable storage adapters (SQLite and in-memory bundled)
//! - Trust relationships between actors
//!     - bilateral handshake with shared secrets
//!     - trust-type permission templates with per-relationship overrides
//! - Subscriptions
//!     - in-order, at-most-once diff delivery with resync
//!     - per-peer circuit breakers and bounded fan-out
//! - OAuth2 authorization server
//!     - dynamic client registration, PKCE, refresh rotation
//!     - Google/GitHub upstream identity providers, MCP client trusts

// Re-export shared types and adapter traits from actingweb-types
pub use actingweb_types::auth_adapter;
pub use actingweb_types::error;
pub use actingweb_types::permissions;
pub use actingweb_types::store_adapter;
pub use actingweb_types::types;
pub use actingweb_types::utils;
pub use actingweb_types::wire;

// Re-export the lock! macro so `$crate::error::Error` resolves correctly
// for code in this crate that uses `lock!` via actingweb_types
pub use actingweb_types::lock;

// Feature crate re-exports
pub use actingweb_actor as actor;
pub use actingweb_core::config;
pub use actingweb_core::extract;
pub use actingweb_core::hooks;
pub use actingweb_core::perm;
pub use actingweb_core::request;
pub use actingweb_core::trust_types;
pub use actingweb_oauth as oauth;
pub use actingweb_subscription as subscription;
pub use actingweb_trust as trust;

// Local modules
pub mod app;
pub mod bootstrap;
pub mod devtest;
pub mod prelude;
pub mod routes;
pub mod surface;

pub use crate::app::Builder;
pub use actingweb_core::app::{App, AppState};

// vim: ts=4
