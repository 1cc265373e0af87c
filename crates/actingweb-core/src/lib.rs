//! Core infrastructure for the ActingWeb runtime: the composition root
//! (`AppState`), runtime configuration, the authentication pipeline, the
//! outbound peer HTTP client, the permission engine, and the hook registry.

pub mod app;
pub mod auth;
pub mod config;
pub mod extensions;
pub mod extract;
pub mod hooks;
pub mod perm;
pub mod prelude;
pub mod request;
pub mod trust_types;

pub use app::{App, AppState};

// vim: ts=4
