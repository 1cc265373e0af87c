//! Subscription engine for the ActingWeb runtime.
//!
//! Three cooperating parts:
//! - `engine`: subscription lifecycle and diff registration on writes,
//! - `callback`: inbound delivery with sequencing, dedup, and resync,
//! - `fanout`: outbound delivery with bounded concurrency and per-peer
//!   circuit breakers.

pub mod breaker;
pub mod callback;
pub mod engine;
pub mod fanout;
pub mod handler;
mod prelude;

pub use fanout::FanoutManager;

// vim: ts=4
