pub use actingweb_core::app::{App, AppState};
pub use actingweb_types::error::{AwResult, Error};
pub use actingweb_types::types::{Patch, Timestamp};

pub use tracing::{debug, error, info, warn};

// vim: ts=4
