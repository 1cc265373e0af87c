pub use crate::app::{App, AppState};
pub use actingweb_types::error::{AwResult, Error};
pub use actingweb_types::types::{Granularity, Patch, Timestamp};

pub use tracing::{debug, debug_span, error, error_span, info, info_span, warn, warn_span};

// vim: ts=4
