pub use crate::error::{AwResult, Error};
pub use crate::types::{Granularity, Patch, Timestamp};

pub use tracing::{debug, debug_span, error, error_span, info, info_span, warn, warn_span};

// vim: ts=4
