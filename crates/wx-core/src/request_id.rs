//! Request identifiers.
//!
//! Every response on the caller surface carries a unique request id, which
//! is also attached to the log context of the work done on its behalf.

use uuid::Uuid;

/// Generates a new unique request identifier.
#[must_use]
pub fn new_request_id() -> String {
    Uuid::new_v4().to_string()
}
