//! Error handling for the facade service.

use thiserror::Error;

/// Result type alias using the facade error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Foundational error type for startup and configuration paths.
///
/// Request-path faults carry their own taxonomies in the crates that
/// produce them; this type covers everything that happens before the
/// service is able to take traffic.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration could not be read or parsed.
    #[error("configuration error: {0}")]
    Config(String),

    /// Configuration was read but fails validation.
    #[error("configuration validation failed: {0}")]
    Validation(String),
}
