//! # wx-token
//!
//! The token manager: the single source of truth for "give me a valid
//! credential for identity X". It keeps upstream load minimal by answering
//! from the cache first, collapses concurrent misses into one refresh per
//! identity, renews soon-to-expire tokens in the background, and supports
//! the explicit invalidate-and-refresh round the article pipeline uses
//! after an upstream expiry fault.

#![forbid(unsafe_code)]
#![deny(warnings)]
#![deny(missing_docs)]

mod flight;

pub mod error;
pub mod manager;

pub use error::{TokenError, TokenResult};
pub use manager::{TokenManager, TokenManagerConfig};
