//! # wx-core
//!
//! Core utilities for the WeChat publish facade service: configuration
//! loading and validation, the foundational error type, and request
//! identifiers.
//!
//! This crate has no opinion about transports or storage backends; it only
//! defines the shapes the other crates agree on.

#![forbid(unsafe_code)]
#![deny(warnings)]
#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod request_id;

pub use config::Config;
pub use error::{Error, Result};
