//! # wx-cache-redis
//!
//! Redis implementation of the `wx-cache` provider trait, built on the
//! `fred` client with automatic reconnection.
//!
//! Token values are stored as raw strings under the shared key schema so the
//! cache slots interoperate with other implementations pointed at the same
//! deployment.

#![forbid(unsafe_code)]
#![deny(warnings)]
#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod provider;

pub use config::RedisConfig;
pub use provider::RedisCacheProvider;
