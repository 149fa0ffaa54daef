//! # wx-upstream
//!
//! Typed client for the WeChat HTTP API: wire models with bit-exact field
//! names, the upstream fault taxonomy, an HTTP client with bounded
//! exponential-backoff retry of transport faults, and a circuit breaker
//! decorator that fails fast when the upstream is down.
//!
//! Layering, innermost first: one HTTP attempt, the retry loop around it,
//! and the breaker around the retry loop, so one guarded call counts as a
//! single breaker observation no matter how many attempts it took.

#![forbid(unsafe_code)]
#![deny(warnings)]
#![deny(missing_docs)]

pub mod breaker;
pub mod client;
pub mod error;
pub mod models;
pub mod retry;

pub use breaker::{BreakerClient, BreakerConfig, BreakerState, CircuitBreaker};
pub use client::{HttpClient, HttpClientConfig, WechatApi, DEFAULT_BASE_URL};
pub use error::{UpstreamError, UpstreamResult};
pub use retry::RetryPolicy;
