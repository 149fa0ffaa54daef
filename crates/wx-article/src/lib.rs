//! # wx-article
//!
//! The published-article pipeline: validates caller requests, obtains
//! credentials from the token manager, calls the upstream article
//! endpoints, and converts a single `credential expired` fault into one
//! transparent invalidate-and-retry round.

#![forbid(unsafe_code)]
#![deny(warnings)]
#![deny(missing_docs)]

pub mod error;
pub mod models;
pub mod service;

pub use error::{ArticleError, ArticleResult};
pub use models::{ArticleRequest, ArticleResponse, BatchArticlesRequest, BatchArticlesResponse};
pub use service::ArticleService;
