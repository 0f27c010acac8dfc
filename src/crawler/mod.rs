//! Crawler module
//!
//! This module contains the crawl engine, including:
//! - The URL/Scope filter deciding which discovered URLs are followed
//! - Link extraction from fetched responses
//! - Fetching with retry for transient failures
//! - The spider state machine coordinating all of the above

mod extractor;
mod fetcher;
mod scope;
mod spider;

pub use extractor::{AttributeExtractor, LinkExtractor, MetaRefreshExtractor, PathExtractor};
pub use fetcher::{fetch_with_retry, FetchOutcome, RetryPolicy};
pub use scope::{resolve_paths, Scope, ScopeContext, ScopeRejection};
pub use spider::{Callback, Spider};
