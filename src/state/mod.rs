//! Crawl state
//!
//! The bookkeeping a spider owns for one crawl. Nothing in here performs I/O;
//! the spider serializes all mutation behind its own lock.
//!
//! # Components
//!
//! - `Sitemap`: visited URLs and their status codes, in completion order
//! - `Frontier`: URLs waiting to be fetched
//! - `FailureLog`: URLs abandoned after retries
//! - `RedundancyCounters`: per-pattern and per-query-shape follow counts
//! - `SpiderStatus`: the spider's lifecycle state

mod failures;
mod frontier;
mod redundancy;
mod sitemap;
mod spider_status;

pub use failures::{Failure, FailureLog};
pub use frontier::{Frontier, QueuedUrl};
pub use redundancy::{RedundancyCounters, RedundancyHit};
pub use sitemap::Sitemap;
pub use spider_status::SpiderStatus;
