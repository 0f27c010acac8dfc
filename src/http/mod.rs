//! HTTP Client Facade
//!
//! A single [`HttpClient`] is shared by the spider and the audit dispatcher.
//! Every request draws a permit from one semaphore, so the configured
//! `max-concurrency` bounds crawling and auditing together.

mod client;

pub use client::{HttpClient, HttpError, HttpResponse, HttpStats};
