//! Spindle: a web application audit core
//!
//! This crate implements the crawl engine and audit orchestration of a web
//! application security scanner: a scope-aware spider that maps a site, and a
//! framework that feeds the discovered pages through pluggable audit modules.

pub mod config;
pub mod crawler;
pub mod framework;
pub mod http;
pub mod output;
pub mod page;
pub mod state;
pub mod url;

use thiserror::Error;

/// Main error type for Spindle operations
#[derive(Debug, Error)]
pub enum SpindleError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP error: {0}")]
    Http(#[from] http::HttpError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Unknown report: {0}")]
    UnknownReport(String),

    #[error("Report '{name}' does not support {capability}")]
    ReportCapability { name: String, capability: String },

    #[error("Report '{name}' failed: {message}")]
    Report { name: String, message: String },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Kinds of failures that are recorded rather than raised
///
/// None of these abort a run. Network and server failures are retried before
/// being recorded; module and authentication failures are recorded as they
/// happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Connection refused, DNS failure, timeout
    Network,
    /// 5xx response after all retries
    Server,
    /// An audit module returned an error or panicked
    Module,
    /// The login sequence did not restore an authenticated session
    Authentication,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Network => "network",
            Self::Server => "server",
            Self::Module => "module",
            Self::Authentication => "authentication",
        };
        f.write_str(s)
    }
}

/// Result type alias for Spindle operations
pub type Result<T> = std::result::Result<T, SpindleError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{Callback, Spider};
pub use framework::{Framework, FrameworkStatus};
pub use page::{ElementKind, Page};
pub use state::SpiderStatus;
pub use url::{normalize_url, to_absolute};
