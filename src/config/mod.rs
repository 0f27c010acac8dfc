//! Configuration module for Spindle
//!
//! This module handles loading, parsing, and validating TOML configuration
//! files. The resulting [`Config`] is passed explicitly to the spider and the
//! framework; there is no process-wide options object.
//!
//! # Example
//!
//! ```no_run
//! use spindle::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("audit.toml")).unwrap();
//! println!("Max concurrency: {}", config.http.max_concurrency);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    AuditConfig, Config, HttpConfig, LoginConfig, ReportEntry, ScopeConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::validate;
