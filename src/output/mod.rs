//! Report generation
//!
//! This module handles:
//! - The [`Report`] contract consumed by the framework
//! - A registry of available reports
//! - Built-in JSON, markdown and stdout reports

mod json;
mod markdown;
mod stdout;
mod traits;

pub use json::JsonReport;
pub use markdown::{format_markdown_report, MarkdownReport};
pub use stdout::StdoutReport;
pub use traits::{Report, ReportInfo, ReportRegistry};
