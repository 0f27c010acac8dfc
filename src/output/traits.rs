//! Report trait and registry
//!
//! Reports consume a finished [`AuditStore`] and render it. A report that
//! cannot produce file output says so through
//! [`Report::supports_outfile`]; the framework refuses to write it to disk.

use crate::framework::AuditStore;
use crate::SpindleError;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Trait for report formats
///
/// Implementations must be thread-safe.
pub trait Report: Send + Sync {
    /// Name used to request the report
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Whether the rendered output can be written to a file
    fn supports_outfile(&self) -> bool {
        true
    }

    /// Renders the audit results
    ///
    /// # Arguments
    ///
    /// * `store` - Results of a finished (or in-progress) audit
    fn render(&self, store: &AuditStore) -> Result<String, SpindleError>;
}

/// Listing entry for a registered report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportInfo {
    pub name: String,
    pub description: String,
    pub supports_outfile: bool,
}

/// Reports available by name
#[derive(Clone, Default)]
pub struct ReportRegistry {
    reports: BTreeMap<String, Arc<dyn Report>>,
}

impl ReportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with the built-in reports
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(super::JsonReport));
        registry.register(Arc::new(super::MarkdownReport));
        registry.register(Arc::new(super::StdoutReport));
        registry
    }

    /// Adds a report, replacing any report with the same name
    pub fn register(&mut self, report: Arc<dyn Report>) {
        self.reports.insert(report.name().to_string(), report);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Report>> {
        self.reports.get(name).cloned()
    }

    /// Looks up a report, failing with [`SpindleError::UnknownReport`]
    pub fn require(&self, name: &str) -> Result<Arc<dyn Report>, SpindleError> {
        self.get(name)
            .ok_or_else(|| SpindleError::UnknownReport(name.to_string()))
    }

    /// Looks up a report that can be written to a file
    pub fn require_outfile(&self, name: &str) -> Result<Arc<dyn Report>, SpindleError> {
        let report = self.require(name)?;
        if !report.supports_outfile() {
            return Err(SpindleError::ReportCapability {
                name: name.to_string(),
                capability: "outfile".to_string(),
            });
        }
        Ok(report)
    }

    /// Registered reports ordered by name
    pub fn list(&self) -> Vec<ReportInfo> {
        self.reports
            .values()
            .map(|r| ReportInfo {
                name: r.name().to_string(),
                description: r.description().to_string(),
                supports_outfile: r.supports_outfile(),
            })
            .collect()
    }
}
