//! JSON report

use crate::framework::AuditStore;
use crate::output::Report;
use crate::SpindleError;

/// Serializes the whole audit store as pretty-printed JSON
pub struct JsonReport;

impl Report for JsonReport {
    fn name(&self) -> &str {
        "json"
    }

    fn description(&self) -> &str {
        "Exports the audit results as JSON"
    }

    fn render(&self, store: &AuditStore) -> Result<String, SpindleError> {
        Ok(serde_json::to_string_pretty(store)?)
    }
}
