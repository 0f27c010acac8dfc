//! Plain-text report for the terminal

use crate::framework::AuditStore;
use crate::output::Report;
use crate::SpindleError;

/// Terse console summary; cannot be written to a file
pub struct StdoutReport;

impl Report for StdoutReport {
    fn name(&self) -> &str {
        "stdout"
    }

    fn description(&self) -> &str {
        "Prints a summary to the terminal"
    }

    fn supports_outfile(&self) -> bool {
        false
    }

    fn render(&self, store: &AuditStore) -> Result<String, SpindleError> {
        let mut out = String::new();
        out.push_str(&format!("Audit of {}\n", store.url));
        out.push_str(&format!(
            "  {} pages mapped, {} issues, {} failed URLs\n",
            store.sitemap.len(),
            store.issues().len(),
            store.failures.len()
        ));

        for issue in store.issues_by_severity() {
            match &issue.param {
                Some(param) => out.push_str(&format!(
                    "  [{}] {} at {} ({} `{}`)\n",
                    issue.severity, issue.name, issue.url, issue.element, param
                )),
                None => out.push_str(&format!(
                    "  [{}] {} at {} ({})\n",
                    issue.severity, issue.name, issue.url, issue.element
                )),
            }
        }

        for failure in &store.module_failures {
            out.push_str(&format!(
                "  module {} failed on {}: {}\n",
                failure.module, failure.url, failure.message
            ));
        }

        Ok(out)
    }
}
