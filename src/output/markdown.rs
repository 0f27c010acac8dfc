//! Markdown report
//!
//! Generates a human-readable summary of an audit: run metadata, issues by
//! severity, the sitemap and everything that failed along the way.

use crate::framework::{AuditStore, Severity};
use crate::output::Report;
use crate::SpindleError;
use std::collections::BTreeMap;

/// Sitemap rows rendered before the list is truncated
const SITEMAP_LIMIT: usize = 100;

pub struct MarkdownReport;

impl Report for MarkdownReport {
    fn name(&self) -> &str {
        "markdown"
    }

    fn description(&self) -> &str {
        "Human-readable markdown summary"
    }

    fn render(&self, store: &AuditStore) -> Result<String, SpindleError> {
        Ok(format_markdown_report(store))
    }
}

/// Formats audit results as markdown
///
/// # Arguments
///
/// * `store` - The audit results
///
/// # Returns
///
/// A formatted markdown string
pub fn format_markdown_report(store: &AuditStore) -> String {
    let mut md = String::new();

    md.push_str("# Spindle Audit Report\n\n");

    // Run metadata
    md.push_str("## Run Information\n\n");
    md.push_str(&format!("- **Target**: {}\n", store.url));
    md.push_str(&format!("- **Started**: {}\n", store.started_at.to_rfc3339()));
    if let Some(finished) = &store.finished_at {
        md.push_str(&format!("- **Finished**: {}\n", finished.to_rfc3339()));
    }
    if let Some(duration) = store.duration() {
        md.push_str(&format!(
            "- **Duration**: {} seconds\n",
            duration.num_seconds()
        ));
    }
    if let Some(hash) = &store.config_hash {
        md.push_str(&format!("- **Config Hash**: {}\n", hash));
    }
    md.push('\n');

    // Overall statistics
    md.push_str("## Overall Statistics\n\n");
    md.push_str(&format!("- **Pages Mapped**: {}\n", store.sitemap.len()));
    md.push_str(&format!("- **Issues**: {}\n", store.issues().len()));
    md.push_str(&format!("- **Failed URLs**: {}\n", store.failures.len()));
    md.push_str(&format!(
        "- **Module Failures**: {}\n\n",
        store.module_failures.len()
    ));

    // Severity breakdown
    if !store.issues().is_empty() {
        let mut counts: BTreeMap<Severity, usize> = BTreeMap::new();
        for issue in store.issues() {
            *counts.entry(issue.severity).or_default() += 1;
        }

        md.push_str("## Severity Breakdown\n\n");
        md.push_str("| Severity | Count |\n");
        md.push_str("|----------|-------|\n");
        for (severity, count) in counts {
            md.push_str(&format!("| {} | {} |\n", severity, count));
        }
        md.push('\n');

        md.push_str("## Issues\n\n");
        for issue in store.issues_by_severity() {
            md.push_str(&format!("### [{}] {}\n\n", issue.severity, issue.name));
            md.push_str(&format!("- **Module**: {}\n", issue.module));
            md.push_str(&format!("- **URL**: {}\n", issue.url));
            md.push_str(&format!("- **Element**: {}\n", issue.element));
            if let Some(param) = &issue.param {
                md.push_str(&format!("- **Input**: {}\n", param));
            }
            if !issue.description.is_empty() {
                md.push_str(&format!("\n{}\n", issue.description));
            }
            if !issue.evidence.is_empty() {
                md.push_str(&format!("\n```\n{}\n```\n", issue.evidence));
            }
            md.push('\n');
        }
    }

    // Sitemap
    if !store.sitemap.is_empty() {
        md.push_str("## Sitemap\n\n");
        md.push_str("| URL | Code |\n");
        md.push_str("|-----|------|\n");
        for entry in store.sitemap.iter().take(SITEMAP_LIMIT) {
            md.push_str(&format!("| {} | {} |\n", entry.url, entry.code));
        }
        if store.sitemap.len() > SITEMAP_LIMIT {
            md.push_str(&format!(
                "\n... and {} more\n",
                store.sitemap.len() - SITEMAP_LIMIT
            ));
        }
        md.push('\n');
    }

    // Failures
    if !store.failures.is_empty() {
        md.push_str("## Failed URLs\n\n");
        md.push_str("| URL | Kind | Reason |\n");
        md.push_str("|-----|------|--------|\n");
        for failure in &store.failures {
            md.push_str(&format!(
                "| {} | {} | {} |\n",
                failure.url, failure.kind, failure.reason
            ));
        }
        md.push('\n');
    }

    if !store.module_failures.is_empty() {
        md.push_str("## Module Failures\n\n");
        for failure in &store.module_failures {
            md.push_str(&format!(
                "- **{}** on {}: {}\n",
                failure.module, failure.url, failure.message
            ));
        }
        md.push('\n');
    }

    if !store.plugins.is_empty() {
        md.push_str("## Plugins\n\n");
        for name in store.plugins.keys() {
            md.push_str(&format!("- {}\n", name));
        }
        md.push('\n');
    }

    md
}
