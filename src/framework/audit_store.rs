//! Audit results
//!
//! The [`AuditStore`] aggregates everything one framework run produces:
//! issues logged by modules, plugin results, the sitemap and the failures.
//! Issues are append-only; a second issue with the same digest is dropped.

use crate::page::ElementKind;
use crate::state::Failure;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Severity level of an issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
    Medium,
    Low,
    Informational,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::High => write!(f, "HIGH"),
            Severity::Medium => write!(f, "MEDIUM"),
            Severity::Low => write!(f, "LOW"),
            Severity::Informational => write!(f, "INFO"),
        }
    }
}

/// A vulnerability reported by a module
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    /// Name of the module that logged the issue
    pub module: String,
    pub name: String,
    pub description: String,
    pub severity: Severity,
    /// Affected URL
    pub url: String,
    /// Kind of element the vulnerable input belongs to
    pub element: ElementKind,
    /// Vulnerable input name, if any
    pub param: Option<String>,
    /// Technical evidence
    pub evidence: String,
}

impl Issue {
    /// Creates an issue with medium severity and no description or evidence
    ///
    /// The module name is filled in when the issue is logged.
    pub fn new(name: impl Into<String>, url: impl Into<String>, element: ElementKind) -> Self {
        Self {
            module: String::new(),
            name: name.into(),
            description: String::new(),
            severity: Severity::Medium,
            url: url.into(),
            element,
            param: None,
            evidence: String::new(),
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_param(mut self, param: impl Into<String>) -> Self {
        self.param = Some(param.into());
        self
    }

    pub fn with_evidence(mut self, evidence: impl Into<String>) -> Self {
        self.evidence = evidence.into();
        self
    }

    /// Identity of the issue: module, name, URL, element and input
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for part in [
            self.module.as_str(),
            self.name.as_str(),
            self.url.as_str(),
            &self.element.to_string(),
            self.param.as_deref().unwrap_or_default(),
        ] {
            hasher.update(part.as_bytes());
            hasher.update([0u8]);
        }
        hex::encode(hasher.finalize())
    }
}

/// A module that errored or panicked on a page
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleFailure {
    pub module: String,
    pub url: String,
    pub message: String,
}

/// A visited URL and its status code
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SitemapEntry {
    pub url: String,
    pub code: u16,
}

/// Aggregate result of one framework run
#[derive(Debug, Clone, Serialize)]
pub struct AuditStore {
    pub url: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub config_hash: Option<String>,
    issues: Vec<Issue>,
    #[serde(skip)]
    digests: HashSet<String>,
    pub plugins: BTreeMap<String, serde_json::Value>,
    pub sitemap: Vec<SitemapEntry>,
    pub failures: Vec<Failure>,
    pub module_failures: Vec<ModuleFailure>,
}

impl AuditStore {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            started_at: Utc::now(),
            finished_at: None,
            config_hash: None,
            issues: Vec::new(),
            digests: HashSet::new(),
            plugins: BTreeMap::new(),
            sitemap: Vec::new(),
            failures: Vec::new(),
            module_failures: Vec::new(),
        }
    }

    /// Appends `issue` unless an identical one was already logged
    pub fn add_issue(&mut self, issue: Issue) -> bool {
        if !self.digests.insert(issue.digest()) {
            return false;
        }
        self.issues.push(issue);
        true
    }

    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    /// Issues ordered by severity, then by logging order
    pub fn issues_by_severity(&self) -> Vec<&Issue> {
        let mut issues: Vec<&Issue> = self.issues.iter().collect();
        issues.sort_by_key(|i| i.severity);
        issues
    }

    /// Duration of the run, once finished
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.finished_at.map(|f| f - self.started_at)
    }
}
