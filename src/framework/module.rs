//! Audit module contract
//!
//! Modules are opaque vulnerability checks run against one page at a time.
//! Each declares, through [`ModuleInfo::elements`], which kinds of element it
//! audits; [`applies`] turns that declaration into a dispatch decision.

use crate::config::AuditConfig;
use crate::framework::audit_store::{AuditStore, Issue};
use crate::http::HttpClient;
use crate::page::{ElementKind, Page};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};

/// Static description of a module
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleInfo {
    pub name: String,
    pub description: String,
    /// Element kinds the module audits; empty means every page
    pub elements: Vec<ElementKind>,
}

impl ModuleInfo {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            elements: Vec::new(),
        }
    }

    pub fn with_elements(mut self, elements: impl IntoIterator<Item = ElementKind>) -> Self {
        self.elements.extend(elements);
        self
    }
}

/// A vulnerability check
///
/// Returning an error, or panicking, is recorded as a module failure for the
/// page; auditing carries on with the next module.
#[async_trait]
pub trait Module: Send + Sync {
    fn info(&self) -> ModuleInfo;

    async fn run(&self, page: &Page, ctx: &AuditContext) -> anyhow::Result<()>;
}

/// What a module gets to work with while auditing a page
#[derive(Clone)]
pub struct AuditContext {
    module: String,
    http: HttpClient,
    store: Arc<Mutex<AuditStore>>,
}

impl AuditContext {
    pub(crate) fn new(module: String, http: HttpClient, store: Arc<Mutex<AuditStore>>) -> Self {
        Self {
            module,
            http,
            store,
        }
    }

    /// Client sharing the framework's request budget and cookie jar
    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    pub fn module_name(&self) -> &str {
        &self.module
    }

    /// Logs an issue under this module's name
    ///
    /// Returns false if an identical issue had already been logged.
    pub fn log_issue(&self, mut issue: Issue) -> bool {
        issue.module = self.module.clone();
        let added = self
            .store
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .add_issue(issue);
        if added {
            tracing::info!("Module {} logged an issue", self.module);
        }
        added
    }
}

/// Whether a module with `info` should run against `page`
///
/// A module that declares no elements always runs. Otherwise it runs if any
/// declared kind is both enabled in `audit` and present on the page. `Body`
/// needs a non-empty body; `Path` and `Server` are always present.
pub fn applies(info: &ModuleInfo, page: &Page, audit: &AuditConfig) -> bool {
    if info.elements.is_empty() {
        return true;
    }

    info.elements.iter().any(|&kind| {
        let enabled = match kind {
            ElementKind::Link => audit.links,
            ElementKind::Form => audit.forms,
            ElementKind::Cookie => audit.cookies,
            ElementKind::Header => audit.headers,
            ElementKind::Body | ElementKind::Path | ElementKind::Server => true,
        };
        enabled && page.has(kind)
    })
}
