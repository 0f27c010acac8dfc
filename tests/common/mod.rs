//! Shared helpers for the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use spindle::framework::{AuditContext, Issue, Module, ModuleInfo};
use spindle::{Config, ElementKind, Page};
use std::sync::{Arc, Mutex};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration seeded at the mock server's root
///
/// Retries are kept short so failure scenarios finish quickly.
pub fn create_test_config(server: &MockServer) -> Config {
    let mut config = Config::new(format!("{}/", server.uri()));
    config.http.max_retries = 2;
    config.http.retry_delay_ms = 10;
    config.http.timeout_ms = 2_000;
    config
}

/// Absolute URL of `route` on the mock server
pub fn url_for(server: &MockServer, route: &str) -> String {
    format!("{}{}", server.uri(), route)
}

/// HTML body containing one anchor per href
pub fn links_page(hrefs: &[&str]) -> String {
    let anchors: String = hrefs
        .iter()
        .map(|h| format!(r#"<a href="{}">{}</a>"#, h, h))
        .collect();
    format!(
        "<html><head><title>Links</title></head><body>{}</body></html>",
        anchors
    )
}

/// Mounts a GET handler serving `body` as HTML
pub async fn mount_html(server: &MockServer, route: &str, body: impl Into<String>) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(body.into(), "text/html"),
        )
        .mount(server)
        .await;
}

/// Mounts a GET handler serving a page with links to `hrefs`
pub async fn mount_links(server: &MockServer, route: &str, hrefs: &[&str]) {
    mount_html(server, route, links_page(hrefs)).await;
}

/// Module that records every page it audits and logs one issue per page
pub struct Recorder {
    info: ModuleInfo,
    pub seen: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub fn new(name: &str, elements: &[ElementKind]) -> Self {
        Self {
            info: ModuleInfo::new(name, "records audited pages")
                .with_elements(elements.iter().copied()),
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Handle to the recorded URLs that outlives registration
    pub fn handle(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.seen)
    }
}

#[async_trait]
impl Module for Recorder {
    fn info(&self) -> ModuleInfo {
        self.info.clone()
    }

    async fn run(&self, page: &Page, ctx: &AuditContext) -> anyhow::Result<()> {
        self.seen.lock().unwrap().push(page.url().to_string());
        ctx.log_issue(Issue::new("visited", page.url().as_str(), ElementKind::Path));
        Ok(())
    }
}

/// Sorted copy of the recorded URLs
pub fn recorded(handle: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
    let mut seen = handle.lock().unwrap().clone();
    seen.sort();
    seen
}
