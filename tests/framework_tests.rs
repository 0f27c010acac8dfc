//! Integration tests for the audit framework
//!
//! Each test runs a complete framework lifecycle against a wiremock server.

mod common;

use async_trait::async_trait;
use common::{create_test_config, mount_html, mount_links, recorded, url_for, Recorder};
use spindle::config::{LoginConfig, ReportEntry};
use spindle::framework::{AuditContext, Module, ModuleInfo, Plugin};
use spindle::{ElementKind, FailureKind, Framework, FrameworkStatus, Page, SpindleError};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use url::Url;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FORM_PAGE: &str = r#"<html><body>
    <form action="/plain" method="post"><input name="q"></form>
    <a href="/plain">plain</a>
</body></html>"#;

struct Failing;

#[async_trait]
impl Module for Failing {
    fn info(&self) -> ModuleInfo {
        ModuleInfo::new("failing", "always errors")
    }

    async fn run(&self, _page: &Page, _ctx: &AuditContext) -> anyhow::Result<()> {
        anyhow::bail!("payload rejected")
    }
}

/// Blocks on its first page until released
struct Gate {
    started: Arc<AtomicUsize>,
    release: Arc<Notify>,
}

#[async_trait]
impl Module for Gate {
    fn info(&self) -> ModuleInfo {
        ModuleInfo::new("gate", "holds the first page")
    }

    async fn run(&self, _page: &Page, _ctx: &AuditContext) -> anyhow::Result<()> {
        if self.started.fetch_add(1, Ordering::SeqCst) == 0 {
            self.release.notified().await;
        }
        Ok(())
    }
}

struct SeedPlugin;

#[async_trait]
impl Plugin for SeedPlugin {
    fn name(&self) -> &str {
        "seed"
    }

    async fn run(&self, framework: Framework) -> anyhow::Result<serde_json::Value> {
        Ok(serde_json::json!({ "url": framework.config().url }))
    }
}

struct BrokenPlugin;

#[async_trait]
impl Plugin for BrokenPlugin {
    fn name(&self) -> &str {
        "broken"
    }

    async fn run(&self, _framework: Framework) -> anyhow::Result<serde_json::Value> {
        anyhow::bail!("plugin gave up")
    }
}

fn page_at(server: &MockServer, route: &str) -> Page {
    Page::builder(Url::parse(&url_for(server, route)).unwrap())
        .body("<html><body>manual</body></html>")
        .content_type("text/html")
        .build()
}

#[tokio::test]
async fn test_crawled_pages_are_audited() {
    let server = MockServer::start().await;
    mount_links(&server, "/", &["/a", "/b"]).await;
    mount_html(&server, "/a", "a").await;
    mount_html(&server, "/b", "b").await;

    let framework = Framework::new(create_test_config(&server)).unwrap();
    let recorder = Recorder::new("recorder", &[]);
    let seen = recorder.handle();
    framework.register_module(recorder);

    let store = framework.run().await.unwrap();

    assert_eq!(framework.status(), FrameworkStatus::Done);
    assert_eq!(
        recorded(&seen),
        vec![
            url_for(&server, "/"),
            url_for(&server, "/a"),
            url_for(&server, "/b"),
        ]
    );
    assert_eq!(store.issues().len(), 3);
    assert!(store.issues().iter().all(|i| i.module == "recorder"));
    assert_eq!(store.sitemap.len(), 3);
    assert_eq!(framework.page_queue_total_size(), 3);
    assert!(store.finished_at.is_some());
}

#[tokio::test]
async fn test_form_module_skips_pages_without_forms() {
    let server = MockServer::start().await;
    mount_html(&server, "/", FORM_PAGE).await;
    mount_html(&server, "/plain", "<html><body>nothing here</body></html>").await;

    let framework = Framework::new(create_test_config(&server)).unwrap();
    let forms = Recorder::new("forms", &[ElementKind::Form]);
    let form_pages = forms.handle();
    let any = Recorder::new("any", &[]);
    let any_pages = any.handle();
    framework.register_module(forms);
    framework.register_module(any);

    framework.run().await.unwrap();

    assert_eq!(recorded(&form_pages), vec![url_for(&server, "/")]);
    assert_eq!(recorded(&any_pages).len(), 2);
}

#[tokio::test]
async fn test_disabled_element_audit_skips_module() {
    let server = MockServer::start().await;
    mount_html(&server, "/", FORM_PAGE).await;
    mount_html(&server, "/plain", "plain").await;

    let mut config = create_test_config(&server);
    config.audit.forms = false;

    let framework = Framework::new(config).unwrap();
    let forms = Recorder::new("forms", &[ElementKind::Form]);
    let form_pages = forms.handle();
    framework.register_module(forms);

    framework.run().await.unwrap();

    assert!(recorded(&form_pages).is_empty());
}

#[tokio::test]
async fn test_restrict_paths_replace_crawl() {
    let server = MockServer::start().await;
    mount_links(&server, "/a", &["/c"]).await;
    mount_html(&server, "/b", "b").await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/c"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut config = create_test_config(&server);
    config.scope.restrict_paths = vec!["/a".to_string(), "/b".to_string()];

    let framework = Framework::new(config).unwrap();
    let recorder = Recorder::new("recorder", &[]);
    let seen = recorder.handle();
    framework.register_module(recorder);

    let store = framework.run().await.unwrap();

    assert_eq!(
        recorded(&seen),
        vec![url_for(&server, "/a"), url_for(&server, "/b")]
    );
    assert_eq!(framework.url_queue_total_size(), 2);
    assert_eq!(store.sitemap.len(), 2);
}

#[tokio::test]
async fn test_crawl_disabled_audits_queued_items_only() {
    let server = MockServer::start().await;
    mount_html(&server, "/queued", "queued").await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut config = create_test_config(&server);
    config.scope.crawl = false;

    let framework = Framework::new(config).unwrap();
    let recorder = Recorder::new("recorder", &[]);
    let seen = recorder.handle();
    framework.register_module(recorder);
    framework.push_to_url_queue("/queued").unwrap();
    framework.push_to_page_queue(page_at(&server, "/manual"));

    framework.run().await.unwrap();

    assert_eq!(
        recorded(&seen),
        vec![url_for(&server, "/manual"), url_for(&server, "/queued")]
    );
    assert!(framework.spider().sitemap().is_empty());
}

#[tokio::test]
async fn test_queued_url_failures_recorded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(502))
        .expect(2)
        .mount(&server)
        .await;

    let mut config = create_test_config(&server);
    config.scope.crawl = false;

    let framework = Framework::new(config).unwrap();
    framework.push_to_url_queue("/down").unwrap();

    let store = framework.run().await.unwrap();

    assert_eq!(store.failures.len(), 1);
    assert_eq!(store.failures[0].url, url_for(&server, "/down"));
    assert_eq!(store.failures[0].kind, FailureKind::Server);
}

#[tokio::test]
async fn test_module_failure_is_not_fatal() {
    let server = MockServer::start().await;
    mount_links(&server, "/", &["/a"]).await;
    mount_html(&server, "/a", "a").await;

    let framework = Framework::new(create_test_config(&server)).unwrap();
    framework.register_module(Failing);
    let recorder = Recorder::new("recorder", &[]);
    let seen = recorder.handle();
    framework.register_module(recorder);

    let store = framework.run().await.unwrap();

    assert_eq!(recorded(&seen).len(), 2);
    assert_eq!(store.module_failures.len(), 2);
    assert!(store
        .module_failures
        .iter()
        .all(|f| f.module == "failing" && f.message.contains("payload rejected")));
    assert_eq!(framework.status(), FrameworkStatus::Done);
}

#[tokio::test]
async fn test_binary_pages_not_audited() {
    let server = MockServer::start().await;
    mount_links(&server, "/", &["/logo.png"]).await;
    Mock::given(method("GET"))
        .and(path("/logo.png"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![0x89, b'P', b'N', b'G'], "image/png"))
        .mount(&server)
        .await;

    let mut config = create_test_config(&server);
    config.scope.exclude_binaries = true;

    let framework = Framework::new(config).unwrap();
    let recorder = Recorder::new("recorder", &[]);
    let seen = recorder.handle();
    framework.register_module(recorder);

    let store = framework.run().await.unwrap();

    assert_eq!(recorded(&seen), vec![url_for(&server, "/")]);
    assert_eq!(store.sitemap.len(), 2);
}

#[tokio::test]
async fn test_session_restored_by_login() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/check"))
        .respond_with(ResponseTemplate::new(200).set_body_string("please sign in"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/check"))
        .respond_with(ResponseTemplate::new(200).set_body_string("welcome back, admin"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .and(body_string_contains("user=admin"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = create_test_config(&server);
    config.scope.crawl = false;
    config.login = Some(LoginConfig {
        url: url_for(&server, "/login"),
        params: BTreeMap::from([("user".to_string(), "admin".to_string())]),
        check_url: url_for(&server, "/check"),
        check_pattern: "welcome".to_string(),
    });

    let framework = Framework::new(config).unwrap();
    let recorder = Recorder::new("recorder", &[]);
    let seen = recorder.handle();
    framework.register_module(recorder);
    framework.push_to_page_queue(page_at(&server, "/one"));
    framework.push_to_page_queue(page_at(&server, "/two"));

    let store = framework.run().await.unwrap();

    assert_eq!(recorded(&seen).len(), 2);
    assert!(store.failures.is_empty());
}

#[tokio::test]
async fn test_failed_login_skips_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/check"))
        .respond_with(ResponseTemplate::new(200).set_body_string("please sign in"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(200))
        .expect(3)
        .mount(&server)
        .await;

    let mut config = create_test_config(&server);
    config.scope.crawl = false;
    config.http.max_retries = 3;
    config.login = Some(LoginConfig {
        url: url_for(&server, "/login"),
        params: BTreeMap::new(),
        check_url: url_for(&server, "/check"),
        check_pattern: "welcome".to_string(),
    });

    let framework = Framework::new(config).unwrap();
    let recorder = Recorder::new("recorder", &[]);
    let seen = recorder.handle();
    framework.register_module(recorder);
    framework.push_to_page_queue(page_at(&server, "/private"));

    let store = framework.run().await.unwrap();

    assert!(recorded(&seen).is_empty());
    assert_eq!(store.failures.len(), 1);
    assert_eq!(store.failures[0].kind, FailureKind::Authentication);
    assert!(store.failures[0].reason.contains("after 3 attempts"));
    assert_eq!(framework.status(), FrameworkStatus::Done);
}

#[tokio::test]
async fn test_reset_then_run_again_notifies_listeners() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(common::links_page(&["/a"]), "text/html"),
        )
        .expect(2)
        .mount(&server)
        .await;
    mount_html(&server, "/a", "a").await;

    let framework = Framework::new(create_test_config(&server)).unwrap();
    let calls = Arc::new(Mutex::new(Vec::new()));
    for tag in ["first", "second"] {
        let calls = Arc::clone(&calls);
        framework.on_audit_page(move |page| {
            calls.lock().unwrap().push((tag, page.url().to_string()));
        });
    }

    let store = framework.run().await.unwrap();
    assert_eq!(store.sitemap.len(), 2);
    assert!(framework.reset().is_ok());
    assert_eq!(framework.status(), FrameworkStatus::Ready);
    assert!(framework.sitemap().is_empty());
    assert_eq!(framework.page_queue_total_size(), 0);

    let store = framework.run().await.unwrap();
    assert_eq!(store.sitemap.len(), 2);
    assert_eq!(framework.page_queue_total_size(), 2);

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 8);
    for pair in calls.chunks(2) {
        assert_eq!(pair[0].0, "first");
        assert_eq!(pair[1].0, "second");
        assert_eq!(pair[0].1, pair[1].1);
    }
}

#[tokio::test]
async fn test_plugin_results_stored() {
    let server = MockServer::start().await;
    mount_html(&server, "/", "root").await;

    let framework = Framework::new(create_test_config(&server)).unwrap();
    framework.register_plugin(SeedPlugin);
    framework.register_plugin(BrokenPlugin);

    let store = framework.run().await.unwrap();

    assert_eq!(store.plugins.len(), 1);
    assert_eq!(store.plugins["seed"]["url"], url_for(&server, "/"));
    assert_eq!(framework.list_plugins(None).unwrap().len(), 2);
}

#[tokio::test]
async fn test_on_cleanup_runs_during_cleanup() {
    let server = MockServer::start().await;
    mount_html(&server, "/", "root").await;

    let framework = Framework::new(create_test_config(&server)).unwrap();
    let observed = Arc::new(Mutex::new(None));

    let o = Arc::clone(&observed);
    framework
        .run_with(move |fw| {
            *o.lock().unwrap() = Some((fw.status(), fw.audit_store().finished_at.is_some()));
        })
        .await
        .unwrap();

    assert_eq!(
        *observed.lock().unwrap(),
        Some((FrameworkStatus::Cleanup, true))
    );
    assert_eq!(framework.status(), FrameworkStatus::Done);
}

#[tokio::test]
async fn test_report_lookup_errors() {
    let server = MockServer::start().await;
    let framework = Framework::new(create_test_config(&server)).unwrap();
    let dir = tempfile::tempdir().unwrap();

    assert!(matches!(
        framework.report_as("pdf", dir.path().join("out.pdf")),
        Err(SpindleError::UnknownReport(name)) if name == "pdf"
    ));
    assert!(matches!(
        framework.report_as("stdout", dir.path().join("out.txt")),
        Err(SpindleError::ReportCapability { name, capability })
            if name == "stdout" && capability == "outfile"
    ));
    assert!(!dir.path().join("out.txt").exists());
    assert!(framework.render_report("stdout").is_ok());
}

#[tokio::test]
async fn test_report_as_writes_file() {
    let server = MockServer::start().await;
    mount_html(&server, "/", "root").await;

    let framework = Framework::new(create_test_config(&server)).unwrap();
    framework.register_module(Recorder::new("recorder", &[]));
    framework.run().await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let outfile = dir.path().join("report.json");
    framework.report_as("json", &outfile).unwrap();

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&outfile).unwrap()).unwrap();
    assert_eq!(json["issues"].as_array().unwrap().len(), 1);
    assert_eq!(json["sitemap"][0]["code"], 200);
}

#[tokio::test]
async fn test_configured_reports_written_on_cleanup() {
    let server = MockServer::start().await;
    mount_html(&server, "/", "root").await;
    let dir = tempfile::tempdir().unwrap();
    let outfile = dir.path().join("summary.md");

    let mut config = create_test_config(&server);
    config.reports.push(ReportEntry {
        name: "markdown".to_string(),
        outfile: outfile.to_string_lossy().into_owned(),
    });

    let framework = Framework::new(config).unwrap();
    framework.set_config_hash("abc123");
    framework.run().await.unwrap();

    let markdown = std::fs::read_to_string(&outfile).unwrap();
    assert!(markdown.contains("# Spindle Audit Report"));
    assert!(markdown.contains("abc123"));
}

#[tokio::test]
async fn test_configured_stdout_report_rejected() {
    let server = MockServer::start().await;
    let mut config = create_test_config(&server);
    config.reports.push(ReportEntry {
        name: "stdout".to_string(),
        outfile: "out.txt".to_string(),
    });

    assert!(matches!(
        Framework::new(config),
        Err(SpindleError::ReportCapability { .. })
    ));
}

#[tokio::test]
async fn test_pause_holds_audit_queue() {
    let server = MockServer::start().await;

    let mut config = create_test_config(&server);
    config.scope.crawl = false;
    config.http.max_concurrency = 1;

    let started = Arc::new(AtomicUsize::new(0));
    let release = Arc::new(Notify::new());

    let framework = Framework::new(config).unwrap();
    framework.register_module(Gate {
        started: Arc::clone(&started),
        release: Arc::clone(&release),
    });
    for route in ["/1", "/2", "/3"] {
        framework.push_to_page_queue(page_at(&server, route));
    }

    let run = {
        let framework = framework.clone();
        tokio::spawn(async move { framework.run().await })
    };

    tokio::time::timeout(Duration::from_secs(5), async {
        while started.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("first page reaches the module");

    assert!(framework.pause());
    assert!(framework.is_paused());
    release.notify_one();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(started.load(Ordering::SeqCst), 1);
    assert_eq!(framework.status(), FrameworkStatus::Paused);

    framework.resume();
    assert_eq!(framework.status(), FrameworkStatus::Auditing);

    let store = tokio::time::timeout(Duration::from_secs(10), run)
        .await
        .expect("audit finishes after resume")
        .unwrap()
        .unwrap();

    assert_eq!(started.load(Ordering::SeqCst), 3);
    assert!(store.finished_at.is_some());
    assert_eq!(framework.stats().auditmap_size, 3);
}

#[tokio::test]
async fn test_stats_after_run() {
    let server = MockServer::start().await;
    mount_links(&server, "/", &["/a"]).await;
    mount_html(&server, "/a", "a").await;

    let framework = Framework::new(create_test_config(&server)).unwrap();
    framework.register_module(Recorder::new("recorder", &[]));
    framework.run().await.unwrap();

    let stats = framework.stats();
    assert_eq!(stats.status, FrameworkStatus::Done);
    assert_eq!(stats.requests, 2);
    assert_eq!(stats.responses, 2);
    assert_eq!(stats.sitemap_size, 2);
    assert_eq!(stats.auditmap_size, 2);
    assert_eq!(stats.progress, 100.0);
    assert!(stats.current_page.is_some());
}
