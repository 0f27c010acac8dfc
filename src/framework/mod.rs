//! Audit framework
//!
//! The [`Framework`] ties the pieces of an audit together. A run moves
//! through the [`FrameworkStatus`] phases:
//!
//! - `preparing`: plugins are started
//! - `crawling`: the [`Spider`] maps the site and every page it fetches is
//!   queued for auditing (skipped when crawling is disabled or
//!   `restrict-paths` is set)
//! - `auditing`: the page and URL queues are drained through the dispatcher
//! - `cleanup`: plugins are awaited, results collected and reports written
//!
//! Crawling and auditing share one [`HttpClient`], so the configured
//! concurrency cap bounds every request the run makes.

mod audit_store;
mod dispatcher;
mod module;
mod plugin;
mod session;
mod stats;
mod status;

pub use audit_store::{AuditStore, Issue, ModuleFailure, Severity, SitemapEntry};
pub use module::{applies, AuditContext, Module, ModuleInfo};
pub use plugin::{Plugin, PluginInfo};
pub use session::{FormLogin, SessionHandler};
pub use stats::Stats;
pub use status::FrameworkStatus;

use crate::config::{validate, Config};
use crate::crawler::{resolve_paths, Callback, Spider};
use crate::http::HttpClient;
use crate::output::{Report, ReportInfo, ReportRegistry};
use crate::page::Page;
use crate::state::Failure;
use crate::{ConfigError, SpindleError};
use chrono::Utc;
use dispatcher::{lock, Dispatcher};
use futures::stream::{FuturesUnordered, StreamExt};
use regex::Regex;
use stats::Progress;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Instant;
use tokio::sync::{watch, Notify};
use tokio::task::JoinSet;
use url::Url;

#[derive(Default)]
struct Queues {
    urls: VecDeque<Url>,
    pages: VecDeque<Arc<Page>>,
    url_total: usize,
    page_total: usize,
    /// Items taken off either queue and finished, whether audited or skipped
    processed: usize,
}

enum QueueItem {
    Page(Arc<Page>),
    Url(Url),
}

#[derive(Default)]
struct Lifecycle {
    status: FrameworkStatus,
    /// Phase to return to on resume
    interrupted: Option<FrameworkStatus>,
    started: Option<Instant>,
}

struct FrameworkInner {
    config: Arc<Config>,
    http: HttpClient,
    spider: Spider,
    dispatcher: Dispatcher,
    store: Arc<Mutex<AuditStore>>,
    plugins: RwLock<Vec<Arc<dyn Plugin>>>,
    reports: RwLock<ReportRegistry>,
    queues: Mutex<Queues>,
    lifecycle: Mutex<Lifecycle>,
    paused: watch::Sender<bool>,
    wake: Notify,
}

/// Audit orchestrator
///
/// Cloning is cheap; clones drive the same run. Plugins receive a clone.
///
/// # Example
///
/// ```no_run
/// use spindle::{Config, Framework};
///
/// # async fn demo() -> spindle::Result<()> {
/// let framework = Framework::new(Config::new("http://example.com/"))?;
/// let store = framework.run().await?;
/// println!("{} issues", store.issues().len());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Framework {
    inner: Arc<FrameworkInner>,
}

impl Framework {
    /// Creates a framework for `config`
    ///
    /// Fails if the configuration is invalid or names a report that does not
    /// exist or cannot be written to a file.
    pub fn new(config: Config) -> Result<Self, SpindleError> {
        validate(&config)?;

        let reports = ReportRegistry::with_defaults();
        for entry in &config.reports {
            reports.require_outfile(&entry.name)?;
        }

        let session: Option<Arc<dyn SessionHandler>> = match &config.login {
            Some(login) => Some(Arc::new(FormLogin::from_config(login)?)),
            None => None,
        };

        let config = Arc::new(config);
        let http = HttpClient::new(&config.http)?;
        let spider = Spider::with_client(Arc::clone(&config), http.clone())?;
        let store = Arc::new(Mutex::new(AuditStore::new(spider.url().to_string())));
        let dispatcher = Dispatcher::new(
            Arc::clone(&config),
            http.clone(),
            Arc::clone(&store),
            session,
        );
        let (paused, _) = watch::channel(false);

        Ok(Self {
            inner: Arc::new(FrameworkInner {
                config,
                http,
                spider,
                dispatcher,
                store,
                plugins: RwLock::new(Vec::new()),
                reports: RwLock::new(reports),
                queues: Mutex::new(Queues::default()),
                lifecycle: Mutex::new(Lifecycle::default()),
                paused,
                wake: Notify::new(),
            }),
        })
    }

    pub fn register_module<M: Module + 'static>(&self, module: M) {
        self.inner.dispatcher.register(Arc::new(module));
    }

    pub fn register_plugin<P: Plugin + 'static>(&self, plugin: P) {
        self.inner
            .plugins
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(plugin));
    }

    /// Adds a report, replacing a built-in of the same name
    pub fn register_report<R: Report + 'static>(&self, report: R) {
        self.inner
            .reports
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .register(Arc::new(report));
    }

    /// Replaces the session handler built from the `[login]` section
    pub fn set_session_handler<S: SessionHandler + 'static>(&self, handler: S) {
        self.inner.dispatcher.set_session(Arc::new(handler));
    }

    /// Registers a listener fired with every page the dispatcher accepts,
    /// before any module runs against it
    pub fn on_audit_page(&self, f: impl Fn(&Page) + Send + Sync + 'static) -> &Self {
        self.inner.dispatcher.on_audit_page(Arc::new(f));
        self
    }

    /// Registered modules, optionally only those whose name matches `filter`
    pub fn list_modules(&self, filter: Option<&str>) -> Result<Vec<ModuleInfo>, ConfigError> {
        let filter = compile_filter(filter)?;
        Ok(self
            .inner
            .dispatcher
            .modules()
            .iter()
            .map(|m| m.info())
            .filter(|info| matches_filter(filter.as_ref(), &info.name))
            .collect())
    }

    pub fn list_plugins(&self, filter: Option<&str>) -> Result<Vec<PluginInfo>, ConfigError> {
        let filter = compile_filter(filter)?;
        Ok(self
            .inner
            .plugins
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|p| p.info())
            .filter(|info| matches_filter(filter.as_ref(), &info.name))
            .collect())
    }

    pub fn list_reports(&self, filter: Option<&str>) -> Result<Vec<ReportInfo>, ConfigError> {
        let filter = compile_filter(filter)?;
        Ok(self
            .inner
            .reports
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .list()
            .into_iter()
            .filter(|info| matches_filter(filter.as_ref(), &info.name))
            .collect())
    }

    /// Queues a URL to be fetched and audited
    ///
    /// `path` is resolved against the seed URL.
    pub fn push_to_url_queue(&self, path: &str) -> Result<(), SpindleError> {
        let url = crate::url::to_absolute(path, self.inner.spider.url())?;
        {
            let mut queues = lock(&self.inner.queues);
            queues.urls.push_back(url);
            queues.url_total += 1;
        }
        self.inner.wake.notify_one();
        Ok(())
    }

    /// Queues an already fetched page for auditing
    pub fn push_to_page_queue(&self, page: impl Into<Arc<Page>>) {
        {
            let mut queues = lock(&self.inner.queues);
            queues.pages.push_back(page.into());
            queues.page_total += 1;
        }
        self.inner.wake.notify_one();
    }

    /// Number of URLs ever pushed to the URL queue
    pub fn url_queue_total_size(&self) -> usize {
        lock(&self.inner.queues).url_total
    }

    /// Number of pages ever pushed to the page queue
    pub fn page_queue_total_size(&self) -> usize {
        lock(&self.inner.queues).page_total
    }

    /// Audits `page` immediately, outside the queues
    ///
    /// Returns false if the page was skipped.
    pub async fn audit_page(&self, page: &Page) -> bool {
        self.inner.dispatcher.audit_page(page).await
    }

    /// Runs the audit to completion
    pub async fn run(&self) -> Result<AuditStore, SpindleError> {
        self.run_with(|_| {}).await
    }

    /// Like [`Framework::run`], calling `on_cleanup` once results have been
    /// collected and reports written
    ///
    /// Returns a snapshot of the final [`AuditStore`]. Running again fails
    /// with [`SpindleError::InvalidState`] until [`Framework::reset`] is
    /// called.
    pub async fn run_with<F>(&self, on_cleanup: F) -> Result<AuditStore, SpindleError>
    where
        F: FnOnce(&Framework) + Send,
    {
        {
            let mut lifecycle = lock(&self.inner.lifecycle);
            if lifecycle.status != FrameworkStatus::Ready {
                return Err(SpindleError::InvalidState(format!(
                    "framework is {}, not ready",
                    lifecycle.status
                )));
            }
            lifecycle.status = FrameworkStatus::Preparing;
            lifecycle.started = Some(Instant::now());
        }
        tracing::info!("Preparing audit of {}", self.inner.spider.url());

        let mut plugins = JoinSet::new();
        for plugin in self.plugins() {
            let framework = self.clone();
            plugins.spawn(async move {
                let name = plugin.name().to_string();
                tracing::debug!("Starting plugin {}", name);
                (name, plugin.run(framework).await)
            });
        }

        let scope = &self.inner.config.scope;
        if !scope.restrict_paths.is_empty() {
            tracing::info!(
                "Auditing {} restricted paths without crawling",
                scope.restrict_paths.len()
            );
            let urls = resolve_paths(&scope.restrict_paths, self.inner.spider.url())?;
            let mut queues = lock(&self.inner.queues);
            queues.url_total += urls.len();
            queues.urls.extend(urls);
        } else if scope.crawl {
            self.enter(FrameworkStatus::Crawling);
            let framework = self.clone();
            let sitemap = self
                .inner
                .spider
                .run_with(Callback::page(move |page| {
                    framework.push_to_page_queue(Arc::clone(page))
                }))
                .await;
            tracing::info!(
                "Crawl finished with {} URLs",
                sitemap.map(|s| s.len()).unwrap_or_default()
            );
        } else {
            tracing::info!("Crawling disabled, auditing queued items only");
        }

        self.enter(FrameworkStatus::Auditing);
        self.drain_queues().await;

        self.enter(FrameworkStatus::Cleanup);
        let results = collect_plugins(plugins).await;
        let sitemap = self.sitemap();
        let failures = self.failures();
        {
            let mut store = lock(&self.inner.store);
            store.plugins.extend(results);
            store.sitemap = sitemap
                .into_iter()
                .map(|(url, code)| SitemapEntry { url, code })
                .collect();
            store.failures = failures;
            store.finished_at = Some(Utc::now());
        }
        self.write_reports();
        on_cleanup(self);

        self.enter(FrameworkStatus::Done);
        tracing::info!("Audit of {} done", self.inner.spider.url());
        Ok(self.audit_store())
    }

    /// Clears queues, results and crawl state so the framework can run again
    ///
    /// Registered modules, plugins, reports and listeners are kept. Fails
    /// with [`SpindleError::InvalidState`] while a run is in progress.
    pub fn reset(&self) -> Result<(), SpindleError> {
        {
            let mut lifecycle = lock(&self.inner.lifecycle);
            if !matches!(
                lifecycle.status,
                FrameworkStatus::Ready | FrameworkStatus::Done
            ) {
                return Err(SpindleError::InvalidState(format!(
                    "cannot reset while {}",
                    lifecycle.status
                )));
            }
            *lifecycle = Lifecycle::default();
        }

        *lock(&self.inner.queues) = Queues::default();
        self.inner.dispatcher.reset();
        self.inner.spider.reset();
        {
            let mut store = lock(&self.inner.store);
            let config_hash = store.config_hash.take();
            *store = AuditStore::new(self.inner.spider.url().to_string());
            store.config_hash = config_hash;
        }
        self.inner.paused.send_replace(false);

        tracing::info!("Framework reset");
        Ok(())
    }

    /// Pauses crawling and auditing
    ///
    /// Requests already in flight complete. Returns false if the framework
    /// is not in a phase that can be paused.
    pub fn pause(&self) -> bool {
        {
            let mut lifecycle = lock(&self.inner.lifecycle);
            if !lifecycle.status.is_pausable() {
                tracing::debug!("Cannot pause while {}", lifecycle.status);
                return false;
            }
            lifecycle.interrupted = Some(lifecycle.status);
            lifecycle.status = FrameworkStatus::Paused;
        }
        self.inner.spider.pause();
        self.inner.paused.send_replace(true);
        tracing::info!("Framework paused");
        true
    }

    pub fn resume(&self) {
        {
            let mut lifecycle = lock(&self.inner.lifecycle);
            if let Some(phase) = lifecycle.interrupted.take() {
                lifecycle.status = phase;
            }
        }
        self.inner.spider.resume();
        self.inner.paused.send_replace(false);
        self.inner.wake.notify_one();
        tracing::info!("Framework resumed");
    }

    pub fn status(&self) -> FrameworkStatus {
        lock(&self.inner.lifecycle).status
    }

    pub fn is_paused(&self) -> bool {
        self.status() == FrameworkStatus::Paused
    }

    /// Visited URLs with their status codes, crawled and queued
    pub fn sitemap(&self) -> Vec<(String, u16)> {
        let mut seen = HashSet::new();
        self.inner
            .spider
            .fancy_sitemap()
            .into_iter()
            .chain(self.inner.dispatcher.sitemap_entries())
            .filter(|(url, _)| seen.insert(url.clone()))
            .collect()
    }

    /// URLs that failed while crawling or auditing
    pub fn failures(&self) -> Vec<Failure> {
        let mut failures = self.inner.spider.failure_log();
        failures.extend(self.inner.dispatcher.failures());
        failures
    }

    /// Snapshot of the results gathered so far
    pub fn audit_store(&self) -> AuditStore {
        lock(&self.inner.store).clone()
    }

    /// Records the hash of the configuration file the run was started from
    pub fn set_config_hash(&self, hash: impl Into<String>) {
        lock(&self.inner.store).config_hash = Some(hash.into());
    }

    pub fn stats(&self) -> Stats {
        let (queued_total, processed, started) = {
            let queues = lock(&self.inner.queues);
            let lifecycle = lock(&self.inner.lifecycle);
            (
                queues.url_total + queues.page_total,
                queues.processed,
                lifecycle.started,
            )
        };

        Stats::compute(
            self.inner.http.stats(),
            Progress {
                status: self.status(),
                elapsed: started.map(|s| s.elapsed()).unwrap_or_default(),
                sitemap_size: self.sitemap().len(),
                audited: self.inner.dispatcher.audited(),
                processed,
                queued_total,
                current_page: self.inner.dispatcher.current_page(),
            },
        )
    }

    /// Renders the current results with the named report
    pub fn render_report(&self, name: &str) -> Result<String, SpindleError> {
        let report = self.reports().require(name)?;
        report.render(&self.audit_store())
    }

    /// Writes the current results to `outfile` with the named report
    ///
    /// Fails with [`SpindleError::UnknownReport`] if no such report is
    /// registered and [`SpindleError::ReportCapability`] if it cannot be
    /// written to a file.
    pub fn report_as(&self, name: &str, outfile: impl AsRef<Path>) -> Result<(), SpindleError> {
        let report = self.reports().require_outfile(name)?;
        let rendered = report.render(&self.audit_store())?;
        std::fs::write(outfile.as_ref(), rendered)?;
        tracing::info!("Wrote {} report to {}", name, outfile.as_ref().display());
        Ok(())
    }

    pub fn spider(&self) -> &Spider {
        &self.inner.spider
    }

    pub fn http(&self) -> &HttpClient {
        &self.inner.http
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    fn plugins(&self) -> Vec<Arc<dyn Plugin>> {
        self.inner
            .plugins
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn reports(&self) -> ReportRegistry {
        self.inner
            .reports
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Moves to `phase`, or makes it the phase to resume into while paused
    fn enter(&self, phase: FrameworkStatus) {
        let mut lifecycle = lock(&self.inner.lifecycle);
        if lifecycle.status == FrameworkStatus::Paused {
            lifecycle.interrupted = Some(phase);
        } else {
            lifecycle.status = phase;
        }
        tracing::info!("Framework {}", phase);
    }

    fn next_item(&self) -> Option<QueueItem> {
        let mut queues = lock(&self.inner.queues);
        if let Some(page) = queues.pages.pop_front() {
            return Some(QueueItem::Page(page));
        }
        queues.urls.pop_front().map(QueueItem::Url)
    }

    fn queues_empty(&self) -> bool {
        let queues = lock(&self.inner.queues);
        queues.pages.is_empty() && queues.urls.is_empty()
    }

    async fn audit_item(&self, item: QueueItem) {
        match item {
            QueueItem::Page(page) => {
                self.inner.dispatcher.audit_page(&page).await;
            }
            QueueItem::Url(url) => {
                if let Some(page) = self.inner.dispatcher.fetch_page(&url).await {
                    self.inner.dispatcher.audit_page(&page).await;
                }
            }
        }
        lock(&self.inner.queues).processed += 1;
    }

    /// Audits queued items until both queues are empty
    async fn drain_queues(&self) {
        let max = self.inner.http.max_concurrency();
        let mut in_flight = FuturesUnordered::new();
        let mut paused_rx = self.inner.paused.subscribe();

        loop {
            let paused = *paused_rx.borrow_and_update();

            if !paused {
                while in_flight.len() < max {
                    let Some(item) = self.next_item() else {
                        break;
                    };
                    let framework = self.clone();
                    in_flight.push(async move { framework.audit_item(item).await });
                }
            }

            if in_flight.is_empty() {
                if !paused && self.queues_empty() {
                    break;
                }
                tokio::select! {
                    _ = paused_rx.changed() => {}
                    _ = self.inner.wake.notified() => {}
                }
                continue;
            }

            tokio::select! {
                Some(()) = in_flight.next() => {}
                _ = paused_rx.changed() => {}
                _ = self.inner.wake.notified() => {}
            }
        }
    }

    /// Writes every `[[report]]` entry; failures are logged
    fn write_reports(&self) {
        for entry in &self.inner.config.reports {
            if let Err(e) = self.report_as(&entry.name, &entry.outfile) {
                tracing::error!(
                    "Failed to write {} report to {}: {}",
                    entry.name,
                    entry.outfile,
                    e
                );
            }
        }
    }
}

async fn collect_plugins(
    mut plugins: JoinSet<(String, anyhow::Result<serde_json::Value>)>,
) -> BTreeMap<String, serde_json::Value> {
    let mut results = BTreeMap::new();
    while let Some(joined) = plugins.join_next().await {
        match joined {
            Ok((name, Ok(value))) => {
                results.insert(name, value);
            }
            Ok((name, Err(e))) => tracing::warn!("Plugin {} failed: {:#}", name, e),
            Err(e) => tracing::warn!("Plugin task failed: {}", e),
        }
    }
    results
}

fn compile_filter(filter: Option<&str>) -> Result<Option<Regex>, ConfigError> {
    filter
        .map(|pattern| {
            Regex::new(pattern).map_err(|e| ConfigError::InvalidPattern {
                pattern: pattern.to_string(),
                message: e.to_string(),
            })
        })
        .transpose()
}

fn matches_filter(filter: Option<&Regex>, name: &str) -> bool {
    filter.map_or(true, |re| re.is_match(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Named(&'static str);

    #[async_trait]
    impl Module for Named {
        fn info(&self) -> ModuleInfo {
            ModuleInfo::new(self.0, "does nothing")
        }

        async fn run(&self, _page: &Page, _ctx: &AuditContext) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn framework() -> Framework {
        let mut config = Config::new("http://example.com/");
        config.scope.crawl = false;
        Framework::new(config).unwrap()
    }

    #[test]
    fn test_unknown_configured_report_rejected() {
        let mut config = Config::new("http://example.com/");
        config.reports.push(crate::config::ReportEntry {
            name: "pdf".to_string(),
            outfile: "out.pdf".to_string(),
        });
        assert!(matches!(
            Framework::new(config),
            Err(SpindleError::UnknownReport(_))
        ));
    }

    #[test]
    fn test_list_modules_filter() {
        let framework = framework();
        framework.register_module(Named("xss"));
        framework.register_module(Named("sqli"));
        framework.register_module(Named("xss_path"));

        let names: Vec<String> = framework
            .list_modules(Some("^xss"))
            .unwrap()
            .into_iter()
            .map(|m| m.name)
            .collect();
        assert_eq!(names, vec!["xss", "xss_path"]);
        assert_eq!(framework.list_modules(None).unwrap().len(), 3);
        assert!(framework.list_modules(Some("(")).is_err());
    }

    #[test]
    fn test_queue_totals() {
        let framework = framework();
        framework.push_to_url_queue("/a").unwrap();
        framework.push_to_url_queue("b?x=1").unwrap();
        framework.push_to_page_queue(
            Page::builder(Url::parse("http://example.com/c").unwrap()).build(),
        );

        assert_eq!(framework.url_queue_total_size(), 2);
        assert_eq!(framework.page_queue_total_size(), 1);
    }

    #[test]
    fn test_pause_outside_pausable_phase() {
        let framework = framework();
        assert!(!framework.pause());
        assert_eq!(framework.status(), FrameworkStatus::Ready);
    }

    #[tokio::test]
    async fn test_skipped_items_count_towards_progress() {
        let mut config = Config::new("http://127.0.0.1:1/");
        config.scope.crawl = false;
        config.scope.exclude_binaries = true;
        config.http.max_retries = 1;
        let framework = Framework::new(config).unwrap();

        framework.push_to_url_queue("/unreachable").unwrap();
        framework.push_to_page_queue(
            Page::builder(Url::parse("http://127.0.0.1:1/logo.png").unwrap())
                .content_type("image/png")
                .build(),
        );
        while let Some(item) = framework.next_item() {
            framework.audit_item(item).await;
        }

        let stats = framework.stats();
        assert_eq!(stats.status, FrameworkStatus::Ready);
        assert_eq!(stats.auditmap_size, 0);
        assert_eq!(stats.progress, 100.0);
    }

    #[tokio::test]
    async fn test_reset_allows_another_run() {
        let framework = framework();
        framework.push_to_page_queue(
            Page::builder(Url::parse("http://example.com/c").unwrap()).build(),
        );
        framework.set_config_hash("abc");
        framework.run().await.unwrap();

        framework.reset().unwrap();
        assert_eq!(framework.status(), FrameworkStatus::Ready);
        assert_eq!(framework.page_queue_total_size(), 0);
        assert_eq!(framework.stats().auditmap_size, 0);
        let store = framework.audit_store();
        assert!(store.finished_at.is_none());
        assert_eq!(store.config_hash.as_deref(), Some("abc"));

        let store = framework.run().await.unwrap();
        assert!(store.finished_at.is_some());
        assert_eq!(framework.status(), FrameworkStatus::Done);
    }

    #[tokio::test]
    async fn test_run_twice_fails() {
        let framework = framework();
        let store = framework.run().await.unwrap();
        assert!(store.finished_at.is_some());
        assert_eq!(framework.status(), FrameworkStatus::Done);
        assert!(matches!(
            framework.run().await,
            Err(SpindleError::InvalidState(_))
        ));
    }
}
