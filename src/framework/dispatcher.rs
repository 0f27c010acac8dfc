//! Audit dispatch
//!
//! The [`Dispatcher`] takes one page at a time, works out which registered
//! modules apply to it and runs them in registration order. A module that
//! errors or panics is recorded and skipped; the page carries on through the
//! remaining modules.

use crate::config::Config;
use crate::crawler::{fetch_with_retry, FetchOutcome, RetryPolicy};
use crate::framework::audit_store::{AuditStore, ModuleFailure};
use crate::framework::module::{applies, AuditContext, Module};
use crate::framework::session::{ensure_session, SessionHandler};
use crate::http::HttpClient;
use crate::page::Page;
use crate::state::{Failure, FailureLog, Sitemap};
use crate::FailureKind;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use url::Url;

type AuditObserver = Arc<dyn Fn(&Page) + Send + Sync>;

pub(crate) struct Dispatcher {
    config: Arc<Config>,
    http: HttpClient,
    retry: RetryPolicy,
    modules: RwLock<Vec<Arc<dyn Module>>>,
    observers: RwLock<Vec<AuditObserver>>,
    session: RwLock<Option<Arc<dyn SessionHandler>>>,
    store: Arc<Mutex<AuditStore>>,
    /// URLs fetched from the URL queue
    sitemap: Mutex<Sitemap>,
    failures: Mutex<FailureLog>,
    audited: AtomicUsize,
    current_page: Mutex<Option<String>>,
}

impl Dispatcher {
    pub(crate) fn new(
        config: Arc<Config>,
        http: HttpClient,
        store: Arc<Mutex<AuditStore>>,
        session: Option<Arc<dyn SessionHandler>>,
    ) -> Self {
        Self {
            retry: RetryPolicy::from_config(&config.http),
            config,
            http,
            modules: RwLock::new(Vec::new()),
            observers: RwLock::new(Vec::new()),
            session: RwLock::new(session),
            store,
            sitemap: Mutex::new(Sitemap::new()),
            failures: Mutex::new(FailureLog::new()),
            audited: AtomicUsize::new(0),
            current_page: Mutex::new(None),
        }
    }

    pub(crate) fn register(&self, module: Arc<dyn Module>) {
        self.modules
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(module);
    }

    pub(crate) fn modules(&self) -> Vec<Arc<dyn Module>> {
        self.modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn on_audit_page(&self, f: AuditObserver) {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(f);
    }

    /// Forgets fetched URLs, failures and the audited count
    pub(crate) fn reset(&self) {
        lock(&self.sitemap).clear();
        lock(&self.failures).clear();
        *lock(&self.current_page) = None;
        self.audited.store(0, Ordering::Relaxed);
    }

    pub(crate) fn set_session(&self, handler: Arc<dyn SessionHandler>) {
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = Some(handler);
    }

    /// Modules that apply to `page`, in registration order
    pub(crate) fn applicable(&self, page: &Page) -> Vec<Arc<dyn Module>> {
        self.modules()
            .into_iter()
            .filter(|m| applies(&m.info(), page, &self.config.audit))
            .collect()
    }

    /// Fetches a queued URL into a page, recording failures
    pub(crate) async fn fetch_page(&self, url: &Url) -> Option<Page> {
        match fetch_with_retry(&self.http, url, self.retry).await {
            FetchOutcome::Response(response) => {
                lock(&self.sitemap).insert(url.to_string(), response.status);
                Some(Page::from_response(&response))
            }
            FetchOutcome::Failed(failure) => {
                lock(&self.failures).record(failure);
                None
            }
        }
    }

    /// Runs every applicable module against `page`
    ///
    /// Returns false if the page was skipped, either because it is binary
    /// and binaries are excluded or because the session could not be
    /// restored.
    pub(crate) async fn audit_page(&self, page: &Page) -> bool {
        if self.config.scope.exclude_binaries && page.is_binary() {
            tracing::debug!("Skipping binary page {}", page.url());
            return false;
        }

        let session = self
            .session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(handler) = session {
            if let Err(e) = ensure_session(handler.as_ref(), &self.http, self.retry).await {
                tracing::warn!("Not auditing {}: {:#}", page.url(), e);
                lock(&self.failures).record(Failure {
                    url: page.url().to_string(),
                    kind: FailureKind::Authentication,
                    reason: format!("{:#}", e),
                });
                return false;
            }
        }

        *lock(&self.current_page) = Some(page.url().to_string());

        let observers = self
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for observer in &observers {
            observer(page);
        }

        let modules = self.applicable(page);
        tracing::debug!("Auditing {} with {} modules", page.url(), modules.len());

        for module in modules {
            let name = module.info().name;
            let ctx = AuditContext::new(name.clone(), self.http.clone(), Arc::clone(&self.store));

            let message = match AssertUnwindSafe(module.run(page, &ctx)).catch_unwind().await {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => format!("{:#}", e),
                Err(panic) => format!("panicked: {}", panic_message(panic.as_ref())),
            };

            tracing::warn!("Module {} failed on {}: {}", name, page.url(), message);
            lock(&self.store).module_failures.push(ModuleFailure {
                module: name,
                url: page.url().to_string(),
                message,
            });
        }

        self.audited.fetch_add(1, Ordering::Relaxed);
        true
    }

    pub(crate) fn audited(&self) -> usize {
        self.audited.load(Ordering::Relaxed)
    }

    pub(crate) fn current_page(&self) -> Option<String> {
        lock(&self.current_page).clone()
    }

    pub(crate) fn sitemap_entries(&self) -> Vec<(String, u16)> {
        lock(&self.sitemap).entries().to_vec()
    }

    pub(crate) fn failures(&self) -> Vec<Failure> {
        lock(&self.failures).entries().to_vec()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framework::module::ModuleInfo;
    use crate::framework::audit_store::Issue;
    use crate::page::ElementKind;
    use async_trait::async_trait;

    struct Logger;

    #[async_trait]
    impl Module for Logger {
        fn info(&self) -> ModuleInfo {
            ModuleInfo::new("logger", "logs one issue per page")
        }

        async fn run(&self, page: &Page, ctx: &AuditContext) -> anyhow::Result<()> {
            ctx.log_issue(Issue::new("seen", page.url().as_str(), ElementKind::Path));
            Ok(())
        }
    }

    struct Panics;

    #[async_trait]
    impl Module for Panics {
        fn info(&self) -> ModuleInfo {
            ModuleInfo::new("panics", "always panics")
        }

        async fn run(&self, _page: &Page, _ctx: &AuditContext) -> anyhow::Result<()> {
            panic!("boom");
        }
    }

    fn dispatcher(config: Config) -> Dispatcher {
        let http = HttpClient::new(&config.http).unwrap();
        let store = Arc::new(Mutex::new(AuditStore::new(config.url.clone())));
        Dispatcher::new(Arc::new(config), http, store, None)
    }

    fn page() -> Page {
        Page::builder(Url::parse("http://example.com/").unwrap())
            .body("hello")
            .build()
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
    }

    #[tokio::test]
    async fn test_panicking_module_does_not_stop_others() {
        let dispatcher = dispatcher(Config::new("http://example.com/"));
        dispatcher.register(Arc::new(Panics));
        dispatcher.register(Arc::new(Logger));

        assert!(dispatcher.audit_page(&page()).await);

        let store = lock(&dispatcher.store);
        assert_eq!(store.issues().len(), 1);
        assert_eq!(store.module_failures.len(), 1);
        assert_eq!(store.module_failures[0].module, "panics");
        assert!(store.module_failures[0].message.contains("boom"));
    }

    #[tokio::test]
    async fn test_binary_pages_excluded() {
        let mut config = Config::new("http://example.com/");
        config.scope.exclude_binaries = true;
        let dispatcher = dispatcher(config);
        dispatcher.register(Arc::new(Logger));

        let binary = Page::builder(Url::parse("http://example.com/a.png").unwrap())
            .content_type("image/png")
            .body("\u{89}PNG")
            .build();

        assert!(!dispatcher.audit_page(&binary).await);
        assert!(dispatcher.audit_page(&page()).await);
        assert_eq!(dispatcher.audited(), 1);
    }

    #[tokio::test]
    async fn test_audit_observers_fire_in_order_for_accepted_pages() {
        let mut config = Config::new("http://example.com/");
        config.scope.exclude_binaries = true;
        let dispatcher = dispatcher(config);
        let calls = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second"] {
            let calls = Arc::clone(&calls);
            dispatcher.on_audit_page(Arc::new(move |page: &Page| {
                lock(&calls).push(format!("{} {}", tag, page.url()));
            }));
        }

        let binary = Page::builder(Url::parse("http://example.com/a.png").unwrap())
            .content_type("image/png")
            .build();
        dispatcher.audit_page(&binary).await;
        dispatcher.audit_page(&page()).await;

        assert_eq!(
            *lock(&calls),
            vec!["first http://example.com/", "second http://example.com/"]
        );
    }

    #[tokio::test]
    async fn test_reset_clears_progress() {
        let dispatcher = dispatcher(Config::new("http://example.com/"));
        dispatcher.audit_page(&page()).await;
        lock(&dispatcher.sitemap).insert("http://example.com/", 200);
        lock(&dispatcher.failures).record(Failure {
            url: "http://example.com/x".to_string(),
            kind: FailureKind::Network,
            reason: "refused".to_string(),
        });

        dispatcher.reset();

        assert_eq!(dispatcher.audited(), 0);
        assert!(dispatcher.current_page().is_none());
        assert!(dispatcher.sitemap_entries().is_empty());
        assert!(dispatcher.failures().is_empty());
    }
}
