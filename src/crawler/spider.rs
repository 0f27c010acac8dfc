//! Spider - the crawl state machine
//!
//! The spider owns the frontier, sitemap, redirect log and failure set of a
//! single crawl. [`Spider::run`] drives a dispatch loop on the calling task:
//! up to `max-concurrency` fetches are kept in flight, and each completed
//! fetch is recorded, scanned for links and filtered through the [`Scope`]
//! before anything new is dispatched.
//!
//! `pause`, `resume`, `push` and the status queries may be called from any
//! task while `run` is in progress. They touch the shared state only through
//! short critical sections and wake the loop through a watch channel and a
//! [`Notify`].

use crate::config::Config;
use crate::crawler::extractor::{LinkExtractor, PathExtractor};
use crate::crawler::fetcher::{fetch_with_retry, FetchOutcome, RetryPolicy};
use crate::crawler::scope::{resolve_paths, Scope, ScopeContext};
use crate::http::{HttpClient, HttpResponse};
use crate::page::Page;
use crate::state::{
    Failure, FailureLog, Frontier, QueuedUrl, RedundancyCounters, Sitemap, SpiderStatus,
};
use crate::url::{normalize_parsed, normalize_url};
use crate::{ConfigError, SpindleError};
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tokio::sync::{watch, Notify};
use url::Url;

type PageObserver = Arc<dyn Fn(&Arc<Page>) + Send + Sync>;
type ResponseObserver = Arc<dyn Fn(&HttpResponse) + Send + Sync>;
type CompleteObserver = Arc<dyn Fn() + Send + Sync>;

/// Per-run callback passed to [`Spider::run_with`]
pub enum Callback {
    /// Called with every fetched, non-redirect page
    Page(Box<dyn Fn(&Arc<Page>) + Send + Sync>),
    /// Called with every response, redirects included
    Response(Box<dyn Fn(&HttpResponse) + Send + Sync>),
}

impl Callback {
    pub fn page(f: impl Fn(&Arc<Page>) + Send + Sync + 'static) -> Self {
        Self::Page(Box::new(f))
    }

    pub fn response(f: impl Fn(&HttpResponse) + Send + Sync + 'static) -> Self {
        Self::Response(Box::new(f))
    }
}

#[derive(Default)]
struct Observers {
    pages: Vec<PageObserver>,
    responses: Vec<ResponseObserver>,
    complete: Vec<CompleteObserver>,
}

/// A fetch whose result has been parsed but not yet recorded
enum Completed {
    Fetched {
        queued: QueuedUrl,
        response: HttpResponse,
        page: Option<Arc<Page>>,
        candidates: Vec<Url>,
    },
    Failed {
        queued: QueuedUrl,
        failure: Failure,
    },
}

/// What observers get told once a completion has been recorded
struct Notice {
    response: HttpResponse,
    page: Option<Arc<Page>>,
}

#[derive(Default)]
struct CrawlState {
    status: SpiderStatus,
    seeded: bool,
    sitemap: Sitemap,
    frontier: Frontier,
    failures: FailureLog,
    redirects: Vec<String>,
    redundancy: RedundancyCounters,
    in_flight: HashSet<String>,
    followed: usize,
    /// Completions that arrived while paused
    buffered: Vec<Completed>,
}

impl CrawlState {
    fn scope_context(&self) -> ScopeContext<'_> {
        ScopeContext {
            sitemap: &self.sitemap,
            frontier: &self.frontier,
            failures: &self.failures,
            in_flight: &self.in_flight,
            redundancy: &self.redundancy,
            followed: self.followed,
        }
    }

    fn is_known(&self, url: &str) -> bool {
        self.scope_context().is_known(url)
    }
}

struct SpiderInner {
    config: Arc<Config>,
    seed: Url,
    http: HttpClient,
    scope: Scope,
    retry: RetryPolicy,
    extractor: RwLock<LinkExtractor>,
    state: Mutex<CrawlState>,
    observers: Mutex<Observers>,
    paused: watch::Sender<bool>,
    wake: Notify,
}

/// Scope-aware crawler
///
/// Cloning is cheap; clones control the same crawl.
///
/// # Example
///
/// ```no_run
/// use spindle::{Config, Spider};
///
/// # async fn demo() -> spindle::Result<()> {
/// let spider = Spider::new(Config::new("http://example.com/"))?;
/// spider.on_each_page(|page| println!("{} {}", page.code(), page.url()));
/// let sitemap = spider.run().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Spider {
    inner: Arc<SpiderInner>,
}

impl Spider {
    /// Creates a spider with its own HTTP client
    pub fn new(config: Config) -> Result<Self, SpindleError> {
        let http = HttpClient::new(&config.http)?;
        Self::with_client(Arc::new(config), http)
    }

    /// Creates a spider that draws from an existing client's request budget
    pub fn with_client(config: Arc<Config>, http: HttpClient) -> Result<Self, SpindleError> {
        let seed = normalize_url(&config.url)
            .map_err(|e| ConfigError::InvalidUrl(format!("{}: {}", config.url, e)))?;
        let scope = Scope::new(&config)?;
        let redundancy =
            RedundancyCounters::new(&config.scope.redundant, config.scope.auto_redundant)?;
        let (paused, _) = watch::channel(false);

        Ok(Self {
            inner: Arc::new(SpiderInner {
                retry: RetryPolicy::from_config(&config.http),
                config,
                seed,
                http,
                scope,
                extractor: RwLock::new(LinkExtractor::new()),
                state: Mutex::new(CrawlState {
                    redundancy,
                    ..CrawlState::default()
                }),
                observers: Mutex::new(Observers::default()),
                paused,
                wake: Notify::new(),
            }),
        })
    }

    /// Crawls until the frontier drains
    ///
    /// Returns the visited URLs, or `None` without visiting anything when
    /// crawling is disabled. Calling `run` again after a crawl finished picks
    /// up anything pushed since.
    pub async fn run(&self) -> Option<Vec<String>> {
        self.crawl(None).await
    }

    /// Like [`Spider::run`], additionally invoking `callback` per fetch
    pub async fn run_with(&self, callback: Callback) -> Option<Vec<String>> {
        self.crawl(Some(callback)).await
    }

    /// Adds URLs to the frontier
    ///
    /// Paths are resolved against the seed URL. URLs already visited, pending
    /// or failed are ignored. Pushed URLs bypass the scope filter. Returns
    /// the number of URLs actually enqueued.
    pub fn push<I, S>(&self, paths: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let urls: Vec<Url> = paths
            .into_iter()
            .filter_map(|p| match crate::url::to_absolute(p.as_ref(), &self.inner.seed) {
                Ok(url) => Some(url),
                Err(e) => {
                    tracing::debug!("Ignoring pushed path {}: {}", p.as_ref(), e);
                    None
                }
            })
            .collect();

        let added = {
            let mut state = self.state();
            urls.into_iter()
                .filter(|url| {
                    !state.is_known(url.as_str()) && state.frontier.push(QueuedUrl::seed(url.clone()))
                })
                .count()
        };

        if added > 0 {
            self.inner.wake.notify_one();
        }
        added
    }

    /// Stops dispatching new fetches
    ///
    /// Fetches already in flight complete, but their results are held back
    /// until [`Spider::resume`].
    pub fn pause(&self) {
        {
            let mut state = self.state();
            if state.status == SpiderStatus::Running {
                state.status = SpiderStatus::Paused;
            }
        }
        self.inner.paused.send_replace(true);
        tracing::info!("Spider paused");
    }

    pub fn resume(&self) {
        {
            let mut state = self.state();
            if state.status == SpiderStatus::Paused {
                state.status = SpiderStatus::Running;
            }
        }
        self.inner.paused.send_replace(false);
        self.inner.wake.notify_one();
        tracing::info!("Spider resumed");
    }

    pub fn status(&self) -> SpiderStatus {
        self.state().status
    }

    pub fn is_done(&self) -> bool {
        self.status() == SpiderStatus::Done
    }

    pub fn is_running(&self) -> bool {
        self.status() == SpiderStatus::Running
    }

    /// Whether a pause has been requested
    pub fn is_paused(&self) -> bool {
        *self.inner.paused.borrow()
    }

    /// Registers a listener for every fetched, non-redirect page
    pub fn on_each_page(&self, f: impl Fn(&Arc<Page>) + Send + Sync + 'static) -> &Self {
        self.observers().pages.push(Arc::new(f));
        self
    }

    /// Registers a listener for every response, redirects included
    pub fn on_each_response(&self, f: impl Fn(&HttpResponse) + Send + Sync + 'static) -> &Self {
        self.observers().responses.push(Arc::new(f));
        self
    }

    /// Registers a listener fired once when a crawl finishes
    pub fn on_complete(&self, f: impl Fn() + Send + Sync + 'static) -> &Self {
        self.observers().complete.push(Arc::new(f));
        self
    }

    /// Adds a link extractor that runs after the built-in ones
    pub fn register_extractor(&self, extractor: Box<dyn PathExtractor>) {
        self.inner
            .extractor
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .register(extractor);
    }

    /// The normalized seed URL
    pub fn url(&self) -> &Url {
        &self.inner.seed
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn scope(&self) -> &Scope {
        &self.inner.scope
    }

    /// Visited URLs in completion order
    pub fn sitemap(&self) -> Vec<String> {
        self.state().sitemap.urls()
    }

    /// Visited URLs with their status codes
    pub fn fancy_sitemap(&self) -> Vec<(String, u16)> {
        self.state().sitemap.entries().to_vec()
    }

    /// URLs whose response was a redirect
    pub fn redirects(&self) -> Vec<String> {
        self.state().redirects.clone()
    }

    /// URLs abandoned after retries
    pub fn failures(&self) -> Vec<String> {
        self.state().failures.urls()
    }

    pub fn failure_log(&self) -> Vec<Failure> {
        self.state().failures.entries().to_vec()
    }

    /// URLs waiting in the frontier
    pub fn paths(&self) -> Vec<String> {
        self.state().frontier.urls()
    }

    /// Forgets everything crawled so far
    pub fn reset(&self) {
        let mut state = self.state();
        let status = state.status;
        state.sitemap.clear();
        state.frontier.clear();
        state.failures.clear();
        state.redirects.clear();
        state.redundancy.reset();
        state.in_flight.clear();
        state.buffered.clear();
        state.followed = 0;
        state.seeded = false;
        state.status = if status.is_active() {
            status
        } else {
            SpiderStatus::Idle
        };
    }

    async fn crawl(&self, callback: Option<Callback>) -> Option<Vec<String>> {
        if !self.inner.config.scope.crawl {
            tracing::info!("Crawling disabled, not visiting {}", self.inner.seed);
            return None;
        }

        self.start();
        tracing::info!("Starting crawl of {}", self.inner.seed);

        let max = self.inner.http.max_concurrency();
        let mut in_flight = FuturesUnordered::new();
        let mut paused_rx = self.inner.paused.subscribe();

        loop {
            let paused = *paused_rx.borrow_and_update();

            if !paused {
                let buffered = std::mem::take(&mut self.state().buffered);
                for completed in buffered {
                    self.complete(completed, callback.as_ref());
                }

                while in_flight.len() < max {
                    let Some(queued) = self.next_queued() else {
                        break;
                    };
                    let http = self.inner.http.clone();
                    let retry = self.inner.retry;
                    in_flight.push(async move {
                        let outcome = fetch_with_retry(&http, &queued.url, retry).await;
                        (queued, outcome)
                    });
                }
            }

            if in_flight.is_empty() {
                if !paused && self.state().frontier.is_empty() {
                    break;
                }
                tokio::select! {
                    _ = paused_rx.changed() => {}
                    _ = self.inner.wake.notified() => {}
                }
                continue;
            }

            tokio::select! {
                Some((queued, outcome)) = in_flight.next() => {
                    let completed = self.process(queued, outcome);
                    self.complete(completed, callback.as_ref());
                }
                _ = paused_rx.changed() => {}
                _ = self.inner.wake.notified() => {}
            }
        }

        let sitemap = {
            let mut state = self.state();
            state.status = SpiderStatus::Done;
            tracing::info!(
                "Crawl of {} done: {} visited, {} redirects, {} failed",
                self.inner.seed,
                state.sitemap.len(),
                state.redirects.len(),
                state.failures.len()
            );
            state.sitemap.urls()
        };

        let complete = self.observers().complete.clone();
        for f in complete {
            f();
        }

        Some(sitemap)
    }

    /// Seeds the frontier on first run and marks the crawl as running
    fn start(&self) {
        let mut state = self.state();

        state.status = if self.is_paused() {
            SpiderStatus::Paused
        } else {
            SpiderStatus::Running
        };

        if state.seeded {
            return;
        }
        state.seeded = true;

        let scope = &self.inner.config.scope;
        let seeds = if scope.restrict_paths.is_empty() {
            let mut seeds = vec![self.inner.seed.clone()];
            seeds.extend(resolve_paths(&scope.extend_paths, &self.inner.seed).unwrap_or_default());
            seeds
        } else {
            resolve_paths(&scope.restrict_paths, &self.inner.seed).unwrap_or_default()
        };

        for url in seeds {
            if !state.is_known(url.as_str()) {
                state.frontier.push(QueuedUrl::seed(url));
            }
        }
    }

    /// Pops the next URL to fetch, enforcing the link-count limit
    fn next_queued(&self) -> Option<QueuedUrl> {
        let mut state = self.state();

        loop {
            if let Some(limit) = self.inner.scope.link_count_limit() {
                if state.followed >= limit {
                    if !state.frontier.is_empty() {
                        tracing::info!(
                            "Link-count limit {} reached, dropping {} pending URLs",
                            limit,
                            state.frontier.len()
                        );
                        state.frontier.clear();
                    }
                    return None;
                }
            }

            let queued = state.frontier.pop()?;
            let key = queued.url.to_string();
            if state.sitemap.contains(&key)
                || state.failures.contains(&key)
                || state.in_flight.contains(&key)
            {
                continue;
            }

            state.in_flight.insert(key);
            state.followed += 1;
            tracing::debug!("Dispatching {}", queued.url);
            return Some(queued);
        }
    }

    /// Parses a fetch result outside the state lock
    fn process(&self, queued: QueuedUrl, outcome: FetchOutcome) -> Completed {
        match outcome {
            FetchOutcome::Failed(failure) => Completed::Failed { queued, failure },
            FetchOutcome::Response(response) if response.is_redirect() => Completed::Fetched {
                queued,
                response,
                page: None,
                candidates: Vec::new(),
            },
            FetchOutcome::Response(response) => {
                let candidates = self
                    .inner
                    .extractor
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .extract(&response);
                let page = Arc::new(Page::from_response(&response));
                Completed::Fetched {
                    queued,
                    response,
                    page: Some(page),
                    candidates,
                }
            }
        }
    }

    /// Records a completion, or buffers it while paused, then notifies
    fn complete(&self, completed: Completed, callback: Option<&Callback>) {
        let notice = {
            let mut state = self.state();
            if state.status == SpiderStatus::Paused {
                state.buffered.push(completed);
                return;
            }
            self.record(&mut state, completed)
        };

        if let Some(notice) = notice {
            self.notify(notice, callback);
        }
    }

    fn record(&self, state: &mut CrawlState, completed: Completed) -> Option<Notice> {
        match completed {
            Completed::Failed { queued, failure } => {
                state.in_flight.remove(queued.url.as_str());
                if !state.sitemap.contains(&failure.url) {
                    state.failures.record(failure);
                }
                None
            }
            Completed::Fetched {
                queued,
                response,
                page,
                candidates,
            } => {
                let key = queued.url.to_string();
                state.in_flight.remove(&key);
                state.sitemap.insert(key, response.status);

                if response.is_redirect() {
                    self.record_redirect(state, &queued, &response);
                } else {
                    let mut added = 0;
                    for url in candidates {
                        let verdict = self.inner.scope.evaluate(&url, &state.scope_context());
                        match verdict {
                            Ok(()) => {
                                state.redundancy.record(&url);
                                state.frontier.push(QueuedUrl::seed(url));
                                added += 1;
                            }
                            Err(rejection) => tracing::trace!("Skipping {}: {}", url, rejection),
                        }
                    }
                    tracing::debug!("{} [{}] queued {} new paths", queued.url, response.status, added);
                }

                Some(Notice { response, page })
            }
        }
    }

    fn record_redirect(&self, state: &mut CrawlState, queued: &QueuedUrl, response: &HttpResponse) {
        let limit = self.inner.config.scope.redirect_hops();
        let depth = queued.redirect_depth;

        if limit.is_some_and(|l| depth >= l) {
            tracing::debug!("Redirect limit reached at {}", queued.url);
            return;
        }
        state.redirects.push(queued.url.to_string());

        let Some(target) = response.location().and_then(|t| normalize_parsed(t).ok()) else {
            tracing::debug!("Redirect from {} has no usable Location", queued.url);
            return;
        };

        if limit.is_some_and(|l| depth + 1 >= l) {
            tracing::debug!("Not following {} -> {}: redirect limit", queued.url, target);
            return;
        }

        let verdict = self.inner.scope.evaluate(&target, &state.scope_context());
        match verdict {
            Ok(()) => {
                state.redundancy.record(&target);
                state.frontier.push(QueuedUrl {
                    url: target,
                    redirect_depth: depth + 1,
                });
            }
            Err(rejection) => {
                tracing::debug!("Not following {} -> {}: {}", queued.url, target, rejection)
            }
        }
    }

    /// Fires observers in registration order, then the per-run callback
    fn notify(&self, notice: Notice, callback: Option<&Callback>) {
        let (responses, pages) = {
            let observers = self.observers();
            (observers.responses.clone(), observers.pages.clone())
        };

        for f in &responses {
            f(&notice.response);
        }
        if let Some(page) = &notice.page {
            for f in &pages {
                f(page);
            }
        }

        match (callback, &notice.page) {
            (Some(Callback::Response(f)), _) => f(&notice.response),
            (Some(Callback::Page(f)), Some(page)) => f(page),
            _ => {}
        }
    }

    fn state(&self) -> MutexGuard<'_, CrawlState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn observers(&self) -> MutexGuard<'_, Observers> {
        self.inner
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
