use serde::Deserialize;
use std::collections::BTreeMap;

/// Main configuration structure for Spindle
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Seed URL of the audit
    pub url: String,

    #[serde(default)]
    pub audit: AuditConfig,

    #[serde(default)]
    pub scope: ScopeConfig,

    #[serde(default)]
    pub http: HttpConfig,

    /// Form-based login used to restore a lost session
    #[serde(default)]
    pub login: Option<LoginConfig>,

    /// Reports written to disk once the audit finishes
    #[serde(default, rename = "report")]
    pub reports: Vec<ReportEntry>,
}

impl Config {
    /// Creates a configuration for `url` with every other section at its default
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            audit: AuditConfig::default(),
            scope: ScopeConfig::default(),
            http: HttpConfig::default(),
            login: None,
            reports: Vec::new(),
        }
    }
}

/// Which element kinds get audited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct AuditConfig {
    #[serde(default = "default_true")]
    pub links: bool,

    #[serde(default = "default_true")]
    pub forms: bool,

    #[serde(default = "default_true")]
    pub cookies: bool,

    #[serde(default)]
    pub headers: bool,
}

impl AuditConfig {
    /// Disables every element kind
    pub fn none() -> Self {
        Self {
            links: false,
            forms: false,
            cookies: false,
            headers: false,
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            links: true,
            forms: true,
            cookies: true,
            headers: false,
        }
    }
}

/// Crawl scope configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ScopeConfig {
    /// Whether to crawl at all (the inverse of "do not crawl")
    #[serde(default = "default_true")]
    pub crawl: bool,

    /// Treat subdomains of the seed host as in scope
    #[serde(default, rename = "include-subdomains")]
    pub include_subdomains: bool,

    /// Extra paths to seed the crawl with
    #[serde(default, rename = "extend-paths")]
    pub extend_paths: Vec<String>,

    /// When set, these are the only paths ever visited
    #[serde(default, rename = "restrict-paths")]
    pub restrict_paths: Vec<String>,

    /// URLs matching any of these patterns are skipped
    #[serde(default)]
    pub exclude: Vec<String>,

    /// When non-empty, URLs must match one of these patterns
    #[serde(default)]
    pub include: Vec<String>,

    /// Pattern to maximum number of matching URLs to follow
    #[serde(default)]
    pub redundant: BTreeMap<String, u32>,

    /// Maximum number of URLs followed per query-parameter shape
    #[serde(default, rename = "auto-redundant")]
    pub auto_redundant: Option<u32>,

    /// Maximum number of paths ever followed
    #[serde(default, rename = "link-count-limit")]
    pub link_count_limit: Option<usize>,

    /// Maximum redirects followed per chain; negative means unlimited
    #[serde(default, rename = "redirect-limit")]
    pub redirect_limit: Option<i64>,

    /// Skip auditing pages with non-textual content
    #[serde(default, rename = "exclude-binaries")]
    pub exclude_binaries: bool,
}

impl ScopeConfig {
    /// Returns the redirect limit as a hop count, `None` meaning unlimited
    pub fn redirect_hops(&self) -> Option<usize> {
        self.redirect_limit
            .and_then(|limit| usize::try_from(limit).ok())
    }
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            crawl: true,
            include_subdomains: false,
            extend_paths: Vec::new(),
            restrict_paths: Vec::new(),
            exclude: Vec::new(),
            include: Vec::new(),
            redundant: BTreeMap::new(),
            auto_redundant: None,
            link_count_limit: None,
            redirect_limit: None,
            exclude_binaries: false,
        }
    }
}

/// HTTP client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Maximum number of requests in flight across crawling and auditing
    #[serde(default = "default_max_concurrency", rename = "max-concurrency")]
    pub max_concurrency: usize,

    /// Per-request timeout (milliseconds)
    #[serde(default = "default_timeout", rename = "timeout")]
    pub timeout_ms: u64,

    /// Attempts per URL before it is recorded as a failure
    #[serde(default = "default_max_retries", rename = "max-retries")]
    pub max_retries: u32,

    /// Delay between attempts (milliseconds)
    #[serde(default = "default_retry_delay", rename = "retry-delay")]
    pub retry_delay_ms: u64,

    #[serde(default = "default_user_agent", rename = "user-agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            timeout_ms: default_timeout(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay(),
            user_agent: default_user_agent(),
        }
    }
}

/// Form login configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoginConfig {
    /// Where the login form is submitted
    pub url: String,

    /// Form fields to submit
    #[serde(default)]
    pub params: BTreeMap<String, String>,

    /// Page fetched to verify the session
    #[serde(rename = "check-url")]
    pub check_url: String,

    /// Pattern the check page must match while logged in
    #[serde(rename = "check-pattern")]
    pub check_pattern: String,
}

/// A report to write after the audit
#[derive(Debug, Clone, Deserialize)]
pub struct ReportEntry {
    pub name: String,
    pub outfile: String,
}

fn default_true() -> bool {
    true
}

fn default_max_concurrency() -> usize {
    20
}

fn default_timeout() -> u64 {
    10_000
}

fn default_max_retries() -> u32 {
    5
}

fn default_retry_delay() -> u64 {
    100
}

fn default_user_agent() -> String {
    format!("spindle/{}", env!("CARGO_PKG_VERSION"))
}
