//! URL/Scope filter
//!
//! [`Scope`] is compiled once from configuration. Deciding whether a
//! candidate is followed is a pure function of the candidate, the compiled
//! rules and a read-only [`ScopeContext`] view of the crawl state.

use crate::config::Config;
use crate::state::{FailureLog, Frontier, RedundancyCounters, RedundancyHit, Sitemap};
use crate::url::{extract_domain, host_in_scope, normalize_url, to_absolute};
use crate::ConfigError;
use regex::Regex;
use std::collections::HashSet;
use std::fmt;
use url::Url;

/// Why a candidate URL was not followed
///
/// Rejections are expected outcomes of filtering, not errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeRejection {
    /// Already visited, pending, in flight or failed
    AlreadySeen,
    /// Host differs from the seed host
    ForeignDomain { host: String },
    /// Not one of the configured restrict-paths
    NotRestricted,
    /// Matches an exclude pattern
    Excluded { pattern: String },
    /// Include patterns are configured and none match
    NotIncluded,
    /// The link-count limit has been reached
    LinkCountLimit { limit: usize },
    /// A redundancy cap has been reached
    Redundant(RedundancyHit),
}

impl fmt::Display for ScopeRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadySeen => write!(f, "already seen"),
            Self::ForeignDomain { host } => write!(f, "foreign domain {}", host),
            Self::NotRestricted => write!(f, "not in restrict-paths"),
            Self::Excluded { pattern } => write!(f, "matches exclude pattern '{}'", pattern),
            Self::NotIncluded => write!(f, "matches no include pattern"),
            Self::LinkCountLimit { limit } => write!(f, "link-count limit {} reached", limit),
            Self::Redundant(RedundancyHit::Pattern { pattern, limit }) => {
                write!(f, "redundant: '{}' followed {} times", pattern, limit)
            }
            Self::Redundant(RedundancyHit::Auto { shape, limit }) => {
                write!(f, "redundant: shape '{}' followed {} times", shape, limit)
            }
        }
    }
}

/// Read-only view of crawl state consulted by [`Scope::evaluate`]
#[derive(Debug, Clone, Copy)]
pub struct ScopeContext<'a> {
    pub sitemap: &'a Sitemap,
    pub frontier: &'a Frontier,
    pub failures: &'a FailureLog,
    pub in_flight: &'a HashSet<String>,
    pub redundancy: &'a RedundancyCounters,
    /// Paths dispatched for fetching so far
    pub followed: usize,
}

impl ScopeContext<'_> {
    /// Whether the URL is visited, pending, in flight or failed
    pub fn is_known(&self, url: &str) -> bool {
        self.sitemap.contains(url)
            || self.frontier.contains(url)
            || self.in_flight.contains(url)
            || self.failures.contains(url)
    }
}

/// Compiled scope rules
#[derive(Debug, Clone)]
pub struct Scope {
    seed_host: String,
    include_subdomains: bool,
    exclude: Vec<Regex>,
    include: Vec<Regex>,
    restrict: Option<HashSet<String>>,
    link_count_limit: Option<usize>,
}

impl Scope {
    /// Compiles the `[scope]` section against the seed URL
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        let seed = normalize_url(&config.url)
            .map_err(|e| ConfigError::InvalidUrl(format!("{}: {}", config.url, e)))?;
        let seed_host = extract_domain(&seed)
            .ok_or_else(|| ConfigError::InvalidUrl(format!("{}: missing host", config.url)))?;

        let scope = &config.scope;

        let restrict = if scope.restrict_paths.is_empty() {
            None
        } else {
            Some(
                resolve_paths(&scope.restrict_paths, &seed)?
                    .into_iter()
                    .map(String::from)
                    .collect(),
            )
        };

        Ok(Self {
            seed_host,
            include_subdomains: scope.include_subdomains,
            exclude: compile_patterns(&scope.exclude)?,
            include: compile_patterns(&scope.include)?,
            restrict,
            link_count_limit: scope.link_count_limit,
        })
    }

    /// Checks every rule, returning the first that rejects `url`
    pub fn evaluate(&self, url: &Url, ctx: &ScopeContext<'_>) -> Result<(), ScopeRejection> {
        if ctx.is_known(url.as_str()) {
            return Err(ScopeRejection::AlreadySeen);
        }

        if let Some(restrict) = &self.restrict {
            if !restrict.contains(url.as_str()) {
                return Err(ScopeRejection::NotRestricted);
            }
        }

        self.check_domain(url)?;

        if let Some(pattern) = self.exclude.iter().find(|p| p.is_match(url.as_str())) {
            return Err(ScopeRejection::Excluded {
                pattern: pattern.as_str().to_string(),
            });
        }

        if !self.include.is_empty() && !self.include.iter().any(|p| p.is_match(url.as_str())) {
            return Err(ScopeRejection::NotIncluded);
        }

        if let Some(limit) = self.link_count_limit {
            if ctx.followed + ctx.frontier.len() >= limit {
                return Err(ScopeRejection::LinkCountLimit { limit });
            }
        }

        if let Some(hit) = ctx.redundancy.check(url) {
            return Err(ScopeRejection::Redundant(hit));
        }

        Ok(())
    }

    /// Boolean form of [`Scope::evaluate`]
    pub fn in_scope(&self, url: &Url, ctx: &ScopeContext<'_>) -> bool {
        self.evaluate(url, ctx).is_ok()
    }

    /// Whether `url` is on the seed host (or a subdomain when enabled)
    pub fn in_domain(&self, url: &Url) -> bool {
        self.check_domain(url).is_ok()
    }

    /// Whether only restrict-paths are ever visited
    pub fn is_restricted(&self) -> bool {
        self.restrict.is_some()
    }

    pub fn link_count_limit(&self) -> Option<usize> {
        self.link_count_limit
    }

    fn check_domain(&self, url: &Url) -> Result<(), ScopeRejection> {
        let host = extract_domain(url).unwrap_or_default();
        if host_in_scope(&host, &self.seed_host, self.include_subdomains) {
            Ok(())
        } else {
            Err(ScopeRejection::ForeignDomain { host })
        }
    }
}

/// Resolves configured paths against the seed, keeping their order
pub fn resolve_paths(paths: &[String], seed: &Url) -> Result<Vec<Url>, ConfigError> {
    paths
        .iter()
        .map(|p| {
            to_absolute(p, seed).map_err(|e| ConfigError::InvalidUrl(format!("{}: {}", p, e)))
        })
        .collect()
}

fn compile_patterns(patterns: &[String]) -> Result<Vec<Regex>, ConfigError> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(p).map_err(|e| ConfigError::InvalidPattern {
                pattern: p.clone(),
                message: e.to_string(),
            })
        })
        .collect()
}
