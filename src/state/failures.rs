use crate::FailureKind;
use serde::Serialize;
use std::collections::HashSet;

/// A URL abandoned after retries were exhausted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub url: String,
    pub kind: FailureKind,
    pub reason: String,
}

/// Ordered, deduplicated set of failed URLs
#[derive(Debug, Clone, Default)]
pub struct FailureLog {
    entries: Vec<Failure>,
    urls: HashSet<String>,
}

impl FailureLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a failure; returns false if the URL had already failed
    pub fn record(&mut self, failure: Failure) -> bool {
        if !self.urls.insert(failure.url.clone()) {
            return false;
        }
        self.entries.push(failure);
        true
    }

    pub fn contains(&self, url: &str) -> bool {
        self.urls.contains(url)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn urls(&self) -> Vec<String> {
        self.entries.iter().map(|f| f.url.clone()).collect()
    }

    pub fn entries(&self) -> &[Failure] {
        &self.entries
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.urls.clear();
    }
}
