use std::collections::{HashSet, VecDeque};
use url::Url;

/// A URL waiting in the frontier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedUrl {
    pub url: Url,
    /// Number of redirects followed to reach this URL
    pub redirect_depth: usize,
}

impl QueuedUrl {
    pub fn seed(url: Url) -> Self {
        Self {
            url,
            redirect_depth: 0,
        }
    }
}

/// FIFO of URLs pending visitation, deduplicated against itself
#[derive(Debug, Clone, Default)]
pub struct Frontier {
    queue: VecDeque<QueuedUrl>,
    pending: HashSet<String>,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues `entry`; returns false if the URL is already pending
    pub fn push(&mut self, entry: QueuedUrl) -> bool {
        if !self.pending.insert(entry.url.to_string()) {
            return false;
        }
        self.queue.push_back(entry);
        true
    }

    pub fn pop(&mut self) -> Option<QueuedUrl> {
        let entry = self.queue.pop_front()?;
        self.pending.remove(entry.url.as_str());
        Some(entry)
    }

    pub fn contains(&self, url: &str) -> bool {
        self.pending.contains(url)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Pending URLs in dequeue order
    pub fn urls(&self) -> Vec<String> {
        self.queue.iter().map(|q| q.url.to_string()).collect()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
        self.pending.clear();
    }
}
