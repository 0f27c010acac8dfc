use std::collections::HashMap;

/// Ordered record of visited URLs and their status codes
///
/// Entries are append-only; a URL is recorded once, with the code of the
/// first response that completed for it.
#[derive(Debug, Clone, Default)]
pub struct Sitemap {
    entries: Vec<(String, u16)>,
    index: HashMap<String, usize>,
}

impl Sitemap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `url` with `code`; returns false if it was already present
    pub fn insert(&mut self, url: impl Into<String>, code: u16) -> bool {
        let url = url.into();
        if self.index.contains_key(&url) {
            return false;
        }
        self.index.insert(url.clone(), self.entries.len());
        self.entries.push((url, code));
        true
    }

    pub fn contains(&self, url: &str) -> bool {
        self.index.contains_key(url)
    }

    pub fn code(&self, url: &str) -> Option<u16> {
        self.index.get(url).map(|&i| self.entries[i].1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Visited URLs in completion order
    pub fn urls(&self) -> Vec<String> {
        self.entries.iter().map(|(u, _)| u.clone()).collect()
    }

    /// URL and status code pairs in completion order
    pub fn entries(&self) -> &[(String, u16)] {
        &self.entries
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }
}
