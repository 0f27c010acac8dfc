use crate::ConfigError;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use url::Url;

/// Why a URL was judged redundant
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedundancyHit {
    /// A configured pattern has reached its cap
    Pattern { pattern: String, limit: u32 },
    /// The URL's query-parameter shape has reached the automatic cap
    Auto { shape: String, limit: u32 },
}

#[derive(Debug, Clone)]
struct Rule {
    pattern: Regex,
    limit: u32,
    followed: u32,
}

/// Follow counters for redundancy rules
///
/// Checking a URL never changes a counter; counters move only when the
/// spider actually follows the URL through [`RedundancyCounters::record`].
#[derive(Debug, Clone, Default)]
pub struct RedundancyCounters {
    rules: Vec<Rule>,
    auto_limit: Option<u32>,
    shapes: HashMap<String, u32>,
}

impl RedundancyCounters {
    /// Compiles the `redundant` pattern map
    pub fn new(rules: &BTreeMap<String, u32>, auto_limit: Option<u32>) -> Result<Self, ConfigError> {
        let rules = rules
            .iter()
            .map(|(pattern, &limit)| {
                Regex::new(pattern)
                    .map(|pattern| Rule {
                        pattern,
                        limit,
                        followed: 0,
                    })
                    .map_err(|e| ConfigError::InvalidPattern {
                        pattern: pattern.clone(),
                        message: e.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            rules,
            auto_limit,
            shapes: HashMap::new(),
        })
    }

    /// Returns the first cap following `url` would exceed
    pub fn check(&self, url: &Url) -> Option<RedundancyHit> {
        let s = url.as_str();

        if let Some(rule) = self
            .rules
            .iter()
            .find(|r| r.pattern.is_match(s) && r.followed >= r.limit)
        {
            return Some(RedundancyHit::Pattern {
                pattern: rule.pattern.as_str().to_string(),
                limit: rule.limit,
            });
        }

        let limit = self.auto_limit?;
        let shape = query_shape(url)?;
        let followed = self.shapes.get(&shape).copied().unwrap_or(0);
        (followed >= limit).then_some(RedundancyHit::Auto { shape, limit })
    }

    /// Counts `url` as followed against every rule it matches
    pub fn record(&mut self, url: &Url) {
        let s = url.as_str();
        for rule in self.rules.iter_mut().filter(|r| r.pattern.is_match(s)) {
            rule.followed += 1;
        }

        if self.auto_limit.is_some() {
            if let Some(shape) = query_shape(url) {
                *self.shapes.entry(shape).or_insert(0) += 1;
            }
        }
    }

    pub fn reset(&mut self) {
        for rule in &mut self.rules {
            rule.followed = 0;
        }
        self.shapes.clear();
    }
}

/// Host, path and sorted parameter names; `None` without a query
///
/// `/list?page=1&sort=a` and `/list?sort=b&page=7` share a shape.
fn query_shape(url: &Url) -> Option<String> {
    url.query().filter(|q| !q.is_empty())?;

    let mut names: Vec<String> = url.query_pairs().map(|(k, _)| k.into_owned()).collect();
    names.sort();
    names.dedup();

    Some(format!(
        "{}{}?{}",
        url.host_str().unwrap_or_default(),
        url.path(),
        names.join("&")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_pattern_cap() {
        let rules = BTreeMap::from([("calendar".to_string(), 2)]);
        let mut counters = RedundancyCounters::new(&rules, None).unwrap();

        for i in 0..2 {
            let u = url(&format!("http://example.com/calendar/{}", i));
            assert!(counters.check(&u).is_none());
            counters.record(&u);
        }

        let hit = counters.check(&url("http://example.com/calendar/9"));
        assert!(matches!(hit, Some(RedundancyHit::Pattern { limit: 2, .. })));
        assert!(counters.check(&url("http://example.com/other")).is_none());
    }

    #[test]
    fn test_check_does_not_count() {
        let rules = BTreeMap::from([("x".to_string(), 1)]);
        let counters = RedundancyCounters::new(&rules, None).unwrap();
        let u = url("http://example.com/x");
        assert!(counters.check(&u).is_none());
        assert!(counters.check(&u).is_none());
    }

    #[test]
    fn test_auto_shape_ignores_values_and_order() {
        assert_eq!(
            query_shape(&url("http://example.com/list?page=1&sort=a")),
            query_shape(&url("http://example.com/list?sort=b&page=7"))
        );
        assert_eq!(query_shape(&url("http://example.com/list")), None);
    }

    #[test]
    fn test_auto_cap() {
        let mut counters = RedundancyCounters::new(&BTreeMap::new(), Some(1)).unwrap();
        let first = url("http://example.com/item?id=1");
        counters.record(&first);

        assert!(matches!(
            counters.check(&url("http://example.com/item?id=2")),
            Some(RedundancyHit::Auto { .. })
        ));
        assert!(counters.check(&url("http://example.com/item")).is_none());
        assert!(counters.check(&url("http://example.com/item?name=x")).is_none());

        counters.reset();
        assert!(counters.check(&url("http://example.com/item?id=2")).is_none());
    }

    #[test]
    fn test_invalid_pattern() {
        let rules = BTreeMap::from([("(".to_string(), 1)]);
        assert!(matches!(
            RedundancyCounters::new(&rules, None),
            Err(ConfigError::InvalidPattern { .. })
        ));
    }
}
