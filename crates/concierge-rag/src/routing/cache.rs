//! Bounded cache for routing decisions.
//!
//! Keyed by normalized query text so trivially different renderings of the
//! same question hit the same entry. Misses recompute; there is no request
//! coalescing; recomputation is idempotent and cheap relative to the
//! machinery a stampede guard would add.

use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;

use crate::types::RoutingDecision;

pub struct DecisionCache {
    inner: Mutex<LruCache<String, RoutingDecision>>,
}

impl DecisionCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity is at least 1");
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn get(&self, query: &str) -> Option<RoutingDecision> {
        self.inner.lock().get(&normalize(query)).cloned()
    }

    pub fn put(&self, query: &str, decision: RoutingDecision) {
        self.inner.lock().put(normalize(query), decision);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Lowercase and collapse whitespace runs to single spaces.
fn normalize(query: &str) -> String {
    query.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Intent, Route, RoutingDecision, RoutingMethod};

    fn decision(reasoning: &str) -> RoutingDecision {
        RoutingDecision {
            intent: Intent::SimpleTax,
            technical_complexity: 2,
            urgency: 1,
            risk_exposure: 1,
            route: Route::Ai,
            confidence: 0.9,
            reasoning: reasoning.to_string(),
            method: RoutingMethod::Llm,
        }
    }

    #[test]
    fn hit_on_differently_cased_and_spaced_query() {
        let cache = DecisionCache::new(10);
        cache.put("What is the  Standard Deduction?", decision("first"));
        let hit = cache.get("what is the standard deduction?").unwrap();
        assert_eq!(hit.reasoning, "first");
    }

    #[test]
    fn evicts_least_recently_used_at_capacity() {
        let cache = DecisionCache::new(2);
        cache.put("q1", decision("one"));
        cache.put("q2", decision("two"));
        // Touch q1 so q2 becomes the eviction candidate.
        assert!(cache.get("q1").is_some());
        cache.put("q3", decision("three"));
        assert!(cache.get("q2").is_none());
        assert!(cache.get("q1").is_some());
        assert!(cache.get("q3").is_some());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn miss_returns_none() {
        let cache = DecisionCache::new(4);
        assert!(cache.get("never seen").is_none());
    }
}
