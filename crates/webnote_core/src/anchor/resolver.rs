//! Anchor-to-element resolution with a bounded cache.
//!
//! # Responsibility
//! - Turn a stored selector pair back into a live element.
//! - Keep a per-page cache of resolved elements, invalidated lazily.
//!
//! # Invariants
//! - A cached node is only returned while still attached to the document.
//! - Overflow evicts the oldest quarter of entries by insertion order,
//!   never by access recency.
//! - Malformed selectors count as misses, not errors.

use crate::anchor::selector::{evaluate_path, is_path_expression, query_all};
use crate::dom::{NodeId, PageDocument};
use crate::model::note::Anchor;
use log::{debug, info};
use std::collections::HashMap;
use std::collections::VecDeque;

/// Upper bound on cached selector pairs per page load.
const ELEMENT_CACHE_CAPACITY: usize = 256;

/// Resolves anchors against the live document, caching hits.
pub struct ElementResolver {
    entries: HashMap<String, NodeId>,
    insertion_order: VecDeque<String>,
    capacity: usize,
}

impl Default for ElementResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ElementResolver {
    pub fn new() -> Self {
        Self::with_capacity(ELEMENT_CACHE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            insertion_order: VecDeque::new(),
            capacity: capacity.max(4),
        }
    }

    /// Resolves `anchor` to a live element.
    ///
    /// Cache hit requires the node to still be attached; a detached entry
    /// is dropped and resolution falls through to a fresh query. Returns
    /// `None` when neither selector matches — the anchor is lost until a
    /// later resolve succeeds.
    pub fn resolve(&mut self, doc: &PageDocument, anchor: &Anchor) -> Option<NodeId> {
        if !anchor.is_resolvable() {
            return None;
        }
        let key = cache_key(anchor);

        if let Some(&cached) = self.entries.get(&key) {
            if doc.is_attached(cached) {
                debug!("event=anchor_resolve module=anchor status=cache_hit");
                return Some(cached);
            }
            self.remove(&key);
        }

        if let Some(primary) = anchor.primary_selector.as_deref() {
            match query_all(doc, primary) {
                Ok(matches) => {
                    if let Some(&element) = matches.first() {
                        self.insert(key, element);
                        debug!("event=anchor_resolve module=anchor status=primary_hit");
                        return Some(element);
                    }
                }
                Err(err) => {
                    debug!("event=anchor_resolve module=anchor status=malformed error={err}");
                }
            }
        }

        if let Some(fallback) = anchor.fallback_selector.as_deref() {
            if is_path_expression(fallback) {
                if let Some(element) = evaluate_path(doc, fallback) {
                    self.insert(key, element);
                    debug!("event=anchor_resolve module=anchor status=fallback_hit");
                    return Some(element);
                }
            }
        }

        info!(
            "event=anchor_resolve module=anchor status=lost primary={} fallback={}",
            anchor.primary_selector.as_deref().unwrap_or("-"),
            anchor.fallback_selector.as_deref().unwrap_or("-")
        );
        None
    }

    /// Drops every cached entry; called on navigation and shutdown.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.insertion_order.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn insert(&mut self, key: String, element: NodeId) {
        if self.entries.contains_key(&key) {
            // Re-resolution of a known pair keeps its original age.
            self.entries.insert(key, element);
            return;
        }
        if self.entries.len() >= self.capacity {
            let evict = (self.capacity / 4).max(1);
            for _ in 0..evict {
                if let Some(oldest) = self.insertion_order.pop_front() {
                    self.entries.remove(&oldest);
                }
            }
            debug!(
                "event=anchor_cache module=anchor status=evicted count={} remaining={}",
                evict,
                self.entries.len()
            );
        }
        self.insertion_order.push_back(key.clone());
        self.entries.insert(key, element);
    }

    fn remove(&mut self, key: &str) {
        self.entries.remove(key);
        self.insertion_order.retain(|k| k != key);
    }
}

fn cache_key(anchor: &Anchor) -> String {
    format!(
        "{}|{}",
        anchor.primary_selector.as_deref().unwrap_or(""),
        anchor.fallback_selector.as_deref().unwrap_or("")
    )
}
