//! Bounded resolution cache with full-flush eviction.

use std::collections::HashMap;

use super::Resolved;
use crate::request::Method;

/// Default number of cached resolutions.
pub const DEFAULT_CACHE_CAPACITY: usize = 1024;

/// Memoised `(method, path)` resolutions.
///
/// Entries are tagged with the route-table generation they were computed
/// against. A fill carrying an older generation is discarded, so a lookup
/// racing with a registration cannot reinstate a result from the old table.
#[derive(Debug)]
pub(crate) struct RouteCache {
    generation: u64,
    entries: HashMap<Method, HashMap<String, Resolved>>,
    len: usize,
    capacity: usize,
}

impl RouteCache {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            generation: 0,
            entries: HashMap::new(),
            len: 0,
            capacity: capacity.max(1),
        }
    }

    pub(crate) fn get(&self, method: Method, path: &str) -> Option<&Resolved> {
        self.entries.get(&method)?.get(path)
    }

    /// Store a resolution computed against route generation `generation`.
    ///
    /// Returns `false` when the generation is stale and nothing was stored.
    pub(crate) fn insert(
        &mut self,
        generation: u64,
        method: Method,
        path: &str,
        resolved: Resolved,
    ) -> bool {
        if generation != self.generation {
            return false;
        }
        if self.len >= self.capacity && self.get(method, path).is_none() {
            self.flush();
        }
        let previous = self
            .entries
            .entry(method)
            .or_default()
            .insert(path.to_owned(), resolved);
        if previous.is_none() {
            self.len += 1;
        }
        true
    }

    /// Drop every entry and accept fills for `generation` only.
    pub(crate) fn invalidate(&mut self, generation: u64) {
        self.generation = generation;
        self.flush();
    }

    pub(crate) fn len(&self) -> usize { self.len }

    fn flush(&mut self) {
        for paths in self.entries.values_mut() {
            paths.clear();
        }
        self.len = 0;
    }
}
