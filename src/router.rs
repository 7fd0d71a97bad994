//! Method and path-template routing.
//!
//! Routes are kept per method in registration order; the first template
//! that matches a path wins. Successful resolutions are memoised in a
//! bounded cache that is flushed whole on every registration and whenever
//! it reaches capacity.
//!
//! The route table and the cache sit behind separate locks. A lookup takes
//! at most one of them at a time. Registration takes the table lock and
//! then the cache lock, always in that order.

use std::{
    collections::HashMap,
    fmt,
    sync::{PoisonError, RwLock},
};

use crate::{context::HandlerFn, request::Method};

mod cache;
mod route;

pub use cache::DEFAULT_CACHE_CAPACITY;
pub use route::Route;

use self::{cache::RouteCache, route::split_path};

/// Path parameters bound by a match, in template order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Params {
    entries: Vec<(String, String)>,
}

impl Params {
    /// Value bound to `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// `(name, value)` pairs in template order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Number of bound parameters.
    #[must_use]
    pub fn len(&self) -> usize { self.entries.len() }

    /// Whether no parameter was bound.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    /// Remove every parameter, keeping the allocation.
    pub fn clear(&mut self) { self.entries.clear(); }

    pub(crate) fn push(&mut self, name: &str, value: &str) {
        self.entries.push((name.to_owned(), value.to_owned()));
    }
}

/// Outcome of a successful lookup.
#[derive(Clone)]
pub struct Resolved {
    /// Handler of the matching route.
    pub handler: HandlerFn,
    /// Parameters bound from the path.
    pub params: Params,
}

impl fmt::Debug for Resolved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolved")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct RouteTable {
    generation: u64,
    by_method: HashMap<Method, Vec<Route>>,
}

/// Thread-safe route table with a resolution cache.
///
/// ```
/// use wirehttp::{
///     context::{Context, handler},
///     request::Method,
///     router::Router,
/// };
///
/// let router = Router::new();
/// router.add_route(Method::Get, "/users/:id", handler(|ctx: &mut Context| {
///     let id = ctx.param("id").to_owned();
///     ctx.text(200, &id);
/// }));
///
/// let found = router.resolve(Method::Get, "/users/42").expect("route matches");
/// assert_eq!(found.params.get("id"), Some("42"));
/// assert!(router.resolve(Method::Post, "/users/42").is_none());
/// ```
pub struct Router {
    routes: RwLock<RouteTable>,
    cache: RwLock<RouteCache>,
}

impl Router {
    /// Create an empty router with the default cache capacity.
    #[must_use]
    pub fn new() -> Self { Self::with_cache_capacity(DEFAULT_CACHE_CAPACITY) }

    /// Create an empty router caching at most `capacity` resolutions.
    #[must_use]
    pub fn with_cache_capacity(capacity: usize) -> Self {
        Self {
            routes: RwLock::new(RouteTable::default()),
            cache: RwLock::new(RouteCache::new(capacity)),
        }
    }

    /// Register a route and invalidate the cache.
    pub fn add_route(&self, method: Method, template: &str, handler: HandlerFn) {
        self.add_routes(method, [(template, handler)]);
    }

    /// Register several routes for one method with a single invalidation.
    pub fn add_routes<I, S>(&self, method: Method, routes: I)
    where
        I: IntoIterator<Item = (S, HandlerFn)>,
        S: AsRef<str>,
    {
        let mut table = self.routes.write().unwrap_or_else(PoisonError::into_inner);
        let list = table.by_method.entry(method).or_default();
        for (template, handler) in routes {
            let template = template.as_ref();
            log::debug!("registering route: {method} {template}");
            list.push(Route::new(method, template, handler));
        }
        table.generation += 1;
        let generation = table.generation;
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .invalidate(generation);
    }

    /// Find the handler for `method` and `path`.
    ///
    /// Returns `None` when no route matches; misses are not cached.
    #[must_use]
    pub fn resolve(&self, method: Method, path: &str) -> Option<Resolved> {
        if let Some(hit) = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(method, path)
        {
            return Some(hit.clone());
        }

        let (generation, found) = {
            let table = self.routes.read().unwrap_or_else(PoisonError::into_inner);
            let parts = split_path(path);
            let found = table.by_method.get(&method).and_then(|routes| {
                routes.iter().find_map(|route| {
                    route.match_segments(&parts).map(|params| Resolved {
                        handler: route.handler().clone(),
                        params,
                    })
                })
            });
            (table.generation, found)
        };

        let resolved = found?;
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(generation, method, path, resolved.clone());
        Some(resolved)
    }

    /// Registered templates per method, in registration order.
    #[must_use]
    pub fn routes(&self) -> HashMap<Method, Vec<String>> {
        let table = self.routes.read().unwrap_or_else(PoisonError::into_inner);
        table
            .by_method
            .iter()
            .map(|(method, routes)| {
                (
                    *method,
                    routes.iter().map(|r| r.template().to_owned()).collect(),
                )
            })
            .collect()
    }

    /// Number of resolutions currently cached.
    #[must_use]
    pub fn cached(&self) -> usize {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.routes())
            .field("cached", &self.cached())
            .finish()
    }
}
