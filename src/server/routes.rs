//! Route and middleware registration on [`HttpServer`].

use std::sync::{Arc, PoisonError};

use super::{HttpServer, ServerState};
use crate::{
    context::{Context, HandlerFn, handler},
    middleware::{Middleware, compose},
    request::Method,
    router::Router,
};

macro_rules! verbs {
    ($($(#[$doc:meta])* $name:ident => $method:ident),* $(,)?) => {
        $(
            $(#[$doc])*
            pub fn $name<H>(&self, path: &str, handler: H) -> &Self
            where
                H: Fn(&mut Context) + Send + Sync + 'static,
            {
                self.route(Method::$method, path, handler)
            }
        )*
    };
}

impl<S> HttpServer<S>
where
    S: ServerState,
{
    /// Register `handler` for `method` requests matching the `path` template.
    ///
    /// Templates are `/`-separated literals and `:name` parameters.
    /// Registration flushes the route cache.
    pub fn route<H>(&self, method: Method, path: &str, handler: H) -> &Self
    where
        H: Fn(&mut Context) + Send + Sync + 'static,
    {
        self.router.add_route(method, path, self::handler(handler));
        self
    }

    verbs! {
        /// Register a `GET` route.
        get => Get,
        /// Register a `POST` route.
        post => Post,
        /// Register a `PUT` route.
        put => Put,
        /// Register a `DELETE` route.
        delete => Delete,
        /// Register a `PATCH` route.
        patch => Patch,
        /// Register a `HEAD` route.
        head => Head,
        /// Register an `OPTIONS` route.
        options => Options,
    }

    /// Append a middleware wrapped around every route handler.
    ///
    /// The global list is read on each dispatch, so middleware added later
    /// applies to routes registered earlier.
    pub fn use_middleware(&self, middleware: Middleware) -> &Self {
        self.middleware
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(middleware);
        self
    }

    /// Open a group of routes sharing `prefix` and `middleware`.
    ///
    /// ```
    /// use wirehttp::{context::Context, middleware::logger, server::HttpServer};
    ///
    /// let server = HttpServer::new();
    /// server
    ///     .group("/api", vec![logger()])
    ///     .get("/users/:id", |ctx: &mut Context| {
    ///         let id = ctx.param("id").to_owned();
    ///         ctx.text(200, &id);
    ///     });
    /// assert_eq!(server.router().routes().len(), 1);
    /// ```
    #[must_use]
    pub fn group(&self, prefix: &str, middleware: Vec<Middleware>) -> RouteGroup {
        RouteGroup {
            router: Arc::clone(&self.router),
            prefix: trim_prefix(prefix).to_owned(),
            middleware,
        }
    }

    /// Route table shared with every connection.
    #[must_use]
    pub fn router(&self) -> &Arc<Router> { &self.router }
}

/// Routes registered under a common path prefix.
///
/// A group's middleware wrap each of its handlers once, at registration,
/// inside the server's global middleware.
#[derive(Clone)]
pub struct RouteGroup {
    router: Arc<Router>,
    prefix: String,
    middleware: Vec<Middleware>,
}

impl RouteGroup {
    /// Register `handler` for `method` at `prefix` joined with `path`.
    pub fn route<H>(&self, method: Method, path: &str, handler: H) -> &Self
    where
        H: Fn(&mut Context) + Send + Sync + 'static,
    {
        let wrapped: HandlerFn = compose(&self.middleware, self::handler(handler));
        self.router.add_route(method, &self.join(path), wrapped);
        self
    }

    verbs! {
        /// Register a `GET` route in this group.
        get => Get,
        /// Register a `POST` route in this group.
        post => Post,
        /// Register a `PUT` route in this group.
        put => Put,
        /// Register a `DELETE` route in this group.
        delete => Delete,
        /// Register a `PATCH` route in this group.
        patch => Patch,
        /// Register a `HEAD` route in this group.
        head => Head,
        /// Register an `OPTIONS` route in this group.
        options => Options,
    }

    /// Append a middleware for routes registered after this call.
    pub fn use_middleware(&mut self, middleware: Middleware) -> &mut Self {
        self.middleware.push(middleware);
        self
    }

    /// Open a nested group; its middleware run inside this group's.
    #[must_use]
    pub fn group(&self, prefix: &str, middleware: Vec<Middleware>) -> RouteGroup {
        let mut layers = self.middleware.clone();
        layers.extend(middleware);
        RouteGroup {
            router: Arc::clone(&self.router),
            prefix: self.join(trim_prefix(prefix)),
            middleware: layers,
        }
    }

    /// Prefix applied to every path in this group.
    #[must_use]
    pub fn prefix(&self) -> &str { &self.prefix }

    fn join(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        match (self.prefix.is_empty(), path.is_empty()) {
            (true, true) => "/".to_owned(),
            (true, false) => format!("/{path}"),
            (false, true) => self.prefix.clone(),
            (false, false) => format!("{}/{path}", self.prefix),
        }
    }
}

impl std::fmt::Debug for RouteGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteGroup")
            .field("prefix", &self.prefix)
            .field("middleware", &self.middleware.len())
            .finish_non_exhaustive()
    }
}

/// Normalise a group prefix to `/segment...` without a trailing slash, or
/// the empty string for the root.
fn trim_prefix(prefix: &str) -> &str {
    let trimmed = prefix.trim_end_matches('/');
    if trimmed.is_empty() { "" } else { trimmed }
}
