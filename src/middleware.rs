//! Handler-wrapping middleware.
//!
//! A [`Middleware`] takes the next handler and returns a handler that runs
//! around it. [`compose`] applies a list so that the first entry ends up
//! outermost. The server composes its global list around each route handler
//! per dispatch; a [`RouteGroup`](crate::server::RouteGroup) composes its
//! list once, when a route is registered.

use std::{
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    time::{Duration, Instant},
};

use crate::{
    context::{Context, HandlerFn, handler},
    panic::format_panic,
    pool::Reset,
    request::Method,
    values::Key,
};

/// Function from the next handler to a wrapping handler.
pub type Middleware = Arc<dyn Fn(HandlerFn) -> HandlerFn + Send + Sync>;

/// Value bag key under which [`bearer_auth`] stores the authenticated user.
pub const AUTH_USER: Key<String> = Key::new("user");

/// Wrap a closure as a [`Middleware`].
pub fn middleware<F>(f: F) -> Middleware
where
    F: Fn(HandlerFn) -> HandlerFn + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Wrap `handler` in `layers`, the first layer outermost.
///
/// ```
/// use std::sync::{Arc, Mutex};
///
/// use wirehttp::{
///     context::{Context, HandlerFn, handler},
///     middleware::{compose, middleware},
///     request::{Method, Request},
/// };
///
/// let trace = Arc::new(Mutex::new(Vec::new()));
/// let layer = |name: &'static str| {
///     let trace = Arc::clone(&trace);
///     middleware(move |next: HandlerFn| {
///         let trace = Arc::clone(&trace);
///         handler(move |ctx: &mut Context| {
///             trace.lock().unwrap().push(name);
///             next(ctx);
///         })
///     })
/// };
/// let app = compose(&[layer("outer"), layer("inner")], handler(|_: &mut Context| {}));
/// app(&mut Context::new(Request::new(Method::Get, "/")));
/// assert_eq!(*trace.lock().unwrap(), ["outer", "inner"]);
/// ```
#[must_use]
pub fn compose(layers: &[Middleware], handler: HandlerFn) -> HandlerFn {
    layers
        .iter()
        .rev()
        .fold(handler, |inner, layer| layer(inner))
}

/// Log method, path, status and elapsed time of every request.
#[must_use]
pub fn logger() -> Middleware {
    middleware(|next: HandlerFn| {
        handler(move |ctx: &mut Context| {
            let start = Instant::now();
            next(ctx);
            tracing::info!(
                method = %ctx.request().method(),
                path = ctx.request().path(),
                status = ctx.response().status(),
                elapsed_us = u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX),
                "request handled"
            );
        })
    })
}

/// Turn a panic in the wrapped handler into a 500 response.
///
/// The response also asks for the connection to be closed.
#[must_use]
pub fn recovery() -> Middleware {
    middleware(|next: HandlerFn| {
        handler(move |ctx: &mut Context| {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| next(ctx)));
            if let Err(payload) = outcome {
                tracing::error!(
                    panic = %format_panic(payload),
                    path = ctx.request().path(),
                    "handler panicked"
                );
                let res = ctx.response_mut();
                res.write_error(500, "Internal Server Error");
                res.set_header("Connection", "close");
            }
        })
    })
}

/// Replace the response with a 503 when the wrapped chain ran longer than
/// `limit`.
///
/// Handlers are synchronous and always run to completion; a slow one has
/// its headers and body discarded afterwards.
#[must_use]
pub fn timeout(limit: Duration) -> Middleware {
    middleware(move |next: HandlerFn| {
        handler(move |ctx: &mut Context| {
            let start = Instant::now();
            next(ctx);
            let elapsed = start.elapsed();
            if elapsed > limit {
                tracing::warn!(
                    path = ctx.request().path(),
                    elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                    "request exceeded time limit"
                );
                ctx.response_mut().reset();
                ctx.error(503, "Request timeout");
            }
        })
    })
}

/// Add permissive CORS headers and answer preflight requests directly.
#[must_use]
pub fn cors(allow_origin: &str) -> Middleware {
    let origin = allow_origin.to_owned();
    middleware(move |next: HandlerFn| {
        let origin = origin.clone();
        handler(move |ctx: &mut Context| {
            ctx.set_header("Access-Control-Allow-Origin", &origin)
                .set_header(
                    "Access-Control-Allow-Methods",
                    "GET, POST, PUT, DELETE, PATCH, OPTIONS",
                )
                .set_header("Access-Control-Allow-Headers", "Content-Type, Authorization");
            if ctx.request().method() == Method::Options {
                ctx.text(204, "");
                return;
            }
            next(ctx);
        })
    })
}

/// Require an `Authorization: Bearer <token>` header.
///
/// `verify` maps a token to the user it authenticates. Missing headers,
/// other schemes and rejected tokens get a 401; on success the user is
/// stored under [`AUTH_USER`].
#[must_use]
pub fn bearer_auth<F>(verify: F) -> Middleware
where
    F: Fn(&str) -> Option<String> + Send + Sync + 'static,
{
    let verify = Arc::new(verify);
    middleware(move |next: HandlerFn| {
        let verify = Arc::clone(&verify);
        handler(move |ctx: &mut Context| {
            let Some(header) = ctx.request().header("Authorization") else {
                ctx.error(401, "Unauthorized");
                return;
            };
            let Some(token) = header.strip_prefix("Bearer ") else {
                ctx.error(401, "Invalid token format");
                return;
            };
            match verify(token.trim()) {
                Some(user) => {
                    ctx.set(&AUTH_USER, user);
                    next(ctx);
                }
                None => ctx.error(401, "Invalid token"),
            }
        })
    })
}
