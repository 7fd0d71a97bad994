//! Request-scoped state threaded through the handler chain.
//!
//! A [`Context`] owns the current [`Request`] and [`Response`] for the
//! duration of one dispatch, together with the resolved path parameters, a
//! typed [`Values`] bag for data shared between middleware, and the handler
//! chain with its cursor.

use std::{fmt, mem, net::SocketAddr, str::FromStr, sync::Arc};

use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

use crate::{
    pool::Reset,
    request::Request,
    response::Response,
    router::Params,
    values::{Key, Values},
};

/// A step in the handler chain.
///
/// Handlers are synchronous: they inspect the request and fill the buffered
/// response through the context.
pub type HandlerFn = Arc<dyn Fn(&mut Context) + Send + Sync>;

/// Wrap a closure as a [`HandlerFn`].
///
/// ```
/// use wirehttp::context::{Context, handler};
///
/// let hello = handler(|ctx: &mut Context| ctx.text(200, "hello"));
/// # let _ = hello;
/// ```
pub fn handler<F>(f: F) -> HandlerFn
where
    F: Fn(&mut Context) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Errors raised while decoding a request body.
#[derive(Debug, Error)]
pub enum BindError {
    /// The request carried no body.
    #[error("empty request body")]
    EmptyBody,
    /// The body was not valid JSON for the target type.
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// Per-request execution context.
#[derive(Default)]
pub struct Context {
    request: Request,
    response: Response,
    params: Params,
    values: Values,
    handlers: Vec<HandlerFn>,
    next_step: usize,
    peer_addr: Option<SocketAddr>,
}

impl Context {
    /// Create a context around `request` with an empty chain.
    #[must_use]
    pub fn new(request: Request) -> Self {
        Self {
            request,
            ..Self::default()
        }
    }

    /// Load everything one dispatch needs into a pooled context.
    pub(crate) fn prepare(
        &mut self,
        request: Request,
        response: Response,
        params: &Params,
        chain: &[HandlerFn],
        peer_addr: Option<SocketAddr>,
    ) {
        self.request = request;
        self.response = response;
        self.params.clone_from(params);
        self.handlers.clear();
        self.handlers.extend_from_slice(chain);
        self.next_step = 0;
        self.peer_addr = peer_addr;
    }

    /// Hand the request and response back so they can be encoded and pooled.
    pub(crate) fn finish(&mut self) -> (Request, Response) {
        (
            mem::take(&mut self.request),
            mem::take(&mut self.response),
        )
    }

    /// Replace the handler chain and rewind the cursor.
    pub fn set_chain(&mut self, chain: &[HandlerFn]) {
        self.handlers.clear();
        self.handlers.extend_from_slice(chain);
        self.next_step = 0;
    }

    /// Run the next step of the chain, if any remain.
    ///
    /// A step that never calls `next` ends the chain there. Calling `next`
    /// after the last step does nothing.
    pub fn next(&mut self) {
        if let Some(step) = self.handlers.get(self.next_step).cloned() {
            self.next_step += 1;
            step(self);
        }
    }

    /// Skip every remaining step of the chain.
    pub fn abort(&mut self) { self.next_step = self.handlers.len(); }

    /// Whether steps remain to be run.
    #[must_use]
    pub fn has_next(&self) -> bool { self.next_step < self.handlers.len() }

    /// The current request.
    #[must_use]
    pub fn request(&self) -> &Request { &self.request }

    /// Mutable access to the current request.
    pub fn request_mut(&mut self) -> &mut Request { &mut self.request }

    /// The response being built.
    #[must_use]
    pub fn response(&self) -> &Response { &self.response }

    /// Mutable access to the response being built.
    pub fn response_mut(&mut self) -> &mut Response { &mut self.response }

    /// Address of the connected client, when known.
    #[must_use]
    pub fn peer_addr(&self) -> Option<SocketAddr> { self.peer_addr }

    /// Path parameter by name, or an empty string.
    #[must_use]
    pub fn param(&self, name: &str) -> &str { self.params.get(name).unwrap_or_default() }

    /// All path parameters.
    #[must_use]
    pub fn params(&self) -> &Params { &self.params }

    /// Decoded query parameter.
    #[must_use]
    pub fn query(&self, key: &str) -> Option<String> { self.request.query(key) }

    /// Decoded query parameter, or `default` when it is absent or empty.
    #[must_use]
    pub fn query_or(&self, key: &str, default: &str) -> String {
        self.query(key)
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| default.to_owned())
    }

    /// Query parameter parsed into `T`; `None` when absent or unparsable.
    #[must_use]
    pub fn query_parse<T: FromStr>(&self, key: &str) -> Option<T> {
        self.query(key).and_then(|value| value.parse().ok())
    }

    /// Every value of a repeated query parameter.
    #[must_use]
    pub fn query_all(&self, key: &str) -> Vec<String> { self.request.query_all(key) }

    /// Best guess at the client address.
    ///
    /// Uses the first `X-Forwarded-For` entry, then `X-Real-IP`, then the
    /// socket peer address.
    #[must_use]
    pub fn client_ip(&self) -> Option<String> {
        let forwarded = self
            .request
            .header("X-Forwarded-For")
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty());
        forwarded
            .or_else(|| {
                self.request
                    .header("X-Real-IP")
                    .map(str::trim)
                    .filter(|ip| !ip.is_empty())
            })
            .map(str::to_owned)
            .or_else(|| self.peer_addr.map(|addr| addr.ip().to_string()))
    }

    /// Overwrite a query parameter on the current request.
    pub fn set_query(&mut self, key: &str, value: &str) { self.request.set_query(key, value); }

    /// Store a request-scoped value.
    pub fn insert<T>(&mut self, key: &str, value: T)
    where
        T: Send + Sync + 'static,
    {
        self.values.insert(key, value);
    }

    /// Read a request-scoped value of type `T`.
    #[must_use]
    pub fn get<T: 'static>(&self, key: &str) -> Option<&T> { self.values.get(key) }

    /// Store a value under a typed key.
    pub fn set<T>(&mut self, key: &Key<T>, value: T)
    where
        T: Send + Sync + 'static,
    {
        self.values.set(key, value);
    }

    /// Read a value through a typed key.
    #[must_use]
    pub fn get_key<T: 'static>(&self, key: &Key<T>) -> Option<&T> { self.values.get_key(key) }

    /// Remove a request-scoped value.
    pub fn remove(&mut self, key: &str) -> bool { self.values.remove(key) }

    /// Whether a request-scoped value exists under `key`.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool { self.values.contains(key) }

    /// The request-scoped value bag.
    #[must_use]
    pub fn values(&self) -> &Values { &self.values }

    /// Raw request body.
    #[must_use]
    pub fn body(&self) -> &[u8] { self.request.body() }

    /// Decode the request body as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`BindError::EmptyBody`] for an empty body and
    /// [`BindError::InvalidJson`] when decoding fails.
    pub fn bind_json<T: DeserializeOwned>(&self) -> Result<T, BindError> {
        let body = self.request.body();
        if body.is_empty() {
            return Err(BindError::EmptyBody);
        }
        Ok(serde_json::from_slice(body)?)
    }

    /// Set the response status.
    pub fn status(&mut self, status: u16) -> &mut Self {
        self.response.set_status(status);
        self
    }

    /// Set a response header.
    pub fn set_header(&mut self, name: &str, value: &str) -> &mut Self {
        self.response.set_header(name, value);
        self
    }

    /// Respond with a JSON body.
    ///
    /// A value that cannot be serialised produces a 500 error body instead.
    pub fn json<T: Serialize + ?Sized>(&mut self, status: u16, value: &T) {
        if let Err(e) = self.response.write_json(status, value) {
            tracing::error!(error = %e, "failed to serialise JSON response");
            self.response.write_error(500, "Internal Server Error");
        }
    }

    /// Respond with a plain-text body.
    pub fn text(&mut self, status: u16, text: &str) { self.response.write_text(status, text); }

    /// Respond with an HTML body.
    pub fn html(&mut self, status: u16, html: &str) { self.response.write_html(status, html); }

    /// Respond with the standard error JSON shape.
    pub fn error(&mut self, status: u16, message: &str) {
        self.response.write_error(status, message);
    }
}

impl Reset for Context {
    fn reset(&mut self) {
        self.request.reset();
        self.response.reset();
        self.params.clear();
        self.values.clear();
        self.handlers.clear();
        self.next_step = 0;
        self.peer_addr = None;
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("request", &self.request)
            .field("response", &self.response)
            .field("params", &self.params)
            .field("values", &self.values)
            .field("handlers", &self.handlers.len())
            .field("next_step", &self.next_step)
            .finish_non_exhaustive()
    }
}
