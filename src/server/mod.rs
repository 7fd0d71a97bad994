//! Tokio-based HTTP/1.1 server.
//!
//! `HttpServer` owns the route table, the global middleware list and the
//! object pools. Once bound it runs a single accept loop that hands every
//! connection to a capacity-bounded [`WorkerPool`]; each admitted
//! connection runs its keep-alive loop in its own task until a close
//! condition or shutdown.

use std::sync::{Arc, RwLock};

use tokio::{net::TcpListener, sync::oneshot};

use crate::{middleware::Middleware, pool::Pools, router::Router};

/// HTTP server carrying a typestate `S` that records whether it is
/// [`Unbound`] or [`Bound`].
///
/// Routes and middleware may be registered in either state. Only a bound
/// server exposes [`run`](HttpServer::run).
///
/// ```no_run
/// use wirehttp::{context::Context, server::HttpServer};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), wirehttp::server::ServerError> {
/// let server = HttpServer::new();
/// server.get("/ping", |ctx: &mut Context| ctx.text(200, "pong"));
/// server.bind(([127, 0, 0, 1], 8080).into())?.run().await
/// # }
/// ```
pub struct HttpServer<S = Unbound>
where
    S: ServerState,
{
    pub(crate) router: Arc<Router>,
    pub(crate) middleware: Arc<RwLock<Vec<Middleware>>>,
    pub(crate) pools: Arc<Pools>,
    pub(crate) config: ServerConfig,
    /// Channel used to notify when the server is ready.
    ///
    /// A `oneshot::Sender` can transmit only one readiness notification, so
    /// a new sender must be provided each time a server is started.
    pub(crate) ready_tx: Option<oneshot::Sender<()>>,
    /// Typestate tracking whether the server has been bound to a listener.
    pub(crate) state: S,
}

/// Marker indicating the server has not yet bound a listener.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unbound;

/// Marker indicating the server is bound to a TCP listener.
#[derive(Debug, Clone)]
pub struct Bound {
    pub(crate) listener: Arc<TcpListener>,
}

/// Trait implemented by [`Unbound`] and [`Bound`] to model binding typestate.
pub trait ServerState: sealed::Sealed {}

mod sealed {
    //! Prevent external implementations of [`ServerState`].

    pub trait Sealed {}
    impl Sealed for super::Unbound {}
    impl Sealed for super::Bound {}
}

impl ServerState for Unbound {}
impl ServerState for Bound {}

mod config;
pub use config::{ServerConfig, binding};
mod connection;
pub mod error;
mod routes;
mod runtime;
mod worker;

pub use error::ServerError;
pub use routes::RouteGroup;
/// Re-exported configuration types for server backoff behavior.
pub use runtime::BackoffConfig;
pub use worker::{Rejected, WorkerPool};

#[cfg(test)]
pub(crate) mod test_util;
