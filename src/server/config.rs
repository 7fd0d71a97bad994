//! Configuration utilities for [`HttpServer`].

use std::{
    sync::{Arc, RwLock},
    time::Duration,
};

use tokio::sync::oneshot;

use super::{HttpServer, ServerState, Unbound, runtime::BackoffConfig};
use crate::{
    codec::{CodecLimits, MAX_BODY_SIZE, MAX_LINE_LENGTH},
    pool::{DEFAULT_IDLE_CAPACITY, Pools},
    router::{DEFAULT_CACHE_CAPACITY, Router},
};

pub mod binding;


/// Default read and write deadline per request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
/// Default number of connections served at once.
pub const DEFAULT_WORKERS: usize = 5000;
/// Default time a new connection waits for a free worker.
pub const DEFAULT_SUBMIT_TIMEOUT: Duration = Duration::from_millis(10);
/// Default idle time before TCP keep-alive probes start.
pub const DEFAULT_TCP_KEEPALIVE: Duration = Duration::from_secs(180);

/// Tunables for an [`HttpServer`].
///
/// `route_cache_capacity` and `idle_pool_size` size structures created with
/// the server, so they only take effect through
/// [`HttpServer::with_config`]. Everything else can also be changed with the
/// builder methods.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    /// Deadline for reading each request, armed before every decode.
    pub read_timeout: Duration,
    /// Deadline for writing each response.
    pub write_timeout: Duration,
    /// Maximum number of connections served concurrently.
    pub workers: usize,
    /// How long the accept loop waits for a worker before refusing a
    /// connection.
    pub submit_timeout: Duration,
    /// Largest request body accepted.
    pub max_body_size: usize,
    /// Longest request line or header line accepted.
    pub max_line_length: usize,
    /// Resolved lookups cached before the route cache is flushed.
    pub route_cache_capacity: usize,
    /// Idle objects retained by each object pool.
    pub idle_pool_size: usize,
    /// Idle time before TCP keep-alive probes start.
    pub tcp_keepalive: Duration,
    /// Retry timing for failed `accept()` calls.
    pub backoff: BackoffConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            read_timeout: DEFAULT_TIMEOUT,
            write_timeout: DEFAULT_TIMEOUT,
            workers: DEFAULT_WORKERS,
            submit_timeout: DEFAULT_SUBMIT_TIMEOUT,
            max_body_size: MAX_BODY_SIZE,
            max_line_length: MAX_LINE_LENGTH,
            route_cache_capacity: DEFAULT_CACHE_CAPACITY,
            idle_pool_size: DEFAULT_IDLE_CAPACITY,
            tcp_keepalive: DEFAULT_TCP_KEEPALIVE,
            backoff: BackoffConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Codec limits derived from this configuration.
    #[must_use]
    pub fn codec_limits(&self) -> CodecLimits {
        CodecLimits {
            max_body_size: self.max_body_size,
            max_line_length: self.max_line_length,
        }
    }
}

impl HttpServer<Unbound> {
    /// Create an unbound server with the default configuration.
    ///
    /// ```
    /// use wirehttp::server::HttpServer;
    ///
    /// let server = HttpServer::new();
    /// assert_eq!(server.config().workers, 5000);
    /// assert!(server.local_addr().is_none());
    /// ```
    #[must_use]
    pub fn new() -> Self { Self::with_config(ServerConfig::default()) }

    /// Create an unbound server from `config`.
    #[must_use]
    pub fn with_config(config: ServerConfig) -> Self {
        let config = ServerConfig {
            workers: config.workers.max(1),
            backoff: config.backoff.normalized(),
            ..config
        };
        Self {
            router: Arc::new(Router::with_cache_capacity(config.route_cache_capacity)),
            middleware: Arc::new(RwLock::new(Vec::new())),
            pools: Arc::new(Pools::new(config.idle_pool_size)),
            config,
            ready_tx: None,
            state: Unbound,
        }
    }
}

impl Default for HttpServer<Unbound> {
    fn default() -> Self { Self::new() }
}

impl<S> HttpServer<S>
where
    S: ServerState,
{
    /// Set the per-request read deadline.
    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    /// Set the per-response write deadline.
    #[must_use]
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.config.write_timeout = timeout;
        self
    }

    /// Set how many connections may be served at once.
    #[must_use]
    pub fn workers(mut self, count: usize) -> Self {
        self.config.workers = count.max(1);
        self
    }

    /// Set how long a new connection waits for a free worker.
    #[must_use]
    pub fn submit_timeout(mut self, timeout: Duration) -> Self {
        self.config.submit_timeout = timeout;
        self
    }

    /// Set the largest accepted request body.
    #[must_use]
    pub fn max_body_size(mut self, bytes: usize) -> Self {
        self.config.max_body_size = bytes;
        self
    }

    /// Set the idle time before TCP keep-alive probes start.
    #[must_use]
    pub fn tcp_keepalive(mut self, idle: Duration) -> Self {
        self.config.tcp_keepalive = idle;
        self
    }

    /// Configure the accept loop's exponential back-off.
    ///
    /// Values are normalised with [`BackoffConfig::normalized`].
    #[must_use]
    pub fn accept_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.config.backoff = backoff.normalized();
        self
    }

    /// Configure a channel used to signal when the server is ready to accept connections.
    #[must_use]
    pub fn ready_signal(mut self, tx: oneshot::Sender<()>) -> Self {
        self.ready_tx = Some(tx);
        self
    }

    /// Current configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig { &self.config }

    /// Pools shared by every connection of this server.
    #[must_use]
    pub fn pools(&self) -> &Arc<Pools> { &self.pools }
}
