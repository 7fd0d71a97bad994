//! Accept-loop utilities for server runtime.

use std::{io, net::SocketAddr, sync::Arc};

use async_trait::async_trait;
use log::warn;
use tokio::{
    net::{TcpListener, TcpStream},
    select,
    time::{Duration, sleep},
};
use tokio_util::sync::CancellationToken;

use super::backoff::BackoffConfig;
use crate::server::{
    WorkerPool,
    connection::{Service, configure_socket, serve},
};

/// Abstraction for sources of incoming connections consumed by the accept loop.
///
/// Implementations must be cancellation-safe: dropping a pending `accept()`
/// future must not leak resources.
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub(in crate::server) trait AcceptListener: Send + Sync {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)>;
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

#[async_trait]
impl AcceptListener for TcpListener {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(self).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> { TcpListener::local_addr(self) }
}

pub(in crate::server) struct AcceptLoopOptions {
    pub service: Arc<Service>,
    pub workers: Arc<WorkerPool>,
    pub shutdown: CancellationToken,
    pub backoff: BackoffConfig,
    pub tcp_keepalive: Duration,
}

/// Accepts incoming connections and submits them to the worker pool.
///
/// Every accepted stream gets its socket options and is submitted as one
/// task serving its whole keep-alive loop. A stream the pool refuses is
/// dropped, closing it. Failures to accept back off exponentially. The loop
/// ends when `shutdown` is cancelled.
pub(in crate::server) async fn accept_loop<L>(listener: Arc<L>, options: AcceptLoopOptions)
where
    L: AcceptListener + Send + Sync + 'static,
{
    let backoff = options.backoff.normalized();
    debug_assert!(
        backoff.initial_delay <= backoff.max_delay,
        "BackoffConfig invariant violated: initial_delay > max_delay"
    );
    let options = AcceptLoopOptions { backoff, ..options };
    let mut delay = backoff.initial_delay;
    while let Some(next_delay) = accept_iteration(&listener, &options, delay).await {
        delay = next_delay;
    }
}

#[expect(
    clippy::integer_division_remainder_used,
    reason = "tokio::select! expands to modulus internally"
)]
async fn accept_iteration<L>(
    listener: &Arc<L>,
    options: &AcceptLoopOptions,
    delay: Duration,
) -> Option<Duration>
where
    L: AcceptListener + Send + Sync + 'static,
{
    select! {
        biased;

        () = options.shutdown.cancelled() => None,
        res = listener.accept() => Some(match res {
            Ok((stream, peer_addr)) => {
                configure_socket(&stream, options.tcp_keepalive);
                let task = serve(
                    stream,
                    Some(peer_addr),
                    Arc::clone(&options.service),
                    options.shutdown.clone(),
                );
                if options.workers.submit(task).await.is_err() {
                    crate::metrics::inc_rejected();
                    warn!(
                        "worker pool full, closing connection: peer_addr={peer_addr}, capacity={}",
                        options.workers.capacity()
                    );
                }
                options.backoff.initial_delay
            }
            Err(e) => {
                let local_addr = listener.local_addr().ok();
                warn!("accept error: error={e:?}, local_addr={local_addr:?}");
                sleep(delay).await;
                options.backoff.next_delay(delay)
            }
        }),
    }
}
