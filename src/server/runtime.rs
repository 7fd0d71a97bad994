//! Runtime control for [`HttpServer`].

mod accept;
mod backoff;
#[cfg(test)]
mod tests;

use std::sync::Arc;

#[cfg(test)]
pub(super) use accept::MockAcceptListener;
pub(super) use accept::{AcceptLoopOptions, accept_loop};
pub use backoff::BackoffConfig;
use futures::Future;
use log::{info, warn};
use tokio::{select, signal};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use super::{Bound, HttpServer, ServerError, WorkerPool, connection::Service};

impl HttpServer<Bound> {
    /// Run the server until Ctrl+C is received.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use wirehttp::server::HttpServer;
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), wirehttp::server::ServerError> {
    /// let server = HttpServer::new().bind(([127, 0, 0, 1], 8080).into())?;
    /// server.run().await?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// Attempting to run a server without binding fails to compile:
    ///
    /// ```compile_fail
    /// use wirehttp::server::HttpServer;
    ///
    /// async fn try_run() {
    ///     HttpServer::new()
    ///         .run()
    ///         .await
    ///         .expect("unbound servers do not expose run()");
    /// }
    /// ```
    ///
    /// # Errors
    ///
    /// Accept failures are retried with exponential back-off and do not
    /// surface as errors.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_with_shutdown(async {
            let _ = signal::ctrl_c().await;
        })
        .await
    }

    /// Run the server until the `shutdown` future resolves.
    ///
    /// Shutdown stops the accept loop, closes idle keep-alive connections,
    /// lets in-flight requests finish and then waits for every connection
    /// task to end.
    ///
    /// # Examples
    ///
    /// ```
    /// use tokio::sync::oneshot;
    /// use wirehttp::server::HttpServer;
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), wirehttp::server::ServerError> {
    /// let server = HttpServer::new().bind(([127, 0, 0, 1], 0).into())?;
    ///
    /// let (tx, rx) = oneshot::channel::<()>();
    /// let handle = tokio::spawn(async move {
    ///     server
    ///         .run_with_shutdown(async {
    ///             let _ = rx.await;
    ///         })
    ///         .await
    /// });
    ///
    /// let _ = tx.send(());
    /// handle
    ///     .await
    ///     .expect("join server task")
    ///     .expect("server run failed");
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// Accept failures are retried with exponential back-off and do not
    /// surface as errors.
    #[expect(
        clippy::integer_division_remainder_used,
        reason = "tokio::select! expands to modulus internally"
    )]
    pub async fn run_with_shutdown<S>(self, shutdown: S) -> Result<(), ServerError>
    where
        S: Future<Output = ()> + Send,
    {
        let HttpServer {
            router,
            middleware,
            pools,
            config,
            ready_tx,
            state: Bound { listener },
        } = self;
        let shutdown_token = CancellationToken::new();
        let tracker = TaskTracker::new();
        let workers = Arc::new(WorkerPool::new(config.workers, config.submit_timeout));
        let service = Arc::new(Service::new(router, middleware, pools, &config));

        if let Ok(addr) = listener.local_addr() {
            info!("listening: addr={addr}, workers={}", config.workers);
        }
        tracker.spawn(accept_loop(
            listener,
            AcceptLoopOptions {
                service,
                workers: Arc::clone(&workers),
                shutdown: shutdown_token.clone(),
                backoff: config.backoff,
                tcp_keepalive: config.tcp_keepalive,
            },
        ));

        // Signal readiness once the accept loop has been spawned.
        if let Some(tx) = ready_tx
            && tx.send(()).is_err()
        {
            warn!("Failed to send readiness signal: receiver dropped");
        }

        select! {
            () = shutdown => shutdown_token.cancel(),
            () = tracker.wait() => {},
        }

        tracker.close();
        tracker.wait().await;
        workers.close();
        workers.wait().await;
        info!("server stopped");
        Ok(())
    }
}
