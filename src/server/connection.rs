//! Per-connection keep-alive loop.
//!
//! Each admitted connection reads a request, dispatches it, writes the
//! response and repeats until a close condition. Requests on one connection
//! are handled strictly in order.

use std::{
    net::SocketAddr,
    sync::{Arc, PoisonError, RwLock},
    time::Duration,
};

use futures::{SinkExt, StreamExt};
use socket2::{SockRef, TcpKeepalive};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    select,
    time::timeout,
};
use tokio_util::{codec::Framed, sync::CancellationToken};
use tracing::{debug, error, warn};

use super::ServerConfig;
use crate::{
    codec::{CodecError, CodecLimits, HttpCodec},
    middleware::{Middleware, compose},
    pipeline::{self, DispatchError},
    pool::{Pools, Reset},
    request::{Method, Request},
    response::Response,
    router::Router,
};

/// Everything a connection task needs from the server.
pub(super) struct Service {
    router: Arc<Router>,
    middleware: Arc<RwLock<Vec<Middleware>>>,
    pools: Arc<Pools>,
    limits: CodecLimits,
    read_timeout: Duration,
    write_timeout: Duration,
}

/// Result of dispatching one request.
struct Outcome {
    response: Response,
    close: bool,
}

impl Service {
    pub(super) fn new(
        router: Arc<Router>,
        middleware: Arc<RwLock<Vec<Middleware>>>,
        pools: Arc<Pools>,
        config: &ServerConfig,
    ) -> Self {
        Self {
            router,
            middleware,
            pools,
            limits: config.codec_limits(),
            read_timeout: config.read_timeout,
            write_timeout: config.write_timeout,
        }
    }

    /// Resolve and run one request, returning pooled objects except the response.
    fn dispatch(&self, request: Request, peer_addr: Option<SocketAddr>) -> Outcome {
        let Some(resolved) = self.router.resolve(request.method(), request.path()) else {
            debug!(method = %request.method(), path = request.path(), "no route");
            self.pools.requests.checkin(request);
            let mut response = self.pools.responses.checkout();
            response.write_error(404, "Not Found");
            return Outcome {
                response,
                close: false,
            };
        };

        let layers = self
            .middleware
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let chain = [compose(&layers, resolved.handler)];

        let mut ctx = self.pools.contexts.checkout();
        ctx.prepare(
            request,
            self.pools.responses.checkout(),
            &resolved.params,
            &chain,
            peer_addr,
        );
        let result = pipeline::run(&mut ctx);
        let (request, mut response) = ctx.finish();
        self.pools.contexts.checkin(ctx);

        let close = match result {
            Ok(()) => false,
            Err(DispatchError::Panicked(message)) => {
                crate::metrics::inc_panics();
                error!(
                    panic = %message,
                    method = %request.method(),
                    path = request.path(),
                    ?peer_addr,
                    "handler panicked"
                );
                response.reset();
                response.write_error(500, "Internal Server Error");
                true
            }
        };
        self.pools.requests.checkin(request);
        Outcome { response, close }
    }
}

/// Apply per-connection socket options.
pub(super) fn configure_socket(stream: &TcpStream, keepalive: Duration) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!(error = %e, "failed to set TCP_NODELAY");
    }
    let probes = TcpKeepalive::new().with_time(keepalive);
    if let Err(e) = SockRef::from(stream).set_tcp_keepalive(&probes) {
        debug!(error = %e, "failed to enable TCP keep-alive");
    }
}

/// Serve requests on `stream` until a close condition.
///
/// Closes when the peer goes away, a read or write deadline passes, a
/// request fails to parse, the handler panics, either side asks for
/// `Connection: close`, or `shutdown` fires while the connection is idle.
#[expect(
    clippy::integer_division_remainder_used,
    reason = "tokio::select! expands to modulus internally"
)]
pub(super) async fn serve(
    stream: TcpStream,
    peer_addr: Option<SocketAddr>,
    service: Arc<Service>,
    shutdown: CancellationToken,
) {
    crate::metrics::inc_connections();
    let codec = HttpCodec::new(Arc::clone(&service.pools)).with_limits(service.limits);
    let mut framed = Framed::new(stream, codec);
    let mut served: u64 = 0;

    loop {
        let idle = framed.read_buffer().is_empty() && framed.codec().is_idle();
        let read = select! {
            biased;

            () = shutdown.cancelled(), if idle => {
                debug!(?peer_addr, served, "closing idle connection for shutdown");
                break;
            }
            res = timeout(service.read_timeout, framed.next()) => res,
        };

        let request = match read {
            Err(_) => {
                debug!(?peer_addr, served, "read deadline passed");
                break;
            }
            Ok(None) => {
                debug!(?peer_addr, served, "peer closed connection");
                break;
            }
            Ok(Some(Err(CodecError::Io(e)))) => {
                debug!(?peer_addr, served, error = %e, "read failed");
                break;
            }
            Ok(Some(Err(CodecError::Parse(e)))) => {
                crate::metrics::inc_parse_errors(e.kind());
                warn!(?peer_addr, error = %e, "rejecting malformed request");
                let mut response = Response::error(400, &e.to_string());
                response.set_header("Connection", "close");
                crate::metrics::inc_requests(400);
                if write_response(&mut framed, &response, service.write_timeout, peer_addr).await {
                    linger_close(framed, &shutdown, peer_addr).await;
                }
                break;
            }
            Ok(Some(Ok(request))) => request,
        };

        served += 1;
        let method = request.method();
        let client_close = request.wants_close();
        let Outcome {
            mut response,
            close: server_close,
        } = service.dispatch(request, peer_addr);

        let handler_close = response
            .header("Connection")
            .is_some_and(|value| value.eq_ignore_ascii_case("close"));
        let close = client_close || server_close || handler_close || shutdown.is_cancelled();
        if close {
            response.set_header("Connection", "close");
        }
        if method == Method::Head {
            strip_body(&mut response);
        }

        crate::metrics::inc_requests(response.status());
        let written = write_response(&mut framed, &response, service.write_timeout, peer_addr).await;
        service.pools.responses.checkin(response);
        if close || !written {
            break;
        }
    }

    crate::metrics::dec_connections();
}

/// Longest time spent draining a peer after an early error response.
const LINGER_TIMEOUT: Duration = Duration::from_secs(1);
/// Most unread request bytes discarded while lingering.
const LINGER_MAX_BYTES: usize = 1024 * 1024;

/// Half-close the stream and discard what the peer is still sending, so an
/// unread request body does not turn the close into a reset.
#[expect(
    clippy::integer_division_remainder_used,
    reason = "tokio::select! expands to modulus internally"
)]
async fn linger_close(
    framed: Framed<TcpStream, HttpCodec>,
    shutdown: &CancellationToken,
    peer_addr: Option<SocketAddr>,
) {
    let mut stream = framed.into_inner();
    if let Err(e) = stream.shutdown().await {
        debug!(?peer_addr, error = %e, "half-close failed");
        return;
    }
    let drain = async {
        let mut buf = [0_u8; 8192];
        let mut drained = 0;
        while drained < LINGER_MAX_BYTES {
            match stream.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => drained += n,
            }
        }
        drained
    };
    select! {
        biased;

        () = shutdown.cancelled() => {}
        res = timeout(LINGER_TIMEOUT, drain) => {
            if let Ok(drained) = res {
                debug!(?peer_addr, drained, "drained unread request bytes");
            }
        }
    }
}

/// Drop the body of a `HEAD` response, keeping the length it would have had.
fn strip_body(response: &mut Response) {
    if response.header("Content-Length").is_none() {
        let length = response.body().len().to_string();
        response.set_header("Content-Length", &length);
    }
    response.clear_body();
}

async fn write_response(
    framed: &mut Framed<TcpStream, HttpCodec>,
    response: &Response,
    deadline: Duration,
    peer_addr: Option<SocketAddr>,
) -> bool {
    match timeout(deadline, framed.send(response)).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            debug!(?peer_addr, error = %e, "write failed");
            false
        }
        Err(_) => {
            debug!(?peer_addr, "write deadline passed");
            false
        }
    }
}
