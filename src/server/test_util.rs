//! Test helpers shared across server modules.

use std::{
    net::{Ipv4Addr, SocketAddr, TcpListener as StdTcpListener},
    sync::{Arc, RwLock},
};

use rstest::fixture;
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, BufReader},
    net::TcpStream,
};

use super::{Bound, HttpServer, ServerConfig, connection::Service};
use crate::{
    context::{Context, handler},
    pool::Pools,
    request::Method,
    router::Router,
};

#[fixture]
/// Returns a bound [`StdTcpListener`] on a free port for use in tests.
///
/// Keeping the listener bound prevents race conditions where another
/// process could claim the port between discovery and use.
pub fn free_listener() -> StdTcpListener {
    let addr = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 0);
    StdTcpListener::bind(addr).expect("Failed to bind free port listener")
}

/// Extract the bound address from a listener.
#[must_use]
pub fn listener_addr(listener: &StdTcpListener) -> SocketAddr {
    listener
        .local_addr()
        .expect("failed to get listener address")
}

/// Bind a server with a single `GET /ping` route to `listener`.
pub fn bind_server(listener: StdTcpListener) -> HttpServer<Bound> {
    let server = HttpServer::new();
    server.get("/ping", |ctx: &mut Context| ctx.text(200, "pong"));
    server
        .bind_existing_listener(listener)
        .expect("Failed to bind")
}

#[fixture]
/// A connection service with a `GET /ping` route and default limits.
pub fn service() -> Arc<Service> {
    let router = Arc::new(Router::new());
    router.add_route(
        Method::Get,
        "/ping",
        handler(|ctx: &mut Context| ctx.text(200, "pong")),
    );
    Arc::new(Service::new(
        router,
        Arc::new(RwLock::new(Vec::new())),
        Arc::new(Pools::new(4)),
        &ServerConfig::default(),
    ))
}

/// Read one response: status code, raw header block and body.
///
/// The body is read according to `Content-Length`.
pub async fn read_response(stream: &mut TcpStream) -> (u16, String, Vec<u8>) {
    let mut reader = BufReader::new(stream);
    let mut head = String::new();
    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line).await.expect("read header line");
        assert!(n > 0, "connection closed before end of headers");
        if line == "\r\n" {
            break;
        }
        head.push_str(&line);
    }
    let status = head
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .expect("status code");
    let length: usize = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse().ok())
                .flatten()
        })
        .unwrap_or(0);
    let mut body = vec![0; length];
    reader.read_exact(&mut body).await.expect("read body");
    (status, head, body)
}
