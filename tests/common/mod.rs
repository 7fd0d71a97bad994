//! Shared helpers for integration tests driving a real server over TCP.
#![allow(dead_code)]

use std::{
    collections::BTreeMap,
    net::SocketAddr,
    sync::{Arc, PoisonError, RwLock},
};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader},
    net::TcpStream,
    sync::oneshot,
    task::JoinHandle,
    time::{Duration, timeout},
};
use wirehttp::{
    context::Context,
    middleware::{logger, recovery},
    server::{HttpServer, ServerError},
};

/// A server running in the background on an ephemeral port.
pub struct TestServer {
    pub addr: SocketAddr,
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<Result<(), ServerError>>,
}

impl TestServer {
    /// Bind `server` to `127.0.0.1:0` and run it until [`stop`](Self::stop).
    pub async fn start(server: HttpServer) -> Self {
        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let server = server
            .ready_signal(ready_tx)
            .bind(([127, 0, 0, 1], 0).into())
            .expect("bind test server");
        let addr = server.local_addr().expect("bound address");
        let handle = tokio::spawn(server.run_with_shutdown(async move {
            let _ = stop_rx.await;
        }));
        ready_rx.await.expect("server ready");
        Self {
            addr,
            stop: Some(stop_tx),
            handle,
        }
    }

    /// Open a client connection.
    pub async fn connect(&self) -> Client { Client::connect(self.addr).await }

    /// Signal shutdown and wait for the server to finish.
    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        timeout(Duration::from_secs(5), &mut self.handle)
            .await
            .expect("server did not stop in time")
            .expect("server task panicked")
            .expect("server returned an error");
    }
}

/// One parsed response.
#[derive(Debug)]
pub struct RawResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RawResponse {
    /// First header named `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Body parsed as JSON.
    pub fn json(&self) -> Value { serde_json::from_slice(&self.body).expect("JSON body") }

    /// Whether the server announced it will close the connection.
    pub fn closes(&self) -> bool {
        self.header("Connection")
            .is_some_and(|value| value.eq_ignore_ascii_case("close"))
    }
}

/// Raw HTTP/1.1 client over one TCP connection.
pub struct Client {
    reader: BufReader<TcpStream>,
}

impl Client {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("connect");
        Self {
            reader: BufReader::new(stream),
        }
    }

    /// Write raw bytes to the server.
    pub async fn send(&mut self, bytes: &[u8]) {
        self.reader
            .get_mut()
            .write_all(bytes)
            .await
            .expect("write request");
    }

    /// Read the next response, framed by `Content-Length`.
    pub async fn response(&mut self) -> RawResponse {
        timeout(Duration::from_secs(5), self.read_response())
            .await
            .expect("response timed out")
    }

    /// Send `bytes` and read one response.
    pub async fn roundtrip(&mut self, bytes: &[u8]) -> RawResponse {
        self.send(bytes).await;
        self.response().await
    }

    /// Whether the server closed the connection, waiting up to a second.
    pub async fn is_closed(&mut self) -> bool {
        let mut buf = [0_u8; 1];
        match timeout(Duration::from_secs(1), self.reader.read(&mut buf)).await {
            Ok(Ok(0) | Err(_)) => true,
            Ok(Ok(_)) | Err(_) => false,
        }
    }

    /// Whether the server ends the connection with an orderly close rather
    /// than a reset, waiting up to two seconds.
    pub async fn closed_cleanly(&mut self) -> bool {
        let mut buf = [0_u8; 1024];
        let read_to_end = async {
            loop {
                match self.reader.read(&mut buf).await {
                    Ok(0) => return true,
                    Ok(_) => {}
                    Err(_) => return false,
                }
            }
        };
        timeout(Duration::from_secs(2), read_to_end)
            .await
            .unwrap_or(false)
    }

    /// Read the status line and headers of a response that carries no body,
    /// such as the answer to `HEAD`.
    pub async fn head_response(&mut self) -> RawResponse {
        timeout(Duration::from_secs(5), self.read_head())
            .await
            .expect("response timed out")
    }

    async fn read_response(&mut self) -> RawResponse {
        let mut response = self.read_head().await;
        let length: usize = response
            .header("Content-Length")
            .map_or(0, |value| value.parse().expect("numeric Content-Length"));
        response.body.resize(length, 0);
        self.reader
            .read_exact(&mut response.body)
            .await
            .expect("read body");
        response
    }

    async fn read_head(&mut self) -> RawResponse {
        let mut status_line = String::new();
        self.reader
            .read_line(&mut status_line)
            .await
            .expect("read status line");
        let status = status_line
            .split_whitespace()
            .nth(1)
            .and_then(|code| code.parse().ok())
            .unwrap_or_else(|| panic!("bad status line: {status_line:?}"));

        let mut headers = Vec::new();
        loop {
            let mut line = String::new();
            let n = self.reader.read_line(&mut line).await.expect("read header");
            assert!(n > 0, "connection closed inside headers");
            let line = line.trim_end();
            if line.is_empty() {
                break;
            }
            let (name, value) = line.split_once(':').expect("header colon");
            headers.push((name.trim().to_owned(), value.trim().to_owned()));
        }

        RawResponse {
            status,
            headers,
            body: Vec::new(),
        }
    }
}

/// Build a `GET` request for `path`.
pub fn get(path: &str) -> Vec<u8> { format!("GET {path} HTTP/1.1\r\nHost: test\r\n\r\n").into_bytes() }

/// Build a request with a `Content-Length` framed body.
pub fn with_body(method: &str, path: &str, body: &str) -> Vec<u8> {
    format!(
        "{method} {path} HTTP/1.1\r\nHost: test\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
        body.len()
    )
    .into_bytes()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(default)]
    pub id: u64,
    pub name: String,
    pub email: String,
}

/// Server exposing an in-memory users API seeded with user 1.
pub fn users_server() -> HttpServer {
    let store = Arc::new(RwLock::new(BTreeMap::from([(
        1_u64,
        User {
            id: 1,
            name: "Alice".to_owned(),
            email: "alice@example.com".to_owned(),
        },
    )])));
    let server = HttpServer::new();
    server.use_middleware(recovery()).use_middleware(logger());

    let users = Arc::clone(&store);
    server.get("/api/users/:id", move |ctx: &mut Context| {
        let Ok(id) = ctx.param("id").parse::<u64>() else {
            ctx.error(400, "invalid user id");
            return;
        };
        let users = users.read().unwrap_or_else(PoisonError::into_inner);
        match users.get(&id) {
            Some(user) => ctx.json(200, &json!({ "user": user })),
            None => ctx.error(404, "user not found"),
        }
    });

    let users = Arc::clone(&store);
    server.post("/api/users", move |ctx: &mut Context| {
        let mut user: User = match ctx.bind_json() {
            Ok(user) => user,
            Err(e) => {
                ctx.error(400, &e.to_string());
                return;
            }
        };
        let mut users = users.write().unwrap_or_else(PoisonError::into_inner);
        user.id = users.keys().max().copied().unwrap_or(0) + 1;
        users.insert(user.id, user.clone());
        ctx.json(201, &json!({ "user": user }));
    });
    server
}
