//! Tests for server runtime behaviour.

use std::{
    io,
    net::TcpListener as StdTcpListener,
    sync::{Arc, Mutex},
};

use rstest::rstest;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    sync::oneshot,
    task::yield_now,
    time::{Duration, Instant, advance, timeout},
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use super::{AcceptLoopOptions, BackoffConfig, MockAcceptListener, accept_loop};
use crate::server::{
    WorkerPool,
    connection::Service,
    test_util::{bind_server, free_listener, listener_addr, read_response, service},
};

fn options(
    service: Arc<Service>,
    workers: Arc<WorkerPool>,
    shutdown: &CancellationToken,
) -> AcceptLoopOptions {
    AcceptLoopOptions {
        service,
        workers,
        shutdown: shutdown.clone(),
        backoff: BackoffConfig::default(),
        tcp_keepalive: Duration::from_secs(60),
    }
}

#[rstest]
#[tokio::test]
async fn test_run_with_immediate_shutdown(free_listener: StdTcpListener) {
    let server = bind_server(free_listener);
    let shutdown_future = async { tokio::time::sleep(Duration::from_millis(10)).await };
    let result = timeout(
        Duration::from_millis(1000),
        server.run_with_shutdown(shutdown_future),
    )
    .await;
    assert!(result.expect("server did not finish in time").is_ok());
}

#[rstest]
#[tokio::test]
async fn test_ready_signal_fires_before_serving(free_listener: StdTcpListener) {
    let addr = listener_addr(&free_listener);
    let (ready_tx, ready_rx) = oneshot::channel();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = bind_server(free_listener).ready_signal(ready_tx);
    let handle = tokio::spawn(server.run_with_shutdown(async move {
        let _ = stop_rx.await;
    }));

    ready_rx.await.expect("ready signal");
    let mut client = TcpStream::connect(addr).await.expect("connect");
    client
        .write_all(b"GET /ping HTTP/1.1\r\nHost: test\r\n\r\n")
        .await
        .expect("write request");
    let (status, _, body) = read_response(&mut client).await;
    assert_eq!(status, 200);
    assert_eq!(body, b"pong");

    drop(client);
    let _ = stop_tx.send(());
    handle
        .await
        .expect("server join error")
        .expect("server run failed");
}

#[rstest]
#[tokio::test]
async fn test_shutdown_closes_idle_keep_alive_connection(free_listener: StdTcpListener) {
    let addr = listener_addr(&free_listener);
    let (ready_tx, ready_rx) = oneshot::channel();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = bind_server(free_listener).ready_signal(ready_tx);
    let handle = tokio::spawn(server.run_with_shutdown(async move {
        let _ = stop_rx.await;
    }));
    ready_rx.await.expect("ready signal");

    let mut client = TcpStream::connect(addr).await.expect("connect");
    client
        .write_all(b"GET /ping HTTP/1.1\r\n\r\n")
        .await
        .expect("write request");
    let (_, head, _) = read_response(&mut client).await;
    assert!(head.contains("Connection: keep-alive"));

    let _ = stop_tx.send(());
    let mut rest = Vec::new();
    let read = timeout(Duration::from_secs(1), client.read_to_end(&mut rest))
        .await
        .expect("idle connection was not closed");
    assert_eq!(read.expect("read"), 0);
    timeout(Duration::from_secs(1), handle)
        .await
        .expect("server did not stop")
        .expect("server join error")
        .expect("server run failed");
}

#[rstest]
#[tokio::test]
async fn test_accept_loop_shutdown_signal(service: Arc<Service>) {
    let token = CancellationToken::new();
    let tracker = TaskTracker::new();
    let listener = Arc::new(
        TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind test listener"),
    );
    let workers = Arc::new(WorkerPool::new(4, Duration::from_millis(10)));

    tracker.spawn(accept_loop(listener, options(service, workers, &token)));

    token.cancel();
    tracker.close();

    let result = timeout(Duration::from_millis(100), tracker.wait()).await;
    assert!(result.is_ok());
}

#[rstest]
#[tokio::test]
async fn test_full_worker_pool_closes_new_connection(service: Arc<Service>) {
    let token = CancellationToken::new();
    let listener = Arc::new(
        TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind test listener"),
    );
    let addr = listener.local_addr().expect("listener addr");
    let workers = Arc::new(WorkerPool::new(1, Duration::from_millis(10)));
    let (release_tx, release_rx) = oneshot::channel::<()>();
    workers
        .submit(async move {
            let _ = release_rx.await;
        })
        .await
        .expect("occupy the only worker");

    let accept = tokio::spawn(accept_loop(
        listener,
        options(service, Arc::clone(&workers), &token),
    ));

    let mut client = TcpStream::connect(addr).await.expect("connect");
    let mut buf = Vec::new();
    let read = timeout(Duration::from_secs(1), client.read_to_end(&mut buf))
        .await
        .expect("rejected connection was not closed");
    assert_eq!(read.expect("read"), 0);

    token.cancel();
    accept.await.expect("accept loop join");
    let _ = release_tx.send(());
    workers.close();
    workers.wait().await;
}

/// Creates a mock listener that fails with exponential backoff tracking.
fn setup_backoff_mock_listener(
    calls: &Arc<Mutex<Vec<Instant>>>,
    num_calls: usize,
) -> MockAcceptListener {
    let mut listener = MockAcceptListener::new();
    let call_log = Arc::clone(calls);
    listener
        .expect_accept()
        .returning(move || {
            let call_log = Arc::clone(&call_log);
            Box::pin(async move {
                call_log.lock().expect("lock").push(Instant::now());
                Err(io::Error::other("mock error"))
            })
        })
        .times(num_calls);
    listener
        .expect_local_addr()
        .returning(|| Ok("127.0.0.1:0".parse().expect("addr parse")))
        .times(num_calls);
    listener
}

fn intervals(calls: &[Instant]) -> Vec<Duration> {
    calls
        .windows(2)
        .map(|pair| pair[1].duration_since(pair[0]))
        .collect()
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn test_accept_loop_exponential_backoff_async(service: Arc<Service>) {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let listener = Arc::new(setup_backoff_mock_listener(&calls, 4));
    let token = CancellationToken::new();
    let tracker = TaskTracker::new();
    let workers = Arc::new(WorkerPool::new(1, Duration::from_millis(10)));
    let backoff = BackoffConfig {
        initial_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(20),
    };

    tracker.spawn(accept_loop(
        listener,
        AcceptLoopOptions {
            backoff,
            ..options(service, workers, &token)
        },
    ));

    yield_now().await;
    assert_eq!(calls.lock().expect("lock").len(), 1);

    for ms in [5, 10, 20] {
        advance(Duration::from_millis(ms)).await;
        yield_now().await;
    }

    token.cancel();
    advance(Duration::from_millis(20)).await;
    yield_now().await;
    tracker.close();
    tracker.wait().await;

    let calls = calls.lock().expect("lock");
    assert_eq!(calls.len(), 4);
    assert_eq!(
        intervals(&calls),
        [
            Duration::from_millis(5),
            Duration::from_millis(10),
            Duration::from_millis(20),
        ]
    );
}

#[test]
fn next_delay_doubles_up_to_max() {
    let backoff = BackoffConfig::default();
    assert_eq!(backoff.next_delay(Duration::from_millis(10)), Duration::from_millis(20));
    assert_eq!(backoff.next_delay(Duration::from_millis(800)), Duration::from_secs(1));
}
