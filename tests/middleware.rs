//! Middleware behaviour observed over a real connection.

use std::sync::{Arc, Mutex};

use wirehttp::{
    context::{Context, HandlerFn, handler},
    middleware::{AUTH_USER, Middleware, bearer_auth, cors, middleware, recovery},
    server::HttpServer,
};

use crate::common::{TestServer, get};

mod common;

fn tag(trace: &Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> Middleware {
    let trace = Arc::clone(trace);
    middleware(move |next: HandlerFn| {
        let trace = Arc::clone(&trace);
        handler(move |ctx: &mut Context| {
            trace.lock().expect("lock").push(name);
            next(ctx);
        })
    })
}

#[tokio::test]
async fn global_then_group_order() {
    let trace = Arc::new(Mutex::new(Vec::new()));
    let server = HttpServer::new();
    server
        .use_middleware(tag(&trace, "global-1"))
        .use_middleware(tag(&trace, "global-2"));
    server
        .group("/api", vec![tag(&trace, "group")])
        .get("/items", |ctx: &mut Context| ctx.text(200, "items"));
    let server = TestServer::start(server).await;
    let mut client = server.connect().await;

    let res = client.roundtrip(&get("/api/items")).await;
    assert_eq!(res.body, b"items");
    assert_eq!(
        *trace.lock().expect("lock"),
        ["global-1", "global-2", "group"]
    );

    drop(client);
    server.stop().await;
}

#[tokio::test]
async fn bearer_auth_guards_group() {
    let server = HttpServer::new();
    server
        .group(
            "/private",
            vec![bearer_auth(|token: &str| (token == "letmein").then(|| "alice".to_owned()))],
        )
        .get("/me", |ctx: &mut Context| {
            let user = ctx.get_key(&AUTH_USER).cloned().unwrap_or_default();
            ctx.text(200, &user);
        });
    server.get("/public", |ctx: &mut Context| ctx.text(200, "open"));
    let server = TestServer::start(server).await;
    let mut client = server.connect().await;

    let res = client.roundtrip(&get("/private/me")).await;
    assert_eq!(res.status, 401);
    assert_eq!(res.json()["error"], "Unauthorized");

    let res = client
        .roundtrip(b"GET /private/me HTTP/1.1\r\nAuthorization: Bearer letmein\r\n\r\n")
        .await;
    assert_eq!(res.status, 200);
    assert_eq!(res.body, b"alice");

    let res = client.roundtrip(&get("/public")).await;
    assert_eq!(res.body, b"open");

    drop(client);
    server.stop().await;
}

#[tokio::test]
async fn cors_preflight_short_circuits() {
    let server = HttpServer::new();
    server.use_middleware(cors("https://example.com"));
    server
        .options("/items", |ctx: &mut Context| ctx.text(200, "unreachable"))
        .get("/items", |ctx: &mut Context| ctx.text(200, "items"));
    let server = TestServer::start(server).await;
    let mut client = server.connect().await;

    let res = client
        .roundtrip(b"OPTIONS /items HTTP/1.1\r\nHost: test\r\n\r\n")
        .await;
    assert_eq!(res.status, 204);
    assert_eq!(
        res.header("Access-Control-Allow-Origin"),
        Some("https://example.com")
    );

    let res = client.roundtrip(&get("/items")).await;
    assert_eq!(res.body, b"items");
    assert!(res.header("Access-Control-Allow-Methods").is_some());

    drop(client);
    server.stop().await;
}

#[tokio::test]
async fn recovery_middleware_answers_panics() {
    let server = HttpServer::new();
    server.use_middleware(recovery());
    server.get("/boom", |_: &mut Context| panic!("exploded"));
    let server = TestServer::start(server).await;
    let mut client = server.connect().await;

    let res = client.roundtrip(&get("/boom")).await;
    assert_eq!(res.status, 500);
    assert!(res.closes());
    assert!(client.is_closed().await);

    server.stop().await;
}

#[tokio::test]
async fn middleware_added_after_routes_still_applies() {
    let server = HttpServer::new();
    server.get("/late", |ctx: &mut Context| ctx.text(200, "late"));
    server.use_middleware(middleware(|next: HandlerFn| {
        handler(move |ctx: &mut Context| {
            next(ctx);
            ctx.set_header("X-Served-By", "wirehttp");
        })
    }));
    let server = TestServer::start(server).await;
    let mut client = server.connect().await;

    let res = client.roundtrip(&get("/late")).await;
    assert_eq!(res.header("X-Served-By"), Some("wirehttp"));

    drop(client);
    server.stop().await;
}
