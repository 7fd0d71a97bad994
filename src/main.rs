//! Demo users API served by `wirehttp`.
//!
//! Keeps users in memory, seeded with two accounts, and exposes them under
//! `/api/users`.

mod cli;

use std::{
    collections::BTreeMap,
    sync::{Arc, PoisonError, RwLock},
};

use clap::Parser;
use serde::{Deserialize, Serialize};
use serde_json::json;
use wirehttp::{
    context::Context,
    middleware::{cors, logger, recovery},
    server::HttpServer,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct User {
    #[serde(default)]
    id: u64,
    name: String,
    email: String,
}

#[derive(Debug)]
struct Users {
    by_id: BTreeMap<u64, User>,
    next_id: u64,
}

impl Users {
    fn seeded() -> Self {
        let by_id = [(1, "Alice", "alice@example.com"), (2, "Bob", "bob@example.com")]
            .into_iter()
            .map(|(id, name, email)| {
                let user = User {
                    id,
                    name: name.to_owned(),
                    email: email.to_owned(),
                };
                (id, user)
            })
            .collect();
        Self { by_id, next_id: 3 }
    }
}

type Store = Arc<RwLock<Users>>;

fn user_id(ctx: &mut Context) -> Option<u64> {
    let id = ctx.param("id").parse().ok();
    if id.is_none() {
        ctx.error(400, "invalid user id");
    }
    id
}

fn valid_user(ctx: &mut Context) -> Option<User> {
    let user: User = match ctx.bind_json() {
        Ok(user) => user,
        Err(e) => {
            ctx.error(400, &e.to_string());
            return None;
        }
    };
    if user.name.trim().is_empty() || user.email.trim().is_empty() {
        ctx.error(400, "name and email are required");
        return None;
    }
    Some(user)
}

fn register(server: &HttpServer, store: &Store) {
    let users = Arc::clone(store);
    server.get("/api/users", move |ctx: &mut Context| {
        let users = users.read().unwrap_or_else(PoisonError::into_inner);
        let list: Vec<&User> = users.by_id.values().collect();
        ctx.json(200, &json!({ "users": list }));
    });

    let users = Arc::clone(store);
    server.get("/api/users/:id", move |ctx: &mut Context| {
        let Some(id) = user_id(ctx) else { return };
        let users = users.read().unwrap_or_else(PoisonError::into_inner);
        match users.by_id.get(&id) {
            Some(user) => ctx.json(200, &json!({ "user": user })),
            None => ctx.error(404, "user not found"),
        }
    });

    let users = Arc::clone(store);
    server.post("/api/users", move |ctx: &mut Context| {
        let Some(mut user) = valid_user(ctx) else { return };
        let mut users = users.write().unwrap_or_else(PoisonError::into_inner);
        user.id = users.next_id;
        users.next_id += 1;
        users.by_id.insert(user.id, user.clone());
        ctx.json(201, &json!({ "user": user }));
    });

    let users = Arc::clone(store);
    server.put("/api/users/:id", move |ctx: &mut Context| {
        let Some(id) = user_id(ctx) else { return };
        let Some(mut user) = valid_user(ctx) else { return };
        let mut users = users.write().unwrap_or_else(PoisonError::into_inner);
        let Some(slot) = users.by_id.get_mut(&id) else {
            ctx.error(404, "user not found");
            return;
        };
        user.id = id;
        slot.clone_from(&user);
        ctx.json(200, &json!({ "user": user, "message": "User updated" }));
    });

    let users = Arc::clone(store);
    server.delete("/api/users/:id", move |ctx: &mut Context| {
        let Some(id) = user_id(ctx) else { return };
        let removed = users
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .by_id
            .remove(&id);
        match removed {
            Some(_) => ctx.json(200, &json!({ "message": "User deleted" })),
            None => ctx.error(404, "user not found"),
        }
    });
}

#[cfg(feature = "metrics")]
fn install_metrics(addr: std::net::SocketAddr) {
    match metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
    {
        Ok(()) => tracing::info!(%addr, "serving metrics"),
        Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
    }
}

#[cfg(not(feature = "metrics"))]
fn install_metrics(addr: std::net::SocketAddr) {
    tracing::warn!(%addr, "built without the metrics feature; ignoring --metrics-addr");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Applications embedding the library should install their own subscriber.
    tracing_subscriber::fmt::init();

    let cli = cli::Cli::parse();
    if let Some(addr) = cli.metrics_addr {
        install_metrics(addr);
    }

    let server = HttpServer::new()
        .workers(cli.workers)
        .read_timeout(cli.read_timeout())
        .write_timeout(cli.write_timeout());
    server
        .use_middleware(recovery())
        .use_middleware(logger())
        .use_middleware(cors("*"));
    register(&server, &Arc::new(RwLock::new(Users::seeded())));

    let server = server.bind(cli.addr)?;
    tracing::info!(addr = ?server.local_addr(), "server starting");
    server.run().await?;
    Ok(())
}
