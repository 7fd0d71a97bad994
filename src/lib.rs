#![doc(html_root_url = "https://docs.rs/wirehttp/latest")]
//! Public API for the `wirehttp` library.
//!
//! This crate provides an HTTP/1.1 server engine: a streaming wire codec,
//! a router with a lookup cache, a middleware-driven dispatch pipeline,
//! object pools for per-request state and a tokio server that bounds
//! concurrent connections with a worker pool.

pub mod codec;
pub mod context;
pub mod metrics;
pub mod middleware;
pub mod panic;
pub mod pipeline;
pub mod pool;
pub mod request;
pub mod response;
pub mod router;
pub mod server;
pub mod values;

pub use codec::{CodecError, HttpCodec, ParseError};
pub use context::{BindError, Context, HandlerFn, handler};
pub use middleware::{Middleware, compose, middleware};
pub use pool::{ObjectPool, Pools, Reset};
pub use request::{Method, Request};
pub use response::Response;
pub use router::{Params, Router};
pub use server::{HttpServer, RouteGroup, ServerConfig, ServerError};
pub use values::{Key, Values};
