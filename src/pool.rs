//! Reusable per-request objects.
//!
//! Each connection task checks a [`Request`], [`Context`] and [`Response`]
//! out of the server's [`Pools`] and checks them back in once the response
//! has been written. Checkout never blocks: an empty pool hands out a fresh
//! value. Checkin always resets the value first, so an object waiting in a
//! pool holds no data from its previous use while keeping the capacity of
//! its maps and buffers.

use std::fmt;

use crossbeam_queue::ArrayQueue;

use crate::{context::Context, request::Request, response::Response};

/// Default number of idle objects retained per pool.
pub const DEFAULT_IDLE_CAPACITY: usize = 1024;

/// Values that can be returned to a clean state for reuse.
///
/// Implementations must remove every entry from map-typed fields and
/// truncate vectors to zero length. Capacity should be retained.
pub trait Reset {
    /// Clear all request-scoped state.
    fn reset(&mut self);
}

/// Bounded, lock-free store of idle objects.
///
/// ```
/// use wirehttp::{pool::ObjectPool, response::Response};
///
/// let pool: ObjectPool<Response> = ObjectPool::new(4);
/// let mut res = pool.checkout();
/// res.set_header("X-Trace", "1");
/// pool.checkin(res);
///
/// let res = pool.checkout();
/// assert!(res.headers().is_empty());
/// ```
pub struct ObjectPool<T> {
    idle: ArrayQueue<T>,
}

impl<T: Reset + Default> ObjectPool<T> {
    /// Create a pool retaining at most `capacity` idle objects.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            idle: ArrayQueue::new(capacity.max(1)),
        }
    }

    /// Take an object from the pool, or build a fresh one when it is empty.
    #[must_use]
    pub fn checkout(&self) -> T { self.idle.pop().unwrap_or_default() }

    /// Reset `item` and return it to the pool.
    ///
    /// When the pool already holds its maximum number of idle objects the
    /// item is dropped.
    pub fn checkin(&self, mut item: T) {
        item.reset();
        let _ = self.idle.push(item);
    }

    /// Number of idle objects currently stored.
    #[must_use]
    pub fn idle(&self) -> usize { self.idle.len() }
}

impl<T> fmt::Debug for ObjectPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectPool")
            .field("idle", &self.idle.len())
            .field("capacity", &self.idle.capacity())
            .finish()
    }
}

/// The request, context and response pools owned by one server.
#[derive(Debug)]
pub struct Pools {
    /// Pool of parsed requests, drawn from by the decoder.
    pub requests: ObjectPool<Request>,
    /// Pool of dispatch contexts.
    pub contexts: ObjectPool<Context>,
    /// Pool of response writers.
    pub responses: ObjectPool<Response>,
}

impl Pools {
    /// Create pools that each retain up to `capacity` idle objects.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            requests: ObjectPool::new(capacity),
            contexts: ObjectPool::new(capacity),
            responses: ObjectPool::new(capacity),
        }
    }
}

impl Default for Pools {
    fn default() -> Self { Self::new(DEFAULT_IDLE_CAPACITY) }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use rstest::{fixture, rstest};

    use super::*;
    use crate::request::Method;

    #[fixture]
    fn pools() -> Pools { Pools::new(8) }

    #[rstest]
    fn request_is_clean_after_reuse(pools: Pools) {
        let req = Request::new(Method::Post, "/upload?x=1")
            .with_header("Authorization", "Bearer t")
            .with_body(b"payload".to_vec());
        pools.requests.checkin(req);

        let req = pools.requests.checkout();
        assert!(req.headers().is_empty());
        assert!(req.body().is_empty());
        assert!(req.raw_query().is_empty());
        assert!(req.header("Authorization").is_none());
    }

    #[rstest]
    fn context_is_clean_after_reuse(pools: Pools) {
        let mut ctx = pools.contexts.checkout();
        ctx.insert("user", String::from("alice"));
        ctx.insert("attempts", 3_u32);
        pools.contexts.checkin(ctx);

        let ctx = pools.contexts.checkout();
        assert!(ctx.get::<String>("user").is_none());
        assert!(!ctx.contains("attempts"));
        assert!(ctx.values().is_empty());
    }

    #[rstest]
    fn response_is_clean_after_reuse(pools: Pools) {
        let mut res = pools.responses.checkout();
        res.set_status(418);
        res.set_header("X-Stale", "yes");
        res.write(b"teapot");
        pools.responses.checkin(res);

        let res = pools.responses.checkout();
        assert_eq!(res.status(), 200);
        assert!(res.header("X-Stale").is_none());
        assert!(res.body().is_empty());
    }

    #[test]
    fn checkout_from_empty_pool_allocates() {
        let pool: ObjectPool<Response> = ObjectPool::new(2);
        assert_eq!(pool.idle(), 0);
        let res = pool.checkout();
        assert_eq!(res.status(), 200);
    }

    #[test]
    fn full_pool_drops_extra_items() {
        let pool: ObjectPool<Response> = ObjectPool::new(1);
        pool.checkin(Response::default());
        pool.checkin(Response::default());
        assert_eq!(pool.idle(), 1);
    }

    #[test]
    fn concurrent_checkout_and_checkin() {
        let pool = Arc::new(ObjectPool::<Request>::new(16));
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let pool = Arc::clone(&pool);
                thread::spawn(move || {
                    for _ in 0..100 {
                        let mut req = pool.checkout();
                        assert!(req.headers().is_empty(), "stale header leaked");
                        req.insert_header(format!("X-{i}"), "v".into());
                        pool.checkin(req);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("pool worker panicked");
        }
        assert!(pool.idle() <= 16);
    }
}
