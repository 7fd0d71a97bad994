//! Execution of a context's handler chain with panic isolation.

use std::panic::{self, AssertUnwindSafe};

use thiserror::Error;

use crate::{context::Context, panic::format_panic};

/// Failure of a dispatch.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    /// A step of the chain panicked; carries the panic message.
    #[error("handler panicked: {0}")]
    Panicked(String),
}

/// Run the chain loaded into `ctx` from its first step.
///
/// A panic anywhere in the chain is caught and returned as
/// [`DispatchError::Panicked`]. The response is buffered, so nothing has
/// reached the client when that happens.
///
/// # Errors
///
/// Returns [`DispatchError::Panicked`] if a step panics.
///
/// ```
/// use wirehttp::{
///     context::{Context, handler},
///     pipeline::{DispatchError, run},
///     request::{Method, Request},
/// };
///
/// let mut ctx = Context::new(Request::new(Method::Get, "/"));
/// ctx.set_chain(&[handler(|_: &mut Context| panic!("boom"))]);
/// assert_eq!(run(&mut ctx), Err(DispatchError::Panicked("boom".into())));
/// ```
pub fn run(ctx: &mut Context) -> Result<(), DispatchError> {
    panic::catch_unwind(AssertUnwindSafe(|| ctx.next()))
        .map_err(|payload| DispatchError::Panicked(format_panic(payload).to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        context::{HandlerFn, handler},
        middleware::{compose, middleware},
        request::{Method, Request},
    };

    #[test]
    fn completes_chain_without_error() {
        let mut ctx = Context::new(Request::new(Method::Get, "/"));
        ctx.set_chain(&[handler(|ctx: &mut Context| ctx.text(200, "fine"))]);
        assert_eq!(run(&mut ctx), Ok(()));
        assert_eq!(ctx.response().body(), b"fine");
    }

    #[test]
    fn panic_in_middleware_is_caught() {
        let explode = middleware(|_next: HandlerFn| {
            handler(|_: &mut Context| panic!("{}", String::from("middleware exploded")))
        });
        let app = compose(&[explode], handler(|_: &mut Context| {}));
        let mut ctx = Context::new(Request::new(Method::Get, "/"));
        ctx.set_chain(&[app]);
        assert_eq!(
            run(&mut ctx),
            Err(DispatchError::Panicked("middleware exploded".into()))
        );
    }

    #[test]
    fn context_is_usable_after_panic() {
        let mut ctx = Context::new(Request::new(Method::Get, "/"));
        ctx.set_chain(&[handler(|ctx: &mut Context| {
            ctx.text(200, "half written");
            panic!("late failure");
        })]);
        assert!(run(&mut ctx).is_err());
        ctx.response_mut().write_error(500, "Internal Server Error");
        assert_eq!(ctx.response().status(), 500);
    }

    #[test]
    fn empty_chain_is_a_noop() {
        let mut ctx = Context::new(Request::new(Method::Get, "/"));
        assert_eq!(run(&mut ctx), Ok(()));
        assert_eq!(ctx.response().status(), 200);
    }
}
