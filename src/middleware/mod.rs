//! Middleware layer.
//!
//! A middleware turns one handler into another: `wrap(next) -> handler`.
//! Chains are plain ordered lists that the [`Router`](crate::Router) folds in
//! reverse, so the **first-declared middleware runs first**: it sees the raw
//! request first and the final response last. The last-declared one sits
//! closest to the handler.
//!
//! Built-in middleware:
//!
//! | Middleware | Concern |
//! |---|---|
//! | [`Recover`] | contains panics, answers 500 |
//! | [`RealIp`] | resolves the client IP into [`ClientIp`](crate::ClientIp) |
//! | [`RealHost`] | resolves the client host into [`ClientHost`](crate::ClientHost) |
//! | [`AccessLog`] | one structured log line and request metrics per request |
//! | [`SecretKeyHeader`] | silent-denial gate for operational endpoints |
//!
//! Ad-hoc middleware can be written as an async closure with [`from_fn`].

use std::future::Future;
use std::sync::Arc;

use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler};
use crate::request::Request;
use crate::response::Response;

mod access_log;
mod real_host;
mod real_ip;
mod recover;
mod secret_key;

pub use access_log::{AccessLog, AccessLogConfig};
pub use real_host::{RealHost, RealHostConfig};
pub use real_ip::{RealIp, RealIpConfig};
pub use recover::Recover;
pub use secret_key::{SecretKeyHeader, SecretKeyHeaderConfig};

/// A transformation from one handler to a wrapping handler.
///
/// Implemented for every `Fn(BoxedHandler) -> BoxedHandler`, and by the
/// built-in middleware structs.
pub trait Middleware: Send + Sync + 'static {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler;
}

impl<F> Middleware for F
where
    F: Fn(BoxedHandler) -> BoxedHandler + Send + Sync + 'static,
{
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        self(next)
    }
}

/// An ordered middleware chain. Cloning is cheap and yields an independent
/// snapshot: pushing onto the clone never affects the original.
pub(crate) type Chain = Vec<Arc<dyn Middleware>>;

/// `h = handler; for mw in reverse(chain) { h = mw.wrap(h) }`
pub(crate) fn apply(chain: &[Arc<dyn Middleware>], handler: BoxedHandler) -> BoxedHandler {
    chain.iter().rev().fold(handler, |next, mw| mw.wrap(next))
}

// ── from_fn ───────────────────────────────────────────────────────────────────

/// Builds a middleware from an async closure that receives the request and
/// the next handler.
///
/// ```rust
/// use gantry::middleware::from_fn;
/// use gantry::{ErasedHandler, Request, Router};
///
/// let mut router = Router::new();
/// router.use_middleware(from_fn(|req: Request, next| async move {
///     let mut res = next.call(req).await;
///     res.headers_mut().insert("x-served-by", "gantry".parse().unwrap());
///     res
/// }));
/// ```
pub fn from_fn<F, Fut>(f: F) -> FromFn<F>
where
    F: Fn(Request, BoxedHandler) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    FromFn { f: Arc::new(f) }
}

/// Middleware returned by [`from_fn`].
pub struct FromFn<F> {
    f: Arc<F>,
}

struct FromFnHandler<F> {
    f: Arc<F>,
    next: BoxedHandler,
}

impl<F, Fut> Middleware for FromFn<F>
where
    F: Fn(Request, BoxedHandler) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        Arc::new(FromFnHandler { f: Arc::clone(&self.f), next })
    }
}

impl<F, Fut> ErasedHandler for FromFnHandler<F>
where
    F: Fn(Request, BoxedHandler) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    fn call(&self, req: Request) -> BoxFuture {
        Box::pin((self.f)(req, Arc::clone(&self.next)))
    }
}
