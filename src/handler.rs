//! Handler traits and type erasure.
//!
//! # How async handlers are stored
//!
//! The router holds handlers of *different* types in one table, and every
//! middleware turns one handler into another. Both only work with a single
//! concrete type, so handlers are hidden behind the [`ErasedHandler`] trait
//! object and passed around as [`BoxedHandler`].
//!
//! ```text
//! async fn hello(req: Request) -> Response { … }   ← user writes this
//!        ↓ router.get("/", hello)
//! hello.into_boxed_handler()                       ← Handler blanket impl
//!        ↓
//! Arc::new(FnHandler(hello))                       ← heap-allocated wrapper
//!        ↓  scoped chain folded around it, stored in the route table
//! handler.call(req)  at request time               ← one vtable dispatch per layer
//!        ↓
//! Box::pin(async { hello(req).await.into_response() })  ← BoxFuture
//! ```
//!
//! Fallible handlers (`async fn(Request) -> Result<R, E>`) go through
//! [`FallibleHandler`] instead, whose wrapper routes an `Err` to the
//! router's error handler. By the time any middleware sees the result it is
//! an ordinary [`Response`].

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::BoxError;
use crate::request::Request;
use crate::response::{IntoResponse, Response};
use crate::router::ErrorHandlerCell;

/// A heap-allocated, type-erased future that resolves to a [`Response`].
///
/// `Send + 'static` let tokio move the future across worker threads.
pub type BoxFuture = Pin<Box<dyn Future<Output = Response> + Send + 'static>>;

/// Object-safe dispatch interface shared by handlers and middleware.
///
/// Implement this on a struct holding the `next` handler to write a
/// middleware by hand; see [`Middleware`](crate::middleware::Middleware).
pub trait ErasedHandler {
    fn call(&self, req: Request) -> BoxFuture;
}

/// A heap-allocated, type-erased handler shared across concurrent requests.
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

// ── Public Handler traits ─────────────────────────────────────────────────────

/// Implemented for every infallible route handler.
///
/// You never implement this yourself. It is automatically satisfied for any
/// `async fn` (or closure returning a future) with the signature:
///
/// ```text
/// async fn name(req: Request) -> impl IntoResponse
/// ```
///
/// The trait is **sealed**: only the blanket impl below can satisfy it.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

/// Implemented for every fallible route handler:
///
/// ```text
/// async fn name(req: Request) -> Result<impl IntoResponse, impl Into<BoxError>>
/// ```
///
/// Sealed like [`Handler`].
pub trait FallibleHandler: private::SealedFallible + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self, on_error: Arc<ErrorHandlerCell>) -> BoxedHandler;
}

mod private {
    pub trait Sealed {}
    pub trait SealedFallible {}
}

// ── Blanket implementations ───────────────────────────────────────────────────

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

impl<F, Fut, R, E> private::SealedFallible for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    R: IntoResponse + Send + 'static,
    E: Into<BoxError> + Send + 'static,
{
}

impl<F, Fut, R, E> FallibleHandler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    R: IntoResponse + Send + 'static,
    E: Into<BoxError> + Send + 'static,
{
    fn into_boxed_handler(self, on_error: Arc<ErrorHandlerCell>) -> BoxedHandler {
        Arc::new(FallibleFn { f: self, on_error })
    }
}

// ── Concrete wrappers ─────────────────────────────────────────────────────────

/// Bridges a typed handler `F` to the trait-object world.
struct FnHandler<F>(F);

impl<F, Fut, R> ErasedHandler for FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call(&self, req: Request) -> BoxFuture {
        let fut = (self.0)(req);
        Box::pin(async move { fut.await.into_response() })
    }
}

struct FallibleFn<F> {
    f: F,
    on_error: Arc<ErrorHandlerCell>,
}

impl<F, Fut, R, E> ErasedHandler for FallibleFn<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    R: IntoResponse + Send + 'static,
    E: Into<BoxError> + Send + 'static,
{
    fn call(&self, req: Request) -> BoxFuture {
        let head = req.head();
        let fut = (self.f)(req);
        let on_error = Arc::clone(&self.on_error);
        Box::pin(async move {
            match fut.await {
                Ok(res) => res.into_response(),
                Err(err) => (on_error.get())(&head, err.into()),
            }
        })
    }
}
