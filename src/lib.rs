//! # gantry
//!
//! The request dispatch pipeline of an HTTP service, and a time-boxed cache
//! to memoize what the pipeline computes.
//!
//! ## The pipeline
//!
//! ```text
//! request → Recover → RealIp → RealHost → AccessLog   (global chain)
//!         → route match
//!         → SecretKeyHeader …                          (scoped chain)
//!         → handler ──Err──→ error handler
//! ```
//!
//! - **Ordered middleware**: the first middleware declared is the first to
//!   see the request and the last to see the response.
//! - **Groups**: [`Router::group`] snapshots the scoped chain, so later
//!   additions to the parent never leak into groups created earlier.
//! - **One error seam**: handlers return `Result`; the router's error
//!   handler turns every `Err` into a response.
//! - **Build, then freeze**: [`Router::into_app`] folds everything into an
//!   immutable [`App`] shared across all connections.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use gantry::middleware::{RealHost, RealHostConfig, RealIp, RealIpConfig, Recover};
//! use gantry::{HttpError, Request, Response, Router, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), gantry::Error> {
//!     let mut app = Router::new();
//!     app.use_middleware(Recover::new())
//!         .use_middleware(RealIp::new(RealIpConfig::default()))
//!         .use_middleware(RealHost::new(RealHostConfig::default()));
//!
//!     app.handle_fn("GET /users/{id}", get_user);
//!
//!     Server::bind("0.0.0.0:3000")?.serve(app).await
//! }
//!
//! async fn get_user(req: Request) -> Result<Response, HttpError> {
//!     match req.param("id") {
//!         Some(id) => Ok(Response::json(format!(r#"{{"id":"{id}"}}"#).into_bytes())),
//!         None => Err(HttpError::bad_request("missing id")),
//!     }
//! }
//! ```

mod error;
mod handler;
mod request;
mod response;
mod router;
mod server;

pub mod cache;
pub mod config;
pub mod error_handler;
pub mod health;
pub mod logging;
pub mod metrics;
pub mod middleware;

pub use cache::TtlCache;
pub use error::{BoxError, ConfigError, Error, HttpError};
pub use handler::{BoxFuture, BoxedHandler, ErasedHandler, FallibleHandler, Handler};
pub use request::{ClientHost, ClientIp, Request, RequestHead};
pub use response::{ContentType, IntoResponse, Response, ResponseBuilder};
pub use router::{App, ErrorHandler, Router, default_error_handler};
pub use server::{Server, shutdown_signal};

#[cfg(test)]
pub(crate) mod test_support;
