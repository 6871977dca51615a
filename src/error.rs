//! Error types.
//!
//! Three families live here:
//!
//! - [`Error`]: infrastructure failures: binding a port, accepting a
//!   connection, an unparsable listen address.
//! - [`ConfigError`]: setup-time mistakes. Middleware constructors and the
//!   config loader return these before a single request is served.
//! - [`HttpError`]: the typed error a handler returns when it wants a
//!   specific status code. Any other error a handler returns is rendered as
//!   `500 Internal Server Error` by the default error handler.

use std::error::Error as StdError;
use std::path::PathBuf;

use http::StatusCode;

/// A type-erased handler error. Handlers registered with
/// [`Router::handle_fn`](crate::Router::handle_fn) may return any error that
/// converts into this.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// The error type returned by gantry's fallible server operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid listen address `{addr}`: {source}")]
    Addr {
        addr: String,
        #[source]
        source: std::net::AddrParseError,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// A configuration mistake detected at construction time.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("secret key header middleware requires a header name")]
    MissingSecretHeaderName,

    #[error("secret key header middleware requires a header value")]
    MissingSecretHeaderValue,

    #[error("invalid header name `{0}`")]
    InvalidHeaderName(String),

    #[error("could not read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("config validation failed: {0}")]
    Invalid(String),
}

/// A handler error that carries the HTTP status to answer with.
///
/// ```rust
/// use gantry::{HttpError, Request, Response};
///
/// async fn find_user(req: Request) -> Result<Response, HttpError> {
///     match req.param("id") {
///         Some("42") => Ok(Response::text("alice")),
///         _ => Err(HttpError::not_found("no such user")),
///     }
/// }
/// ```
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct HttpError {
    status: StatusCode,
    message: String,
}

impl HttpError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Finds an `HttpError` in `err` or anywhere down its `source()` chain.
    pub fn find<'a>(err: &'a (dyn StdError + 'static)) -> Option<&'a HttpError> {
        let mut current = Some(err);
        while let Some(e) = current {
            if let Some(http) = e.downcast_ref::<HttpError>() {
                return Some(http);
            }
            current = e.source();
        }
        None
    }
}

/// Status a handler error maps to: the wrapped [`HttpError`]'s status, or 500.
pub(crate) fn status_of(err: &(dyn StdError + Send + Sync + 'static)) -> StatusCode {
    HttpError::find(err).map_or(StatusCode::INTERNAL_SERVER_ERROR, HttpError::status)
}
