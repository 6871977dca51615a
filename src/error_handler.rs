//! The production error handler: themed error pages, an error counter, and
//! notifications for server errors.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use gantry::Router;
//! use gantry::error_handler::{ErrorHandlerConfig, StaticErrorPages, themed_error_handler};
//!
//! # fn main() -> Result<(), gantry::ConfigError> {
//! let pages = StaticErrorPages::from_dir("assets/error_pages")?;
//! let mut router = Router::new();
//! router.set_error_handler(themed_error_handler(ErrorHandlerConfig {
//!     pages: Arc::new(pages),
//!     notifier: None,
//!     metrics: None,
//! }));
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use http::StatusCode;
use tokio::runtime::Handle;
use tracing::{debug, error, warn};

use crate::error::{BoxError, ConfigError, status_of};
use crate::metrics::Metrics;
use crate::request::RequestHead;
use crate::response::{ContentType, Response};

/// Source of error page bodies, keyed by status.
pub trait ErrorPages: Send + Sync + 'static {
    fn page(&self, status: StatusCode) -> Option<String>;
}

/// Error pages held in memory.
#[derive(Clone, Debug, Default)]
pub struct StaticErrorPages {
    pages: HashMap<StatusCode, String>,
}

impl StaticErrorPages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, status: StatusCode, body: impl Into<String>) -> Self {
        self.pages.insert(status, body.into());
        self
    }

    /// Loads every `HTTP<code>.html` file in `dir`. Other files are ignored.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Read`] if the directory or one of the pages cannot be
    /// read.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let dir = dir.as_ref();
        let read_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source: std::io::Error| ConfigError::Read { path, source }
        };

        let mut pages = HashMap::new();
        for entry in fs::read_dir(dir).map_err(read_err(dir))? {
            let path = entry.map_err(read_err(dir))?.path();
            let Some(status) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(status_from_file_name)
            else {
                continue;
            };
            let body = fs::read_to_string(&path).map_err(read_err(&path))?;
            pages.insert(status, body);
        }
        Ok(Self { pages })
    }
}

fn status_from_file_name(name: &str) -> Option<StatusCode> {
    let code = name.strip_prefix("HTTP")?.strip_suffix(".html")?;
    code.parse::<u16>().ok().and_then(|c| StatusCode::from_u16(c).ok())
}

impl ErrorPages for StaticErrorPages {
    fn page(&self, status: StatusCode) -> Option<String> {
        self.pages.get(&status).cloned()
    }
}

/// An outbound alert channel (mail, chat, pager).
#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    async fn send(&self, subject: &str, message: &str) -> Result<(), BoxError>;
}

pub struct ErrorHandlerConfig {
    pub pages: Arc<dyn ErrorPages>,
    /// Told about every error that maps to a 5xx status.
    pub notifier: Option<Arc<dyn Notifier>>,
    /// Receives `http_errors_total{host}`.
    pub metrics: Option<Arc<Metrics>>,
}

/// Builds the error handler to pass to
/// [`Router::set_error_handler`](crate::Router::set_error_handler).
///
/// For every handler error it counts the error per host, logs
/// `error on request` once, sends a notification in the background when
/// the status is 5xx, and answers with the page for the status. Without
/// one it falls back to the 500 page (keeping the original status), and
/// without that to the status's reason phrase in plain text.
pub fn themed_error_handler(
    config: ErrorHandlerConfig,
) -> impl Fn(&RequestHead, BoxError) -> Response + Send + Sync + 'static {
    let ErrorHandlerConfig { pages, notifier, metrics } = config;

    move |head: &RequestHead, err: BoxError| {
        if let Some(metrics) = &metrics {
            metrics.record_error(&head.host);
        }

        let status = status_of(err.as_ref());
        error!(
            err = %err,
            status = status.as_u16(),
            method = %head.method,
            url = %head.uri,
            "error on request"
        );

        if status.is_server_error() {
            if let Some(notifier) = &notifier {
                notify(Arc::clone(notifier), err.to_string());
            }
        }

        render(pages.as_ref(), status)
    }
}

fn notify(notifier: Arc<dyn Notifier>, message: String) {
    let Ok(runtime) = Handle::try_current() else {
        warn!(err = %message, "no runtime available, error notification dropped");
        return;
    };
    runtime.spawn(async move {
        debug!(err = %message, "sending error notification");
        if let Err(e) = notifier.send("ERROR", &message).await {
            error!(err = %e, "error on notification send");
        }
    });
}

fn render(pages: &dyn ErrorPages, status: StatusCode) -> Response {
    match pages.page(status).or_else(|| pages.page(StatusCode::INTERNAL_SERVER_ERROR)) {
        Some(body) => Response::builder()
            .status(status)
            .header("x-content-type-options", "nosniff")
            .bytes(ContentType::Html, body.into_bytes()),
        None => Response::error(status, status.canonical_reason().unwrap_or("Error")),
    }
}
