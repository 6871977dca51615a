//! Radix-tree request router with ordered middleware chains.
//!
//! One tree per HTTP method plus one for method-less patterns. O(path-length)
//! lookup. Routes are wrapped with the scoped chain when they are registered;
//! the global chain is folded around the whole table once, in
//! [`Router::into_app`].

use std::collections::HashMap;
use std::mem;
use std::sync::{Arc, PoisonError, RwLock};

use http::Method;
use matchit::{Match, Router as MatchitRouter};

use crate::error::{BoxError, HttpError};
use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler, FallibleHandler, Handler};
use crate::middleware::{self, Chain, Middleware};
use crate::request::{Request, RequestHead};
use crate::response::Response;

/// Turns a handler error into the response the client sees.
pub type ErrorHandler = Arc<dyn Fn(&RequestHead, BoxError) -> Response + Send + Sync>;

/// The error handler shared by a router, its groups, and every fallible
/// handler registered on them. Replacing it affects routes registered
/// earlier too.
#[doc(hidden)]
pub struct ErrorHandlerCell(RwLock<ErrorHandler>);

impl ErrorHandlerCell {
    fn new(handler: ErrorHandler) -> Self {
        Self(RwLock::new(handler))
    }

    pub fn get(&self) -> ErrorHandler {
        Arc::clone(&self.0.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn set(&self, handler: ErrorHandler) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = handler;
    }
}

/// The error handler a new [`Router`] starts with.
///
/// An [`HttpError`] anywhere in the error's source chain answers with its
/// status and message. Anything else answers `500` with the error's display
/// text. Both are plain-text bodies terminated by a newline.
pub fn default_error_handler() -> ErrorHandler {
    Arc::new(|_head: &RequestHead, err: BoxError| match HttpError::find(err.as_ref()) {
        Some(http) => Response::error(http.status(), http.message()),
        None => Response::error(http::StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    })
}

async fn not_found(_req: Request) -> Response {
    Response::error(http::StatusCode::NOT_FOUND, "404 page not found")
}

/// The application router.
///
/// Build it once at startup, then pass it to [`Server::serve`] (or freeze it
/// yourself with [`into_app`](Router::into_app)).
///
/// ```rust
/// use gantry::middleware::{Recover, SecretKeyHeader, SecretKeyHeaderConfig};
/// use gantry::{Router, health};
///
/// # fn main() -> Result<(), gantry::ConfigError> {
/// let secret = SecretKeyHeader::new(SecretKeyHeaderConfig {
///     header_name: "X-Secret-Key".into(),
///     header_value: "s3cret".into(),
///     debug: false,
/// })?;
///
/// let mut router = Router::new();
/// router.use_middleware(Recover::new());
/// router.group(|ops| {
///     ops.use_middleware(secret);
///     ops.get("/health", health::health);
///     ops.get("/version", health::version);
/// });
/// let app = router.into_app();
/// # let _ = app;
/// # Ok(())
/// # }
/// ```
///
/// [`Server::serve`]: crate::Server::serve
pub struct Router {
    table: Table,
    global: Chain,
    scoped: Chain,
    is_group: bool,
    on_error: Arc<ErrorHandlerCell>,
}

impl Router {
    pub fn new() -> Self {
        Self {
            table: Table::default(),
            global: Chain::new(),
            scoped: Chain::new(),
            is_group: false,
            on_error: Arc::new(ErrorHandlerCell::new(default_error_handler())),
        }
    }

    /// Appends a middleware.
    ///
    /// On the root router it joins the global chain, which wraps every
    /// request, including ones for routes registered before this call and
    /// ones that end in the fallback. Inside a [`group`](Router::group) it
    /// joins that group's scoped chain and wraps routes registered after
    /// this call.
    pub fn use_middleware(&mut self, mw: impl Middleware) -> &mut Self {
        let mw: Arc<dyn Middleware> = Arc::new(mw);
        if self.is_group {
            self.scoped.push(mw);
        } else {
            self.global.push(mw);
        }
        self
    }

    /// Alias for [`use_middleware`](Router::use_middleware).
    pub fn layer(&mut self, mw: impl Middleware) -> &mut Self {
        self.use_middleware(mw)
    }

    /// Registers routes that share extra middleware.
    ///
    /// The group starts with a copy of the current scoped chain; middleware
    /// it adds never leak back into this router or into sibling groups.
    pub fn group(&mut self, f: impl FnOnce(&mut Router)) -> &mut Self {
        let mut sub = Router {
            table: mem::take(&mut self.table),
            global: Chain::new(),
            scoped: self.scoped.clone(),
            is_group: true,
            on_error: Arc::clone(&self.on_error),
        };
        f(&mut sub);
        self.table = sub.table;
        self
    }

    /// Registers a handler under `pattern`: `"GET /users/{id}"` for one
    /// method, `"/users/{id}"` for all of them.
    ///
    /// # Panics
    ///
    /// Panics on a malformed method, a path not starting with `/`, or a
    /// pattern that conflicts with one already registered.
    pub fn handle(&mut self, pattern: &str, handler: impl Handler) -> &mut Self {
        self.insert(pattern, Handler::into_boxed_handler(handler))
    }

    /// Registers a handler returning `Result`. An `Err` goes to the router's
    /// error handler, and its response is what the middleware chains see.
    ///
    /// # Panics
    ///
    /// Same as [`handle`](Router::handle).
    pub fn handle_fn(&mut self, pattern: &str, handler: impl FallibleHandler) -> &mut Self {
        let boxed = FallibleHandler::into_boxed_handler(handler, Arc::clone(&self.on_error));
        self.insert(pattern, boxed)
    }

    pub fn get(&mut self, path: &str, handler: impl Handler) -> &mut Self {
        self.handle(&format!("GET {path}"), handler)
    }

    pub fn post(&mut self, path: &str, handler: impl Handler) -> &mut Self {
        self.handle(&format!("POST {path}"), handler)
    }

    pub fn put(&mut self, path: &str, handler: impl Handler) -> &mut Self {
        self.handle(&format!("PUT {path}"), handler)
    }

    pub fn delete(&mut self, path: &str, handler: impl Handler) -> &mut Self {
        self.handle(&format!("DELETE {path}"), handler)
    }

    pub fn patch(&mut self, path: &str, handler: impl Handler) -> &mut Self {
        self.handle(&format!("PATCH {path}"), handler)
    }

    /// Sets the handler for requests no pattern matches. It is wrapped with
    /// the current scoped chain like any route.
    pub fn fallback(&mut self, handler: impl Handler) -> &mut Self {
        self.table.fallback = middleware::apply(&self.scoped, Handler::into_boxed_handler(handler));
        self
    }

    /// Replaces the error handler. The handler is shared by the root router
    /// and every group, so calling this on a group replaces it for the
    /// parent and its other groups too.
    pub fn set_error_handler<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(&RequestHead, BoxError) -> Response + Send + Sync + 'static,
    {
        self.on_error.set(Arc::new(handler));
        self
    }

    /// Freezes the router: folds the global chain around the route table.
    pub fn into_app(self) -> App {
        let table: BoxedHandler = Arc::new(self.table);
        App { entry: middleware::apply(&self.global, table) }
    }

    fn insert(&mut self, pattern: &str, handler: BoxedHandler) -> &mut Self {
        let (method, path) = parse_pattern(pattern);
        let handler = middleware::apply(&self.scoped, handler);
        let tree = match method {
            Some(method) => self.table.by_method.entry(method).or_default(),
            None => &mut self.table.any,
        };
        tree.insert(path, handler)
            .unwrap_or_else(|e| panic!("invalid route `{pattern}`: {e}"));
        self
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

fn parse_pattern(pattern: &str) -> (Option<Method>, &str) {
    let (method, path) = match pattern.split_once(' ') {
        Some((method, path)) => {
            let method = Method::from_bytes(method.as_bytes())
                .unwrap_or_else(|e| panic!("invalid route `{pattern}`: {e}"));
            (Some(method), path.trim_start())
        }
        None => (None, pattern),
    };
    if !path.starts_with('/') {
        panic!("invalid route `{pattern}`: path must start with `/`");
    }
    (method, path)
}

struct Table {
    by_method: HashMap<Method, MatchitRouter<BoxedHandler>>,
    any: MatchitRouter<BoxedHandler>,
    fallback: BoxedHandler,
}

impl Default for Table {
    fn default() -> Self {
        Self {
            by_method: HashMap::new(),
            any: MatchitRouter::new(),
            fallback: Handler::into_boxed_handler(not_found),
        }
    }
}

impl Table {
    fn lookup(&self, method: &Method, path: &str) -> Option<(BoxedHandler, HashMap<String, String>)> {
        // `GET` routes answer `HEAD` unless a `HEAD` route is registered.
        let head_as_get = || {
            if *method == Method::HEAD {
                self.method_match(&Method::GET, path)
            } else {
                None
            }
        };
        let matched = self
            .method_match(method, path)
            .or_else(head_as_get)
            .or_else(|| self.any.at(path).ok())?;
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((Arc::clone(matched.value), params))
    }

    fn method_match<'t, 'p>(
        &'t self,
        method: &Method,
        path: &'p str,
    ) -> Option<Match<'t, 'p, &'t BoxedHandler>> {
        self.by_method.get(method).and_then(|tree| tree.at(path).ok())
    }
}

impl ErasedHandler for Table {
    fn call(&self, mut req: Request) -> BoxFuture {
        match self.lookup(req.method(), req.path()) {
            Some((handler, params)) => {
                req.set_params(params);
                handler.call(req)
            }
            None => self.fallback.call(req),
        }
    }
}

/// A frozen router: the entry point the server calls for every request.
/// Cloning is cheap.
#[derive(Clone)]
pub struct App {
    entry: BoxedHandler,
}

impl App {
    pub fn call(&self, req: Request) -> BoxFuture {
        self.entry.call(req)
    }
}
