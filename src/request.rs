//! Incoming HTTP request type.

use std::borrow::Cow;
use std::collections::HashMap;
use std::net::SocketAddr;

use bytes::Bytes;
use http::request::Parts;
use http::{Extensions, HeaderMap, Method, Uri, Version};

/// Client IP resolved by [`RealIp`](crate::middleware::RealIp).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientIp(pub String);

/// Host resolved by [`RealHost`](crate::middleware::RealHost).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientHost(pub String);

/// An incoming HTTP request with its body fully buffered.
///
/// Besides the wire-level parts, a request carries per-request context:
/// path parameters filled in by the router, and typed
/// [`extensions`](Request::extensions) set by middleware (the identity
/// middlewares store [`ClientIp`] and [`ClientHost`] there).
pub struct Request {
    head: Parts,
    body: Bytes,
    params: HashMap<String, String>,
    remote_addr: SocketAddr,
    host: String,
}

impl Request {
    /// Builds a request from its `http` representation and the transport
    /// peer address.
    ///
    /// The server does this for every connection; tests call it directly:
    ///
    /// ```rust
    /// use gantry::Request;
    ///
    /// let req = Request::new(
    ///     http::Request::builder()
    ///         .uri("/health")
    ///         .header("host", "example.com")
    ///         .body(bytes::Bytes::new())
    ///         .unwrap(),
    ///     "10.0.0.1:1234".parse().unwrap(),
    /// );
    /// assert_eq!(req.host(), "example.com");
    /// ```
    pub fn new(req: http::Request<Bytes>, remote_addr: SocketAddr) -> Self {
        let (head, body) = req.into_parts();
        let host = head
            .uri
            .authority()
            .map(|a| a.as_str().to_owned())
            .or_else(|| {
                head.headers
                    .get(http::header::HOST)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_owned)
            })
            .unwrap_or_default();

        Self { head, body, params: HashMap::new(), remote_addr, host }
    }

    pub fn method(&self) -> &Method { &self.head.method }
    pub fn uri(&self) -> &Uri { &self.head.uri }
    pub fn path(&self) -> &str { self.head.uri.path() }
    pub fn query(&self) -> &str { self.head.uri.query().unwrap_or("") }
    pub fn version(&self) -> Version { self.head.version }
    pub fn headers(&self) -> &HeaderMap { &self.head.headers }
    pub fn body(&self) -> &[u8] { &self.body }
    pub fn remote_addr(&self) -> SocketAddr { self.remote_addr }

    /// The host this request was addressed to. [`RealHost`] rewrites it with
    /// the value resolved from proxy headers.
    ///
    /// [`RealHost`]: crate::middleware::RealHost
    pub fn host(&self) -> &str { &self.host }

    /// Case-insensitive header lookup. Non-UTF-8 values read as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.head.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn extensions(&self) -> &Extensions { &self.head.extensions }
    pub fn extensions_mut(&mut self) -> &mut Extensions { &mut self.head.extensions }

    /// Client IP stored by [`RealIp`](crate::middleware::RealIp), if it ran.
    pub fn real_ip(&self) -> Option<&str> {
        self.head.extensions.get::<ClientIp>().map(|ip| ip.0.as_str())
    }

    /// Host stored by [`RealHost`](crate::middleware::RealHost), if it ran.
    pub fn real_host(&self) -> Option<&str> {
        self.head.extensions.get::<ClientHost>().map(|h| h.0.as_str())
    }

    /// The resolved client IP, or the raw peer address when no identity
    /// middleware ran.
    pub fn remote_ip(&self) -> Cow<'_, str> {
        match self.real_ip() {
            Some(ip) => Cow::Borrowed(ip),
            None => Cow::Owned(self.remote_addr.to_string()),
        }
    }

    /// A cheap snapshot of the fields an error handler needs after the
    /// request itself has been consumed by a handler.
    pub fn head(&self) -> RequestHead {
        RequestHead {
            method: self.head.method.clone(),
            uri: self.head.uri.clone(),
            host: self.host.clone(),
            remote_addr: self.remote_addr,
            real_ip: self.real_ip().map(str::to_owned),
        }
    }

    pub(crate) fn set_params(&mut self, params: HashMap<String, String>) {
        self.params = params;
    }

    pub(crate) fn set_host(&mut self, host: String) {
        self.host = host;
    }
}

/// Request metadata handed to the router's error handler.
#[derive(Clone, Debug)]
pub struct RequestHead {
    pub method: Method,
    pub uri: Uri,
    pub host: String,
    pub remote_addr: SocketAddr,
    pub real_ip: Option<String>,
}
