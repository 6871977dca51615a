//! Client IP resolution.

use std::sync::Arc;

use super::Middleware;
use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler};
use crate::request::{ClientIp, Request};

#[derive(Clone, Debug, Default)]
pub struct RealIpConfig {
    /// Header set by the fronting proxy with the client IP, e.g.
    /// `X-Real-IP` or `CF-Connecting-IP`. `None` (or empty) trusts only the
    /// transport peer address.
    pub ip_header: Option<String>,
}

/// Stores the client IP as a [`ClientIp`] extension.
///
/// The configured header's value is taken verbatim: proxies put a bare IP
/// there. Without the header the transport peer address is used, port
/// stripped.
#[derive(Clone)]
pub struct RealIp {
    header: Option<Arc<str>>,
}

impl RealIp {
    pub fn new(config: RealIpConfig) -> Self {
        let header = config.ip_header.filter(|h| !h.is_empty()).map(Arc::from);
        Self { header }
    }
}

impl Middleware for RealIp {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        Arc::new(RealIpHandler { header: self.header.clone(), next })
    }
}

struct RealIpHandler {
    header: Option<Arc<str>>,
    next: BoxedHandler,
}

impl ErasedHandler for RealIpHandler {
    fn call(&self, mut req: Request) -> BoxFuture {
        let ip = resolve(self.header.as_deref(), &req);
        req.extensions_mut().insert(ClientIp(ip));
        self.next.call(req)
    }
}

fn resolve(header: Option<&str>, req: &Request) -> String {
    header
        .and_then(|name| req.header(name))
        .filter(|value| !value.is_empty())
        .map_or_else(|| req.remote_addr().ip().to_string(), str::to_owned)
}
