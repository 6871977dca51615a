//! Per-request access log line and request metrics.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use http::HeaderMap;
use tokio::time::Instant;
use tracing::info;

use super::Middleware;
use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler};
use crate::metrics::{Metrics, RequestLabels};
use crate::request::Request;

#[derive(Clone)]
pub struct AccessLogConfig {
    pub metrics: Arc<Metrics>,
}

/// Emits one INFO `request completed` event per request and feeds the
/// request metrics.
///
/// Place it after [`RealIp`](super::RealIp) and [`RealHost`](super::RealHost)
/// so the logged `remote_ip` and `host` are the resolved ones.
#[derive(Clone)]
pub struct AccessLog {
    metrics: Arc<Metrics>,
}

impl AccessLog {
    pub fn new(config: AccessLogConfig) -> Self {
        Self { metrics: config.metrics }
    }
}

impl Middleware for AccessLog {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        Arc::new(AccessLogHandler { metrics: Arc::clone(&self.metrics), next })
    }
}

struct AccessLogHandler {
    metrics: Arc<Metrics>,
    next: BoxedHandler,
}

impl ErasedHandler for AccessLogHandler {
    fn call(&self, req: Request) -> BoxFuture {
        let start = Instant::now();
        let method = req.method().clone();
        let proto = req.version();
        let host = req.host().to_owned();
        let path = req.path().to_owned();
        let query = req.query().to_owned();
        let remote_addr = req.remote_addr();
        let remote_ip = req.remote_ip().into_owned();
        let req_len = req.body().len();
        let headers = HeaderGroup::new(req.headers());

        let metrics = Arc::clone(&self.metrics);
        let fut = self.next.call(req);

        Box::pin(async move {
            let res = fut.await;
            let duration = start.elapsed();
            let status = res.status_code();
            let resp_len = res.body().len();

            let labels = RequestLabels {
                code: status,
                method: method.as_str(),
                host: &host,
                path: &path,
            };
            metrics.observe_request(&labels, duration, req_len, resp_len);

            info!(
                method = %method,
                proto = ?proto,
                host = %host,
                path = %path,
                query = %query,
                remote_addr = %remote_addr,
                remote_ip = %remote_ip,
                req_len = req_len as u64,
                resp_len = resp_len as u64,
                status_code = status.as_u16(),
                duration = ?duration,
                headers = %headers,
                "request completed"
            );
            res
        })
    }
}

/// Request headers as logged: canonical names, sorted, repeated values
/// joined with `", "`. Displays as a JSON object, which the JSON log format
/// emits as a nested `headers` group.
struct HeaderGroup(BTreeMap<String, String>);

impl HeaderGroup {
    fn new(headers: &HeaderMap) -> Self {
        let mut group = BTreeMap::new();
        for name in headers.keys() {
            let joined = headers
                .get_all(name)
                .iter()
                .map(|v| String::from_utf8_lossy(v.as_bytes()))
                .collect::<Vec<_>>()
                .join(", ");
            group.insert(canonical_header_key(name.as_str()), joined);
        }
        Self(group)
    }
}

impl fmt::Display for HeaderGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(&self.0).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}

/// `x-forwarded-for` → `X-Forwarded-For`.
fn canonical_header_key(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = true;
    for c in name.chars() {
        if upper {
            out.extend(c.to_uppercase());
        } else {
            out.extend(c.to_lowercase());
        }
        upper = c == '-';
    }
    out
}
