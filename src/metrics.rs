//! Prometheus metrics for the dispatch pipeline.
//!
//! # Metrics
//!
//! - `http_requests_total{code, method, host, path}`: counter
//! - `http_request_duration_seconds{code, method, host, path}`: histogram
//! - `http_request_size_bytes{code, method, host, path}`: histogram
//! - `http_response_size_bytes{code, method, host, path}`: histogram
//! - `http_errors_total{host}`: counter, bumped by the themed error handler
//!
//! All of them live in the [`Registry`] passed to [`Metrics::new`], so tests
//! use a private registry and the binary exposes the default one via
//! [`Metrics::handler`].

use std::sync::Arc;
use std::time::Duration;

use http::StatusCode;
use http::header::{CONTENT_TYPE, HeaderValue};
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};

use crate::handler::Handler;
use crate::request::Request;
use crate::response::{ContentType, Response};

const REQUEST_LABELS: &[&str] = &["code", "method", "host", "path"];

/// Default histogram buckets for request duration (in seconds)
const DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Labels shared by every per-request metric.
pub(crate) struct RequestLabels<'a> {
    pub(crate) code: StatusCode,
    pub(crate) method: &'a str,
    pub(crate) host: &'a str,
    pub(crate) path: &'a str,
}

/// The metrics sink consumed by [`AccessLog`](crate::middleware::AccessLog)
/// and the themed error handler.
pub struct Metrics {
    registry: Registry,
    request_count: IntCounterVec,
    request_duration: HistogramVec,
    request_size: HistogramVec,
    response_size: HistogramVec,
    errors: IntCounterVec,
}

impl Metrics {
    /// Creates the metrics and registers them in `registry`.
    ///
    /// # Errors
    ///
    /// Fails if a metric with the same name is already registered there.
    pub fn new(registry: Registry) -> Result<Self, prometheus::Error> {
        let size_buckets = prometheus::exponential_buckets(100.0, 10.0, 7)?;

        let request_count = IntCounterVec::new(
            Opts::new("http_requests_total", "Total number of HTTP requests"),
            REQUEST_LABELS,
        )?;
        let request_duration = HistogramVec::new(
            HistogramOpts::new("http_request_duration_seconds", "HTTP request duration in seconds")
                .buckets(DURATION_BUCKETS.to_vec()),
            REQUEST_LABELS,
        )?;
        let request_size = HistogramVec::new(
            HistogramOpts::new("http_request_size_bytes", "HTTP request body size in bytes")
                .buckets(size_buckets.clone()),
            REQUEST_LABELS,
        )?;
        let response_size = HistogramVec::new(
            HistogramOpts::new("http_response_size_bytes", "HTTP response body size in bytes")
                .buckets(size_buckets),
            REQUEST_LABELS,
        )?;
        let errors = IntCounterVec::new(
            Opts::new("http_errors_total", "Handler errors per host"),
            &["host"],
        )?;

        registry.register(Box::new(request_count.clone()))?;
        registry.register(Box::new(request_duration.clone()))?;
        registry.register(Box::new(request_size.clone()))?;
        registry.register(Box::new(response_size.clone()))?;
        registry.register(Box::new(errors.clone()))?;

        Ok(Self { registry, request_count, request_duration, request_size, response_size, errors })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encodes every metric in the registry in the Prometheus text format.
    pub fn render(&self) -> Result<Vec<u8>, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(buffer)
    }

    /// A handler serving [`render`](Metrics::render) for a `/metrics` route.
    pub fn handler(self: &Arc<Self>) -> impl Handler {
        let metrics = Arc::clone(self);
        move |_req: Request| {
            let metrics = Arc::clone(&metrics);
            async move {
                match metrics.render() {
                    Ok(body) => {
                        let mut res = Response::builder().bytes(ContentType::Text, body);
                        res.headers_mut()
                            .insert(CONTENT_TYPE, HeaderValue::from_static(prometheus::TEXT_FORMAT));
                        res
                    }
                    Err(e) => {
                        tracing::error!(err = %e, "could not encode metrics");
                        Response::status(StatusCode::INTERNAL_SERVER_ERROR)
                    }
                }
            }
        }
    }

    pub(crate) fn observe_request(
        &self,
        labels: &RequestLabels<'_>,
        duration: Duration,
        req_len: usize,
        resp_len: usize,
    ) {
        let code = labels.code.as_str();
        let values = [code, labels.method, labels.host, labels.path];
        self.request_count.with_label_values(&values).inc();
        self.request_duration.with_label_values(&values).observe(duration.as_secs_f64());
        self.request_size.with_label_values(&values).observe(req_len as f64);
        self.response_size.with_label_values(&values).observe(resp_len as f64);
    }

    pub(crate) fn record_error(&self, host: &str) {
        self.errors.with_label_values(&[host]).inc();
    }

    #[cfg(test)]
    pub(crate) fn request_count(&self, code: &str, method: &str, host: &str, path: &str) -> u64 {
        self.request_count.with_label_values(&[code, method, host, path]).get()
    }

    #[cfg(test)]
    pub(crate) fn error_count(&self, host: &str) -> u64 {
        self.errors.with_label_values(&[host]).get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registering_twice_in_one_registry_fails() {
        let registry = Registry::new();
        assert!(Metrics::new(registry.clone()).is_ok());
        assert!(Metrics::new(registry).is_err());
    }

    #[test]
    fn render_includes_observed_requests() {
        let metrics = Metrics::new(Registry::new()).unwrap();
        let labels = RequestLabels {
            code: StatusCode::OK,
            method: "GET",
            host: "example.com",
            path: "/health",
        };
        metrics.observe_request(&labels, Duration::from_millis(3), 0, 2);

        let text = String::from_utf8(metrics.render().unwrap()).unwrap();
        assert!(text.contains(
            r#"http_requests_total{code="200",host="example.com",method="GET",path="/health"} 1"#
        ));
        assert_eq!(metrics.request_count("200", "GET", "example.com", "/health"), 1);
    }
}
