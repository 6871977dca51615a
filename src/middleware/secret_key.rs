//! Shared-secret gate for operational endpoints (health, version, debug).
//!
//! Denial is silent: a missing or wrong secret gets `200 OK` with an empty
//! body, indistinguishable from an endpoint that has nothing to say. Every
//! denial is logged at ERROR with the URL and the resolved client IP.

use std::future;
use std::sync::Arc;

use http::{HeaderName, StatusCode};
use tracing::error;

use super::Middleware;
use crate::error::ConfigError;
use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler};
use crate::request::Request;
use crate::response::Response;

#[derive(Clone, Debug, Default)]
pub struct SecretKeyHeaderConfig {
    pub header_name: String,
    pub header_value: String,
    /// Skip the check entirely (development mode).
    pub debug: bool,
}

type Skipper = Arc<dyn Fn(&Request) -> bool + Send + Sync>;

/// Gate that only lets requests carrying the configured secret header
/// through.
#[derive(Clone)]
pub struct SecretKeyHeader {
    name: HeaderName,
    value: Arc<[u8]>,
    debug: bool,
    skip: Option<Skipper>,
}

impl SecretKeyHeader {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// An empty header name or value is a setup mistake and is rejected here,
    /// never at request time.
    pub fn new(config: SecretKeyHeaderConfig) -> Result<Self, ConfigError> {
        if config.header_name.is_empty() {
            return Err(ConfigError::MissingSecretHeaderName);
        }
        if config.header_value.is_empty() {
            return Err(ConfigError::MissingSecretHeaderValue);
        }
        let name = HeaderName::from_bytes(config.header_name.as_bytes())
            .map_err(|_| ConfigError::InvalidHeaderName(config.header_name.clone()))?;

        Ok(Self {
            name,
            value: config.header_value.into_bytes().into(),
            debug: config.debug,
            skip: None,
        })
    }

    /// Adds a bypass predicate evaluated per request; `true` lets the request
    /// through unchecked.
    pub fn skip_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Request) -> bool + Send + Sync + 'static,
    {
        self.skip = Some(Arc::new(predicate));
        self
    }

    fn bypass(&self, req: &Request) -> bool {
        self.debug || self.skip.as_ref().is_some_and(|skip| skip(req))
    }
}

impl Middleware for SecretKeyHeader {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        Arc::new(SecretKeyGate { settings: self.clone(), next })
    }
}

struct SecretKeyGate {
    settings: SecretKeyHeader,
    next: BoxedHandler,
}

impl ErasedHandler for SecretKeyGate {
    fn call(&self, req: Request) -> BoxFuture {
        if self.settings.bypass(&req) {
            return self.next.call(req);
        }

        let supplied = req
            .headers()
            .get(&self.settings.name)
            .map(|v| v.as_bytes())
            .filter(|v| !v.is_empty());

        match supplied {
            None => {
                error!(url = %req.uri(), ip = %req.remote_ip(), "url called without secret header");
                deny()
            }
            Some(v) if constant_time_eq(v, &self.settings.value) => self.next.call(req),
            Some(_) => {
                error!(url = %req.uri(), ip = %req.remote_ip(), "url called with wrong secret header");
                deny()
            }
        }
    }
}

fn deny() -> BoxFuture {
    Box::pin(future::ready(Response::status(StatusCode::OK)))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
