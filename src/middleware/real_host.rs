//! Client host resolution.

use std::sync::Arc;

use super::Middleware;
use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler};
use crate::request::{ClientHost, Request};

#[derive(Clone, Debug, Default)]
pub struct RealHostConfig {
    /// Headers to check for the host, in order of preference, e.g.
    /// `["X-Forwarded-Host", "X-Original-Host"]`.
    pub headers: Vec<String>,
}

/// Resolves the host the client asked for behind a proxy.
///
/// The first configured header with a non-empty value wins. Multi-hop
/// values (`a.example.com, b.example.com`) resolve to their first element.
/// The result replaces [`Request::host`] and is stored as a [`ClientHost`]
/// extension.
#[derive(Clone)]
pub struct RealHost {
    headers: Arc<[String]>,
}

impl RealHost {
    pub fn new(config: RealHostConfig) -> Self {
        Self { headers: config.headers.into() }
    }
}

impl Middleware for RealHost {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        Arc::new(RealHostHandler { headers: Arc::clone(&self.headers), next })
    }
}

struct RealHostHandler {
    headers: Arc<[String]>,
    next: BoxedHandler,
}

impl ErasedHandler for RealHostHandler {
    fn call(&self, mut req: Request) -> BoxFuture {
        let host = resolve(&self.headers, &req);
        req.set_host(host.clone());
        req.extensions_mut().insert(ClientHost(host));
        self.next.call(req)
    }
}

fn resolve(headers: &[String], req: &Request) -> String {
    headers
        .iter()
        .filter_map(|name| req.header(name))
        .find(|value| !value.is_empty())
        .map_or_else(
            || req.host().to_owned(),
            |value| match value.split_once(',') {
                Some((first, _)) => first.trim().to_owned(),
                None => value.to_owned(),
            },
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::Handler;
    use crate::test_support::request;

    const PROXY_HEADERS: [&str; 2] = ["X-Forwarded-Host", "X-Original-Host"];

    fn real_host() -> RealHost {
        RealHost::new(RealHostConfig {
            headers: PROXY_HEADERS.iter().map(|h| (*h).to_owned()).collect(),
        })
    }

    fn resolved(headers: &[(&str, &str)]) -> String {
        let req = request("GET", "/", headers);
        resolve(&real_host().headers, &req)
    }

    #[test]
    fn later_header_used_when_earlier_absent() {
        assert_eq!(
            resolved(&[("host", "origin.local"), ("X-Original-Host", "b.example.com")]),
            "b.example.com"
        );
    }

    #[test]
    fn first_element_of_list_wins() {
        assert_eq!(
            resolved(&[("X-Forwarded-Host", "a.example.com, c.example.com")]),
            "a.example.com"
        );
        assert_eq!(resolved(&[("X-Forwarded-Host", " a.example.com ,c")]), "a.example.com");
    }

    #[test]
    fn header_order_is_preference_order() {
        assert_eq!(
            resolved(&[("X-Original-Host", "b.example.com"), ("X-Forwarded-Host", "a.example.com")]),
            "a.example.com"
        );
    }

    #[test]
    fn falls_back_to_request_host() {
        assert_eq!(resolved(&[("host", "origin.local")]), "origin.local");
        assert_eq!(resolved(&[("host", "origin.local"), ("X-Forwarded-Host", "")]), "origin.local");
    }

    #[tokio::test]
    async fn rewrites_host_and_stores_extension() {
        let handler = (|req: Request| async move {
            format!("{}|{}", req.host(), req.real_host().unwrap_or("<unset>"))
        })
        .into_boxed_handler();

        let res = real_host()
            .wrap(handler)
            .call(request("GET", "/", &[("host", "origin.local"), ("X-Forwarded-Host", "a.example.com")]))
            .await;

        assert_eq!(res.body(), b"a.example.com|a.example.com");
    }
}
