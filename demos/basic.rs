//! A complete gantry service: config file, logging, metrics, the full
//! middleware pipeline, a secret-gated operations group and a page cache.
//!
//! Run with:
//!   cargo run --example basic -- demos/config.toml
//!
//! Try:
//!   curl http://localhost:8000/users/42
//!   curl -H 'X-Forwarded-Host: shop.example.com' http://localhost:8000/pages/about
//!   curl http://localhost:8000/health                          # empty 200
//!   curl -H 'X-Secret-Key: change-me' http://localhost:8000/health
//!   curl http://localhost:8000/metrics

use std::sync::Arc;

use gantry::config::Config;
use gantry::error_handler::{ErrorHandlerConfig, StaticErrorPages, themed_error_handler};
use gantry::metrics::Metrics;
use gantry::middleware::{AccessLog, AccessLogConfig, RealHost, RealIp, Recover, SecretKeyHeader};
use gantry::{HttpError, Request, Response, Router, Server, TtlCache, health, logging, shutdown_signal};
use http::StatusCode;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args().nth(1).unwrap_or_else(|| "demos/config.toml".to_owned());
    let config = Config::from_file(&path)?;

    // Flushes buffered log lines when main returns.
    let _log_guard = logging::init(&config.logging.level, logging::resolve_format(config.logging.json))?;

    let metrics = Arc::new(Metrics::new(prometheus::default_registry().clone())?);

    // One signal for the server and every cache sweep.
    let (stop, stopped) = watch::channel(false);
    let cache_shutdown = {
        let mut stopped = stopped.clone();
        async move {
            let _ = stopped.wait_for(|stop| *stop).await;
        }
    };
    let pages: TtlCache<String> = TtlCache::new("pages", config.cache.ttl(), cache_shutdown);

    let mut app = Router::new();
    app.set_error_handler(themed_error_handler(ErrorHandlerConfig {
        pages: Arc::new(
            StaticErrorPages::new()
                .with_page(StatusCode::NOT_FOUND, "<h1>Not found</h1>")
                .with_page(StatusCode::INTERNAL_SERVER_ERROR, "<h1>Something broke</h1>"),
        ),
        notifier: None,
        metrics: Some(Arc::clone(&metrics)),
    }));

    app.use_middleware(Recover::new())
        .use_middleware(RealIp::new(config.real_ip()))
        .use_middleware(RealHost::new(config.real_host()));
    if config.logging.access_log {
        app.use_middleware(AccessLog::new(AccessLogConfig { metrics: Arc::clone(&metrics) }));
    }

    app.handle_fn("GET /users/{id}", get_user);
    app.get("/pages/{name}", move |req: Request| {
        let pages = pages.clone();
        async move { render_page(&pages, &req) }
    });
    app.get("/metrics", metrics.handler());

    let secret = SecretKeyHeader::new(config.secret_key())?;
    app.group(|ops| {
        ops.use_middleware(secret);
        ops.get("/health", health::health);
        ops.get("/version", health::version);
    });

    app.fallback(|_req: Request| async {
        Response::builder()
            .status(StatusCode::NOT_FOUND)
            .bytes(gantry::ContentType::Html, b"<h1>Not found</h1>".to_vec())
    });

    Server::bind(&config.server.listen)?
        .serve_with_shutdown(app, async move {
            shutdown_signal().await;
            let _ = stop.send(true);
        })
        .await?;
    Ok(())
}

// GET /users/{id}: errors go through the themed error handler.
async fn get_user(req: Request) -> Result<Response, HttpError> {
    let id = req.param("id").unwrap_or_default();
    if id.parse::<u64>().is_err() {
        return Err(HttpError::bad_request(format!("`{id}` is not a user id")));
    }
    if id == "0" {
        return Err(HttpError::not_found("no such user"));
    }
    Ok(Response::json(format!(r#"{{"id":{id},"name":"alice"}}"#).into_bytes()))
}

// GET /pages/{name}: rendered once per host and page, then served from cache.
fn render_page(pages: &TtlCache<String>, req: &Request) -> Response {
    let key = format!("{}{}", req.host(), req.path());
    if let Some(html) = pages.get(&key) {
        return Response::builder().bytes(gantry::ContentType::Html, html.into_bytes());
    }
    let html = format!("<h1>{}</h1>", req.param("name").unwrap_or_default());
    pages.set(key, html.clone());
    Response::builder().bytes(gantry::ContentType::Html, html.into_bytes())
}
