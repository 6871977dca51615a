//! End-to-end tests: a production-shaped router served over a real socket.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use gantry::middleware::{
    AccessLog, AccessLogConfig, RealHost, RealHostConfig, RealIp, RealIpConfig, Recover,
    SecretKeyHeader, SecretKeyHeaderConfig,
};
use gantry::metrics::Metrics;
use gantry::{HttpError, Request, Response, Router, TtlCache, health};
use prometheus::Registry;

const SECRET_HEADER: &str = "X-Secret-Key";
const SECRET: &str = "s3cret";

struct Fixture {
    metrics: Arc<Metrics>,
    renders: Arc<AtomicUsize>,
}

fn router(fixture: &Fixture) -> Router {
    let pages: TtlCache<String> =
        TtlCache::new("pages", Duration::from_secs(300), std::future::pending());

    let mut router = Router::new();
    router
        .use_middleware(Recover::new())
        .use_middleware(RealIp::new(RealIpConfig { ip_header: Some("X-Real-IP".into()) }))
        .use_middleware(RealHost::new(RealHostConfig { headers: vec!["X-Forwarded-Host".into()] }))
        .use_middleware(AccessLog::new(AccessLogConfig { metrics: Arc::clone(&fixture.metrics) }));

    let renders = Arc::clone(&fixture.renders);
    router.get("/page/{name}", move |req: Request| {
        let pages = pages.clone();
        let renders = Arc::clone(&renders);
        async move {
            let name = req.param("name").unwrap_or_default().to_owned();
            if let Some(html) = pages.get(&name) {
                return Response::text(html);
            }
            renders.fetch_add(1, Ordering::SeqCst);
            let html = format!("<h1>{name}</h1>");
            pages.set(name, html.clone());
            Response::text(html)
        }
    });
    router.get("/whoami", |req: Request| async move {
        format!("{} {}", req.real_ip().unwrap_or("-"), req.host())
    });
    router.get("/panic", |_req: Request| async move {
        if true {
            panic!("handler exploded");
        }
        "unreachable"
    });
    router.handle_fn("GET /teapot", |_req: Request| async {
        Err::<Response, _>(HttpError::new(http::StatusCode::IM_A_TEAPOT, "short and stout"))
    });
    router.get("/metrics", fixture.metrics.handler());

    let secret = SecretKeyHeader::new(SecretKeyHeaderConfig {
        header_name: SECRET_HEADER.into(),
        header_value: SECRET.into(),
        debug: false,
    })
    .unwrap();
    router.group(|ops| {
        ops.use_middleware(secret);
        ops.get("/health", health::health);
        ops.get("/version", health::version);
    });

    router
}

fn fixture() -> Fixture {
    Fixture {
        metrics: Arc::new(Metrics::new(Registry::new()).unwrap()),
        renders: Arc::new(AtomicUsize::new(0)),
    }
}

#[tokio::test]
async fn secret_group_denies_silently() {
    let fixture = fixture();
    let server = common::start(router(&fixture)).await;
    let client = reqwest::Client::new();

    let denied = client.get(server.url("/health")).send().await.unwrap();
    assert_eq!(denied.status(), 200);
    assert_eq!(denied.text().await.unwrap(), "");

    let wrong = client.get(server.url("/health")).header(SECRET_HEADER, "nope").send().await.unwrap();
    assert_eq!(wrong.status(), 200);
    assert_eq!(wrong.text().await.unwrap(), "");

    let allowed = client.get(server.url("/health")).header(SECRET_HEADER, SECRET).send().await.unwrap();
    assert_eq!(allowed.status(), 200);
    assert_eq!(allowed.text().await.unwrap(), "OK");

    // Routes outside the group are not gated.
    let open = client.get(server.url("/page/home")).send().await.unwrap();
    assert_eq!(open.text().await.unwrap(), "<h1>home</h1>");
}

#[tokio::test]
async fn identity_comes_from_proxy_headers() {
    let fixture = fixture();
    let server = common::start(router(&fixture)).await;
    let client = reqwest::Client::new();

    let res = client
        .get(server.url("/whoami"))
        .header("X-Real-IP", "203.0.113.9")
        .header("X-Forwarded-Host", "shop.example.com, edge.example.com")
        .send()
        .await
        .unwrap();
    assert_eq!(res.text().await.unwrap(), "203.0.113.9 shop.example.com");

    let res = client.get(server.url("/whoami")).send().await.unwrap();
    assert_eq!(res.text().await.unwrap(), format!("127.0.0.1 {}", server.addr));
}

#[tokio::test]
async fn panics_become_500_and_the_server_keeps_going() {
    let fixture = fixture();
    let server = common::start(router(&fixture)).await;
    let client = reqwest::Client::new();

    let res = client.get(server.url("/panic")).send().await.unwrap();
    assert_eq!(res.status(), 500);
    assert_eq!(res.text().await.unwrap(), "Internal Server Error\n");

    let res = client.get(server.url("/page/after")).send().await.unwrap();
    assert_eq!(res.status(), 200);
}

#[tokio::test]
async fn errors_and_unknown_paths() {
    let fixture = fixture();
    let server = common::start(router(&fixture)).await;
    let client = reqwest::Client::new();

    let res = client.get(server.url("/teapot")).send().await.unwrap();
    assert_eq!(res.status(), 418);
    assert_eq!(res.text().await.unwrap(), "short and stout\n");

    let res = client.get(server.url("/nothing/here")).send().await.unwrap();
    assert_eq!(res.status(), 404);
    assert_eq!(res.text().await.unwrap(), "404 page not found\n");
}

#[tokio::test]
async fn cache_memoizes_and_access_log_counts() {
    let fixture = fixture();
    let server = common::start(router(&fixture)).await;
    let client = reqwest::Client::new();

    for _ in 0..3 {
        let res = client
            .get(server.url("/page/about"))
            .header("X-Forwarded-Host", "shop.example.com")
            .send()
            .await
            .unwrap();
        assert_eq!(res.text().await.unwrap(), "<h1>about</h1>");
    }
    assert_eq!(fixture.renders.load(Ordering::SeqCst), 1);

    let exposition = client.get(server.url("/metrics")).send().await.unwrap().text().await.unwrap();
    assert!(exposition.contains(
        r#"http_requests_total{code="200",host="shop.example.com",method="GET",path="/page/about"} 3"#
    ));
}

#[tokio::test]
async fn shutdown_drains_and_returns() {
    let fixture = fixture();
    let server = common::start(router(&fixture)).await;

    {
        let client = reqwest::Client::new();
        let res = client.get(server.url("/page/bye")).send().await.unwrap();
        assert_eq!(res.status(), 200);
    }

    server.shutdown.send(()).unwrap();
    let outcome = tokio::time::timeout(Duration::from_secs(5), server.task).await;
    assert!(matches!(outcome, Ok(Ok(Ok(())))));
}
