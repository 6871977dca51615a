//! Built-in operational handlers.
//!
//! | Path | Answer |
//! |---|---|
//! | `/health` | `OK` while the process can serve HTTP |
//! | `/version` | crate name and version |
//!
//! Both are meant for monitoring, so mount them behind a
//! [`SecretKeyHeader`](crate::middleware::SecretKeyHeader) group:
//!
//! ```rust,no_run
//! use gantry::middleware::{SecretKeyHeader, SecretKeyHeaderConfig};
//! use gantry::{Router, health};
//!
//! # fn main() -> Result<(), gantry::ConfigError> {
//! let secret = SecretKeyHeader::new(SecretKeyHeaderConfig {
//!     header_name: "X-Secret-Key".into(),
//!     header_value: "s3cret".into(),
//!     debug: false,
//! })?;
//! let mut router = Router::new();
//! router.group(|ops| {
//!     ops.use_middleware(secret);
//!     ops.get("/health", health::health);
//!     ops.get("/version", health::version);
//! });
//! # Ok(())
//! # }
//! ```

use crate::{Request, Response};

/// Always `200 OK` with body `OK`. No dependencies are checked.
pub async fn health(_req: Request) -> Response {
    Response::text("OK")
}

/// `200 OK` with `<name> <version>` of this build.
pub async fn version(_req: Request) -> Response {
    Response::text(concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::get;

    #[tokio::test]
    async fn health_says_ok() {
        let res = health(get("/health")).await;
        assert_eq!(res.body(), b"OK");
        assert_eq!(res.headers()["content-type"], "text/plain; charset=utf-8");
    }

    #[tokio::test]
    async fn version_names_the_build() {
        let res = version(get("/version")).await;
        let body = String::from_utf8(res.body().to_vec()).unwrap();
        assert_eq!(body, format!("gantry {}", env!("CARGO_PKG_VERSION")));
    }
}
