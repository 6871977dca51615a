//! Shared helpers for the integration tests.

use std::net::SocketAddr;

use gantry::{Error, Router, Server};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub struct TestServer {
    pub addr: SocketAddr,
    pub shutdown: oneshot::Sender<()>,
    pub task: JoinHandle<Result<(), Error>>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }
}

/// Serves `router` on an ephemeral port until `shutdown` fires.
pub async fn start(router: Router) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let server = Server::from_listener(listener).unwrap();
    let addr = server.local_addr();

    let (shutdown, stopped) = oneshot::channel::<()>();
    let task = tokio::spawn(server.serve_with_shutdown(router, async {
        let _ = stopped.await;
    }));

    TestServer { addr, shutdown, task }
}
