//! Shared helpers for unit tests: request builders and log capture.

use std::io;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;

use crate::logging::json_layer;
use crate::request::Request;

pub(crate) const PEER: &str = "10.0.0.1:1234";

pub(crate) fn request(method: &str, uri: &str, headers: &[(&str, &str)]) -> Request {
    let mut builder = http::Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    Request::new(builder.body(Bytes::new()).unwrap(), PEER.parse().unwrap())
}

pub(crate) fn get(uri: &str) -> Request {
    request("GET", uri, &[])
}

/// Log lines written by the JSON formatter, one object per event.
#[derive(Clone, Default)]
pub(crate) struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    /// Installs a thread-local JSON subscriber writing into the buffer.
    /// Tests run on the current-thread runtime, so every event of the test
    /// lands here while the guard lives.
    pub(crate) fn install() -> (Self, DefaultGuard) {
        let logs = Self::default();
        let subscriber = tracing_subscriber::registry().with(json_layer(logs.clone(), true));
        let guard = tracing::subscriber::set_default(subscriber);
        (logs, guard)
    }

    pub(crate) fn events(&self) -> Vec<serde_json::Value> {
        let buf = self.0.lock().unwrap();
        String::from_utf8_lossy(&buf)
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    pub(crate) fn at_level(&self, level: &str) -> Vec<serde_json::Value> {
        self.events().into_iter().filter(|e| e["level"] == level).collect()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
