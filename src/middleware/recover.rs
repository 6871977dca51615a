//! Panic containment.
//!
//! A panic inside a handler (or any middleware below `Recover`) unwinds up
//! to here, is logged once at ERROR with the panic site's backtrace, and
//! becomes a plain `500 Internal Server Error`. The connection task and every
//! other in-flight request are unaffected.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::fmt::{self, Write as _};
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Once};

use futures_util::FutureExt;
use futures_util::future::poll_fn;
use http::StatusCode;
use tracing::error;

use super::Middleware;
use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler};
use crate::request::Request;
use crate::response::Response;

/// Upper bound on the logged backtrace.
const MAX_STACK_BYTES: usize = 64 << 10;

const PANIC_BODY: &str = "Internal Server Error";

thread_local! {
    /// Depth of `Recover` polls on this thread. Non-zero means a panic will
    /// be caught, so the hook records it instead of printing it.
    static RECOVER_DEPTH: Cell<usize> = const { Cell::new(0) };
    static LAST_STACK: RefCell<Option<String>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

/// Contains panics from downstream stages and answers `500`.
#[derive(Clone, Default)]
pub struct Recover {
    _priv: (),
}

impl Recover {
    /// Creates the middleware. The first call installs a process-wide panic
    /// hook that captures backtraces for panics raised under `Recover`;
    /// panics elsewhere still reach the previously installed hook.
    pub fn new() -> Self {
        install_hook();
        Self { _priv: () }
    }
}

impl Middleware for Recover {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        install_hook();
        Arc::new(RecoverHandler { next })
    }
}

struct RecoverHandler {
    next: BoxedHandler,
}

impl ErasedHandler for RecoverHandler {
    fn call(&self, req: Request) -> BoxFuture {
        let method = req.method().clone();
        let url = req.uri().to_string();
        let next = Arc::clone(&self.next);

        Box::pin(async move {
            // `next.call` runs inside the first poll so a panic while building
            // the future is caught too.
            let mut fut =
                std::pin::pin!(AssertUnwindSafe(async move { next.call(req).await }).catch_unwind());
            let outcome = poll_fn(|cx| {
                let _depth = DepthGuard::enter();
                fut.as_mut().poll(cx)
            })
            .await;

            match outcome {
                Ok(res) => res,
                Err(payload) => {
                    let stack = LAST_STACK.with(|s| s.borrow_mut().take()).unwrap_or_default();
                    error!(
                        error = %panic_message(payload.as_ref()),
                        stack = %stack,
                        method = %method,
                        url = %url,
                        "panic recovered"
                    );
                    Response::error(StatusCode::INTERNAL_SERVER_ERROR, PANIC_BODY)
                }
            }
        })
    }
}

struct DepthGuard;

impl DepthGuard {
    fn enter() -> Self {
        RECOVER_DEPTH.with(|d| d.set(d.get() + 1));
        Self
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        RECOVER_DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
    }
}

fn install_hook() {
    HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if RECOVER_DEPTH.with(Cell::get) == 0 {
                previous(info);
                return;
            }
            let stack = capped(&Backtrace::force_capture(), MAX_STACK_BYTES);
            LAST_STACK.with(|s| *s.borrow_mut() = Some(stack));
        }));
    });
}

/// Renders `value` into at most `max` bytes. Formatting stops at the cap.
fn capped(value: &dyn fmt::Display, max: usize) -> String {
    let mut out = CappedString { buf: String::new(), max };
    // An error here only means the cap was reached.
    let _ = write!(out, "{value}");
    out.buf
}

struct CappedString {
    buf: String,
    max: usize,
}

impl fmt::Write for CappedString {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let room = self.max - self.buf.len();
        if s.len() <= room {
            self.buf.push_str(s);
            return Ok(());
        }
        let mut end = room;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        self.buf.push_str(&s[..end]);
        Err(fmt::Error)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with a non-string payload".to_owned()
    }
}
