//! Middleware layer.
//!
//! A middleware stage takes the next handler and returns a new handler that
//! wraps it. Stages are collected into a [`Chain`] and applied once, at
//! startup, by [`Chain::then`]: the first stage declared is the outermost, so
//! it sees the request first and the response last.
//!
//! ```text
//! standard = [RecoverPanic, LogRequest, SecureHeaders]
//! standard.then(router)
//!
//!   RecoverPanic ─▶ LogRequest ─▶ SecureHeaders ─▶ router ─▶ handler
//! ```
//!
//! Built-in stages:
//! - [`RecoverPanic`]: contains panics, answers 500 and closes the connection
//! - [`LogRequest`]: one structured log line per request
//! - [`SecureHeaders`]: defensive response headers
//! - [`EnableSession`]: loads and persists the per-request session

mod headers;
mod logging;
mod recover;
mod session;

use std::sync::Arc;

use crate::handler::{BoxedHandler, Endpoint, Handler};

pub use headers::SecureHeaders;
pub use logging::LogRequest;
pub use recover::RecoverPanic;
pub use session::EnableSession;

/// A handler-transforming stage.
///
/// Implementations return a handler that calls `next` (or deliberately does
/// not) and may inspect or adjust the request and response around it.
pub trait Middleware: Send + Sync + 'static {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler;
}

/// An ordered list of middleware stages.
///
/// Cloning is cheap; stages are shared.
#[derive(Clone, Default)]
pub struct Chain {
    stages: Vec<Arc<dyn Middleware>>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage. It runs inside every stage added before it.
    pub fn with(mut self, stage: impl Middleware) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    /// Append every stage of `other`, keeping its order.
    pub fn append(mut self, other: &Chain) -> Self {
        self.stages.extend(other.stages.iter().cloned());
        self
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Wrap `handler` in every stage, innermost last.
    pub fn then(&self, handler: impl Handler) -> Endpoint {
        let composed = self.stages.iter()
            .rev()
            .fold(handler.into_boxed_handler(), |next, stage| stage.wrap(next));
        Endpoint(composed)
    }
}
