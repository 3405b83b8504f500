use std::sync::Arc;

use tracing::info;

use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler};
use crate::middleware::Middleware;
use crate::request::Request;

/// Logs remote address, protocol, method and path for every request before
/// handing it on.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogRequest;

impl Middleware for LogRequest {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        Arc::new(LogRequestHandler { next })
    }
}

struct LogRequestHandler {
    next: BoxedHandler,
}

impl ErasedHandler for LogRequestHandler {
    fn call(&self, req: Request) -> BoxFuture {
        let remote = req.remote_addr().map_or_else(|| "-".to_owned(), |a| a.to_string());
        info!(
            %remote,
            proto = ?req.version(),
            method = %req.method(),
            path = req.path(),
            "request"
        );
        self.next.call(req)
    }
}
