use std::sync::Arc;

use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler};
use crate::middleware::Middleware;
use crate::request::Request;

/// Headers set on every response, overriding whatever downstream chose.
const HEADERS: [(&str, &str); 4] = [
    ("x-xss-protection", "1; mode=block"),
    ("x-frame-options", "deny"),
    ("x-content-type-options", "nosniff"),
    ("referrer-policy", "origin-when-cross-origin"),
];

/// Sets defensive response headers. Never short-circuits.
#[derive(Clone, Copy, Debug, Default)]
pub struct SecureHeaders;

impl Middleware for SecureHeaders {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        Arc::new(SecureHeadersHandler { next })
    }
}

struct SecureHeadersHandler {
    next: BoxedHandler,
}

impl ErasedHandler for SecureHeadersHandler {
    fn call(&self, req: Request) -> BoxFuture {
        let fut = self.next.call(req);
        Box::pin(async move {
            let mut res = fut.await;
            for (name, value) in HEADERS {
                res.set_header(name, value);
            }
            res
        })
    }
}
