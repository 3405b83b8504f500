//! Fault boundary for the whole pipeline.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::error;

use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler};
use crate::middleware::Middleware;
use crate::request::Request;
use crate::response::Response;
use crate::status::Status;

/// Converts a panic anywhere downstream into a generic `500`.
///
/// The response carries `Connection: close` so the client does not reuse a
/// connection whose server-side state is unknown. The panic message is logged
/// at `ERROR`; the client only ever sees "Internal Server Error".
///
/// Place it first in the standard chain so it guards every other stage.
#[derive(Clone, Copy, Debug, Default)]
pub struct RecoverPanic;

impl Middleware for RecoverPanic {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        Arc::new(RecoverPanicHandler { next })
    }
}

struct RecoverPanicHandler {
    next: BoxedHandler,
}

impl ErasedHandler for RecoverPanicHandler {
    fn call(&self, req: Request) -> BoxFuture {
        let method = req.method();
        let path = req.path().to_owned();
        let next = Arc::clone(&self.next);

        Box::pin(async move {
            // `call` may panic while building the future, before any poll.
            let fut = match std::panic::catch_unwind(AssertUnwindSafe(|| next.call(req))) {
                Ok(fut) => fut,
                Err(payload) => return fault(payload, method.as_str(), &path),
            };
            match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(res) => res,
                Err(payload) => fault(payload, method.as_str(), &path),
            }
        })
    }
}

fn fault(payload: Box<dyn Any + Send>, method: &str, path: &str) -> Response {
    error!(
        panic = panic_message(payload.as_ref()),
        %method,
        %path,
        "recovered from panic while handling request"
    );
    Response::builder()
        .status(Status::InternalServerError)
        .header("connection", "close")
        .text("Internal Server Error")
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
