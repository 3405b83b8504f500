//! Method-aware request router.
//!
//! One radix tree per HTTP method, built once at startup. Patterns are made
//! of literal segments plus at most one `:name` capture:
//!
//! ```text
//! /                  literal root
//! /snippet/create    two literals
//! /snippet/:id       literal + capture bound to "id"
//! ```
//!
//! A literal always wins over a capture in the same position, so
//! `/snippet/create` and `/snippet/:id` can live side by side. There are no
//! wildcards and no regex; the only catch-all is [`Router::passthrough`],
//! which hands a whole prefix to a collaborator such as a static-file server.

use std::collections::HashMap;
use std::sync::Arc;

use matchit::Router as MatchitRouter;

use crate::handler::{private, BoxFuture, BoxedHandler, Endpoint, ErasedHandler, Handler};
use crate::method::Method;
use crate::request::Request;
use crate::response::Response;
use crate::status::Status;

/// Name of the internal catch-all parameter used by passthrough routes.
const TAIL_PARAM: &str = "__tail";

/// The application router.
///
/// Each [`Router::on`] call returns `self` so registrations chain naturally.
/// A router is itself a [`Handler`]: wrap it in the standard middleware chain
/// and hand it to [`Server::serve`](crate::Server::serve).
pub struct Router {
    routes: HashMap<Method, MatchitRouter<BoxedHandler>>,
}

/// Outcome of matching a `(method, path)` pair.
pub enum Lookup {
    /// A pattern matched for this method. `params` holds the capture, if any.
    Found { handler: Endpoint, params: HashMap<String, String> },
    /// The path is registered, but only for the listed methods.
    MethodNotAllowed { allowed: Vec<Method> },
    NotFound,
}

/// Why a route pattern was refused at registration time.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatternError {
    #[error("pattern must start with `/`")]
    MissingLeadingSlash,
    #[error("capture segment `{0}` needs a name made of letters, digits or `_`")]
    BadCaptureName(String),
    #[error("at most one capture segment is allowed per pattern")]
    TooManyCaptures,
    #[error("segment `{0}` contains a reserved character (`*`, `{{` or `}}`)")]
    ReservedCharacter(String),
    #[error("passthrough prefix must be literal")]
    CaptureInPrefix,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: HashMap::new() }
    }

    /// Register a handler for a method + pattern pair. Returns `self` for chaining.
    ///
    /// ```rust,no_run
    /// # use snipshare::{Method, Request, Response, Router};
    /// # async fn show(_: Request) -> Response { Response::text("") }
    /// # async fn form(_: Request) -> Response { Response::text("") }
    /// # async fn create(_: Request) -> Response { Response::text("") }
    /// Router::new()
    ///     .on(Method::Get,  "/snippet/create", form)
    ///     .on(Method::Post, "/snippet/create", create)
    ///     .on(Method::Get,  "/snippet/:id",    show);
    /// ```
    ///
    /// # Panics
    ///
    /// Panics on a malformed pattern or one that collides with an existing
    /// registration for the same method. Both are programming errors caught
    /// the first time the route table is built.
    pub fn on(self, method: Method, pattern: &str, handler: impl Handler) -> Self {
        let route = compile(pattern).unwrap_or_else(|e| panic!("invalid route `{pattern}`: {e}"));
        self.add(method, pattern, &route, handler.into_boxed_handler())
    }

    /// Delegate every `GET prefix/...` request to `handler`, with `prefix`
    /// stripped from the path it sees (`/static/css/main.css` arrives as
    /// `/css/main.css`).
    ///
    /// # Panics
    ///
    /// Panics if `prefix` is not a literal pattern.
    pub fn passthrough(self, prefix: &str, handler: impl Handler) -> Self {
        let compiled = compile(prefix)
            .and_then(|route| {
                if route.contains('{') { Err(PatternError::CaptureInPrefix) } else { Ok(route) }
            })
            .unwrap_or_else(|e| panic!("invalid passthrough prefix `{prefix}`: {e}"));
        let route = format!("{}/{{*{TAIL_PARAM}}}", compiled.trim_end_matches('/'));
        let strip: BoxedHandler = Arc::new(StripPrefix { next: handler.into_boxed_handler() });
        self.add(Method::Get, prefix, &route, strip)
    }

    fn add(mut self, method: Method, pattern: &str, route: &str, handler: BoxedHandler) -> Self {
        self.routes
            .entry(method)
            .or_default()
            .insert(route, handler)
            .unwrap_or_else(|e| panic!("invalid route `{pattern}`: {e}"));
        self
    }

    /// Match `path` against the tree for `method`, falling back to the other
    /// trees to tell "wrong method" apart from "no such path".
    ///
    /// `HEAD` is answered by the `GET` route when no `HEAD` route matches.
    pub fn lookup(&self, method: Method, path: &str) -> Lookup {
        let found = self.find(method, path)
            .or_else(|| if method == Method::Head { self.find(Method::Get, path) } else { None });
        if let Some(found) = found {
            return found;
        }

        let mut allowed: Vec<Method> = self.routes.iter()
            .filter(|(m, tree)| **m != method && tree.at(path).is_ok())
            .map(|(m, _)| *m)
            .collect();
        if allowed.is_empty() {
            return Lookup::NotFound;
        }
        if allowed.contains(&Method::Get) && !allowed.contains(&Method::Head) {
            allowed.push(Method::Head);
        }
        allowed.sort_by_key(|m| m.as_str());
        Lookup::MethodNotAllowed { allowed }
    }

    fn find(&self, method: Method, path: &str) -> Option<Lookup> {
        let matched = self.routes.get(&method)?.at(path).ok()?;
        let handler = Endpoint(Arc::clone(matched.value));
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some(Lookup::Found { handler, params })
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

impl ErasedHandler for Router {
    fn call(&self, mut req: Request) -> BoxFuture {
        match self.lookup(req.method(), req.path()) {
            Lookup::Found { handler, params } => {
                let head = req.method() == Method::Head;
                req.params = params;
                let fut = handler.0.call(req);
                if !head {
                    return fut;
                }
                Box::pin(async move {
                    let mut res = fut.await;
                    res.body.clear();
                    res
                })
            }
            Lookup::MethodNotAllowed { allowed } => {
                let allow = allowed.iter().map(|m| m.as_str()).collect::<Vec<_>>().join(", ");
                Box::pin(async move {
                    Response::builder()
                        .status(Status::MethodNotAllowed)
                        .header("allow", &allow)
                        .text("Method Not Allowed")
                })
            }
            Lookup::NotFound => Box::pin(async {
                Response::builder().status(Status::NotFound).text("Not Found")
            }),
        }
    }
}

impl private::Sealed for Router {}

impl Handler for Router {
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(self)
    }
}

/// Rewrites the request path to the catch-all remainder before delegating.
struct StripPrefix {
    next: BoxedHandler,
}

impl ErasedHandler for StripPrefix {
    fn call(&self, mut req: Request) -> BoxFuture {
        if let Some(tail) = req.params.remove(TAIL_PARAM) {
            req.path = format!("/{tail}");
        }
        self.next.call(req)
    }
}

/// Translates a `:name` pattern into matchit's `{name}` syntax, enforcing
/// the literal-plus-one-capture grammar.
fn compile(pattern: &str) -> Result<String, PatternError> {
    let rest = pattern.strip_prefix('/').ok_or(PatternError::MissingLeadingSlash)?;
    let mut route = String::with_capacity(pattern.len() + 2);
    let mut captures = 0;

    for segment in rest.split('/') {
        route.push('/');
        if let Some(name) = segment.strip_prefix(':') {
            if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(PatternError::BadCaptureName(segment.to_owned()));
            }
            captures += 1;
            if captures > 1 {
                return Err(PatternError::TooManyCaptures);
            }
            route.push('{');
            route.push_str(name);
            route.push('}');
        } else if segment.contains(['*', '{', '}']) {
            return Err(PatternError::ReservedCharacter(segment.to_owned()));
        } else {
            route.push_str(segment);
        }
    }
    Ok(route)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label(name: &'static str) -> impl Handler {
        move |req: Request| async move {
            let id = req.param("id").unwrap_or("-").to_owned();
            format!("{name}:{id}:{}", req.path())
        }
    }

    fn body(res: &Response) -> &str {
        std::str::from_utf8(res.body()).unwrap()
    }

    #[tokio::test]
    async fn dispatches_capture_and_rejects_others() {
        let router = Router::new().on(Method::Get, "/snippet/:id", label("show"));

        match router.lookup(Method::Get, "/snippet/42") {
            Lookup::Found { params, .. } => assert_eq!(params.get("id").map(String::as_str), Some("42")),
            _ => panic!("expected a match"),
        }
        assert!(matches!(
            router.lookup(Method::Post, "/snippet/42"),
            Lookup::MethodNotAllowed { ref allowed } if allowed == &[Method::Get, Method::Head]
        ));
        assert!(matches!(router.lookup(Method::Get, "/unknown"), Lookup::NotFound));

        let res = router.call(Request::new(Method::Get, "/snippet/42")).await;
        assert_eq!(body(&res), "show:42:/snippet/42");
    }

    #[tokio::test]
    async fn literal_beats_capture_in_same_position() {
        let router = Router::new()
            .on(Method::Get, "/snippet/create", label("form"))
            .on(Method::Get, "/snippet/:id", label("show"));

        let res = router.call(Request::new(Method::Get, "/snippet/create")).await;
        assert_eq!(body(&res), "form:-:/snippet/create");
        let res = router.call(Request::new(Method::Get, "/snippet/9")).await;
        assert_eq!(body(&res), "show:9:/snippet/9");
    }

    #[tokio::test]
    async fn method_not_allowed_lists_allowed_methods() {
        let router = Router::new()
            .on(Method::Get, "/snippet/create", label("form"))
            .on(Method::Post, "/snippet/create", label("create"));

        let res = router.call(Request::new(Method::Delete, "/snippet/create")).await;
        assert_eq!(res.status_code(), 405);
        assert_eq!(res.header("allow"), Some("GET, HEAD, POST"));

        let res = router.call(Request::new(Method::Get, "/nope")).await;
        assert_eq!(res.status_code(), 404);
    }

    #[tokio::test]
    async fn head_is_served_by_get_routes_without_a_body() {
        let router = Router::new()
            .on(Method::Get, "/snippet/:id", label("show"))
            .on(Method::Post, "/user/logout", label("logout"));

        let res = router.call(Request::new(Method::Head, "/snippet/3")).await;
        assert_eq!(res.status_code(), 200);
        assert_eq!(res.header("content-type"), Some("text/plain; charset=utf-8"));
        assert!(res.body().is_empty());

        let res = router.call(Request::new(Method::Head, "/user/logout")).await;
        assert_eq!(res.status_code(), 405);
        assert_eq!(res.header("allow"), Some("POST"));
    }

    #[tokio::test]
    async fn segment_count_must_match() {
        let router = Router::new().on(Method::Get, "/snippet/:id", label("show"));
        assert!(matches!(router.lookup(Method::Get, "/snippet"), Lookup::NotFound));
        assert!(matches!(router.lookup(Method::Get, "/snippet/1/extra"), Lookup::NotFound));
    }

    #[tokio::test]
    async fn passthrough_strips_prefix() {
        let router = Router::new()
            .on(Method::Get, "/", label("home"))
            .passthrough("/static", label("files"));

        let res = router.call(Request::new(Method::Get, "/static/css/main.css")).await;
        assert_eq!(body(&res), "files:-:/css/main.css");
        let res = router.call(Request::new(Method::Post, "/static/css/main.css")).await;
        assert_eq!(res.status_code(), 405);
    }

    #[test]
    fn compile_translates_and_validates() {
        assert_eq!(compile("/"), Ok("/".to_owned()));
        assert_eq!(compile("/snippet/:id"), Ok("/snippet/{id}".to_owned()));
        assert_eq!(compile("snippet"), Err(PatternError::MissingLeadingSlash));
        assert_eq!(compile("/a/:x/:y"), Err(PatternError::TooManyCaptures));
        assert_eq!(compile("/a/:"), Err(PatternError::BadCaptureName(":".into())));
        assert_eq!(compile("/files/*"), Err(PatternError::ReservedCharacter("*".into())));
    }

    #[test]
    #[should_panic(expected = "invalid route `/a/:x/:y`")]
    fn registering_two_captures_panics() {
        let _ = Router::new().on(Method::Get, "/a/:x/:y", label("x"));
    }

    #[test]
    #[should_panic(expected = "invalid passthrough prefix")]
    fn passthrough_prefix_must_be_literal() {
        let _ = Router::new().passthrough("/static/:v", label("x"));
    }
}
