use std::sync::Arc;

use tracing::{debug, error};

use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler};
use crate::middleware::Middleware;
use crate::request::Request;
use crate::response::Response;
use crate::session::{Outcome, Session, SessionConfig, SessionStore, SessionValues};
use crate::status::Status;

/// Attaches a [`Session`] to the request and persists it afterwards.
///
/// The session is looked up through the cookie named in [`SessionConfig`].
/// An unknown or expired token starts an empty session; a failing store is a
/// server error, not an empty session.
#[derive(Clone)]
pub struct EnableSession {
    store: Arc<dyn SessionStore>,
    config: Arc<SessionConfig>,
}

impl EnableSession {
    pub fn new(store: Arc<dyn SessionStore>, config: SessionConfig) -> Self {
        Self { store, config: Arc::new(config) }
    }
}

impl Middleware for EnableSession {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        Arc::new(EnableSessionHandler {
            store: Arc::clone(&self.store),
            config: Arc::clone(&self.config),
            next,
        })
    }
}

struct EnableSessionHandler {
    store: Arc<dyn SessionStore>,
    config: Arc<SessionConfig>,
    next: BoxedHandler,
}

impl ErasedHandler for EnableSessionHandler {
    fn call(&self, mut req: Request) -> BoxFuture {
        let store = Arc::clone(&self.store);
        let config = Arc::clone(&self.config);
        let next = Arc::clone(&self.next);

        Box::pin(async move {
            let token = req.header("cookie")
                .and_then(|raw| cookie_value(raw, &config.cookie_name))
                .map(str::to_owned);

            let session = match token {
                Some(token) => match store.load(&token).await {
                    Ok(Some(values)) => Session::new(Some(token), values),
                    Ok(None) => {
                        debug!("session token unknown or expired; starting fresh");
                        Session::new(None, SessionValues::new())
                    }
                    Err(e) => {
                        error!(error = %e, "failed to load session");
                        return Response::status(Status::InternalServerError);
                    }
                },
                None => Session::new(None, SessionValues::new()),
            };

            req.extensions_mut().insert(session.clone());
            let mut res = next.call(req).await;

            if let Err(e) = commit(&*store, &config, &session, &mut res).await {
                error!(error = %e, "failed to persist session");
                return Response::status(Status::InternalServerError);
            }
            res
        })
    }
}

async fn commit(
    store: &dyn SessionStore,
    config: &SessionConfig,
    session: &Session,
    res: &mut Response,
) -> Result<(), crate::session::SessionError> {
    match session.outcome() {
        Outcome::Unchanged => {}
        Outcome::Save { token, values, retired } => {
            if let Some(old) = retired {
                store.delete(&old).await?;
            }
            store.save(&token, &values, config.lifetime).await?;
            res.append_header("set-cookie", &session_cookie(config, &token, config.lifetime.as_secs()));
        }
        Outcome::Destroy { token } => {
            if let Some(token) = token {
                store.delete(&token).await?;
            }
            res.append_header("set-cookie", &session_cookie(config, "", 0));
        }
    }
    Ok(())
}

fn session_cookie(config: &SessionConfig, token: &str, max_age: u64) -> String {
    let mut cookie = format!(
        "{}={token}; Path=/; Max-Age={max_age}; HttpOnly; SameSite=Lax",
        config.cookie_name
    );
    if config.secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Value of cookie `name` in a `Cookie` request header.
fn cookie_value<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header.split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.trim_matches('"'))
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::middleware::Chain;
    use crate::session::{MemorySessionStore, SessionError};
    use crate::Method;

    struct BrokenStore;

    #[async_trait]
    impl SessionStore for BrokenStore {
        async fn load(&self, _token: &str) -> Result<Option<SessionValues>, SessionError> {
            Err(SessionError::Backend("connection refused".into()))
        }
        async fn save(&self, _: &str, _: &HashMap<String, String>, _: Duration) -> Result<(), SessionError> {
            Err(SessionError::Backend("connection refused".into()))
        }
        async fn delete(&self, _token: &str) -> Result<(), SessionError> {
            Ok(())
        }
    }

    fn token_from(res: &Response) -> String {
        let cookie = res.header("set-cookie").expect("set-cookie");
        cookie_value(cookie.split(';').next().unwrap(), "session").unwrap().to_owned()
    }

    #[test]
    fn parses_cookie_header() {
        assert_eq!(cookie_value("a=1; session=abc; b=2", "session"), Some("abc"));
        assert_eq!(cookie_value("session=", "session"), None);
        assert_eq!(cookie_value("sessionx=1", "session"), None);
    }

    #[tokio::test]
    async fn flash_survives_to_the_next_request() {
        let store = Arc::new(MemorySessionStore::new());
        let chain = Chain::new().with(EnableSession::new(store.clone(), SessionConfig::default()));

        let write = chain.then(|req: Request| async move {
            let session = req.extensions().get::<Session>().cloned().unwrap();
            session.put("flash", "created");
            "ok"
        });
        let read = chain.then(|req: Request| async move {
            let session = req.extensions().get::<Session>().cloned().unwrap();
            session.pop("flash").unwrap_or_default()
        });

        let res = write.call(Request::new(Method::Post, "/")).await;
        let token = token_from(&res);
        assert!(res.header("set-cookie").unwrap().contains("HttpOnly"));

        let cookie = format!("session={token}");
        let res = read.call(Request::new(Method::Get, "/").with_header("cookie", &cookie)).await;
        assert_eq!(res.body(), b"created");

        let res = read.call(Request::new(Method::Get, "/").with_header("cookie", &cookie)).await;
        assert_eq!(res.body(), b"");
        assert!(res.header("set-cookie").is_none());
    }

    #[tokio::test]
    async fn read_only_requests_do_not_set_cookies() {
        let store = Arc::new(MemorySessionStore::new());
        let endpoint = Chain::new()
            .with(EnableSession::new(store, SessionConfig::default()))
            .then(|_req: Request| async { "hi" });

        let res = endpoint.call(Request::new(Method::Get, "/")).await;
        assert_eq!(res.status_code(), 200);
        assert!(res.header("set-cookie").is_none());
    }

    #[tokio::test]
    async fn failing_store_is_a_server_error() {
        let endpoint = Chain::new()
            .with(EnableSession::new(Arc::new(BrokenStore), SessionConfig::default()))
            .then(|_req: Request| async { "unreachable" });

        let res = endpoint.call(
            Request::new(Method::Get, "/").with_header("cookie", "session=abc"),
        ).await;
        assert_eq!(res.status_code(), 500);
        assert!(res.body().is_empty());
    }

    #[tokio::test]
    async fn destroy_expires_cookie() {
        let store = Arc::new(MemorySessionStore::new());
        let mut values = SessionValues::new();
        values.insert("user".into(), "1".into());
        store.save("tok", &values, Duration::from_secs(60)).await.unwrap();

        let endpoint = Chain::new()
            .with(EnableSession::new(store.clone(), SessionConfig { secure: true, ..Default::default() }))
            .then(|req: Request| async move {
                req.extensions().get::<Session>().unwrap().destroy();
                "bye"
            });

        let res = endpoint.call(Request::new(Method::Post, "/").with_header("cookie", "session=tok")).await;
        let cookie = res.header("set-cookie").unwrap();
        assert!(cookie.starts_with("session=;"));
        assert!(cookie.contains("Max-Age=0"));
        assert!(cookie.ends_with("; Secure"));
        assert_eq!(store.load("tok").await.unwrap(), None);
    }
}
