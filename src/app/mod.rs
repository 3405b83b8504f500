//! The snippet-sharing application: stores, sessions and the route table,
//! composed into one handler at startup.
//!
//! ```text
//! request ─▶ standard chain ─▶ router ─▶ dynamic chain ─▶ handler ─▶ store
//!            (always)                    (session routes only)
//! ```

mod errors;
mod forms;
mod handlers;

use std::future::Future;
use std::sync::Arc;

use sqlx::SqlitePool;

use crate::handler::{Endpoint, Handler};
use crate::health;
use crate::method::Method;
use crate::middleware::{Chain, EnableSession, LogRequest, RecoverPanic, SecureHeaders};
use crate::request::Request;
use crate::response::IntoResponse;
use crate::router::Router;
use crate::session::{SessionConfig, SessionStore};
use crate::static_files::StaticFiles;
use crate::store::{Clock, PasswordHasher, SnippetStore, UserStore};

pub use errors::{AppError, FieldErrors};
pub use forms::{LoginForm, SignupForm, SnippetForm, EXPIRY_OPTIONS};

/// Shared application state. Built once in `main`, then frozen behind an
/// `Arc` by [`App::routes`].
pub struct App {
    pub(crate) snippets: SnippetStore,
    pub(crate) users: UserStore,
    pool: SqlitePool,
    sessions: Arc<dyn SessionStore>,
    session_config: SessionConfig,
    static_files: StaticFiles,
}

impl App {
    pub fn new(
        pool: SqlitePool,
        clock: Arc<dyn Clock>,
        hasher: Arc<dyn PasswordHasher>,
        sessions: Arc<dyn SessionStore>,
        session_config: SessionConfig,
        static_files: StaticFiles,
    ) -> Self {
        Self {
            snippets: SnippetStore::new(pool.clone(), Arc::clone(&clock)),
            users: UserStore::new(pool.clone(), clock, hasher),
            pool,
            sessions,
            session_config,
            static_files,
        }
    }

    /// The complete request pipeline.
    pub fn routes(self) -> Endpoint {
        let app = Arc::new(self);

        let standard = Chain::new()
            .with(RecoverPanic)
            .with(LogRequest)
            .with(SecureHeaders);
        let dynamic = Chain::new()
            .with(EnableSession::new(Arc::clone(&app.sessions), app.session_config.clone()));

        let router = Router::new()
            .on(Method::Get,  "/",               dynamic.then(bind(&app, handlers::home)))
            .on(Method::Get,  "/snippet/create", dynamic.then(bind(&app, handlers::create_snippet_form)))
            .on(Method::Post, "/snippet/create", dynamic.then(bind(&app, handlers::create_snippet)))
            .on(Method::Get,  "/snippet/:id",    dynamic.then(bind(&app, handlers::show_snippet)))
            .on(Method::Get,  "/user/signup",    dynamic.then(bind(&app, handlers::signup_form)))
            .on(Method::Post, "/user/signup",    dynamic.then(bind(&app, handlers::signup)))
            .on(Method::Get,  "/user/login",     dynamic.then(bind(&app, handlers::login_form)))
            .on(Method::Post, "/user/login",     dynamic.then(bind(&app, handlers::login)))
            .on(Method::Post, "/user/logout",    dynamic.then(bind(&app, handlers::logout)))
            .on(Method::Get,  "/healthz",        health::liveness)
            .on(Method::Get,  "/readyz",         bind(&app, |app: Arc<App>, _req| async move {
                health::readiness(&app.pool).await
            }))
            .passthrough("/static", app.static_files.handler());

        standard.then(router)
    }
}

/// Turn an `(app, request)` handler into a plain request handler.
fn bind<F, Fut, R>(app: &Arc<App>, f: F) -> impl Handler + use<F, Fut, R>
where
    F: Fn(Arc<App>, Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    let app = Arc::clone(app);
    move |req: Request| f(Arc::clone(&app), req)
}
