//! Route handlers.
//!
//! Rendering is somebody else's job: every handler answers with JSON that a
//! template layer (or a script) can turn into pages.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::info;

use super::errors::AppError;
use super::forms::{self, LoginForm, SignupForm, SnippetForm, EXPIRY_OPTIONS};
use super::App;
use crate::request::Request;
use crate::response::{Json, Response};
use crate::session::{Session, SessionError};
use crate::store::{StoreError, User};

/// One-shot message shown on the next page.
const FLASH: &str = "flash";
const AUTH_USER: &str = "authenticated_user_id";

type Page = Result<Json<Value>, AppError>;

fn session_of(req: &Request) -> Result<Session, AppError> {
    req.extensions()
        .get::<Session>()
        .cloned()
        .ok_or(AppError::Session(SessionError::NotAttached))
}

/// The logged-in user, if the session names one that still exists.
async fn current_user(app: &App, session: &Session) -> Result<Option<User>, AppError> {
    let Some(id) = session.get(AUTH_USER).and_then(|raw| raw.parse::<i64>().ok()) else {
        return Ok(None);
    };
    match app.users.get(id).await {
        Ok(user) => Ok(Some(user)),
        Err(StoreError::NoRecord) => {
            session.remove(AUTH_USER);
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

// ── Snippets ──────────────────────────────────────────────────────────────────

pub async fn home(app: Arc<App>, req: Request) -> Page {
    let session = session_of(&req)?;
    let snippets = app.snippets.latest().await?;
    let user = current_user(&app, &session).await?;
    Ok(Json(json!({
        "snippets": snippets,
        "user": user,
        "flash": session.pop(FLASH),
    })))
}

pub async fn show_snippet(app: Arc<App>, req: Request) -> Page {
    let session = session_of(&req)?;
    let id = req.param("id")
        .and_then(|raw| raw.parse::<i64>().ok())
        .filter(|id| *id >= 1)
        .ok_or(AppError::NotFound)?;
    let snippet = app.snippets.get(id).await?;
    Ok(Json(json!({
        "snippet": snippet,
        "flash": session.pop(FLASH),
    })))
}

pub async fn create_snippet_form(_app: Arc<App>, req: Request) -> Page {
    let session = session_of(&req)?;
    Ok(Json(json!({
        "form": SnippetForm::blank(),
        "expires_options": EXPIRY_OPTIONS,
        "flash": session.pop(FLASH),
    })))
}

pub async fn create_snippet(app: Arc<App>, req: Request) -> Result<Response, AppError> {
    let session = session_of(&req)?;
    let form: SnippetForm = forms::parse(&req)?;
    let days = form.validate().map_err(AppError::Validation)?;

    let id = app.snippets.insert(form.title.trim(), &form.content, days).await?;
    info!(id, days, "snippet created");

    session.put(FLASH, "Snippet successfully created!");
    Ok(Response::see_other(&format!("/snippet/{id}")))
}

// ── Users ─────────────────────────────────────────────────────────────────────

pub async fn signup_form(_app: Arc<App>, _req: Request) -> Page {
    Ok(Json(json!({ "form": SignupForm::default() })))
}

pub async fn signup(app: Arc<App>, req: Request) -> Result<Response, AppError> {
    let session = session_of(&req)?;
    let form: SignupForm = forms::parse(&req)?;
    form.validate().map_err(AppError::Validation)?;

    let id = app.users.insert(form.name.trim(), form.email.trim(), &form.password).await?;
    info!(id, "user registered");

    session.put(FLASH, "Your signup was successful. Please log in.");
    Ok(Response::see_other("/user/login"))
}

pub async fn login_form(_app: Arc<App>, req: Request) -> Page {
    let session = session_of(&req)?;
    Ok(Json(json!({
        "form": LoginForm::default(),
        "flash": session.pop(FLASH),
    })))
}

pub async fn login(app: Arc<App>, req: Request) -> Result<Response, AppError> {
    let session = session_of(&req)?;
    let form: LoginForm = forms::parse(&req)?;

    let id = app.users.authenticate(form.email.trim(), &form.password).await?;

    session.renew();
    session.put(AUTH_USER, id.to_string());
    Ok(Response::see_other("/snippet/create"))
}

pub async fn logout(_app: Arc<App>, req: Request) -> Result<Response, AppError> {
    let session = session_of(&req)?;
    session.renew();
    session.remove(AUTH_USER);
    session.put(FLASH, "You've been logged out successfully!");
    Ok(Response::see_other("/"))
}
