//! # snipshare
//!
//! A small snippet-sharing web service: anonymous users paste text that
//! expires after a chosen number of days, registered users sign up and log
//! in through cookie-backed sessions.
//!
//! The crate is layered bottom-up:
//!
//! - [`store`]: SQLite persistence for snippets and users (sqlx)
//! - [`session`]: the session capability and an in-memory backend
//! - [`Router`] and [`middleware`]: routing plus the composable request chain
//! - [`app`]: handlers and the route table
//! - [`Server`]: hyper connection handling and graceful shutdown
//!
//! TLS, rate limiting and body-size limits belong to the reverse proxy in
//! front of the service.
//!
//! ## Composing a pipeline
//!
//! ```rust,no_run
//! use snipshare::middleware::{Chain, LogRequest, RecoverPanic, SecureHeaders};
//! use snipshare::{Method, Request, Response, Router, Server};
//!
//! # async fn run() -> Result<(), snipshare::Error> {
//! let router = Router::new()
//!     .on(Method::Get, "/snippet/:id", show);
//!
//! let app = Chain::new()
//!     .with(RecoverPanic)
//!     .with(LogRequest)
//!     .with(SecureHeaders)
//!     .then(router);
//!
//! Server::bind(([127, 0, 0, 1], 4000).into()).serve(app).await
//! # }
//!
//! async fn show(req: Request) -> Response {
//!     Response::text(format!("snippet {}", req.param("id").unwrap_or("?")))
//! }
//! ```

mod error;
mod handler;
mod method;
mod request;
mod response;
mod router;
mod server;
mod status;

pub mod app;
pub mod config;
pub mod health;
pub mod middleware;
pub mod session;
pub mod static_files;
pub mod store;

pub use app::App;
pub use config::Config;
pub use error::Error;
pub use handler::{Endpoint, Handler};
pub use method::{Method, UnknownMethod};
pub use request::Request;
pub use response::{ContentType, IntoResponse, Json, Response, ResponseBuilder};
pub use router::{Lookup, PatternError, Router};
pub use server::Server;
pub use status::Status;
