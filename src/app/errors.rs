use std::collections::BTreeMap;

use serde_json::json;
use tracing::error;

use crate::response::{IntoResponse, Response};
use crate::session::SessionError;
use crate::status::Status;
use crate::store::StoreError;

/// Per-field validation messages, keyed by form field name.
pub type FieldErrors = BTreeMap<&'static str, String>;

/// Everything a handler can fail with, each variant mapping to one response.
///
/// Server-side faults keep their full detail for the log; the client only
/// ever sees a generic message for them.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("not found")]
    NotFound,
    #[error("malformed request: {0}")]
    BadRequest(String),
    #[error("invalid form: {0:?}")]
    Validation(FieldErrors),
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error(transparent)]
    Store(StoreError),
    #[error(transparent)]
    Session(#[from] SessionError),
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NoRecord => Self::NotFound,
            StoreError::InvalidCredentials => Self::InvalidCredentials,
            StoreError::DuplicateEmail { field } => {
                Self::Validation(FieldErrors::from([(field, "Address is already in use".to_owned())]))
            }
            other => Self::Store(other),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Self::NotFound => (Status::NotFound, json!({ "error": "Not Found" })),
            Self::BadRequest(_) => (Status::BadRequest, json!({ "error": "Bad Request" })),
            Self::Validation(errors) => (Status::UnprocessableContent, json!({ "errors": errors })),
            Self::InvalidCredentials => (
                Status::Unauthorized,
                json!({ "error": "Email or Password is incorrect" }),
            ),
            Self::Store(_) | Self::Session(_) => {
                error!(error = %self, detail = ?self, "request failed");
                (Status::InternalServerError, json!({ "error": "Internal Server Error" }))
            }
        };
        Response::builder().status(status).json(body.to_string().into_bytes())
    }
}
