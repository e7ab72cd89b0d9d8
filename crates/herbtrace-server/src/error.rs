use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use herbtrace_ledger::LedgerError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("missing credential: send the {0} header")]
    MissingCredential(&'static str),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("store error: {0}")]
    Store(#[from] herbtrace_store::StoreError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type ServerResult<T> = Result<T, ServerError>;

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingCredential(_) | Self::AuthFailed(_) => StatusCode::UNAUTHORIZED,
            Self::Ledger(err) => match err {
                LedgerError::Unauthorized { .. } => StatusCode::FORBIDDEN,
                LedgerError::AlreadyExists(_) | LedgerError::Conflict(_) => StatusCode::CONFLICT,
                LedgerError::NotFound(_) => StatusCode::NOT_FOUND,
                LedgerError::MalformedPayload(_)
                | LedgerError::InvalidBatchId(_)
                | LedgerError::UnknownOperation(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Store(_) | Self::Config(_) | Self::Io(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self, "request failed");
        } else {
            warn!(status = status.as_u16(), error = %self, "request rejected");
        }
        (status, Json(json!({ "ok": false, "error": self.to_string() }))).into_response()
    }
}
