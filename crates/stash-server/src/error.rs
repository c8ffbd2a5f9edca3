use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use stash_backend::BackendError;
use stash_catalog::CatalogError;
use stash_core::StashError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Stash(#[from] StashError),

    #[error("unauthorized: invalid API key")]
    Unauthorized,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Stash(e) => match e {
                StashError::InvalidIdentifier(_) => StatusCode::BAD_REQUEST,
                StashError::NotFound(_) => StatusCode::NOT_FOUND,
                StashError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to clients. Internal details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            Self::Stash(e) => match e {
                StashError::PayloadTooLarge { limit } => {
                    format!("Payload exceeds the {limit} byte upload limit")
                }
                StashError::ReadError(_) => "Failed to read request body".into(),
                StashError::SpoolError(_) => "Failed to write temp file".into(),
                StashError::BackendWriteFailed(_) => "Failed to upload to storage backend".into(),
                StashError::BackendReadFailed(_) => "Failed to read from storage backend".into(),
                StashError::CacheIo(_) => "Failed to open cached file".into(),
                StashError::CatalogWriteFailed(_) => "Failed to save asset metadata".into(),
                StashError::CatalogReadFailed(_) => "Failed to retrieve asset".into(),
                StashError::NotFound(_) => "Asset not found".into(),
                StashError::InvalidIdentifier(_) => "Invalid asset ID format".into(),
                StashError::Internal(_) => "Internal server error".into(),
            },
            Self::Unauthorized => "Unauthorized: Invalid API key".into(),
            _ => "Internal server error".into(),
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
        let body = json!({
            "success": false,
            "error": {
                "code": status.as_u16(),
                "message": self.public_message(),
            },
        });
        (status, Json(body)).into_response()
    }
}

pub type ServerResult<T> = Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_the_error_kind() {
        let cases = [
            (StashError::InvalidIdentifier("x".into()), StatusCode::BAD_REQUEST),
            (StashError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (StashError::PayloadTooLarge { limit: 1 }, StatusCode::PAYLOAD_TOO_LARGE),
            (
                StashError::CatalogWriteFailed(CatalogError::Corrupt("x".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ServerError::from(err).status(), status);
        }
        assert_eq!(ServerError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ServerError::Config("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn internal_details_are_not_exposed() {
        let err = ServerError::from(StashError::CatalogReadFailed(CatalogError::Corrupt(
            "row 7 has a bad digest".into(),
        )));
        assert_eq!(err.public_message(), "Failed to retrieve asset");
    }
}
