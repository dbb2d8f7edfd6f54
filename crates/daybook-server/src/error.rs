use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use daybook_shared::ValidationError;
use daybook_store::StoreError;

use crate::admission::Denial;
use crate::generative::GenerationError;
use crate::image_host::ImageHostError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("Malformed request body: {0}")]
    MalformedBody(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Entry not found or unauthorized")]
    EntryNotFound,

    #[error("Not found")]
    NotFound,

    #[error("Username already exists")]
    UsernameTaken,

    #[error("{}", .0.message())]
    RateLimited(Denial),

    #[error("Image generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("Image hosting failed: {0}")]
    ImageHost(#[from] ImageHostError),

    #[error("Image cleanup failed: {0}")]
    ImageCleanup(ImageHostError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServerError::Validation(_) | ServerError::MalformedBody(_) => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            ServerError::Unauthorized | ServerError::InvalidCredentials => {
                (StatusCode::UNAUTHORIZED, self.to_string())
            }
            ServerError::EntryNotFound | ServerError::NotFound => {
                (StatusCode::NOT_FOUND, self.to_string())
            }
            ServerError::UsernameTaken => (StatusCode::CONFLICT, self.to_string()),
            ServerError::RateLimited(denial) => {
                let body = serde_json::json!({
                    "error": denial.message(),
                    "code": denial.code(),
                });
                return (StatusCode::TOO_MANY_REQUESTS, axum::Json(body)).into_response();
            }
            ServerError::Generation(_) | ServerError::ImageHost(_) => {
                tracing::error!(error = %self, "Entry pipeline failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to create diary entry".to_string(),
                )
            }
            ServerError::ImageCleanup(_) => {
                tracing::error!(error = %self, "Entry deletion failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to delete entries".to_string(),
                )
            }
            ServerError::Store(_) | ServerError::Internal(_) => {
                tracing::error!(error = %self, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ServerError::from(ValidationError::MissingContent), StatusCode::BAD_REQUEST),
            (ServerError::Unauthorized, StatusCode::UNAUTHORIZED),
            (ServerError::EntryNotFound, StatusCode::NOT_FOUND),
            (ServerError::UsernameTaken, StatusCode::CONFLICT),
            (
                ServerError::RateLimited(Denial::WeeklyLimitReached),
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (
                ServerError::Generation(GenerationError::MissingOutput("url")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (ServerError::Store(StoreError::NotFound), StatusCode::INTERNAL_SERVER_ERROR),
            (
                ServerError::ImageCleanup(ImageHostError::Empty),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }
}
