use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::database::StoreError;
use crate::generation::GenerationError;

pub type WebResult<T> = std::result::Result<T, WebError>;

#[derive(thiserror::Error, Debug)]
pub enum WebError {
    #[error("Internal Server Error: {0}")]
    Internal(#[from] anyhow::Error),
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Not found")]
    NotFound,
    /// The request itself couldn't be read, e.g. a malformed body or missing query.
    #[error("{detail}")]
    Rejected {
        status: http::StatusCode,
        detail: String,
    },
}

impl From<JsonRejection> for WebError {
    fn from(rejection: JsonRejection) -> Self {
        WebError::Rejected {
            status: rejection.status(),
            detail: rejection.body_text(),
        }
    }
}

impl From<QueryRejection> for WebError {
    fn from(rejection: QueryRejection) -> Self {
        WebError::Rejected {
            status: rejection.status(),
            detail: rejection.body_text(),
        }
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        tracing::error!("Request failed: {}", self);
        let (status, detail) = match &self {
            WebError::Internal(_) => (
                http::StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Server Error".to_string(),
            ),
            WebError::Generation(GenerationError::InvalidInput(_)) => {
                (http::StatusCode::BAD_REQUEST, self.to_string())
            }
            WebError::Generation(GenerationError::Failure(_)) => {
                (http::StatusCode::BAD_GATEWAY, self.to_string())
            }
            // Connection trouble is not worth explaining to the caller
            WebError::Store(StoreError::Unavailable(_)) => (
                http::StatusCode::SERVICE_UNAVAILABLE,
                "Database connection error. Please try again later.".to_string(),
            ),
            WebError::Store(StoreError::Operation(err)) => (
                http::StatusCode::SERVICE_UNAVAILABLE,
                format!("Database operation error: {}", err),
            ),
            WebError::Store(StoreError::Document(err)) => (
                http::StatusCode::SERVICE_UNAVAILABLE,
                format!("Database operation error: {}", err),
            ),
            WebError::Store(StoreError::InvalidId(_)) => {
                (http::StatusCode::BAD_REQUEST, "Invalid Id passed".to_string())
            }
            WebError::Store(StoreError::InvalidRecipe(_)) => {
                (http::StatusCode::BAD_REQUEST, self.to_string())
            }
            WebError::NotFound => (http::StatusCode::NOT_FOUND, "Resource not found".to_string()),
            WebError::Rejected { status, detail } => (*status, detail.clone()),
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}
