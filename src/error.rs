use axum::{
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error};

pub type AppResult<T> = Result<T, AppError>;

/// Request-level failures. Every variant maps to a status code and the
/// `{status, message}` error envelope.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Unauthenticated(&'static str),
    #[error("you do not have permission to perform this action")]
    Forbidden,
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("token is invalid or has expired")]
    InvalidResetToken,
    #[error("there was an error sending the email, try again later")]
    DeliveryFailed,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::InvalidResetToken => StatusCode::BAD_REQUEST,
            AppError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::DeliveryFailed | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        debug!(error = %rejection.body_text(), "request body rejected");
        let message = match rejection {
            JsonRejection::MissingJsonContentType(_) => {
                "expected a JSON body with content-type application/json".to_string()
            }
            JsonRejection::JsonSyntaxError(_) => "request body is not valid JSON".to_string(),
            JsonRejection::JsonDataError(e) => format!("invalid request body: {}", e.body_text()),
            _ => "could not read request body".to_string(),
        };
        AppError::Validation(message)
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        debug!(error = %rejection.body_text(), "path rejected");
        AppError::Validation("invalid value in request path".into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            AppError::Internal(e) => {
                error!(error = ?e, "internal error");
                "something went wrong".to_string()
            }
            other => other.to_string(),
        };
        let body = json!({
            "status": if status.is_server_error() { "error" } else { "fail" },
            "message": message,
        });
        (status, Json(body)).into_response()
    }
}
