use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use service::auth::AuthError;
use thiserror::Error;
use tracing::error;

/// Handler failure. Only storage problems end up here; auth rejections are
/// redirects.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = match &self {
            AppError::Auth(e) => e.code(),
        };
        error!(code, error = %self, "request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
    }
}
