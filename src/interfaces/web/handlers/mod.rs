pub mod health;
pub mod stream;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::core::error::DocpackError;

impl IntoResponse for DocpackError {
    fn into_response(self) -> Response {
        match self {
            DocpackError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized").into_response(),
            DocpackError::Configuration(what) => {
                tracing::error!("Rejecting request: {}", what);
                (StatusCode::INTERNAL_SERVER_ERROR, "Server configuration error").into_response()
            }
            other => {
                let status = match &other {
                    DocpackError::JobNotFound => StatusCode::NOT_FOUND,
                    DocpackError::UpstreamUnreachable(_) => StatusCode::BAD_GATEWAY,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (
                    status,
                    Json(serde_json::json!({
                        "error": other.reason(),
                        "message": other.detail(),
                    })),
                )
                    .into_response()
            }
        }
    }
}
