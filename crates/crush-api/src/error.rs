use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

use crush_types::models::UnknownVariant;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Db(#[from] crush_db::Error),

    #[error("{0}")]
    Validation(String),

    #[error("internal server error")]
    Internal,
}

impl From<UnknownVariant> for ApiError {
    fn from(e: UnknownVariant) -> Self {
        ApiError::Validation(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        use crush_db::Error as DbError;

        let (status, detail) = match &self {
            ApiError::Db(DbError::NotFound(_)) => (StatusCode::NOT_FOUND, self.to_string()),
            ApiError::Db(DbError::Conflict(_)) => (StatusCode::CONFLICT, self.to_string()),
            ApiError::Db(DbError::Forbidden(_)) => (StatusCode::FORBIDDEN, self.to_string()),
            ApiError::Db(DbError::Validation(_)) | ApiError::Validation(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, self.to_string())
            }
            ApiError::Db(e) => {
                error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            ApiError::Internal => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        (status, Json(serde_json::json!({ "detail": detail }))).into_response()
    }
}
