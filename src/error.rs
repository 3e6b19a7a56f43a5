use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Error taxonomy for the authorization core.
///
/// `NotFound` on a delete path is swallowed by the service layer
/// before it ever reaches a handler, keeping delete idempotent; it
/// only escapes from read paths that genuinely have nothing to return.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("invalid namespace: {0}")]
    InvalidNamespace(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Internal(String),

    #[error("{0}")]
    Database(#[from] sqlx::Error),
}

impl AppError {
    fn code(&self) -> &'static str {
        match self {
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Forbidden(_) => "forbidden",
            AppError::Conflict(_) => "conflict",
            AppError::BadRequest(_) | AppError::InvalidNamespace(_) => "bad_request",
            AppError::NotFound(_) => "not_found",
            AppError::Internal(_) | AppError::Database(_) => "internal_error",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::BadRequest(_) | AppError::InvalidNamespace(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Internal(_) | AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    /// Builds the bare `{"error": {"code", "message"}}` envelope.
    /// `request_id` isn't added here — `request_id_middleware` wraps
    /// every response and stamps it into this same shape afterward,
    /// since only the middleware (not this impl) has the request's id.
    fn into_response(self) -> Response {
        if let AppError::Database(ref e) = self {
            tracing::error!(error = %e, "store error surfaced to caller");
        }

        let status = self.status();
        let body = Json(json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}

impl From<crate::store::StoreError> for AppError {
    fn from(err: crate::store::StoreError) -> Self {
        match err {
            crate::store::StoreError::NotFound => AppError::NotFound("not found".to_string()),
            crate::store::StoreError::DuplicateKey => AppError::Conflict("already exists".to_string()),
            crate::store::StoreError::Internal(e) => AppError::Database(e),
        }
    }
}

impl From<crate::policy::EngineError> for AppError {
    fn from(err: crate::policy::EngineError) -> Self {
        match err {
            crate::policy::EngineError::MissingParent => {
                AppError::BadRequest("parent_resource_id is required".to_string())
            }
            crate::policy::EngineError::Store(e) => e.into(),
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
