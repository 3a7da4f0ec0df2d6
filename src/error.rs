use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use derive_more::Display;
use serde_json::json;

#[derive(Debug, Display)]
pub enum AppError {
    /// Timeout or transport failure talking to the record store.
    #[display(fmt = "Network failure: {}", _0)]
    Network(String),

    #[display(fmt = "Validation failed: {}", _0)]
    Validation(String),

    #[display(
        fmt = "Batch partially applied: {} record(s) updated, {} record(s) failed, {} group(s) skipped as stale",
        succeeded,
        failed,
        stale
    )]
    PartialBatch {
        succeeded: usize,
        failed: usize,
        stale: usize,
    },

    #[display(fmt = "Stale snapshot: {}", _0)]
    StaleSnapshot(String),

    #[display(fmt = "Fetch superseded by a newer request")]
    FetchSuperseded,

    #[display(
        fmt = "Leave request of {} day(s) exceeds the {} day(s) remaining",
        requested,
        remaining
    )]
    LeaveCapExceeded { requested: i64, remaining: i64 },

    #[display(fmt = "Unsupported leave span: {}", _0)]
    UnsupportedLeaveSpan(String),

    #[display(fmt = "Not found: {}", _0)]
    NotFound(String),

    #[display(fmt = "Database error: {}", _0)]
    Database(sqlx::Error),
}

impl std::error::Error for AppError {}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => AppError::Network("database pool timed out".into()),
            sqlx::Error::Io(e) => AppError::Network(e.to_string()),
            other => AppError::Database(other),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Network(_) => StatusCode::BAD_GATEWAY,
            AppError::Validation(_) | AppError::UnsupportedLeaveSpan(_) => StatusCode::BAD_REQUEST,
            AppError::PartialBatch { .. } => StatusCode::MULTI_STATUS,
            AppError::StaleSnapshot(_) | AppError::FetchSuperseded => StatusCode::CONFLICT,
            AppError::LeaveCapExceeded { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            AppError::Database(e) => {
                tracing::error!(error = %e, "Database error");
                "Internal Server Error".to_string()
            }
            other => other.to_string(),
        };
        HttpResponse::build(self.status_code()).json(json!({ "message": message }))
    }
}
