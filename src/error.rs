use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;

/// Application-wide error type.
///
/// Intake and dry-run surface these to the caller; the worker converts every
/// fault it hits into a terminal `ERROR` verdict instead of propagating.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    /// Job could not be enqueued after the submission row was created. The
    /// orphaned PENDING row is left behind as the reconciliation signal.
    #[error("failed to enqueue job: {0}")]
    Queue(String),

    #[error("execution engine failure: {0}")]
    Engine(String),

    /// Problem or test-case data missing or malformed at processing time
    #[error("judge data unavailable: {0}")]
    Data(String),

    #[error("database failure: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Serialize)]
struct ErrorBody {
    reason: &'static str,
    code: u32,
    message: String,
}

impl AppError {
    fn reason(&self) -> (&'static str, u32) {
        match self {
            Self::Validation(_) => ("ERR_INVALID_ARGUMENT", 1),
            Self::NotFound(_) => ("ERR_NOT_FOUND", 3),
            Self::Queue(_) | Self::Engine(_) | Self::Data(_) | Self::Database(_) => {
                ("ERR_EXTERNAL", 5)
            }
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Engine(_) => StatusCode::BAD_GATEWAY,
            Self::Queue(_) | Self::Data(_) | Self::Database(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let (reason, code) = self.reason();
        HttpResponse::build(self.status_code()).json(ErrorBody {
            reason,
            code,
            message: self.to_string(),
        })
    }
}
