mod get;
mod post;
mod run;

pub use get::{get_submission_by_id_handler, get_submissions_handler};
pub use post::post_submission_handler;
pub use run::run_code_handler;

use actix_web::{HttpResponse, get, post, web};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;

use crate::config::ProblemConfig;
use crate::database as db;
use crate::engine::{BatchItem, ExecutionEngine};
use crate::error::AppError;
use crate::queue::JobQueue;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SubmissionRequest {
    pub user_id: u32,
    pub problem_id: u32,
    pub code: String,
    pub language_id: u32,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct SubmissionAccepted {
    pub message: String,
    pub submission_id: u32,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct RunRequest {
    pub code: String,
    pub language_id: u32,
    /// User-supplied stdin for the ad-hoc run
    #[serde(default)]
    pub stdin: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct RunResponse {
    pub status: String,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub compile_output: Option<String>,
    pub time: Option<f64>,
    pub memory: Option<i64>,
}

/// Message carried by the job queue. Denormalized so the worker can judge
/// without an extra read of the submission row.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SubmissionJob {
    pub submission_id: u32,
    pub user_id: u32,
    pub problem_id: u32,
    pub code: String,
    pub language_id: u32,
}

#[derive(Deserialize, Debug)]
pub struct SubmissionsQueryParams {
    pub user_id: Option<u32>,
    pub problem_id: Option<u32>,
    pub limit: Option<u32>,
}

/// Shared by intake and dry-run. The language id zero check complements the
/// type-level guarantee that negative ids never deserialize.
pub(super) fn validate_code(code: &str, language_id: u32) -> Result<(), AppError> {
    if code.is_empty() {
        return Err(AppError::Validation("Code cannot be empty".to_string()));
    }
    if language_id == 0 {
        return Err(AppError::Validation("Invalid languageId".to_string()));
    }
    Ok(())
}
