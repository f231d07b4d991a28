use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite};

use crate::routes::{SubmissionRequest, SubmissionsQueryParams};
use crate::worker::JudgeOutcome;

const DATABASE_NAME: &str = "code_service.sqlite3";

/// Hard cap on the page size of the submission history listing
pub const MAX_PAGE_SIZE: u32 = 50;

/// Submission lifecycle statuses. PENDING and PROCESSING are the two live
/// states; everything else (ACCEPTED, a failure category derived from the
/// engine's verdict, or ERROR) is terminal and never reverted.
pub mod status {
    pub const PENDING: &str = "PENDING";
    pub const PROCESSING: &str = "PROCESSING";
    pub const ACCEPTED: &str = "ACCEPTED";
    pub const ERROR: &str = "ERROR";

    pub fn is_terminal(status: &str) -> bool {
        status != PENDING && status != PROCESSING
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, sqlx::FromRow)]
pub struct SubmissionRecord {
    pub id: u32,
    pub user_id: u32,
    pub problem_id: u32,
    pub code: String,
    pub language_id: u32,
    pub status: String,
    /// Max wall time across judged cases, in seconds
    pub time: Option<f64>,
    /// Max memory across judged cases, in KB
    pub memory: Option<i64>,
    /// First case's stdout, kept for debugging
    pub stdout: Option<String>,
    /// First failing case's diagnostic, or a generic one for internal faults
    pub stderr: Option<String>,
    pub created_time: String,
    pub updated_time: String,
}

/// Outcome of trying to move a submission into PROCESSING.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim {
    /// The row was PENDING, or PROCESSING after a crashed attempt, and now
    /// belongs to this worker.
    Acquired,
    /// The row already carries a terminal verdict; the job is a duplicate
    /// delivery and must not be judged again. Carries the stored status.
    AlreadyTerminal(String),
}

pub fn get_db_path() -> PathBuf {
    use directories::ProjectDirs;

    let proj_dirs =
        ProjectDirs::from("", "", "code-service").expect("Unable to find user directory");
    let data_dir = proj_dirs.data_local_dir();

    fs::create_dir_all(data_dir).expect("Failed to create local data dir");

    data_dir.join(DATABASE_NAME)
}

pub async fn init_db(db_path: impl AsRef<Path>) -> sqlx::Result<SqlitePool> {
    let db_url = format!("sqlite://{}?mode=rwc", db_path.as_ref().display()); // rwc = read/write/create
    let db_pool = SqlitePoolOptions::new()
        .max_connections(2)
        .connect(&db_url)
        .await?;

    for sql in &[
        "PRAGMA foreign_keys = ON;",
        "PRAGMA busy_timeout = 2000;", // 2 seconds timeout for lock contention
        "PRAGMA journal_mode = WAL;",
        "PRAGMA synchronous = NORMAL;",
        r"
        CREATE TABLE IF NOT EXISTS submissions (
            id            INTEGER  PRIMARY KEY AUTOINCREMENT,
            user_id       INTEGER  NOT NULL,
            problem_id    INTEGER  NOT NULL,
            code          TEXT     NOT NULL,
            language_id   INTEGER  NOT NULL,
            status        TEXT     NOT NULL,
            time          REAL,
            memory        INTEGER,
            stdout        TEXT,
            stderr        TEXT,
            created_time  TEXT     NOT NULL,
            updated_time  TEXT     NOT NULL
        );",
        "CREATE INDEX IF NOT EXISTS idx_submissions_created_time ON submissions(created_time);",
        "CREATE INDEX IF NOT EXISTS idx_submissions_user_id ON submissions(user_id);",
    ] {
        sqlx::query(sql).execute(&db_pool).await?;
    }

    log::info!("Initialized database at {}", db_path.as_ref().display());

    Ok(db_pool)
}

pub fn remove_db(db_path: impl AsRef<Path>) {
    // WAL and SHM files might not exist, ignore errors
    let _ = fs::remove_file(format!("{}-wal", db_path.as_ref().display()));
    let _ = fs::remove_file(format!("{}-shm", db_path.as_ref().display()));

    if let Err(e) = fs::remove_file(&db_path) {
        log::warn!(
            "Unable to remove database at {}: {e}",
            db_path.as_ref().display()
        );
    } else {
        log::info!("Removed database at {}", db_path.as_ref().display());
    }
}

/// Creates a new submission row in PENDING state and returns its id.
pub async fn create_submission(
    body: &SubmissionRequest,
    pool: &SqlitePool,
) -> sqlx::Result<u32> {
    let now = crate::create_timestamp();

    let result = sqlx::query(
        r#"
        INSERT INTO submissions (user_id, problem_id, code, language_id, status, created_time, updated_time)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(body.user_id)
    .bind(body.problem_id)
    .bind(&body.code)
    .bind(body.language_id)
    .bind(status::PENDING)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid() as u32)
}

pub async fn fetch_submission(id: u32, pool: &SqlitePool) -> sqlx::Result<SubmissionRecord> {
    sqlx::query_as::<_, SubmissionRecord>(
        r#"
        SELECT id, user_id, problem_id, code, language_id, status,
               time, memory, stdout, stderr, created_time, updated_time
        FROM submissions
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_one(pool)
    .await
}

/// Submission history, newest first, page size capped at [`MAX_PAGE_SIZE`].
pub async fn fetch_submissions(
    query: &SubmissionsQueryParams,
    pool: &SqlitePool,
) -> sqlx::Result<Vec<SubmissionRecord>> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT id, user_id, problem_id, code, language_id, status, \
         time, memory, stdout, stderr, created_time, updated_time \
         FROM submissions WHERE 1=1",
    );

    if let Some(user_id) = query.user_id {
        qb.push(" AND user_id = ").push_bind(user_id);
    }
    if let Some(problem_id) = query.problem_id {
        qb.push(" AND problem_id = ").push_bind(problem_id);
    }

    let limit = query.limit.unwrap_or(MAX_PAGE_SIZE).min(MAX_PAGE_SIZE);
    qb.push(" ORDER BY created_time DESC, id DESC LIMIT ")
        .push_bind(limit);

    qb.build_query_as::<SubmissionRecord>().fetch_all(pool).await
}

/// Moves a submission into PROCESSING before any remote call is made, so a
/// crash mid-judging leaves a PROCESSING row rather than a PENDING one.
///
/// The update is guarded on the current status: a row that already carries a
/// terminal verdict is reported as [`Claim::AlreadyTerminal`] and must not be
/// re-judged (at-least-once delivery means the same job can arrive twice). A
/// PROCESSING row may be re-claimed, which is the crash-retry path.
pub async fn claim_processing(id: u32, pool: &SqlitePool) -> sqlx::Result<Claim> {
    let now = crate::create_timestamp();

    let updated = sqlx::query(
        r#"
        UPDATE submissions
        SET status = ?, updated_time = ?
        WHERE id = ? AND status IN (?, ?)
        "#,
    )
    .bind(status::PROCESSING)
    .bind(&now)
    .bind(id)
    .bind(status::PENDING)
    .bind(status::PROCESSING)
    .execute(pool)
    .await?
    .rows_affected();

    if updated == 1 {
        return Ok(Claim::Acquired);
    }

    let record = fetch_submission(id, pool).await?;
    Ok(Claim::AlreadyTerminal(record.status))
}

/// The sole terminal write for a submission: status, aggregate metrics and
/// diagnostics in a single update, guarded so a terminal row is never
/// overwritten.
pub async fn save_verdict(
    id: u32,
    outcome: &JudgeOutcome,
    pool: &SqlitePool,
) -> sqlx::Result<()> {
    let now = crate::create_timestamp();

    let updated = sqlx::query(
        r#"
        UPDATE submissions
        SET status = ?, time = ?, memory = ?, stdout = ?, stderr = ?, updated_time = ?
        WHERE id = ? AND status = ?
        "#,
    )
    .bind(&outcome.status)
    .bind(outcome.time)
    .bind(outcome.memory)
    .bind(&outcome.stdout)
    .bind(&outcome.stderr)
    .bind(&now)
    .bind(id)
    .bind(status::PROCESSING)
    .execute(pool)
    .await?
    .rows_affected();

    if updated == 0 {
        log::warn!("Verdict for submission {id} not stored: row was not PROCESSING");
    }

    Ok(())
}
