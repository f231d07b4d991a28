use std::sync::Arc;

use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;

use crate::config::{ProblemConfig, TestCaseConfig};
use crate::database::{self as db, Claim, status};
use crate::engine::{BatchItem, ExecutionEngine, Verdict};
use crate::error::AppError;
use crate::queue::JobQueue;
use crate::routes::SubmissionJob;

/// Final verdict of one submission, persisted in a single update.
#[derive(Debug, Clone, PartialEq)]
pub struct JudgeOutcome {
    pub status: String,
    /// Max wall time across judged cases, in seconds
    pub time: Option<f64>,
    /// Max memory across judged cases, in KB
    pub memory: Option<i64>,
    /// First case's stdout, kept for debugging
    pub stdout: Option<String>,
    /// First failing case's diagnostic, or a generic one for internal faults
    pub stderr: Option<String>,
}

impl JudgeOutcome {
    /// Catch-all terminal outcome for faults that are not judging results.
    /// The diagnostic is always non-empty so a failed submission never shows
    /// a blank error to the user.
    pub fn internal_error(detail: &str) -> Self {
        Self {
            status: status::ERROR.to_string(),
            time: None,
            memory: None,
            stdout: None,
            stderr: Some(format!("internal error while judging: {detail}")),
        }
    }
}

pub async fn worker(
    id: u8,
    problems: Arc<Vec<ProblemConfig>>,
    engine: Arc<dyn ExecutionEngine>,
    db_pool: Arc<SqlitePool>,
    queue: Arc<JobQueue>,
    token: CancellationToken,
) -> anyhow::Result<()> {
    log::info!("Worker {id} initialized");

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                log::info!("Worker {id} received shutdown signal, stopping");
                break;
            }

            job = queue.pop() => {
                log::info!("Worker {id} got job for submission {} from queue", job.submission_id);
                process_job(&job, &problems, engine.as_ref(), &db_pool).await;
            }
        };
    }

    log::info!("Worker {id} has shut down gracefully");
    Ok(())
}

/// Drives one job to a terminal submission status.
///
/// Never bubbles an error up: any fault during judging is converted into a
/// stored ERROR verdict, so a picked-up job cannot leave its submission
/// stuck in PROCESSING on this worker's watch.
pub async fn process_job(
    job: &SubmissionJob,
    problems: &[ProblemConfig],
    engine: &dyn ExecutionEngine,
    pool: &SqlitePool,
) {
    let submission_id = job.submission_id;

    match db::claim_processing(submission_id, pool).await {
        Ok(Claim::Acquired) => {}
        Ok(Claim::AlreadyTerminal(current)) => {
            log::info!(
                "Submission {submission_id} already terminal ({current}), duplicate job skipped"
            );
            return;
        }
        Err(e) => {
            log::error!("Failed to claim submission {submission_id}, job discarded: {e}");
            return;
        }
    }

    let outcome = match judge(job, problems, engine).await {
        Ok(outcome) => outcome,
        Err(e) => {
            log::error!("Judging submission {submission_id} failed: {e}");
            JudgeOutcome::internal_error(&e.to_string())
        }
    };

    log::info!(
        "Submission {submission_id} finished with status {}",
        outcome.status
    );

    if let Err(e) = db::save_verdict(submission_id, &outcome, pool).await {
        log::error!("Failed to save verdict for submission {submission_id}: {e}");
    }
}

async fn judge(
    job: &SubmissionJob,
    problems: &[ProblemConfig],
    engine: &dyn ExecutionEngine,
) -> Result<JudgeOutcome, AppError> {
    let problem = problems
        .iter()
        .find(|p| p.id == job.problem_id)
        .ok_or_else(|| AppError::Data(format!("problem {} not configured", job.problem_id)))?;

    if problem.cases.is_empty() {
        return Err(AppError::Data(format!(
            "problem {} has no test cases",
            problem.id
        )));
    }

    // One item per test case, in case order; all share the submission's code
    // and language.
    let items: Vec<BatchItem> = problem
        .cases
        .iter()
        .map(|case| BatchItem {
            language_id: job.language_id,
            source_code: job.code.clone(),
            stdin: case.input.clone(),
            expected_output: case.expected_output.clone(),
        })
        .collect();

    let verdicts = engine.execute_batch(&items).await?;

    Ok(reduce_verdicts(&verdicts, &problem.cases))
}

/// Folds per-case verdicts into one submission verdict.
///
/// Cases are scanned in order and the scan stops at the first case the
/// engine did not accept; time and memory maxima therefore cover the cases
/// up to and including that one. Whatever the engine produced for later
/// cases is ignored.
pub fn reduce_verdicts(verdicts: &[Verdict], cases: &[TestCaseConfig]) -> JudgeOutcome {
    let mut time: Option<f64> = None;
    let mut memory: Option<i64> = None;
    let mut failure: Option<(String, String)> = None;

    for (idx, verdict) in verdicts.iter().enumerate() {
        if let Some(t) = verdict.time_seconds() {
            time = Some(time.map_or(t, |cur| cur.max(t)));
        }
        if let Some(m) = verdict.memory {
            memory = Some(memory.map_or(m, |cur| cur.max(m)));
        }

        if !verdict.is_accepted() {
            failure = Some((
                failure_category(&verdict.status.description),
                failure_detail(verdict, cases.get(idx)),
            ));
            break;
        }
    }

    let (status, stderr) = match failure {
        Some((category, detail)) => (category, Some(detail)),
        None => (status::ACCEPTED.to_string(), None),
    };

    JudgeOutcome {
        status,
        time,
        memory,
        stdout: verdicts.first().and_then(|v| v.stdout.clone()),
        stderr,
    }
}

/// Normalizes an engine status description into a stored category token:
/// "Wrong Answer" becomes WRONG_ANSWER, "Runtime Error (NZEC)" becomes
/// RUNTIME_ERROR_NZEC.
pub fn failure_category(description: &str) -> String {
    let mut token = String::with_capacity(description.len());
    for c in description.chars() {
        if c.is_ascii_alphanumeric() {
            token.push(c.to_ascii_uppercase());
        } else if !token.is_empty() && !token.ends_with('_') {
            token.push('_');
        }
    }
    while token.ends_with('_') {
        token.pop();
    }

    if token.is_empty() {
        status::ERROR.to_string()
    } else {
        token
    }
}

/// Diagnostic for the first failing case: its stderr, else the compiler
/// output, else a constructed message naming the offending input.
fn failure_detail(verdict: &Verdict, case: Option<&TestCaseConfig>) -> String {
    if let Some(stderr) = verdict.stderr.as_deref().filter(|s| !s.is_empty()) {
        return stderr.to_string();
    }
    if let Some(compile_output) = verdict.compile_output.as_deref().filter(|s| !s.is_empty()) {
        return compile_output.to_string();
    }
    match case {
        Some(case) => format!(
            "{} on input \"{}\"",
            verdict.status.description, case.input
        ),
        None => verdict.status.description.clone(),
    }
}
