use super::*;

/// Non-blocking intake: one durable row, one durable job, then 202. The
/// caller polls `GET /submissions/{id}` for the verdict.
#[post("/submissions")]
pub async fn post_submission_handler(
    job_queue: web::Data<JobQueue>,
    pool: web::Data<SqlitePool>,
    problems: web::Data<Vec<ProblemConfig>>,
    body: web::Json<SubmissionRequest>,
) -> Result<HttpResponse, AppError> {
    validate_code(&body.code, body.language_id)?;

    if !problems.iter().any(|p| p.id == body.problem_id) {
        return Err(AppError::NotFound(format!(
            "Problem {} not found.",
            body.problem_id
        )));
    }

    let submission_id = db::create_submission(&body, pool.get_ref()).await?;
    log::info!("Inserted submission {submission_id} into database");

    let job = SubmissionJob {
        submission_id,
        user_id: body.user_id,
        problem_id: body.problem_id,
        code: body.code.clone(),
        language_id: body.language_id,
    };

    if let Err(e) = job_queue.push(job).await {
        // The PENDING row stays behind on purpose: a submission with no
        // matching job is the signal operators reconcile on.
        log::error!("Failed to enqueue job for submission {submission_id}: {e}");
        return Err(e);
    }
    log::debug!("Sent job for submission {submission_id} to queue");

    Ok(HttpResponse::Accepted().json(SubmissionAccepted {
        message: "Submission queued successfully".to_string(),
        submission_id,
    }))
}
