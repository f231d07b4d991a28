use super::*;

/// Synchronous ad-hoc execution against user-supplied stdin. Bypasses the
/// queue and the store entirely: nothing is persisted regardless of the
/// engine's verdict.
#[post("/submissions/run")]
pub async fn run_code_handler(
    engine: web::Data<dyn ExecutionEngine>,
    body: web::Json<RunRequest>,
) -> Result<HttpResponse, AppError> {
    validate_code(&body.code, body.language_id)?;

    // No reference answer for an ad-hoc run, so the engine cannot judge
    // correctness; its verdict is passed through as-is.
    let item = BatchItem {
        language_id: body.language_id,
        source_code: body.code.clone(),
        stdin: body.stdin.clone(),
        expected_output: String::new(),
    };

    let mut verdicts = engine.execute_batch(std::slice::from_ref(&item)).await?;
    let verdict = verdicts
        .pop()
        .ok_or_else(|| AppError::Engine("engine returned no verdict".to_string()))?;

    log::info!("Dry run finished with status {}", verdict.status.description);

    let time = verdict.time_seconds();
    Ok(HttpResponse::Ok().json(RunResponse {
        status: verdict.status.description,
        stdout: verdict.stdout,
        stderr: verdict.stderr,
        compile_output: verdict.compile_output,
        time,
        memory: verdict.memory,
    }))
}
