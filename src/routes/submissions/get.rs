use super::*;

#[get("/submissions")]
pub async fn get_submissions_handler(
    pool: web::Data<SqlitePool>,
    query: web::Query<SubmissionsQueryParams>,
) -> Result<HttpResponse, AppError> {
    let records = db::fetch_submissions(&query, pool.get_ref()).await?;
    log::info!("Got {} submission records", records.len());
    Ok(HttpResponse::Ok().json(records))
}

#[get("/submissions/{id}")]
pub async fn get_submission_by_id_handler(
    pool: web::Data<SqlitePool>,
    path: web::Path<(u32,)>,
) -> Result<HttpResponse, AppError> {
    let submission_id = path.into_inner().0;

    match db::fetch_submission(submission_id, pool.get_ref()).await {
        Ok(record) => {
            log::debug!("Got the record of submission {submission_id} from database");
            Ok(HttpResponse::Ok().json(record))
        }
        Err(sqlx::Error::RowNotFound) => Err(AppError::NotFound(format!(
            "Submission {submission_id} not found."
        ))),
        Err(e) => {
            log::error!("Failed to retrieve submission record from database: {e}");
            Err(e.into())
        }
    }
}
