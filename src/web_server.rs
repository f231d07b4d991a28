use std::sync::Arc;

use actix_web::{App, HttpServer, dev::Server, middleware, web};
use sqlx::sqlite::SqlitePool;

use crate::config::{ProblemConfig, ServerConfig};
use crate::engine::ExecutionEngine;
use crate::queue::JobQueue;
use crate::routes::{
    get_submission_by_id_handler, get_submissions_handler, json_error_handler,
    post_submission_handler, query_error_handler, run_code_handler,
};

pub fn build_server(
    server_config: ServerConfig,
    problems: Arc<Vec<ProblemConfig>>,
    engine: Arc<dyn ExecutionEngine>,
    db_pool: Arc<SqlitePool>,
    job_queue: Arc<JobQueue>,
) -> std::io::Result<Server> {
    let problems = web::Data::from(problems);
    let engine = web::Data::from(engine);
    let db_pool = web::Data::from(db_pool);
    let job_queue = web::Data::from(job_queue);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(db_pool.clone())
            .app_data(problems.clone())
            .app_data(engine.clone())
            .app_data(job_queue.clone())
            .app_data(web::JsonConfig::default().error_handler(json_error_handler))
            .app_data(web::QueryConfig::default().error_handler(query_error_handler))
            .wrap(middleware::Logger::default())
            // Order matters: /submissions/run must be registered before the
            // dynamic /submissions/{id} path
            .service(run_code_handler)
            .service(post_submission_handler)
            .service(get_submissions_handler)
            .service(get_submission_by_id_handler)
    })
    .bind((
        server_config
            .bind_address
            .unwrap_or("127.0.0.1".to_string()),
        server_config.bind_port.unwrap_or(3004),
    ))?
    .run();

    Ok(server)
}
