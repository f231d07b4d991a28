use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use actix_web::{App, test, web};
use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::json;
use sqlx::sqlite::SqlitePool;

use code_service::config::{ProblemConfig, TestCaseConfig};
use code_service::database::{self as db, status};
use code_service::engine::{BatchItem, ExecutionEngine, Verdict, VerdictStatus};
use code_service::error::AppError;
use code_service::queue::JobQueue;
use code_service::routes::{
    json_error_handler, post_submission_handler, query_error_handler, run_code_handler,
};

// Global counter to ensure unique test database names
static TEST_DB_COUNTER: AtomicU32 = AtomicU32::new(0);

// Helper function to create isolated test database
async fn create_test_db() -> (SqlitePool, String) {
    let test_id = TEST_DB_COUNTER.fetch_add(1, Ordering::SeqCst);
    let db_path = std::env::temp_dir()
        .join(format!(
            "code_service_submit_{}_{}.sqlite3",
            std::process::id(),
            test_id
        ))
        .to_string_lossy()
        .into_owned();

    let _ = std::fs::remove_file(&db_path);

    let db_pool = db::init_db(&db_path).await.unwrap();
    (db_pool, db_path)
}

// Test guard that ensures cleanup on drop
struct TestDbGuard {
    db_path: String,
}

impl TestDbGuard {
    fn new(db_path: String) -> Self {
        Self { db_path }
    }
}

impl Drop for TestDbGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.db_path);
        let _ = std::fs::remove_file(format!("{}-wal", self.db_path));
        let _ = std::fs::remove_file(format!("{}-shm", self.db_path));
    }
}

/// Engine double that records the batches it receives
struct RecordingEngine {
    verdicts: Result<Vec<Verdict>, String>,
    seen: Mutex<Vec<Vec<BatchItem>>>,
}

impl RecordingEngine {
    fn with_verdicts(verdicts: Vec<Verdict>) -> Arc<Self> {
        Arc::new(Self {
            verdicts: Ok(verdicts),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            verdicts: Err(message.to_string()),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn batches_seen(&self) -> Vec<Vec<BatchItem>> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExecutionEngine for RecordingEngine {
    async fn execute_batch(&self, items: &[BatchItem]) -> Result<Vec<Verdict>, AppError> {
        self.seen.lock().unwrap().push(items.to_vec());
        match &self.verdicts {
            Ok(verdicts) => Ok(verdicts.clone()),
            Err(message) => Err(AppError::Engine(message.clone())),
        }
    }
}

fn accepted_verdict(stdout: &str) -> Verdict {
    Verdict {
        status: VerdictStatus {
            id: 3,
            description: "Accepted".to_string(),
        },
        stdout: Some(stdout.to_string()),
        stderr: None,
        compile_output: None,
        time: Some("0.013".to_string()),
        memory: Some(3064),
    }
}

fn test_problems() -> Vec<ProblemConfig> {
    vec![ProblemConfig {
        id: 1,
        name: "A + B".to_string(),
        cases: vec![TestCaseConfig {
            input: "1 2".to_string(),
            expected_output: "3".to_string(),
        }],
    }]
}

async fn count_submissions(pool: &SqlitePool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM submissions")
        .fetch_one(pool)
        .await
        .unwrap()
}

macro_rules! build_app {
    ($pool:expr, $problems:expr, $engine:expr, $queue:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($pool.clone()))
                .app_data(web::Data::new($problems.clone()))
                .app_data(web::Data::from($engine.clone() as Arc<dyn ExecutionEngine>))
                .app_data(web::Data::from($queue.clone()))
                .app_data(web::JsonConfig::default().error_handler(json_error_handler))
                .app_data(web::QueryConfig::default().error_handler(query_error_handler))
                .service(run_code_handler)
                .service(post_submission_handler),
        )
        .await
    };
}

#[actix_web::test]
async fn test_post_submission_is_accepted_and_enqueued() {
    let (pool, db_path) = create_test_db().await;
    let _guard = TestDbGuard::new(db_path);
    let problems = test_problems();
    let engine = RecordingEngine::with_verdicts(vec![]);
    let queue = Arc::new(JobQueue::new());
    let app = build_app!(pool, problems, engine, queue);

    let req = test::TestRequest::post()
        .uri("/submissions")
        .set_json(json!({
            "user_id": 1,
            "problem_id": 1,
            "code": "print(sum(map(int, input().split())))",
            "language_id": 71
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 202);
    let body: serde_json::Value = test::read_body_json(resp).await;
    let submission_id = body["submission_id"].as_u64().unwrap() as u32;

    // Both side effects are observable before the call returned: the PENDING
    // row and the queued job
    let record = db::fetch_submission(submission_id, &pool).await.unwrap();
    assert_eq!(record.status, status::PENDING);
    assert_eq!(record.language_id, 71);

    assert_eq!(queue.len().await, 1);
    let job = queue.pop().await;
    assert_eq!(job.submission_id, submission_id);
    assert_eq!(job.problem_id, 1);
    assert_eq!(job.language_id, 71);
    assert_eq!(job.code, "print(sum(map(int, input().split())))");

    // Intake never calls the engine
    assert!(engine.batches_seen().is_empty());
}

#[actix_web::test]
async fn test_post_submission_rejects_empty_code() {
    let (pool, db_path) = create_test_db().await;
    let _guard = TestDbGuard::new(db_path);
    let problems = test_problems();
    let engine = RecordingEngine::with_verdicts(vec![]);
    let queue = Arc::new(JobQueue::new());
    let app = build_app!(pool, problems, engine, queue);

    let req = test::TestRequest::post()
        .uri("/submissions")
        .set_json(json!({
            "user_id": 1,
            "problem_id": 1,
            "code": "",
            "language_id": 71
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["reason"], "ERR_INVALID_ARGUMENT");

    // Nothing persisted, nothing queued
    assert_eq!(count_submissions(&pool).await, 0);
    assert!(queue.is_empty().await);
}

#[actix_web::test]
async fn test_post_submission_rejects_zero_language_id() {
    let (pool, db_path) = create_test_db().await;
    let _guard = TestDbGuard::new(db_path);
    let problems = test_problems();
    let engine = RecordingEngine::with_verdicts(vec![]);
    let queue = Arc::new(JobQueue::new());
    let app = build_app!(pool, problems, engine, queue);

    let req = test::TestRequest::post()
        .uri("/submissions")
        .set_json(json!({
            "user_id": 1,
            "problem_id": 1,
            "code": "print(1)",
            "language_id": 0
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 400);
    assert_eq!(count_submissions(&pool).await, 0);
}

#[actix_web::test]
async fn test_post_submission_rejects_negative_language_id() {
    let (pool, db_path) = create_test_db().await;
    let _guard = TestDbGuard::new(db_path);
    let problems = test_problems();
    let engine = RecordingEngine::with_verdicts(vec![]);
    let queue = Arc::new(JobQueue::new());
    let app = build_app!(pool, problems, engine, queue);

    // Negative ids never deserialize into the unsigned field; the payload
    // error handler turns that into the same 400 shape
    let req = test::TestRequest::post()
        .uri("/submissions")
        .set_json(json!({
            "user_id": 1,
            "problem_id": 1,
            "code": "print(1)",
            "language_id": -3
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["reason"], "ERR_INVALID_ARGUMENT");
    assert_eq!(count_submissions(&pool).await, 0);
}

#[actix_web::test]
async fn test_post_submission_unknown_problem_is_not_found() {
    let (pool, db_path) = create_test_db().await;
    let _guard = TestDbGuard::new(db_path);
    let problems = test_problems();
    let engine = RecordingEngine::with_verdicts(vec![]);
    let queue = Arc::new(JobQueue::new());
    let app = build_app!(pool, problems, engine, queue);

    let req = test::TestRequest::post()
        .uri("/submissions")
        .set_json(json!({
            "user_id": 1,
            "problem_id": 999,
            "code": "print(1)",
            "language_id": 71
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 404);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["reason"], "ERR_NOT_FOUND");
    assert_eq!(count_submissions(&pool).await, 0);
}

#[actix_web::test]
async fn test_post_submission_enqueue_failure_keeps_pending_row() {
    let (pool, db_path) = create_test_db().await;
    let _guard = TestDbGuard::new(db_path);
    let problems = test_problems();
    let engine = RecordingEngine::with_verdicts(vec![]);
    let queue = Arc::new(JobQueue::new());
    queue.close();
    let app = build_app!(pool, problems, engine, queue);

    let req = test::TestRequest::post()
        .uri("/submissions")
        .set_json(json!({
            "user_id": 1,
            "problem_id": 1,
            "code": "print(1)",
            "language_id": 71
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 500);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["reason"], "ERR_EXTERNAL");

    // The orphaned PENDING row is the reconciliation signal and must survive
    assert_eq!(count_submissions(&pool).await, 1);
    let record = db::fetch_submission(1, &pool).await.unwrap();
    assert_eq!(record.status, status::PENDING);
    assert!(queue.is_empty().await);
}

#[actix_web::test]
async fn test_run_code_passes_verdict_through() {
    let (pool, db_path) = create_test_db().await;
    let _guard = TestDbGuard::new(db_path);
    let problems = test_problems();
    let engine = RecordingEngine::with_verdicts(vec![accepted_verdict("hello\n")]);
    let queue = Arc::new(JobQueue::new());
    let app = build_app!(pool, problems, engine, queue);

    let req = test::TestRequest::post()
        .uri("/submissions/run")
        .set_json(json!({
            "code": "print('hello')",
            "language_id": 71,
            "stdin": "ignored"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "Accepted");
    assert_eq!(body["stdout"], "hello\n");
    assert_eq!(body["time"], 0.013);
    assert_eq!(body["memory"], 3064);

    // Exactly one item, the caller's stdin, no reference answer
    let batches = engine.batches_seen();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 1);
    assert_eq!(batches[0][0].stdin, "ignored");
    assert_eq!(batches[0][0].expected_output, "");
}

#[actix_web::test]
async fn test_run_code_never_persists_anything() {
    let (pool, db_path) = create_test_db().await;
    let _guard = TestDbGuard::new(db_path);
    let problems = test_problems();
    let engine = RecordingEngine::with_verdicts(vec![accepted_verdict("ok\n")]);
    let queue = Arc::new(JobQueue::new());
    let app = build_app!(pool, problems, engine, queue);

    let req = test::TestRequest::post()
        .uri("/submissions/run")
        .set_json(json!({ "code": "print('ok')", "language_id": 71 }))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 200);
    assert_eq!(count_submissions(&pool).await, 0);
    assert!(queue.is_empty().await);
}

#[actix_web::test]
async fn test_run_code_defaults_stdin_to_empty() {
    let (pool, db_path) = create_test_db().await;
    let _guard = TestDbGuard::new(db_path);
    let problems = test_problems();
    let engine = RecordingEngine::with_verdicts(vec![accepted_verdict("ok\n")]);
    let queue = Arc::new(JobQueue::new());
    let app = build_app!(pool, problems, engine, queue);

    let req = test::TestRequest::post()
        .uri("/submissions/run")
        .set_json(json!({ "code": "print('ok')", "language_id": 71 }))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 200);
    assert_eq!(engine.batches_seen()[0][0].stdin, "");
}

#[actix_web::test]
async fn test_run_code_engine_failure_is_bad_gateway() {
    let (pool, db_path) = create_test_db().await;
    let _guard = TestDbGuard::new(db_path);
    let problems = test_problems();
    let engine = RecordingEngine::failing("engine down");
    let queue = Arc::new(JobQueue::new());
    let app = build_app!(pool, problems, engine, queue);

    let req = test::TestRequest::post()
        .uri("/submissions/run")
        .set_json(json!({ "code": "print(1)", "language_id": 71 }))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 502);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["reason"], "ERR_EXTERNAL");
    assert_eq!(count_submissions(&pool).await, 0);
}

#[actix_web::test]
async fn test_run_code_rejects_empty_code_without_engine_call() {
    let (pool, db_path) = create_test_db().await;
    let _guard = TestDbGuard::new(db_path);
    let problems = test_problems();
    let engine = RecordingEngine::with_verdicts(vec![accepted_verdict("ok\n")]);
    let queue = Arc::new(JobQueue::new());
    let app = build_app!(pool, problems, engine, queue);

    let req = test::TestRequest::post()
        .uri("/submissions/run")
        .set_json(json!({ "code": "", "language_id": 71 }))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 400);
    assert!(engine.batches_seen().is_empty());
}

#[actix_web::test]
async fn test_malformed_json_body_is_bad_request() {
    let (pool, db_path) = create_test_db().await;
    let _guard = TestDbGuard::new(db_path);
    let problems = test_problems();
    let engine = RecordingEngine::with_verdicts(vec![]);
    let queue = Arc::new(JobQueue::new());
    let app = build_app!(pool, problems, engine, queue);

    let req = test::TestRequest::post()
        .uri("/submissions")
        .insert_header(("content-type", "application/json"))
        .set_payload("{not json")
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["reason"], "ERR_INVALID_ARGUMENT");
}
