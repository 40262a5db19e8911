use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use actix_web::{App, test, web};
use assert_json_diff::assert_json_include;
use lazy_static::lazy_static;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use soljudge::config::Config;
use soljudge::judge::Judge;
use soljudge::queue::SubmissionQueue;
use soljudge::routes::{json_error_handler, post_submission_handler};
use soljudge::worker::worker;

// Global counter to keep per-test work directories unique
static TEST_DIR_COUNTER: AtomicU32 = AtomicU32::new(0);

lazy_static! {
    static ref CONFIG_JSON: String =
        std::fs::read_to_string("data/example.json").expect("example config missing");
}

struct TestHarness {
    judge: web::Data<Judge>,
    queue: web::Data<SubmissionQueue>,
    token: CancellationToken,
}

/// Builds a judge with no container runtime attached plus one worker
/// draining the queue, mirroring the production wiring in main.rs.
fn spawn_harness() -> TestHarness {
    let mut config: Config = serde_json::from_str(&CONFIG_JSON).unwrap();
    let id = TEST_DIR_COUNTER.fetch_add(1, Ordering::SeqCst);
    config.sandbox.work_dir = Some(std::env::temp_dir().join(format!(
        "soljudge-server-test-{}-{id}",
        std::process::id()
    )));

    let judge = Arc::new(Judge::build_without_sandbox(&config).unwrap());
    let queue = Arc::new(SubmissionQueue::new());
    let token = CancellationToken::new();

    tokio::spawn(worker(1, judge.clone(), queue.clone(), token.clone()));

    TestHarness {
        judge: web::Data::from(judge),
        queue: web::Data::from(queue),
        token,
    }
}

macro_rules! test_app {
    ($harness:expr) => {
        test::init_service(
            App::new()
                .app_data($harness.judge.clone())
                .app_data($harness.queue.clone())
                .app_data(web::JsonConfig::default().error_handler(json_error_handler))
                .service(post_submission_handler),
        )
        .await
    };
}

#[actix_web::test]
async fn unknown_lesson_returns_not_found() {
    let harness = spawn_harness();
    let app = test_app!(harness);

    let req = test::TestRequest::post()
        .uri("/submissions")
        .set_json(json!({
            "lesson_id": "no-such-lesson",
            "source_code": "contract Foo {}"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 404);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_json_include!(
        actual: body,
        expected: json!({"reason": "ERR_NOT_FOUND", "code": 3})
    );

    harness.token.cancel();
}

#[actix_web::test]
async fn contractless_source_returns_bad_request() {
    let harness = spawn_harness();
    let app = test_app!(harness);

    let req = test::TestRequest::post()
        .uri("/submissions")
        .set_json(json!({
            "lesson_id": "hello-world",
            "source_code": "library Math {}"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_json_include!(
        actual: body,
        expected: json!({"reason": "ERR_INVALID_ARGUMENT", "code": 1})
    );

    harness.token.cancel();
}

#[actix_web::test]
async fn valid_submission_reports_unavailable_without_runtime() {
    let harness = spawn_harness();
    let app = test_app!(harness);

    let req = test::TestRequest::post()
        .uri("/submissions")
        .set_json(json!({
            "lesson_id": "hello-world",
            "source_code": "contract Foo { string public greeting = \"hi\"; }"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_json_include!(
        actual: body,
        expected: json!({
            "lesson_id": "hello-world",
            "result": {
                "strategy": "UNAVAILABLE",
                "success": false,
                "passed": false,
                "test_cases": []
            }
        })
    );

    harness.token.cancel();
}

#[actix_web::test]
async fn alias_id_is_accepted() {
    let harness = spawn_harness();
    let app = test_app!(harness);

    let req = test::TestRequest::post()
        .uri("/submissions")
        .set_json(json!({
            "lesson_id": "home",
            "source_code": "contract Foo { string public greeting = \"hi\"; }"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 200);

    harness.token.cancel();
}

#[actix_web::test]
async fn malformed_json_body_returns_bad_request() {
    let harness = spawn_harness();
    let app = test_app!(harness);

    let req = test::TestRequest::post()
        .uri("/submissions")
        .insert_header(("content-type", "application/json"))
        .set_payload("{not valid json")
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_json_include!(
        actual: body,
        expected: json!({"reason": "ERR_INVALID_ARGUMENT", "code": 1})
    );

    harness.token.cancel();
}
