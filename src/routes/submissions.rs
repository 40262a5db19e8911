use actix_web::{HttpResponse, Responder, post, web};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use super::{ErrorResponse, ErrorResponseWithMessage};
use crate::create_timestamp;
use crate::judge::{Judge, SubmissionError};
use crate::queue::SubmissionQueue;
use crate::sandbox::TestRunResult;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SubmissionRequest {
    pub lesson_id: String,
    pub source_code: String,
}

/// Envelope returned for a completed verification run
#[derive(Serialize, Deserialize, Debug)]
pub struct SubmissionOutcome {
    pub lesson_id: String,
    pub created_time: String,
    pub finished_time: String,
    pub result: TestRunResult,
}

/// One queued submission, paired with the channel its verdict goes back on
pub struct SubmissionMessage {
    pub request: SubmissionRequest,
    pub responder: oneshot::Sender<Result<TestRunResult, SubmissionError>>,
}

#[post("/submissions")]
pub async fn post_submission_handler(
    judge: web::Data<Judge>,
    queue: web::Data<SubmissionQueue>,
    body: web::Json<SubmissionRequest>,
) -> impl Responder {
    // Unknown lessons are rejected before any sandbox work is queued
    if !judge.registry().contains(&body.lesson_id) {
        return HttpResponse::NotFound().json(ErrorResponse {
            reason: "ERR_NOT_FOUND",
            code: 3,
        });
    }

    let request = body.into_inner();
    let lesson_id = request.lesson_id.clone();
    let created_time = create_timestamp();

    let (tx, rx) = oneshot::channel();
    queue
        .push(SubmissionMessage {
            request,
            responder: tx,
        })
        .await;
    log::debug!("queued submission for lesson {lesson_id}");

    match rx.await {
        Ok(Ok(result)) => HttpResponse::Ok().json(SubmissionOutcome {
            lesson_id,
            created_time,
            finished_time: create_timestamp(),
            result,
        }),
        Ok(Err(e)) => submission_error_response(e),
        Err(e) => {
            log::error!("worker dropped submission responder: {e}");
            HttpResponse::InternalServerError().json(ErrorResponse {
                reason: "ERR_INTERNAL",
                code: 6,
            })
        }
    }
}

fn submission_error_response(err: SubmissionError) -> HttpResponse {
    match err {
        SubmissionError::UnknownLesson(e) => {
            HttpResponse::NotFound().json(ErrorResponseWithMessage {
                reason: "ERR_NOT_FOUND",
                code: 3,
                message: e.to_string(),
            })
        }
        SubmissionError::NoContractDeclaration(e) => {
            HttpResponse::BadRequest().json(ErrorResponseWithMessage {
                reason: "ERR_INVALID_ARGUMENT",
                code: 1,
                message: e.to_string(),
            })
        }
    }
}
