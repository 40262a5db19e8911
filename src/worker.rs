use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::judge::Judge;
use crate::queue::SubmissionQueue;

pub async fn worker(
    id: u8,
    judge: Arc<Judge>,
    queue: Arc<SubmissionQueue>,
    token: CancellationToken,
) -> anyhow::Result<()> {
    log::info!("Worker {id} initialized");

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                log::info!("Worker {id} received shutdown signal, stopping");
                break;
            }

            message = queue.pop() => {
                let lesson_id = message.request.lesson_id.clone();
                log::info!("Worker {id} got submission for lesson {lesson_id}");

                let outcome = judge
                    .run_submission(&message.request.source_code, &message.request.lesson_id)
                    .await;

                match &outcome {
                    Ok(result) => log::info!(
                        "Lesson {lesson_id} verified on worker {id}: strategy={}, passed={}",
                        result.strategy.as_str(),
                        result.passed
                    ),
                    Err(e) => log::info!(
                        "Submission for lesson {lesson_id} rejected on worker {id}: {e}"
                    ),
                }

                if message.responder.send(outcome).is_err() {
                    log::warn!("Failed to send submission result back to server");
                }
            }
        };
    }

    log::info!("Worker {id} has shut down gracefully");
    Ok(())
}
