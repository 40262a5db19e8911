use std::collections::VecDeque;

use tokio::sync::{Mutex, Notify};

use crate::routes::SubmissionMessage;

pub struct SubmissionQueue {
    queue: Mutex<VecDeque<SubmissionMessage>>,
    notify: Notify,
}

impl SubmissionQueue {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    pub async fn push(&self, message: SubmissionMessage) {
        self.queue.lock().await.push_back(message);
        self.notify.notify_one();
    }

    pub async fn pop(&self) -> SubmissionMessage {
        loop {
            if let Some(message) = self.queue.lock().await.pop_front() {
                return message;
            }
            self.notify.notified().await;
        }
    }
}

impl Default for SubmissionQueue {
    fn default() -> Self {
        Self::new()
    }
}
