use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Lifecycle of an outbox entry. `Dead` is terminal: the event exhausted its
/// retry budget and needs operator attention.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum WebhookEventStatus {
    Queued,
    Running,
    Done,
    Dead,
}

impl Display for WebhookEventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = match self {
            WebhookEventStatus::Queued => "queued",
            WebhookEventStatus::Running => "running",
            WebhookEventStatus::Done => "done",
            WebhookEventStatus::Dead => "dead",
        };
        write!(f, "{}", status)
    }
}
