use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use uuid::Uuid;

use crate::domain::entities::webhook_events::{InsertWebhookEventEntity, WebhookEventEntity};

#[automock]
#[async_trait]
pub trait WebhookEventRepository {
    /// Enqueues a verified event. Returns `false` when the provider event id
    /// was already enqueued (redelivery).
    async fn enqueue(&self, event: InsertWebhookEventEntity) -> Result<bool>;

    /// Claims the next due queued event with FOR UPDATE SKIP LOCKED and marks
    /// it running.
    async fn lock_next_due(&self) -> Result<Option<WebhookEventEntity>>;

    async fn mark_done(&self, event_id: Uuid) -> Result<()>;

    /// Re-queues with exponential backoff, or marks the event dead once
    /// `max_attempts` is exhausted.
    async fn mark_failed(&self, event_id: Uuid, error: &str, max_attempts: i32) -> Result<()>;
}
