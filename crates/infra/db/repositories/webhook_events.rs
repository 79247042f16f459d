use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    domain::{
        entities::webhook_events::{InsertWebhookEventEntity, WebhookEventEntity},
        repositories::webhook_events::WebhookEventRepository,
        value_objects::enums::webhook_event_statuses::WebhookEventStatus,
    },
    infra::db::postgres::{postgres_connection::PgPoolSquad, schema::webhook_events},
};

pub struct WebhookEventPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl WebhookEventPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl WebhookEventRepository for WebhookEventPostgres {
    async fn enqueue(&self, event: InsertWebhookEventEntity) -> Result<bool> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let rows = diesel::insert_into(webhook_events::table)
            .values(&event)
            .on_conflict_do_nothing()
            .execute(&mut conn)?;

        Ok(rows > 0)
    }

    async fn lock_next_due(&self) -> Result<Option<WebhookEventEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;
        let worker_id = Uuid::new_v4().to_string();
        let current_time = Utc::now();

        let event = conn.transaction::<Option<WebhookEventEntity>, diesel::result::Error, _>(
            |conn| {
                let candidate: Option<WebhookEventEntity> = webhook_events::table
                    .select(WebhookEventEntity::as_select())
                    .filter(webhook_events::status.eq(WebhookEventStatus::Queued.to_string()))
                    .filter(webhook_events::run_at.le(current_time))
                    .order(webhook_events::run_at.asc())
                    .for_update()
                    .skip_locked()
                    .first::<WebhookEventEntity>(conn)
                    .optional()?;

                if let Some(event) = candidate {
                    let claimed = diesel::update(webhook_events::table.find(event.id))
                        .set((
                            webhook_events::status
                                .eq(WebhookEventStatus::Running.to_string()),
                            webhook_events::locked_at.eq(Some(current_time)),
                            webhook_events::locked_by.eq(Some(worker_id)),
                        ))
                        .returning(WebhookEventEntity::as_select())
                        .get_result::<WebhookEventEntity>(conn)?;
                    Ok(Some(claimed))
                } else {
                    Ok(None)
                }
            },
        )?;

        Ok(event)
    }

    async fn mark_done(&self, event_id: Uuid) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        diesel::update(webhook_events::table.find(event_id))
            .set((
                webhook_events::status.eq(WebhookEventStatus::Done.to_string()),
                webhook_events::processed_at.eq(Some(Utc::now())),
                webhook_events::locked_at.eq(None::<chrono::DateTime<Utc>>),
                webhook_events::locked_by.eq(None::<String>),
            ))
            .execute(&mut conn)?;

        Ok(())
    }

    async fn mark_failed(&self, event_id: Uuid, error: &str, max_attempts: i32) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;
        let current_time = Utc::now();

        let event = webhook_events::table
            .find(event_id)
            .select(WebhookEventEntity::as_select())
            .first::<WebhookEventEntity>(&mut conn)?;

        let new_attempts = event.attempts + 1;
        let (new_status, next_run_at) = if new_attempts < max_attempts {
            // Exponential backoff: 5s, 25s, 125s...
            let backoff_sec = 5 * 5_i64.pow((new_attempts - 1) as u32);
            (
                WebhookEventStatus::Queued,
                current_time + chrono::Duration::seconds(backoff_sec),
            )
        } else {
            (WebhookEventStatus::Dead, current_time)
        };

        diesel::update(webhook_events::table.find(event_id))
            .set((
                webhook_events::status.eq(new_status.to_string()),
                webhook_events::attempts.eq(new_attempts),
                webhook_events::error.eq(Some(error)),
                webhook_events::run_at.eq(next_run_at),
                webhook_events::locked_at.eq(None::<chrono::DateTime<Utc>>),
                webhook_events::locked_by.eq(None::<String>),
            ))
            .execute(&mut conn)?;

        Ok(())
    }
}
