use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    domain::{
        entities::{
            points_history::InsertPointsHistoryEntity,
            stripe_payments::InsertStripePaymentEntity,
        },
        repositories::{
            stripe_payments::StripePaymentRepository, users::SubscriptionActivation,
        },
    },
    infra::db::postgres::{
        postgres_connection::PgPoolSquad,
        schema::{points_history, stripe_payments, users},
    },
};

pub struct StripePaymentPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl StripePaymentPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl StripePaymentRepository for StripePaymentPostgres {
    async fn record_subscription_activation(
        &self,
        payment: InsertStripePaymentEntity,
        activation: SubscriptionActivation,
        journal: InsertPointsHistoryEntity,
    ) -> Result<bool> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        conn.transaction::<bool, anyhow::Error, _>(|conn| {
            // Zero rows affected means the unique constraint on the session
            // or intent id matched an existing row: a redelivered event.
            let rows = diesel::insert_into(stripe_payments::table)
                .values(&payment)
                .on_conflict_do_nothing()
                .execute(conn)?;
            if rows == 0 {
                return Ok(false);
            }

            let updated = diesel::update(users::table.find(activation.user_id))
                .set((
                    users::stripe_customer_id.eq(Some(activation.stripe_customer_id)),
                    users::subscription_id.eq(Some(activation.subscription_id)),
                    users::subscription_status.eq(activation.status.to_string()),
                    users::subscription_plan.eq(Some(activation.plan.to_string())),
                    users::subscription_current_period_end.eq(Some(activation.period_end)),
                    users::points.eq(users::points + activation.gift_points),
                    users::gifted_points.eq(users::gifted_points + activation.gift_points),
                    users::updated_at.eq(Utc::now()),
                ))
                .execute(conn)?;
            if updated == 0 {
                return Err(anyhow!(
                    "user {} not found for subscription activation",
                    activation.user_id
                ));
            }

            diesel::insert_into(points_history::table)
                .values(&journal)
                .execute(conn)?;

            Ok(true)
        })
    }

    async fn record_points_purchase(
        &self,
        user_id: Uuid,
        points: i32,
        payment: InsertStripePaymentEntity,
        journal: InsertPointsHistoryEntity,
    ) -> Result<bool> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        conn.transaction::<bool, anyhow::Error, _>(|conn| {
            let rows = diesel::insert_into(stripe_payments::table)
                .values(&payment)
                .on_conflict_do_nothing()
                .execute(conn)?;
            if rows == 0 {
                return Ok(false);
            }

            let updated = diesel::update(users::table.find(user_id))
                .set((
                    users::points.eq(users::points + points),
                    users::purchased_points.eq(users::purchased_points + points),
                    users::updated_at.eq(Utc::now()),
                ))
                .execute(conn)?;
            if updated == 0 {
                return Err(anyhow!("user {} not found for points purchase", user_id));
            }

            diesel::insert_into(points_history::table)
                .values(&journal)
                .execute(conn)?;

            Ok(true)
        })
    }
}
