use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    domain::{
        entities::users::{InsertUserEntity, UserEntity},
        repositories::users::UserRepository,
        value_objects::enums::{
            points_types::PointsType, subscription_statuses::SubscriptionStatus,
        },
    },
    infra::db::postgres::{postgres_connection::PgPoolSquad, schema::users},
};

pub struct UserPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl UserPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl UserRepository for UserPostgres {
    async fn insert_user(&self, new_user: InsertUserEntity) -> Result<UserEntity> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let user = diesel::insert_into(users::table)
            .values(&new_user)
            .returning(UserEntity::as_returning())
            .get_result::<UserEntity>(&mut conn)?;

        Ok(user)
    }

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<UserEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let user = users::table
            .find(user_id)
            .select(UserEntity::as_select())
            .first::<UserEntity>(&mut conn)
            .optional()?;

        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let user = users::table
            .filter(users::email.eq(email))
            .select(UserEntity::as_select())
            .first::<UserEntity>(&mut conn)
            .optional()?;

        Ok(user)
    }

    async fn find_by_subscription_id(
        &self,
        subscription_id: &str,
    ) -> Result<Option<UserEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let user = users::table
            .filter(users::subscription_id.eq(subscription_id))
            .select(UserEntity::as_select())
            .first::<UserEntity>(&mut conn)
            .optional()?;

        Ok(user)
    }

    async fn credit_points(
        &self,
        user_id: Uuid,
        amount: i32,
        bucket: PointsType,
    ) -> Result<usize> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let rows = match bucket {
            PointsType::Purchased => diesel::update(users::table.find(user_id))
                .set((
                    users::points.eq(users::points + amount),
                    users::purchased_points.eq(users::purchased_points + amount),
                    users::updated_at.eq(Utc::now()),
                ))
                .execute(&mut conn)?,
            PointsType::Gifted => diesel::update(users::table.find(user_id))
                .set((
                    users::points.eq(users::points + amount),
                    users::gifted_points.eq(users::gifted_points + amount),
                    users::updated_at.eq(Utc::now()),
                ))
                .execute(&mut conn)?,
        };

        Ok(rows)
    }

    async fn debit_total_points(&self, user_id: Uuid, amount: i32) -> Result<usize> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let rows = diesel::update(
            users::table
                .filter(users::id.eq(user_id))
                .filter(users::points.ge(amount)),
        )
        .set((
            users::points.eq(users::points - amount),
            users::updated_at.eq(Utc::now()),
        ))
        .execute(&mut conn)?;

        Ok(rows)
    }

    async fn debit_split_points(
        &self,
        user_id: Uuid,
        observed_points: i32,
        observed_gifted: i32,
        gifted_used: i32,
        purchased_used: i32,
    ) -> Result<usize> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let rows = diesel::update(
            users::table
                .filter(users::id.eq(user_id))
                .filter(users::points.eq(observed_points))
                .filter(users::gifted_points.eq(observed_gifted)),
        )
        .set((
            users::points.eq(users::points - (gifted_used + purchased_used)),
            users::gifted_points.eq(users::gifted_points - gifted_used),
            users::purchased_points.eq(users::purchased_points - purchased_used),
            users::updated_at.eq(Utc::now()),
        ))
        .execute(&mut conn)?;

        Ok(rows)
    }

    async fn update_subscription_period(
        &self,
        subscription_id: &str,
        status: SubscriptionStatus,
        period_end: Option<DateTime<Utc>>,
    ) -> Result<usize> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let rows = diesel::update(
            users::table.filter(users::subscription_id.eq(subscription_id)),
        )
        .set((
            users::subscription_status.eq(status.to_string()),
            users::subscription_current_period_end.eq(period_end),
            users::updated_at.eq(Utc::now()),
        ))
        .execute(&mut conn)?;

        Ok(rows)
    }

    async fn cancel_subscription(
        &self,
        user_id: Uuid,
        observed_gifted: i32,
        clawback: i32,
    ) -> Result<usize> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let rows = diesel::update(
            users::table
                .filter(users::id.eq(user_id))
                .filter(users::gifted_points.eq(observed_gifted)),
        )
        .set((
            users::subscription_status.eq(SubscriptionStatus::Canceled.to_string()),
            users::subscription_plan.eq(None::<String>),
            users::points.eq(users::points - clawback),
            users::gifted_points.eq(users::gifted_points - clawback),
            users::updated_at.eq(Utc::now()),
        ))
        .execute(&mut conn)?;

        Ok(rows)
    }

    async fn expire_subscription(&self, user_id: Uuid, observed_gifted: i32) -> Result<usize> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        // The status and period guards make the correction single-shot: a
        // concurrent caller that already flipped the row matches zero rows.
        let rows = diesel::update(
            users::table
                .filter(users::id.eq(user_id))
                .filter(users::subscription_status.eq(SubscriptionStatus::Active.to_string()))
                .filter(users::subscription_current_period_end.lt(Utc::now()))
                .filter(users::gifted_points.eq(observed_gifted)),
        )
        .set((
            users::subscription_status.eq(SubscriptionStatus::Expired.to_string()),
            users::subscription_plan.eq(None::<String>),
            users::points.eq(users::points - users::gifted_points),
            users::gifted_points.eq(0),
            users::updated_at.eq(Utc::now()),
        ))
        .execute(&mut conn)?;

        Ok(rows)
    }

    async fn mark_past_due(&self, stripe_customer_id: &str) -> Result<usize> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let rows = diesel::update(
            users::table.filter(users::stripe_customer_id.eq(stripe_customer_id)),
        )
        .set((
            users::subscription_status.eq(SubscriptionStatus::PastDue.to_string()),
            users::updated_at.eq(Utc::now()),
        ))
        .execute(&mut conn)?;

        Ok(rows)
    }
}
