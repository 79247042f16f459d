use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::infra::db::postgres::schema::users;

/// One row per user. The three balance columns are a cache over the
/// points_history journal: `points == purchased_points + gifted_points`.
#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = users)]
pub struct UserEntity {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub points: i32,
    pub purchased_points: i32,
    pub gifted_points: i32,
    pub stripe_customer_id: Option<String>,
    pub subscription_id: Option<String>,
    pub subscription_status: String,
    pub subscription_plan: Option<String>,
    pub subscription_current_period_end: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = users)]
pub struct InsertUserEntity {
    pub email: String,
    pub name: Option<String>,
    pub points: i32,
    pub purchased_points: i32,
    pub gifted_points: i32,
    pub subscription_status: String,
}
