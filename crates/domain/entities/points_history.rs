use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::infra::db::postgres::schema::points_history;

/// Append-only ledger entry. `points` is a signed delta; positive credits,
/// negative debits.
#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = points_history)]
pub struct PointsHistoryEntity {
    pub id: Uuid,
    pub user_id: Uuid,
    pub points: i32,
    pub points_type: String,
    pub action: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = points_history)]
pub struct InsertPointsHistoryEntity {
    pub user_id: Uuid,
    pub points: i32,
    pub points_type: String,
    pub action: String,
    pub description: String,
}
