use anyhow::Result;
use async_trait::async_trait;
use diesel::prelude::*;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    domain::{
        entities::points_history::{InsertPointsHistoryEntity, PointsHistoryEntity},
        repositories::points_history::PointsHistoryRepository,
    },
    infra::db::postgres::{postgres_connection::PgPoolSquad, schema::points_history},
};

pub struct PointsHistoryPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl PointsHistoryPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl PointsHistoryRepository for PointsHistoryPostgres {
    async fn insert_entry(&self, entry: InsertPointsHistoryEntity) -> Result<Uuid> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let entry_id = diesel::insert_into(points_history::table)
            .values(&entry)
            .returning(points_history::id)
            .get_result::<Uuid>(&mut conn)?;

        Ok(entry_id)
    }

    async fn list_by_user(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<PointsHistoryEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let entries = points_history::table
            .filter(points_history::user_id.eq(user_id))
            .order(points_history::created_at.desc())
            .limit(limit)
            .offset(offset)
            .select(PointsHistoryEntity::as_select())
            .load::<PointsHistoryEntity>(&mut conn)?;

        Ok(entries)
    }

    async fn count_by_user(&self, user_id: Uuid) -> Result<i64> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let total = points_history::table
            .filter(points_history::user_id.eq(user_id))
            .count()
            .get_result::<i64>(&mut conn)?;

        Ok(total)
    }
}
