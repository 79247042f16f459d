use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use uuid::Uuid;

use crate::domain::entities::points_history::{InsertPointsHistoryEntity, PointsHistoryEntity};

#[automock]
#[async_trait]
pub trait PointsHistoryRepository {
    async fn insert_entry(&self, entry: InsertPointsHistoryEntity) -> Result<Uuid>;

    /// Journal page ordered by creation time descending.
    async fn list_by_user(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<PointsHistoryEntity>>;

    async fn count_by_user(&self, user_id: Uuid) -> Result<i64>;
}
