use std::sync::Arc;

use serde::Deserialize;
use tally::domain::{
    entities::{points_history::InsertPointsHistoryEntity, users::InsertUserEntity},
    repositories::{points_history::PointsHistoryRepository, users::UserRepository},
    value_objects::{
        enums::{
            points_actions::PointsAction, points_types::PointsType,
            subscription_statuses::SubscriptionStatus,
        },
        points::REGISTER_BONUS,
    },
};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct RegisterModel {
    pub email: String,
    pub name: Option<String>,
}

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("email is already registered")]
    EmailTaken,
    #[error("email must not be empty")]
    MissingEmail,
    #[error("user not found")]
    UserNotFound,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AccountError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            AccountError::EmailTaken => StatusCode::CONFLICT,
            AccountError::MissingEmail => StatusCode::BAD_REQUEST,
            AccountError::UserNotFound => StatusCode::NOT_FOUND,
            AccountError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type UseCaseResult<T> = std::result::Result<T, AccountError>;

pub struct AccountUseCase<U, H>
where
    U: UserRepository + Send + Sync + 'static,
    H: PointsHistoryRepository + Send + Sync + 'static,
{
    user_repo: Arc<U>,
    points_history_repo: Arc<H>,
}

impl<U, H> AccountUseCase<U, H>
where
    U: UserRepository + Send + Sync + 'static,
    H: PointsHistoryRepository + Send + Sync + 'static,
{
    pub fn new(user_repo: Arc<U>, points_history_repo: Arc<H>) -> Self {
        Self {
            user_repo,
            points_history_repo,
        }
    }

    /// Creates the user row with the welcome bonus already on it, then
    /// journals the bonus so the ledger explains the opening balance.
    pub async fn register(&self, register_model: RegisterModel) -> UseCaseResult<Uuid> {
        let email = register_model.email.trim().to_lowercase();
        if email.is_empty() {
            return Err(AccountError::MissingEmail);
        }

        if self.user_repo.find_by_email(&email).await?.is_some() {
            return Err(AccountError::EmailTaken);
        }

        let user = self
            .user_repo
            .insert_user(InsertUserEntity {
                email,
                name: register_model.name,
                points: REGISTER_BONUS,
                purchased_points: REGISTER_BONUS,
                gifted_points: 0,
                subscription_status: SubscriptionStatus::Free.to_string(),
            })
            .await?;

        self.points_history_repo
            .insert_entry(InsertPointsHistoryEntity {
                user_id: user.id,
                points: REGISTER_BONUS,
                points_type: PointsType::Purchased.to_string(),
                action: PointsAction::Register.to_string(),
                description: PointsAction::Register.default_description().to_string(),
            })
            .await?;

        info!(user_id = %user.id, "user registered with welcome bonus");

        Ok(user.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally::domain::entities::users::UserEntity;
    use tally::domain::repositories::{
        points_history::MockPointsHistoryRepository, users::MockUserRepository,
    };

    #[tokio::test]
    async fn register_credits_welcome_bonus_into_purchased_bucket() {
        let mut user_repo = MockUserRepository::new();
        user_repo.expect_find_by_email().returning(|_| Ok(None));
        user_repo
            .expect_insert_user()
            .withf(|new_user| {
                new_user.email == "new@example.com"
                    && new_user.points == REGISTER_BONUS
                    && new_user.purchased_points == REGISTER_BONUS
                    && new_user.gifted_points == 0
            })
            .returning(|new_user| {
                Ok(UserEntity {
                    id: Uuid::new_v4(),
                    email: new_user.email,
                    name: new_user.name,
                    points: new_user.points,
                    purchased_points: new_user.purchased_points,
                    gifted_points: new_user.gifted_points,
                    stripe_customer_id: None,
                    subscription_id: None,
                    subscription_status: new_user.subscription_status,
                    subscription_plan: None,
                    subscription_current_period_end: None,
                    created_at: chrono::Utc::now(),
                    updated_at: chrono::Utc::now(),
                })
            });

        let mut history_repo = MockPointsHistoryRepository::new();
        history_repo
            .expect_insert_entry()
            .withf(|entry| entry.points == REGISTER_BONUS && entry.action == "register")
            .times(1)
            .returning(|_| Ok(Uuid::new_v4()));

        let usecase = AccountUseCase::new(Arc::new(user_repo), Arc::new(history_repo));
        let result = usecase
            .register(RegisterModel {
                email: "New@Example.com ".to_string(),
                name: None,
            })
            .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn register_rejects_duplicate_email() {
        let mut user_repo = MockUserRepository::new();
        user_repo.expect_find_by_email().returning(|_| {
            Ok(Some(UserEntity {
                id: Uuid::new_v4(),
                email: "new@example.com".to_string(),
                name: None,
                points: 100,
                purchased_points: 100,
                gifted_points: 0,
                stripe_customer_id: None,
                subscription_id: None,
                subscription_status: "free".to_string(),
                subscription_plan: None,
                subscription_current_period_end: None,
                created_at: chrono::Utc::now(),
                updated_at: chrono::Utc::now(),
            }))
        });

        let history_repo = MockPointsHistoryRepository::new();

        let usecase = AccountUseCase::new(Arc::new(user_repo), Arc::new(history_repo));
        let result = usecase
            .register(RegisterModel {
                email: "new@example.com".to_string(),
                name: None,
            })
            .await;

        assert!(matches!(result, Err(AccountError::EmailTaken)));
    }
}
