use std::sync::Arc;

use chrono::Utc;
use tally::domain::{
    entities::{points_history::InsertPointsHistoryEntity, users::UserEntity},
    repositories::{points_history::PointsHistoryRepository, users::UserRepository},
    value_objects::{
        enums::{
            points_actions::PointsAction, points_types::PointsType,
            subscription_plans::SubscriptionPlan, subscription_statuses::SubscriptionStatus,
        },
        points::{
            DeductPointsModel, PaginationDto, PointsDetailDto, PointsHistoryItemDto,
            PointsHistoryPageDto, UsePointsModel, UsePointsOutcome,
        },
        subscriptions::SubscriptionDetailDto,
    },
};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

const DEFAULT_HISTORY_LIMIT: i64 = 10;
const MAX_HISTORY_LIMIT: i64 = 100;
// Bounded retries for compare-and-swap balance updates.
const MAX_BALANCE_RETRIES: usize = 3;

#[derive(Debug, Error)]
pub enum PointsError {
    #[error("user not found")]
    UserNotFound,
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    #[error("unknown points action: {0}")]
    UnknownAction(String),
    #[error("insufficient points")]
    InsufficientPoints,
    #[error("balance changed concurrently, retry the request")]
    Conflict,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl PointsError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            PointsError::UserNotFound => StatusCode::NOT_FOUND,
            PointsError::InvalidAmount(_)
            | PointsError::UnknownAction(_)
            | PointsError::InsufficientPoints => StatusCode::BAD_REQUEST,
            PointsError::Conflict => StatusCode::CONFLICT,
            PointsError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type UseCaseResult<T> = std::result::Result<T, PointsError>;

pub struct PointsUseCase<U, H>
where
    U: UserRepository + Send + Sync + 'static,
    H: PointsHistoryRepository + Send + Sync + 'static,
{
    user_repo: Arc<U>,
    points_history_repo: Arc<H>,
}

impl<U, H> PointsUseCase<U, H>
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

    /// Corrects an active subscription whose period end has already passed:
    /// the row flips to expired and the gifted balance is forfeited. Runs
    /// before every read or spend so stale rows never leak out.
    async fn ensure_not_lapsed(&self, user: UserEntity) -> UseCaseResult<UserEntity> {
        let status = SubscriptionStatus::from_str(&user.subscription_status);
        let lapsed = status == SubscriptionStatus::Active
            && user
                .subscription_current_period_end
                .map(|end| end < Utc::now())
                .unwrap_or(false);

        if !lapsed {
            return Ok(user);
        }

        let rows = self
            .user_repo
            .expire_subscription(user.id, user.gifted_points)
            .await?;

        if rows == 1 {
            info!(user_id = %user.id, forfeited = user.gifted_points, "subscription lapsed, gifted points forfeited");
            if user.gifted_points > 0 {
                self.points_history_repo
                    .insert_entry(InsertPointsHistoryEntity {
                        user_id: user.id,
                        points: -user.gifted_points,
                        points_type: PointsType::Gifted.to_string(),
                        action: PointsAction::SubscriptionExpired.to_string(),
                        description: PointsAction::SubscriptionExpired
                            .default_description()
                            .to_string(),
                    })
                    .await?;
            }
        }

        // Zero rows means a concurrent caller already corrected the row;
        // either way the fresh state is what callers should see.
        self.user_repo
            .find_by_id(user.id)
            .await?
            .ok_or(PointsError::UserNotFound)
    }

    async fn load_fresh_user(&self, user_id: Uuid) -> UseCaseResult<UserEntity> {
        let user = self
            .user_repo
            .find_by_id(user_id)
            .await?
            .ok_or(PointsError::UserNotFound)?;
        self.ensure_not_lapsed(user).await
    }

    pub async fn get_points_detail(&self, user_id: Uuid) -> UseCaseResult<PointsDetailDto> {
        let user = self.load_fresh_user(user_id).await?;
        Ok(to_points_detail(&user))
    }

    pub async fn get_subscription_detail(
        &self,
        user_id: Uuid,
    ) -> UseCaseResult<SubscriptionDetailDto> {
        let user = self.load_fresh_user(user_id).await?;
        Ok(SubscriptionDetailDto {
            subscription_status: SubscriptionStatus::from_str(&user.subscription_status),
            subscription_plan: user
                .subscription_plan
                .as_deref()
                .and_then(SubscriptionPlan::from_str),
            subscription_current_period_end: user.subscription_current_period_end,
            stripe_customer_id: user.stripe_customer_id,
        })
    }

    /// Flat deduction against the total balance. The journal entry is tagged
    /// with the purchased bucket without touching the bucket columns.
    pub async fn deduct_points(
        &self,
        user_id: Uuid,
        deduct_points_model: DeductPointsModel,
    ) -> UseCaseResult<PointsDetailDto> {
        let amount = deduct_points_model.points;
        if amount <= 0 {
            return Err(PointsError::InvalidAmount(
                "points must be a positive number".to_string(),
            ));
        }

        let action = PointsAction::from_str(&deduct_points_model.action)
            .ok_or_else(|| PointsError::UnknownAction(deduct_points_model.action.clone()))?;

        let user = self.load_fresh_user(user_id).await?;

        // The UPDATE carries a `points >= amount` guard, so zero rows means
        // the balance no longer covers the deduction.
        let rows = self.user_repo.debit_total_points(user.id, amount).await?;
        if rows == 0 {
            return match self.user_repo.find_by_id(user.id).await? {
                Some(_) => Err(PointsError::InsufficientPoints),
                None => Err(PointsError::UserNotFound),
            };
        }

        let description = if deduct_points_model.description.is_empty() {
            action.default_description().to_string()
        } else {
            deduct_points_model.description
        };

        self.points_history_repo
            .insert_entry(InsertPointsHistoryEntity {
                user_id: user.id,
                points: -amount,
                points_type: PointsType::Purchased.to_string(),
                action: action.to_string(),
                description,
            })
            .await?;

        let user = self
            .user_repo
            .find_by_id(user.id)
            .await?
            .ok_or(PointsError::UserNotFound)?;

        Ok(to_points_detail(&user))
    }

    /// Bucket-aware spend: gifted points drain before purchased ones. The
    /// debit is compare-and-swapped against the balances read at the start of
    /// each attempt, so a concurrent mutation retries instead of corrupting
    /// the split.
    pub async fn use_points(
        &self,
        user_id: Uuid,
        use_points_model: UsePointsModel,
    ) -> UseCaseResult<UsePointsOutcome> {
        let amount = use_points_model.points;
        if amount <= 0 {
            return Err(PointsError::InvalidAmount(
                "points must be a positive number".to_string(),
            ));
        }

        let mut user = self.load_fresh_user(user_id).await?;

        for attempt in 0..MAX_BALANCE_RETRIES {
            if user.points < amount {
                return Err(PointsError::InsufficientPoints);
            }

            let gifted_used = user.gifted_points.min(amount);
            let purchased_used = amount - gifted_used;

            let rows = self
                .user_repo
                .debit_split_points(
                    user.id,
                    user.points,
                    user.gifted_points,
                    gifted_used,
                    purchased_used,
                )
                .await?;

            if rows == 1 {
                let description = if use_points_model.description.is_empty() {
                    PointsAction::Use.default_description().to_string()
                } else {
                    use_points_model.description.clone()
                };

                if gifted_used > 0 {
                    self.points_history_repo
                        .insert_entry(InsertPointsHistoryEntity {
                            user_id: user.id,
                            points: -gifted_used,
                            points_type: PointsType::Gifted.to_string(),
                            action: PointsAction::Use.to_string(),
                            description: description.clone(),
                        })
                        .await?;
                }
                if purchased_used > 0 {
                    self.points_history_repo
                        .insert_entry(InsertPointsHistoryEntity {
                            user_id: user.id,
                            points: -purchased_used,
                            points_type: PointsType::Purchased.to_string(),
                            action: PointsAction::Use.to_string(),
                            description,
                        })
                        .await?;
                }

                return Ok(UsePointsOutcome {
                    points_used: amount,
                    gifted_points_used: gifted_used,
                    purchased_points_used: purchased_used,
                    remaining_points: user.points - amount,
                });
            }

            warn!(user_id = %user.id, attempt, "points balance moved during spend, retrying");
            user = self
                .user_repo
                .find_by_id(user.id)
                .await?
                .ok_or(PointsError::UserNotFound)?;
        }

        Err(PointsError::Conflict)
    }

    /// Atomic credit of the total and the matching bucket column, plus one
    /// journal row. Used for engagement bonuses and manual adjustments.
    pub async fn add_points(
        &self,
        user_id: Uuid,
        amount: i32,
        action: PointsAction,
        bucket: PointsType,
        description: Option<String>,
    ) -> UseCaseResult<PointsDetailDto> {
        if amount <= 0 {
            return Err(PointsError::InvalidAmount(
                "points must be a positive number".to_string(),
            ));
        }

        let rows = self.user_repo.credit_points(user_id, amount, bucket).await?;
        if rows == 0 {
            return Err(PointsError::UserNotFound);
        }

        self.points_history_repo
            .insert_entry(InsertPointsHistoryEntity {
                user_id,
                points: amount,
                points_type: bucket.to_string(),
                action: action.to_string(),
                description: description
                    .unwrap_or_else(|| action.default_description().to_string()),
            })
            .await?;

        let user = self
            .user_repo
            .find_by_id(user_id)
            .await?
            .ok_or(PointsError::UserNotFound)?;

        Ok(to_points_detail(&user))
    }

    pub async fn get_history(
        &self,
        user_id: Uuid,
        page: Option<i64>,
        limit: Option<i64>,
    ) -> UseCaseResult<PointsHistoryPageDto> {
        let page = page.unwrap_or(1).max(1);
        let limit = limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .clamp(1, MAX_HISTORY_LIMIT);
        let offset = (page - 1) * limit;

        let total_items = self.points_history_repo.count_by_user(user_id).await?;
        let entries = self
            .points_history_repo
            .list_by_user(user_id, limit, offset)
            .await?;

        let total_pages = if total_items == 0 {
            0
        } else {
            (total_items + limit - 1) / limit
        };

        let history = entries
            .into_iter()
            .map(|entry| PointsHistoryItemDto {
                id: entry.id,
                points: entry.points,
                points_type: entry.points_type,
                action: entry.action,
                description: entry.description,
                created_at: entry.created_at,
            })
            .collect();

        Ok(PointsHistoryPageDto {
            history,
            pagination: PaginationDto {
                current_page: page,
                total_pages,
                total_items,
                items_per_page: limit,
                has_next_page: page < total_pages,
                has_previous_page: page > 1,
            },
        })
    }
}

fn to_points_detail(user: &UserEntity) -> PointsDetailDto {
    PointsDetailDto {
        total_points: user.points,
        purchased_points: user.purchased_points,
        gifted_points: user.gifted_points,
        subscription_status: SubscriptionStatus::from_str(&user.subscription_status),
        subscription_plan: user
            .subscription_plan
            .as_deref()
            .and_then(SubscriptionPlan::from_str),
        subscription_current_period_end: user.subscription_current_period_end,
    }
}
