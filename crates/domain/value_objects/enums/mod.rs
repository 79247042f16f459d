pub mod payment_statuses;
pub mod payment_types;
pub mod points_actions;
pub mod points_types;
pub mod subscription_plans;
pub mod subscription_statuses;
pub mod webhook_event_statuses;
