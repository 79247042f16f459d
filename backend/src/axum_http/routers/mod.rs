pub mod points;
pub mod stripe_webhook;
pub mod subscriptions;
pub mod users;
