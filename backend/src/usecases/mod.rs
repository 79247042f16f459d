pub mod accounts;
pub mod points;
pub mod reconciliation;
pub mod stripe_webhook;
