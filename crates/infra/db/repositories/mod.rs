pub mod points_history;
pub mod stripe_payments;
pub mod users;
pub mod webhook_events;
