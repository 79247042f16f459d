pub mod enums;
pub mod points;
pub mod subscriptions;
