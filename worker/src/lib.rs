pub mod config;
pub mod reconciliation;
