use anyhow::{Ok, Result};

use super::config_model::{Database, DotEnvyConfig, Reconciliation, Stripe};

pub fn load() -> Result<DotEnvyConfig> {
    dotenvy::dotenv().ok();

    let database = Database {
        url: std::env::var("DATABASE_URL").expect("DATABASE_URL is invalid"),
    };

    let stripe = Stripe {
        secret_key: std::env::var("STRIPE_SECRET_KEY").expect("STRIPE_SECRET_KEY is invalid"),
        webhook_secret: std::env::var("STRIPE_WEBHOOK_SECRET")
            .expect("STRIPE_WEBHOOK_SECRET is invalid"),
    };

    let reconciliation = Reconciliation {
        poll_interval_secs: std::env::var("WORKER_POLL_INTERVAL")
            .unwrap_or_else(|_| "5".to_string())
            .parse()?,
        max_attempts: std::env::var("WORKER_MAX_ATTEMPTS")
            .unwrap_or_else(|_| "5".to_string())
            .parse()?,
    };

    Ok(DotEnvyConfig {
        database,
        stripe,
        reconciliation,
    })
}
