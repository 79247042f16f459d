#[derive(Debug, Clone)]
pub struct DotEnvyConfig {
    pub database: Database,
    pub stripe: Stripe,
    pub reconciliation: Reconciliation,
}

#[derive(Debug, Clone)]
pub struct Database {
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct Stripe {
    pub secret_key: String,
    pub webhook_secret: String,
}

#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub poll_interval_secs: u64,
    pub max_attempts: i32,
}
