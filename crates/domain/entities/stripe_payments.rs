use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::infra::db::postgres::schema::stripe_payments;

/// Payment audit record, one per successful charge. The unique constraints on
/// `checkout_session_id` and `payment_intent_id` are what de-duplicates
/// redelivered webhook events.
#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = stripe_payments)]
pub struct StripePaymentEntity {
    pub id: Uuid,
    pub user_id: Uuid,
    pub stripe_customer_id: Option<String>,
    pub payment_intent_id: Option<String>,
    pub checkout_session_id: Option<String>,
    pub subscription_id: Option<String>,
    pub payment_status: String,
    pub payment_type: String,
    pub amount_minor: i64,
    pub currency: String,
    pub points_amount: Option<i32>,
    pub points_type: Option<String>,
    pub subscription_plan: Option<String>,
    pub period_start: Option<DateTime<Utc>>,
    pub period_end: Option<DateTime<Utc>>,
    pub product_name: Option<String>,
    pub webhook_event_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = stripe_payments)]
pub struct InsertStripePaymentEntity {
    pub user_id: Uuid,
    pub stripe_customer_id: Option<String>,
    pub payment_intent_id: Option<String>,
    pub checkout_session_id: Option<String>,
    pub subscription_id: Option<String>,
    pub payment_status: String,
    pub payment_type: String,
    pub amount_minor: i64,
    pub currency: String,
    pub points_amount: Option<i32>,
    pub points_type: Option<String>,
    pub subscription_plan: Option<String>,
    pub period_start: Option<DateTime<Utc>>,
    pub period_end: Option<DateTime<Utc>>,
    pub product_name: Option<String>,
    pub webhook_event_id: Option<String>,
}
