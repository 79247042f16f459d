use std::collections::HashMap;

use anyhow::Result;
use hmac::{Hmac, Mac};
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use sha2::Sha256;
use tracing::error;

type HmacSha256 = Hmac<Sha256>;

/// Maximum accepted age of the `t=` timestamp in a signature header, matching
/// Stripe's own default tolerance.
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Minimal Stripe client built on reqwest. Only covers what reconciliation
/// needs: webhook signature verification and subscription retrieval.
pub struct StripeClient {
    http: reqwest::Client,
    secret_key: String,
    webhook_secret: String,
}

#[derive(Debug, Deserialize)]
pub struct StripeEvent {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub type_: String,
    pub created: Option<i64>,
    pub livemode: Option<bool>,
    pub data: StripeEventData,
}

#[derive(Debug, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct StripeCheckoutSession {
    pub id: Option<String>,
    pub mode: Option<String>,
    pub subscription: Option<String>,
    pub customer: Option<String>,
    pub customer_details: Option<StripeCustomerDetails>,
    pub payment_intent: Option<String>,
    pub amount_total: Option<i64>,
    pub currency: Option<String>,
    pub metadata: Option<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
pub struct StripeCustomerDetails {
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StripeCustomer {
    pub id: String,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StripePaymentIntent {
    pub id: Option<String>,
    pub customer: Option<String>,
    pub amount: Option<i64>,
    pub currency: Option<String>,
    pub metadata: Option<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
pub struct StripeInvoice {
    pub id: Option<String>,
    pub customer: Option<String>,
}

/// Shape shared by the subscription object embedded in webhook events and
/// the one returned by the retrieve endpoint.
#[derive(Debug, Deserialize)]
pub struct StripeSubscription {
    pub id: Option<String>,
    pub customer: Option<String>,
    pub status: Option<String>,
    pub created: Option<i64>,
    pub current_period_end: Option<i64>,
    #[serde(default)]
    pub items: StripeSubscriptionItems,
}

#[derive(Debug, Deserialize, Default)]
pub struct StripeSubscriptionItems {
    pub data: Vec<StripeSubscriptionItem>,
}

#[derive(Debug, Deserialize)]
pub struct StripeSubscriptionItem {
    pub current_period_end: Option<i64>,
}

impl StripeSubscription {
    /// Returns the subscription period end timestamp, falling back to the
    /// first item when the top-level field is absent.
    pub fn period_end(&self) -> Option<i64> {
        self.current_period_end.or_else(|| {
            self.items
                .data
                .first()
                .and_then(|item| item.current_period_end)
        })
    }
}

#[derive(Debug, Deserialize)]
struct StripeErrorEnvelope {
    error: StripeErrorDetails,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetails {
    #[serde(rename = "type")]
    type_: Option<String>,
    code: Option<String>,
    message: Option<String>,
    param: Option<String>,
}

impl StripeClient {
    pub fn new(secret_key: String, webhook_secret: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            secret_key,
            webhook_secret,
        }
    }

    async fn ensure_success(resp: reqwest::Response, context: &str) -> Result<reqwest::Response> {
        if resp.status().is_success() {
            return Ok(resp);
        }

        let status = resp.status();
        let request_id = resp
            .headers()
            .get("request-id")
            .or_else(|| resp.headers().get("stripe-request-id"))
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());

        let body = match resp.text().await {
            Ok(text) if !text.is_empty() => text,
            Ok(_) => "<empty response body>".to_string(),
            Err(err) => format!("<failed to read response body: {err}>"),
        };

        let (stripe_error_type, stripe_error_code, stripe_error_param, stripe_error_message) =
            match serde_json::from_str::<StripeErrorEnvelope>(&body) {
                Ok(envelope) => {
                    let details = envelope.error;
                    (details.type_, details.code, details.param, details.message)
                }
                Err(_) => (None, None, None, None),
            };

        error!(
            status = %status,
            stripe_request_id = ?request_id,
            stripe_error_type = ?stripe_error_type,
            stripe_error_code = ?stripe_error_code,
            stripe_error_param = ?stripe_error_param,
            stripe_error_message = ?stripe_error_message,
            response_body = %body,
            context = %context,
            "stripe api request failed"
        );

        anyhow::bail!(
            "Stripe API request failed: {} (status {}, request_id={:?})",
            context,
            status,
            request_id
        );
    }

    /// Verifies the webhook signature. https://stripe.com/docs/webhooks/signatures
    pub fn verify_webhook_signature(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<StripeEvent> {
        let mut timestamp: Option<String> = None;
        let mut signature: Option<String> = None;

        for part in signature_header.split(',') {
            if let Some(rest) = part.strip_prefix("t=") {
                timestamp = Some(rest.to_string());
            } else if let Some(rest) = part.strip_prefix("v1=") {
                signature = Some(rest.to_string());
            }
        }

        let timestamp =
            timestamp.ok_or_else(|| anyhow::anyhow!("missing timestamp in stripe-signature"))?;
        let signature =
            signature.ok_or_else(|| anyhow::anyhow!("missing v1 in stripe-signature"))?;

        let timestamp: i64 = timestamp
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid timestamp in stripe-signature"))?;
        if (chrono::Utc::now().timestamp() - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
            anyhow::bail!("stripe-signature timestamp outside tolerance");
        }

        let signed_payload = format!("{}.{}", timestamp, String::from_utf8_lossy(payload));
        let mut mac = HmacSha256::new_from_slice(self.webhook_secret.as_bytes())?;
        mac.update(signed_payload.as_bytes());
        let provided = hex::decode(signature)?;

        // Constant-time comparison.
        mac.verify_slice(&provided)
            .map_err(|_| anyhow::anyhow!("invalid webhook signature"))?;

        let event: StripeEvent = serde_json::from_slice(payload)?;
        Ok(event)
    }

    pub fn extract_checkout_session(object: &serde_json::Value) -> Option<StripeCheckoutSession> {
        serde_json::from_value(object.clone()).ok()
    }

    pub fn extract_payment_intent(object: &serde_json::Value) -> Option<StripePaymentIntent> {
        serde_json::from_value(object.clone()).ok()
    }

    pub fn extract_subscription(object: &serde_json::Value) -> Option<StripeSubscription> {
        serde_json::from_value(object.clone()).ok()
    }

    pub fn extract_invoice(object: &serde_json::Value) -> Option<StripeInvoice> {
        serde_json::from_value(object.clone()).ok()
    }

    pub async fn retrieve_customer(&self, customer_id: &str) -> Result<StripeCustomer> {
        // https://stripe.com/docs/api/customers/retrieve
        let resp = self
            .http
            .get(format!(
                "https://api.stripe.com/v1/customers/{}",
                customer_id
            ))
            .header(AUTHORIZATION, format!("Bearer {}", self.secret_key))
            .send()
            .await?;
        let resp = Self::ensure_success(resp, "retrieve customer").await?;

        let customer: StripeCustomer = resp.json().await?;
        Ok(customer)
    }

    pub async fn retrieve_subscription(&self, subscription_id: &str) -> Result<StripeSubscription> {
        // https://stripe.com/docs/api/subscriptions/retrieve
        let resp = self
            .http
            .get(format!(
                "https://api.stripe.com/v1/subscriptions/{}",
                subscription_id
            ))
            .header(AUTHORIZATION, format!("Bearer {}", self.secret_key))
            .send()
            .await?;
        let resp = Self::ensure_success(resp, "retrieve subscription").await?;

        let subscription: StripeSubscription = resp.json().await?;
        Ok(subscription)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sign(secret: &str, timestamp: &str, payload: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{}.{}", timestamp, payload).as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn accepts_valid_signature_and_parses_event() {
        let client = StripeClient::new("sk_test_x".to_string(), "whsec_test".to_string());
        let payload = r#"{"id":"evt_1","type":"invoice.payment_failed","data":{"object":{"id":"in_1","customer":"cus_1"}}}"#;
        let timestamp = Utc::now().timestamp().to_string();
        let header = format!("t={timestamp},v1={}", sign("whsec_test", &timestamp, payload));

        let event = client
            .verify_webhook_signature(payload.as_bytes(), &header)
            .unwrap();

        assert_eq!(event.type_, "invoice.payment_failed");
        let invoice = StripeClient::extract_invoice(&event.data.object).unwrap();
        assert_eq!(invoice.customer.as_deref(), Some("cus_1"));
    }

    #[test]
    fn rejects_tampered_payload() {
        let client = StripeClient::new("sk_test_x".to_string(), "whsec_test".to_string());
        let payload = r#"{"id":"evt_1","type":"x","data":{"object":{}}}"#;
        let timestamp = Utc::now().timestamp().to_string();
        let header = format!("t={timestamp},v1={}", sign("whsec_test", &timestamp, payload));

        let tampered = r#"{"id":"evt_2","type":"x","data":{"object":{}}}"#;
        let result = client.verify_webhook_signature(tampered.as_bytes(), &header);

        assert!(result.is_err());
    }

    #[test]
    fn rejects_header_without_v1() {
        let client = StripeClient::new("sk_test_x".to_string(), "whsec_test".to_string());
        let result = client.verify_webhook_signature(b"{}", "t=1700000000");

        assert!(result.is_err());
    }

    #[test]
    fn rejects_stale_timestamp() {
        let client = StripeClient::new("sk_test_x".to_string(), "whsec_test".to_string());
        let payload = r#"{"id":"evt_1","type":"x","data":{"object":{}}}"#;
        let stale = (Utc::now().timestamp() - SIGNATURE_TOLERANCE_SECS - 60).to_string();
        let header = format!("t={stale},v1={}", sign("whsec_test", &stale, payload));

        let result = client.verify_webhook_signature(payload.as_bytes(), &header);

        assert!(result.is_err());
    }

    #[test]
    fn period_end_falls_back_to_first_item() {
        let subscription: StripeSubscription = serde_json::from_str(
            r#"{"id":"sub_1","items":{"data":[{"current_period_end":1700003600}]}}"#,
        )
        .unwrap();

        assert_eq!(subscription.period_end(), Some(1700003600));
    }
}
