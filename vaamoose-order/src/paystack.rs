use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::Sha512;
use std::time::Duration;
use vaamoose_core::payment::{GatewayInit, GatewayInitRequest, GatewayVerification, PaymentGateway};
use vaamoose_core::{CoreError, CoreResult};

type HmacSha512 = Hmac<Sha512>;

/// Naira → kobo.
const KOBO_PER_NAIRA: i64 = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaystackConfig {
    pub secret_key: String,
    pub base_url: String,
    pub timeout_seconds: u64,
}

impl Default for PaystackConfig {
    fn default() -> Self {
        Self {
            secret_key: String::new(),
            base_url: "https://api.paystack.co".to_string(),
            timeout_seconds: 15,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PaystackError {
    #[error("Paystack request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Paystack rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("Paystack response missing data: {0}")]
    MissingData(String),
}

impl PaystackError {
    /// Network faults and Paystack 5xx, as opposed to an answer about the transaction.
    pub fn is_unavailable(&self) -> bool {
        match self {
            PaystackError::Transport(_) => true,
            PaystackError::Rejected { status, .. } => *status >= 500,
            PaystackError::MissingData(_) => false,
        }
    }
}

impl From<PaystackError> for CoreError {
    fn from(err: PaystackError) -> Self {
        if err.is_unavailable() {
            CoreError::GatewayUnavailable(err.to_string())
        } else {
            CoreError::PaymentError(err.to_string())
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: bool,
    message: String,
    data: Option<T>,
}

#[derive(Debug, Serialize)]
struct InitializeBody<'a> {
    email: &'a str,
    /// Kobo.
    amount: i64,
    reference: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    callback_url: Option<&'a str>,
    metadata: &'a serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct InitializeData {
    authorization_url: String,
    access_code: Option<String>,
    reference: String,
}

#[derive(Debug, Deserialize)]
struct VerifyData {
    id: Option<i64>,
    status: String,
    reference: String,
    /// Kobo.
    amount: i64,
    customer: Option<Customer>,
    #[serde(default)]
    metadata: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct Customer {
    email: Option<String>,
}

/// Paystack transaction API client.
pub struct PaystackGateway {
    http: reqwest::Client,
    config: PaystackConfig,
}

impl PaystackGateway {
    pub fn new(config: PaystackConfig) -> Result<Self, PaystackError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self { http, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn read<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, PaystackError> {
        let status = response.status();
        if status.is_server_error() {
            return Err(PaystackError::Rejected {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("server error").to_string(),
            });
        }
        let envelope: Envelope<T> = response.json().await?;
        if !status.is_success() || !envelope.status {
            return Err(PaystackError::Rejected {
                status: status.as_u16(),
                message: envelope.message,
            });
        }
        envelope.data.ok_or(PaystackError::MissingData(envelope.message))
    }
}

#[async_trait]
impl PaymentGateway for PaystackGateway {
    async fn initialize(&self, request: &GatewayInitRequest) -> CoreResult<GatewayInit> {
        let body = InitializeBody {
            email: &request.email,
            amount: request.amount * KOBO_PER_NAIRA,
            reference: &request.reference,
            callback_url: request.callback_url.as_deref(),
            metadata: &request.metadata,
        };

        let response = self
            .http
            .post(self.url("transaction/initialize"))
            .bearer_auth(&self.config.secret_key)
            .json(&body)
            .send()
            .await
            .map_err(PaystackError::from)?;
        let data: InitializeData = Self::read(response).await?;

        tracing::debug!(reference = %data.reference, "Paystack transaction initialized");
        Ok(GatewayInit {
            authorization_url: data.authorization_url,
            reference: data.reference,
            access_code: data.access_code,
        })
    }

    async fn verify(&self, reference: &str) -> CoreResult<GatewayVerification> {
        let response = self
            .http
            .get(self.url(&format!("transaction/verify/{}", reference)))
            .bearer_auth(&self.config.secret_key)
            .send()
            .await
            .map_err(PaystackError::from)?;
        let data: VerifyData = Self::read(response).await?;

        tracing::debug!(%reference, status = %data.status, "Paystack transaction verified");
        Ok(GatewayVerification {
            reference: data.reference,
            status: data.status,
            // partial naira rounds down, so an underpayment never matches
            amount: data.amount.div_euclid(KOBO_PER_NAIRA),
            customer_email: data.customer.and_then(|c| c.email),
            external_id: data.id.map(|id| id.to_string()),
            metadata: data.metadata,
        })
    }
}

/// Checks `x-paystack-signature`: hex HMAC-SHA512 of the raw body keyed by the secret key.
pub fn verify_signature(secret_key: &str, body: &[u8], signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha512::new_from_slice(secret_key.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

pub fn sign(secret_key: &str, body: &[u8]) -> CoreResult<String> {
    let mut mac = HmacSha512::new_from_slice(secret_key.as_bytes()).map_err(CoreError::internal)?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub event: String,
    pub data: WebhookData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookData {
    pub reference: String,
    #[serde(default)]
    pub status: Option<String>,
}

impl WebhookEvent {
    pub fn parse(body: &[u8]) -> CoreResult<Self> {
        serde_json::from_slice(body)
            .map_err(|e| CoreError::ValidationError(format!("malformed webhook payload: {}", e)))
    }

    /// Charge events settle or fail a transaction; everything else is acknowledged and ignored.
    pub fn is_charge(&self) -> bool {
        self.event.starts_with("charge.")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_roundtrip_and_tamper() {
        let body = br#"{"event":"charge.success","data":{"reference":"VMS-1"}}"#;
        let signature = sign("sk_test_secret", body).unwrap();

        assert!(verify_signature("sk_test_secret", body, &signature));
        assert!(!verify_signature("sk_other", body, &signature));
        assert!(!verify_signature("sk_test_secret", b"{}", &signature));
        assert!(!verify_signature("sk_test_secret", body, "not-hex"));
    }

    #[test]
    fn test_webhook_parse() {
        let body = br#"{"event":"charge.success","data":{"reference":"VMS-1","status":"success","amount":525000}}"#;
        let event = WebhookEvent::parse(body).unwrap();
        assert!(event.is_charge());
        assert_eq!(event.data.reference, "VMS-1");

        assert!(WebhookEvent::parse(b"[]").is_err());
    }

    #[test]
    fn test_only_outages_map_to_unavailable() {
        let not_found = PaystackError::Rejected { status: 400, message: "Transaction reference not found".into() };
        assert!(matches!(CoreError::from(not_found), CoreError::PaymentError(_)));

        let outage = PaystackError::Rejected { status: 503, message: "Service Unavailable".into() };
        assert!(matches!(CoreError::from(outage), CoreError::GatewayUnavailable(_)));

        let missing = PaystackError::MissingData("no data".into());
        assert!(matches!(CoreError::from(missing), CoreError::PaymentError(_)));
    }

    #[test]
    fn test_verify_payload_decodes_kobo() {
        let raw = r#"{"status":true,"message":"Verification successful","data":{
            "id": 4099260516, "status": "success", "reference": "VMS-1", "amount": 525000,
            "customer": {"email": "ada@uni.edu.ng"}, "metadata": ""}}"#;
        let envelope: Envelope<VerifyData> = serde_json::from_str(raw).unwrap();
        let data = envelope.data.unwrap();
        assert_eq!(data.amount.div_euclid(KOBO_PER_NAIRA), 5250);
        assert_eq!(data.customer.and_then(|c| c.email).as_deref(), Some("ada@uni.edu.ng"));
    }
}
