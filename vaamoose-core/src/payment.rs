use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::booking::{Booking, BookingDraft};
use crate::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentStatus {
    Initialized,
    Succeeded,
    Failed,
}

impl IntentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentStatus::Initialized => "initialized",
            IntentStatus::Succeeded => "succeeded",
            IntentStatus::Failed => "failed",
        }
    }
}

impl FromStr for IntentStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initialized" => Ok(IntentStatus::Initialized),
            "succeeded" => Ok(IntentStatus::Succeeded),
            "failed" => Ok(IntentStatus::Failed),
            other => Err(CoreError::InternalError(format!("unknown intent status '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntent {
    /// Our reference, also sent to the gateway. Join key between the two systems.
    pub reference: String,
    pub session_id: Uuid,
    pub user_id: String,
    pub customer_email: String,
    /// Naira.
    pub amount: i64,
    pub status: IntentStatus,
    pub external_reference: Option<String>,
    pub authorization_url: Option<String>,
    pub draft: BookingDraft,
    pub booking_id: Option<Uuid>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentIntent {
    pub fn new_reference() -> String {
        format!("VMS-{}", Uuid::new_v4().simple())
    }

    pub fn initialized(
        session_id: Uuid,
        user_id: &str,
        customer_email: &str,
        draft: BookingDraft,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            reference: Self::new_reference(),
            session_id,
            user_id: user_id.to_string(),
            customer_email: customer_email.to_string(),
            amount: draft.total_price,
            status: IntentStatus::Initialized,
            external_reference: None,
            authorization_url: None,
            draft,
            booking_id: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == IntentStatus::Initialized
    }
}

/// Outcome of a successful `verify`.
#[derive(Debug, Clone, Serialize)]
pub struct VerifiedPayment {
    pub reference: String,
    pub booking: Booking,
    /// True when the reference had already been settled by an earlier call.
    pub replayed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct GatewayInitRequest {
    pub reference: String,
    pub email: String,
    /// Naira; gateway clients convert to their minor unit.
    pub amount: i64,
    pub callback_url: Option<String>,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayInit {
    pub authorization_url: String,
    pub reference: String,
    pub access_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayVerification {
    pub reference: String,
    /// Raw gateway status ("success", "failed", "abandoned", "ongoing", ...).
    pub status: String,
    /// Naira.
    pub amount: i64,
    pub customer_email: Option<String>,
    pub external_id: Option<String>,
    pub metadata: serde_json::Value,
}

impl GatewayVerification {
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }

    /// Statuses that mean the customer may still complete the payment.
    pub fn is_in_flight(&self) -> bool {
        matches!(self.status.as_str(), "ongoing" | "pending" | "processing" | "queued")
    }
}

/// External payment gateway (Paystack in production).
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn initialize(&self, request: &GatewayInitRequest) -> CoreResult<GatewayInit>;

    async fn verify(&self, reference: &str) -> CoreResult<GatewayVerification>;
}
