use crate::domain::money::Amount;
use crate::domain::token::{PaymentToken, Receiver, TokenId, TokenOrigin};
use crate::error::{PaymentError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const PAYLOAD_TYPE: &str = "bluepay";
const PAYLOAD_ACTION: &str = "payment";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadOrigin {
    Gateway,
    Fallback,
}

/// What a scannable code contains.
///
/// Field order is the serialization order, so encoding the same token twice
/// yields the same bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentPayload {
    #[serde(rename = "type")]
    pub kind: String,
    pub action: String,
    pub token_id: TokenId,
    pub recipient: Receiver,
    pub amount: Option<Amount>,
    pub message: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub origin: PayloadOrigin,
    pub signature: Option<String>,
}

impl PaymentPayload {
    /// Builds the payload a receiver displays for `token`.
    pub fn from_token(token: &PaymentToken) -> Self {
        let origin = match token.origin() {
            TokenOrigin::Gateway { .. } => PayloadOrigin::Gateway,
            TokenOrigin::Fallback => PayloadOrigin::Fallback,
        };
        Self {
            kind: PAYLOAD_TYPE.to_string(),
            action: PAYLOAD_ACTION.to_string(),
            token_id: token.token_id().clone(),
            recipient: token.receiver().clone(),
            amount: token.requested_amount(),
            message: token.message().map(str::to_string),
            issued_at: token.issued_at(),
            expires_at: token.expires_at(),
            origin,
            signature: token.signature().map(str::to_string),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Compact JSON for rendering as a scannable image or copying.
pub fn encode_payload(token: &PaymentToken) -> Result<String> {
    Ok(serde_json::to_string(&PaymentPayload::from_token(token))?)
}

/// Parses a scanned code and checks it is a well-formed payment request.
pub fn decode_payload(raw: &str) -> Result<PaymentPayload> {
    let payload: PaymentPayload = serde_json::from_str(raw.trim())?;
    if payload.kind != PAYLOAD_TYPE || payload.action != PAYLOAD_ACTION {
        return Err(PaymentError::InvalidPayload("unknown type or action"));
    }
    let signed = payload
        .signature
        .as_deref()
        .is_some_and(|s| !s.trim().is_empty());
    match (payload.origin, signed) {
        (PayloadOrigin::Gateway, false) => {
            Err(PaymentError::InvalidPayload("gateway token without signature"))
        }
        (PayloadOrigin::Fallback, true) => {
            Err(PaymentError::InvalidPayload("fallback token carrying a signature"))
        }
        _ => Ok(payload),
    }
}
