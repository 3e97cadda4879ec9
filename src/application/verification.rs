use super::dispatcher::settle;
use crate::domain::money::Amount;
use crate::domain::ports::{SharedClock, SharedGateway};
use crate::domain::transfer::{Channel, Destination, Pin, SendMoneyRequest, SendMoneyResult};
use crate::error::{PaymentError, Result, ValidationError};
use crate::interfaces::json::payload::{PaymentPayload, PayloadOrigin, decode_payload};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Verdict on a scanned payment code.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "verdict", rename_all = "lowercase")]
pub enum Verification {
    /// Issued and signed by the gateway, confirmed online.
    Verified(PaymentPayload),
    /// Readable but not confirmed. Must not be treated as payment-authorized.
    Unverified {
        payload: PaymentPayload,
        reason: String,
    },
    Rejected {
        reason: String,
    },
}

impl Verification {
    pub fn is_verified(&self) -> bool {
        matches!(self, Verification::Verified(_))
    }
}

/// Scanner side of a payment code: check it, then pay it.
pub struct TokenVerifier {
    gateway: SharedGateway,
    clock: SharedClock,
    timeout: Duration,
}

impl TokenVerifier {
    /// Creates a verifier. Gateway calls are abandoned after `timeout`.
    pub fn new(gateway: SharedGateway, clock: SharedClock, timeout: Duration) -> Self {
        Self {
            gateway,
            clock,
            timeout,
        }
    }

    /// Only malformed input is an `Err`; every well-formed code gets a verdict.
    pub async fn verify(&self, raw: &str) -> Result<Verification> {
        let payload = decode_payload(raw)?;

        if payload.is_expired(self.clock.now()) {
            debug!(token_id = %payload.token_id, "scanned token has expired");
            return Ok(Verification::Rejected {
                reason: "token expired".into(),
            });
        }

        let signature = match (payload.origin, payload.signature.clone()) {
            (PayloadOrigin::Gateway, Some(signature)) => signature,
            _ => {
                return Ok(Verification::Unverified {
                    payload,
                    reason: "generated offline, not signed by the gateway".into(),
                });
            }
        };

        let answer = tokio::time::timeout(
            self.timeout,
            self.gateway.validate_token(raw.trim(), &signature),
        )
        .await
        .unwrap_or(Err(PaymentError::Timeout(self.timeout)));

        match answer {
            Ok(()) => Ok(Verification::Verified(payload)),
            Err(err) if err.is_transport() => {
                warn!(token_id = %payload.token_id, error = %err, "could not reach gateway to verify token");
                Ok(Verification::Unverified {
                    payload,
                    reason: err.to_string(),
                })
            }
            Err(err) => {
                debug!(token_id = %payload.token_id, error = %err, "gateway rejected token");
                Ok(Verification::Rejected {
                    reason: err.to_string(),
                })
            }
        }
    }

    /// Pays a scanned code from the wallet.
    ///
    /// A code with a fixed amount is paid that amount; `amount` may repeat it
    /// but not change it. An open code needs `amount`. Only codes the gateway
    /// vouches for are paid. Form errors and unpayable codes are `Err`; a
    /// payment the gateway refuses is a `Failure` result.
    pub async fn pay(
        &self,
        raw: &str,
        amount: Option<Amount>,
        pin: Pin,
        note: Option<String>,
    ) -> Result<SendMoneyResult> {
        let payload = decode_payload(raw)?;
        let amount = match (payload.amount, amount) {
            (Some(fixed), Some(offered)) if fixed != offered => {
                return Err(PaymentError::InvalidState(
                    "payment code asks for a fixed amount",
                ));
            }
            (Some(fixed), _) => fixed,
            (None, Some(offered)) => offered,
            (None, None) => return Err(ValidationError::InvalidAmount.into()),
        };
        if !pin.is_complete() {
            return Err(ValidationError::MissingPin.into());
        }

        match self.verify(raw).await? {
            Verification::Verified(_) => {}
            Verification::Unverified { reason, .. } => {
                debug!(token_id = %payload.token_id, %reason, "refusing to pay an unverified code");
                return Err(PaymentError::InvalidState(
                    "payment code could not be verified",
                ));
            }
            Verification::Rejected { reason } => {
                return Err(PaymentError::gateway("QR_REJECTED", reason));
            }
        }

        let request = SendMoneyRequest {
            channel: Channel::Wallet,
            destination: Destination::Phone {
                phone: payload.recipient.identifier.clone(),
            },
            amount,
            note: note.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
            pin,
        };
        info!(token_id = %payload.token_id, amount = %request.amount, "paying scanned code");
        let answer = tokio::time::timeout(
            self.timeout,
            self.gateway.pay_token(raw.trim(), &request),
        )
        .await
        .unwrap_or(Err(PaymentError::Timeout(self.timeout)));
        Ok(settle(request, answer))
    }
}
