use super::money::{Amount, Balance};
use super::token::Receiver;
use super::transfer::SendMoneyRequest;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Body of a token generation request.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct TokenRequest {
    pub amount: Option<Amount>,
    pub message: Option<String>,
}

/// Token as issued by the gateway, before the client checks it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IssuedToken {
    pub token_id: String,
    #[serde(default)]
    pub receiver: Option<Receiver>,
    #[serde(default)]
    pub amount: Option<Amount>,
    #[serde(default)]
    pub message: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub signature: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TransferConfirmation {
    #[serde(rename = "transaction_id")]
    pub transaction_reference: String,
}

/// Remote payment service.
///
/// Every method distinguishes an application-level rejection
/// (`PaymentError::Gateway`) from a missing answer (`PaymentError::Transport`).
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_token(&self, request: &TokenRequest) -> Result<IssuedToken>;
    /// `Ok(())` means the gateway vouches for the payload and signature.
    async fn validate_token(&self, payload: &str, signature: &str) -> Result<()>;
    /// Executes the transfer on the rail named by `request.channel`.
    async fn transfer(&self, request: &SendMoneyRequest) -> Result<TransferConfirmation>;
    /// Pays the receiver named in a scanned code. `request` carries the
    /// amount, PIN and note; its destination is the code's receiver.
    async fn pay_token(
        &self,
        payload: &str,
        request: &SendMoneyRequest,
    ) -> Result<TransferConfirmation>;
    async fn get_balance(&self) -> Result<Balance>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub type SharedGateway = Arc<dyn PaymentGateway>;
pub type SharedClock = Arc<dyn Clock>;
