use std::time::Duration;
use thiserror::Error;

/// Client-side rejection of a send-money draft. Never reaches the gateway.
///
/// Variants are listed in the order the draft is checked; the first failure wins.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Please enter a valid amount")]
    InvalidAmount,
    #[error("Please enter your PIN")]
    MissingPin,
    #[error("Please enter a phone number")]
    MissingPhone,
    #[error("Please fill in bank details")]
    MissingBankDetails,
}

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Application-level rejection returned by the gateway.
    #[error("Gateway rejected request ({reason_code}): {message}")]
    Gateway { reason_code: String, message: String },
    /// No usable response: connection failure, malformed body.
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Gateway did not answer within {0:?}")]
    Timeout(Duration),
    #[error("Invalid state: {0}")]
    InvalidState(&'static str),
    #[error("Payload error: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("Not a payment payload: {0}")]
    InvalidPayload(&'static str),
    #[error("Configuration error: {0}")]
    Config(String),
}

impl PaymentError {
    /// Creates a new gateway rejection.
    pub fn gateway(reason_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Gateway {
            reason_code: reason_code.into(),
            message: message.into(),
        }
    }

    /// True when the gateway never produced an answer.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout(_))
    }
}

impl From<reqwest::Error> for PaymentError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PaymentError>;
