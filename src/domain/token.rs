use super::money::Amount;
use super::ports::{IssuedToken, TokenRequest};
use crate::error::{PaymentError, Result};
use chrono::{DateTime, TimeDelta, Utc};
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Opaque reference for one token generation. Doubles as the idempotency key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenId(String);

impl TokenId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Local id for a token the gateway never saw: time plus a random suffix.
    pub fn synthesize(now: DateTime<Utc>) -> Self {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(8)
            .map(char::from)
            .collect();
        Self(format!("local-{}-{}", now.timestamp_millis(), suffix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Receive identity of the logged-in user. Supplied by the session, never
/// modified here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receiver {
    /// Phone number or account id.
    #[serde(rename = "phone")]
    pub identifier: String,
    #[serde(rename = "name")]
    pub display_name: String,
}

impl Receiver {
    /// Creates a new receiver.
    pub fn new(identifier: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            display_name: display_name.into(),
        }
    }
}

/// Gateway-issued signature. Never empty.
#[derive(Clone, PartialEq, Eq)]
pub struct Signature(String);

impl Signature {
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            None
        } else {
            Some(Self(value))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Signature(..)")
    }
}

/// Trust provenance of a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenOrigin {
    /// Signed by the gateway.
    Gateway { signature: Signature },
    /// Built locally because the gateway could not be reached. Unverified:
    /// a payer must re-validate online before treating it as authorized.
    Fallback,
}

impl TokenOrigin {
    pub fn signature(&self) -> Option<&Signature> {
        match self {
            TokenOrigin::Gateway { signature } => Some(signature),
            TokenOrigin::Fallback => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TokenOrigin::Gateway { .. } => "gateway",
            TokenOrigin::Fallback => "fallback",
        }
    }
}

/// Countdown shown next to the scannable code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TimeRemaining {
    Expired,
    Remaining(Duration),
}

impl TimeRemaining {
    pub fn is_expired(&self) -> bool {
        matches!(self, TimeRemaining::Expired)
    }
}

impl fmt::Display for TimeRemaining {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeRemaining::Expired => f.write_str("expired"),
            TimeRemaining::Remaining(left) => {
                let secs = left.as_secs();
                write!(f, "{}:{:02}", secs / 60, secs % 60)
            }
        }
    }
}

/// A signed (or fallback) request-to-pay.
///
/// Tokens are immutable: an amount change or an expiry always produces a new
/// value, so a rendered code never changes under the user's feet.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentToken {
    token_id: TokenId,
    receiver: Receiver,
    requested_amount: Option<Amount>,
    message: Option<String>,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    origin: TokenOrigin,
}

impl PaymentToken {
    /// Builds a token from a gateway answer to `request`.
    ///
    /// A missing signature, an inverted validity window or an echo that
    /// contradicts the request is treated as a failed generation. Fields the
    /// gateway leaves out are taken from the request.
    pub fn from_gateway(
        issued: IssuedToken,
        request: &TokenRequest,
        session: &Receiver,
    ) -> Result<Self> {
        let signature = issued
            .signature
            .and_then(Signature::new)
            .ok_or_else(|| PaymentError::gateway("UNSIGNED_TOKEN", "Gateway returned an unsigned token"))?;
        if issued.expires_at <= issued.issued_at {
            return Err(PaymentError::gateway(
                "INVALID_EXPIRY",
                "Gateway returned a token that expires before it is issued",
            ));
        }
        if issued.amount.is_some_and(|amount| Some(amount) != request.amount) {
            return Err(PaymentError::gateway(
                "AMOUNT_MISMATCH",
                "Gateway signed a different amount than requested",
            ));
        }
        if issued
            .message
            .as_deref()
            .is_some_and(|message| Some(message) != request.message.as_deref())
        {
            return Err(PaymentError::gateway(
                "MESSAGE_MISMATCH",
                "Gateway signed a different message than requested",
            ));
        }

        Ok(Self {
            token_id: TokenId::new(issued.token_id),
            receiver: issued.receiver.unwrap_or_else(|| session.clone()),
            requested_amount: request.amount,
            message: request.message.clone(),
            issued_at: issued.issued_at,
            expires_at: issued.expires_at,
            origin: TokenOrigin::Gateway { signature },
        })
    }

    /// Builds an unsigned token locally, for when the gateway cannot issue one.
    pub fn fallback(
        receiver: Receiver,
        requested_amount: Option<Amount>,
        message: Option<String>,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        let ttl = TimeDelta::from_std(ttl).unwrap_or(TimeDelta::minutes(5));
        Self {
            token_id: TokenId::synthesize(now),
            receiver,
            requested_amount,
            message,
            issued_at: now,
            expires_at: now + ttl,
            origin: TokenOrigin::Fallback,
        }
    }

    pub fn token_id(&self) -> &TokenId {
        &self.token_id
    }

    pub fn receiver(&self) -> &Receiver {
        &self.receiver
    }

    pub fn requested_amount(&self) -> Option<Amount> {
        self.requested_amount
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn origin(&self) -> &TokenOrigin {
        &self.origin
    }

    pub fn signature(&self) -> Option<&str> {
        self.origin.signature().map(Signature::as_str)
    }

    pub fn is_verified(&self) -> bool {
        matches!(self.origin, TokenOrigin::Gateway { .. })
    }

    /// Whole seconds left, floored. `Expired` once nothing is left.
    pub fn time_remaining(&self, now: DateTime<Utc>) -> TimeRemaining {
        let secs = (self.expires_at - now).num_seconds();
        if secs <= 0 {
            TimeRemaining::Expired
        } else {
            TimeRemaining::Remaining(Duration::from_secs(secs as u64))
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.time_remaining(now).is_expired()
    }

    /// True when a fresh token for this request would carry the same content.
    pub fn has_content(&self, amount: Option<Amount>, message: Option<&str>) -> bool {
        self.requested_amount == amount && self.message.as_deref() == message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn receiver() -> Receiver {
        Receiver::new("+250788000000", "Alice")
    }

    fn request() -> TokenRequest {
        TokenRequest {
            amount: Amount::new(dec!(5000)).ok(),
            message: None,
        }
    }

    fn issued(signature: Option<&str>) -> IssuedToken {
        let now = Utc::now();
        IssuedToken {
            token_id: "QR-1".into(),
            receiver: None,
            amount: Some(Amount::new(dec!(5000)).unwrap()),
            message: None,
            issued_at: now,
            expires_at: now + TimeDelta::minutes(5),
            signature: signature.map(str::to_string),
        }
    }

    #[test]
    fn test_gateway_token_carries_signature() {
        let token = PaymentToken::from_gateway(issued(Some("abc")), &request(), &receiver()).unwrap();
        assert!(token.is_verified());
        assert_eq!(token.signature(), Some("abc"));
        assert_eq!(token.receiver(), &receiver());
    }

    #[test]
    fn test_gateway_token_without_signature_is_rejected() {
        assert!(PaymentToken::from_gateway(issued(None), &request(), &receiver()).is_err());
        assert!(PaymentToken::from_gateway(issued(Some("  ")), &request(), &receiver()).is_err());
    }

    #[test]
    fn test_request_fills_fields_the_gateway_leaves_out() {
        let mut answer = issued(Some("abc"));
        answer.amount = None;
        let request = TokenRequest {
            amount: Amount::new(dec!(5000)).ok(),
            message: Some("rent".into()),
        };

        let token = PaymentToken::from_gateway(answer, &request, &receiver()).unwrap();
        assert_eq!(token.requested_amount(), Amount::new(dec!(5000)).ok());
        assert_eq!(token.message(), Some("rent"));
        assert!(token.has_content(request.amount, Some("rent")));
    }

    #[test]
    fn test_contradicting_echo_is_rejected() {
        let open = TokenRequest::default();
        assert!(PaymentToken::from_gateway(issued(Some("abc")), &open, &receiver()).is_err());

        let mut answer = issued(Some("abc"));
        answer.message = Some("other".into());
        assert!(PaymentToken::from_gateway(answer, &request(), &receiver()).is_err());
    }

    #[test]
    fn test_fallback_token_is_unsigned() {
        let now = Utc::now();
        let token = PaymentToken::fallback(receiver(), None, None, now, Duration::from_secs(300));
        assert_eq!(token.origin(), &TokenOrigin::Fallback);
        assert!(token.signature().is_none());
        assert_eq!(token.expires_at() - token.issued_at(), TimeDelta::minutes(5));
        assert!(token.token_id().as_str().starts_with("local-"));
    }

    #[test]
    fn test_synthesized_ids_are_unique() {
        let now = Utc::now();
        assert_ne!(TokenId::synthesize(now), TokenId::synthesize(now));
    }

    #[test]
    fn test_time_remaining_floors_to_the_second() {
        let now = Utc::now();
        let token = PaymentToken::fallback(receiver(), None, None, now, Duration::from_secs(300));

        assert_eq!(
            token.time_remaining(now),
            TimeRemaining::Remaining(Duration::from_secs(300))
        );
        assert_eq!(
            token.time_remaining(now + TimeDelta::milliseconds(1500)),
            TimeRemaining::Remaining(Duration::from_secs(298))
        );
        assert_eq!(
            token.time_remaining(now + TimeDelta::milliseconds(299_500)),
            TimeRemaining::Expired
        );
        assert_eq!(
            token.time_remaining(now + TimeDelta::minutes(6)),
            TimeRemaining::Expired
        );
    }

    #[test]
    fn test_time_remaining_display() {
        assert_eq!(
            TimeRemaining::Remaining(Duration::from_secs(299)).to_string(),
            "4:59"
        );
        assert_eq!(TimeRemaining::Expired.to_string(), "expired");
    }

    #[test]
    fn test_has_content() {
        let now = Utc::now();
        let amount = Amount::new(dec!(100)).ok();
        let token = PaymentToken::fallback(
            receiver(),
            amount,
            Some("lunch".into()),
            now,
            Duration::from_secs(300),
        );
        assert!(token.has_content(amount, Some("lunch")));
        assert!(!token.has_content(None, Some("lunch")));
        assert!(!token.has_content(amount, None));
    }
}
