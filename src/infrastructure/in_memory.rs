use crate::domain::money::{Amount, Balance};
use crate::domain::ports::{
    Clock, IssuedToken, PaymentGateway, SharedClock, TokenRequest, TransferConfirmation,
};
use crate::domain::transfer::{Channel, Destination, SendMoneyRequest};
use crate::error::{PaymentError, Result};
use crate::infrastructure::clock::SystemClock;
use crate::interfaces::json::payload::decode_payload;
use async_trait::async_trait;
use chrono::TimeDelta;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

const TOKEN_TTL: TimeDelta = TimeDelta::minutes(5);

/// How a scripted operation answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Behaviour {
    Respond,
    Reject { reason_code: String, message: String },
    Unreachable,
}

impl Behaviour {
    /// Answers with a gateway rejection.
    pub fn reject(reason_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Reject {
            reason_code: reason_code.into(),
            message: message.into(),
        }
    }

    fn check(&self) -> Result<()> {
        match self {
            Behaviour::Respond => Ok(()),
            Behaviour::Reject {
                reason_code,
                message,
            } => Err(PaymentError::gateway(reason_code.clone(), message.clone())),
            Behaviour::Unreachable => Err(PaymentError::Transport("connection refused".into())),
        }
    }
}

/// A transfer as the gateway saw it. The PIN is not kept.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedTransfer {
    pub channel: Channel,
    pub destination: Destination,
    pub amount: Amount,
    pub note: Option<String>,
    pub pin_len: usize,
}

struct Script {
    tokens: Behaviour,
    token_delay: Duration,
    echo_request: bool,
    transfers: Behaviour,
    transfer_delay: Duration,
    transfer_reference: Option<String>,
    balance: Behaviour,
    current_balance: Balance,
    issued_signatures: HashSet<String>,
    transfers_seen: Vec<RecordedTransfer>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            tokens: Behaviour::Respond,
            token_delay: Duration::ZERO,
            echo_request: true,
            transfers: Behaviour::Respond,
            transfer_delay: Duration::ZERO,
            transfer_reference: None,
            balance: Behaviour::Respond,
            current_balance: Balance::ZERO,
            issued_signatures: HashSet::new(),
            transfers_seen: Vec::new(),
        }
    }
}

/// Scriptable in-process gateway for tests and offline runs.
///
/// Clones share state, so a test can keep one handle for scripting and
/// assertions while the component under test owns another.
#[derive(Clone)]
pub struct InMemoryGateway {
    script: Arc<RwLock<Script>>,
    clock: SharedClock,
    create_token_calls: Arc<AtomicUsize>,
    validate_calls: Arc<AtomicUsize>,
    transfer_calls: Arc<AtomicUsize>,
    token_payment_calls: Arc<AtomicUsize>,
    balance_calls: Arc<AtomicUsize>,
}

impl Default for InMemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryGateway {
    /// Creates a new gateway on the system clock. Every call succeeds until scripted otherwise.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates a new gateway that stamps tokens with `clock`.
    pub fn with_clock(clock: SharedClock) -> Self {
        Self {
            script: Arc::new(RwLock::new(Script::default())),
            clock,
            create_token_calls: Arc::default(),
            validate_calls: Arc::default(),
            transfer_calls: Arc::default(),
            token_payment_calls: Arc::default(),
            balance_calls: Arc::default(),
        }
    }

    /// Scripts token creation and validation.
    pub async fn set_token_behaviour(&self, behaviour: Behaviour) {
        self.script.write().await.tokens = behaviour;
    }

    /// Delays every token creation by `delay`.
    pub async fn set_token_delay(&self, delay: Duration) {
        self.script.write().await.token_delay = delay;
    }

    /// When off, issued tokens leave amount and message out, as some
    /// gateway versions do.
    pub async fn set_token_echo(&self, echo: bool) {
        self.script.write().await.echo_request = echo;
    }

    /// Scripts transfers and code payments.
    pub async fn set_transfer_behaviour(&self, behaviour: Behaviour) {
        self.script.write().await.transfers = behaviour;
    }

    /// Delays every transfer and code payment by `delay`.
    pub async fn set_transfer_delay(&self, delay: Duration) {
        self.script.write().await.transfer_delay = delay;
    }

    /// Reference returned by the next successful transfers. Defaults to `TX<n>`.
    pub async fn set_transfer_reference(&self, reference: impl Into<String>) {
        self.script.write().await.transfer_reference = Some(reference.into());
    }

    pub async fn set_balance(&self, balance: Balance) {
        self.script.write().await.current_balance = balance;
    }

    /// Scripts balance lookups.
    pub async fn set_balance_behaviour(&self, behaviour: Behaviour) {
        self.script.write().await.balance = behaviour;
    }

    /// Transfers and code payments seen so far, oldest first.
    pub async fn transfers(&self) -> Vec<RecordedTransfer> {
        self.script.read().await.transfers_seen.clone()
    }

    /// Number of `create_token` calls, failed ones included.
    pub fn create_token_calls(&self) -> usize {
        self.create_token_calls.load(Ordering::SeqCst)
    }

    pub fn validate_calls(&self) -> usize {
        self.validate_calls.load(Ordering::SeqCst)
    }

    pub fn transfer_calls(&self) -> usize {
        self.transfer_calls.load(Ordering::SeqCst)
    }

    pub fn token_payment_calls(&self) -> usize {
        self.token_payment_calls.load(Ordering::SeqCst)
    }

    pub fn balance_calls(&self) -> usize {
        self.balance_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for InMemoryGateway {
    async fn create_token(&self, request: &TokenRequest) -> Result<IssuedToken> {
        let call = self.create_token_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let (behaviour, delay, echo) = {
            let script = self.script.read().await;
            (script.tokens.clone(), script.token_delay, script.echo_request)
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        behaviour.check()?;

        let now = self.clock.now();
        let signature = format!("sig-{call}-{}", now.timestamp_millis());
        self.script
            .write()
            .await
            .issued_signatures
            .insert(signature.clone());

        Ok(IssuedToken {
            token_id: format!("QR-{call}"),
            receiver: None,
            amount: request.amount.filter(|_| echo),
            message: request.message.clone().filter(|_| echo),
            issued_at: now,
            expires_at: now + TOKEN_TTL,
            signature: Some(signature),
        })
    }

    async fn validate_token(&self, _payload: &str, signature: &str) -> Result<()> {
        self.validate_calls.fetch_add(1, Ordering::SeqCst);
        let script = self.script.read().await;
        script.tokens.check()?;
        if script.issued_signatures.contains(signature) {
            Ok(())
        } else {
            Err(PaymentError::gateway(
                "INVALID_SIGNATURE",
                "QR validation failed",
            ))
        }
    }

    async fn transfer(&self, request: &SendMoneyRequest) -> Result<TransferConfirmation> {
        let call = self.transfer_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.settle_transfer(request, call).await
    }

    async fn pay_token(
        &self,
        payload: &str,
        request: &SendMoneyRequest,
    ) -> Result<TransferConfirmation> {
        let call = self.token_payment_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let signature = decode_payload(payload)?.signature.unwrap_or_default();
        if !self.script.read().await.issued_signatures.contains(&signature) {
            return Err(PaymentError::gateway(
                "INVALID_SIGNATURE",
                "Payment code was not issued here",
            ));
        }
        self.settle_transfer(request, call).await
    }

    async fn get_balance(&self) -> Result<Balance> {
        self.balance_calls.fetch_add(1, Ordering::SeqCst);
        let script = self.script.read().await;
        script.balance.check()?;
        Ok(script.current_balance)
    }
}

impl InMemoryGateway {
    /// Records the transfer, then answers as scripted for transfers.
    async fn settle_transfer(
        &self,
        request: &SendMoneyRequest,
        call: usize,
    ) -> Result<TransferConfirmation> {
        let (behaviour, delay) = {
            let mut script = self.script.write().await;
            script.transfers_seen.push(RecordedTransfer {
                channel: request.channel,
                destination: request.destination.clone(),
                amount: request.amount,
                note: request.note.clone(),
                pin_len: request.pin.len(),
            });
            (script.transfers.clone(), script.transfer_delay)
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        behaviour.check()?;
        if !request.destination.matches(request.channel) {
            return Err(PaymentError::InvalidState(
                "destination does not match channel",
            ));
        }

        let reference = self
            .script
            .read()
            .await
            .transfer_reference
            .clone()
            .unwrap_or_else(|| format!("TX{call}"));
        Ok(TransferConfirmation {
            transaction_reference: reference,
        })
    }
}
