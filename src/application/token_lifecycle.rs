use crate::config::TokenPolicy;
use crate::domain::money::Amount;
use crate::domain::ports::{SharedClock, SharedGateway, TokenRequest};
use crate::domain::token::{PaymentToken, Receiver, TimeRemaining, TokenId};
use crate::error::{PaymentError, Result};
use crate::interfaces::json::payload::encode_payload;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast, watch};
use tracing::{debug, warn};

/// What asked for a new token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Explicit refresh by the user.
    User,
    /// Amount or message edited.
    Edit,
    /// The expiry watch saw the current token run out.
    Expiry,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RegenerateOutcome {
    /// A new token is current.
    Applied(Arc<PaymentToken>),
    /// A generation was already running. The request was folded into its
    /// single follow-up and the call returned once that settled.
    Coalesced,
    /// The live token already carries the requested content.
    Unchanged,
    /// A later edit arrived during the debounce window and took over.
    Superseded,
    /// The manager was cleared while the gateway was answering.
    Discarded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing generated yet.
    Idle,
    Fresh,
    /// Expired; a regeneration was started.
    Started,
    /// Expired, but a regeneration is already running.
    Suppressed,
}

/// Recoverable warnings for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenNotice {
    /// A user-requested refresh could not reach the gateway; the code on
    /// screen is an unsigned fallback.
    Unverified { token_id: TokenId, reason: String },
}

/// Read-only view for rendering the code and its countdown.
#[derive(Debug, Clone)]
pub struct TokenSnapshot {
    pub token: Option<Arc<PaymentToken>>,
    pub time_remaining: Option<TimeRemaining>,
    pub regenerating: bool,
}

#[derive(Default)]
struct TokenState {
    current: Option<Arc<PaymentToken>>,
    amount: Option<Amount>,
    message: Option<String>,
    in_flight: bool,
    pending: Option<Trigger>,
    /// Bumped by `clear`; results started under an older epoch are dropped.
    epoch: u64,
    edits: u64,
}

/// Snapshot of what a generation is for, taken when it starts.
struct Basis {
    request: TokenRequest,
    trigger: Trigger,
    epoch: u64,
    replaces: Option<TokenId>,
}

impl TokenState {
    fn basis(&self, trigger: Trigger) -> Basis {
        Basis {
            request: TokenRequest {
                amount: self.amount,
                message: self.message.clone(),
            },
            trigger,
            epoch: self.epoch,
            replaces: self.current.as_ref().map(|t| t.token_id().clone()),
        }
    }

    /// Starts a generation, or folds the request into the single pending
    /// follow-up when one is already running. Expiry ticks never queue.
    fn claim(&mut self, trigger: Trigger) -> Option<Basis> {
        if self.in_flight {
            if trigger != Trigger::Expiry {
                self.pending = match (self.pending, trigger) {
                    (Some(Trigger::User), _) | (_, Trigger::User) => Some(Trigger::User),
                    _ => Some(Trigger::Edit),
                };
            }
            return None;
        }
        self.in_flight = true;
        Some(self.basis(trigger))
    }

    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.current.as_ref().is_some_and(|token| {
            token.has_content(self.amount, self.message.as_deref()) && !token.is_expired(now)
        })
    }
}

/// Owns the user's current payment-request token.
///
/// Keeps exactly one token current, regenerates it on edits, on explicit
/// refresh and on expiry, and degrades to an unsigned fallback token when the
/// gateway cannot be reached. All regenerations run through one serialized
/// path: while one is in flight, further requests collapse into a single
/// follow-up.
pub struct TokenLifecycleManager {
    gateway: SharedGateway,
    clock: SharedClock,
    receiver: Receiver,
    policy: TokenPolicy,
    state: Mutex<TokenState>,
    notices: broadcast::Sender<TokenNotice>,
    /// Bumped each time a run of generations finishes and nothing is in flight.
    settled: watch::Sender<u64>,
}

impl TokenLifecycleManager {
    /// Creates a manager with no token. Nothing is generated until the first
    /// `regenerate` or edit.
    pub fn new(
        gateway: SharedGateway,
        clock: SharedClock,
        receiver: Receiver,
        policy: TokenPolicy,
    ) -> Self {
        let (notices, _) = broadcast::channel(16);
        let (settled, _) = watch::channel(0);
        Self {
            gateway,
            clock,
            receiver,
            policy,
            state: Mutex::new(TokenState::default()),
            notices,
            settled,
        }
    }

    /// Notices about degraded tokens, from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<TokenNotice> {
        self.notices.subscribe()
    }

    /// Requests a new token regardless of the current one and returns once
    /// it is applied. While another generation is in flight the request rides
    /// on its follow-up, and the call waits for that to settle.
    pub async fn regenerate(&self) -> RegenerateOutcome {
        let (basis, settled) = {
            let mut state = self.state.lock().await;
            (state.claim(Trigger::User), self.settled.subscribe())
        };
        match basis {
            Some(basis) => self.run(basis).await,
            None => Self::wait_settled(settled).await,
        }
    }

    /// Sets the amount the payer is asked for. `None` accepts any amount.
    pub async fn set_requested_amount(&self, amount: Option<Amount>) -> RegenerateOutcome {
        let edit = {
            let mut state = self.state.lock().await;
            state.amount = amount;
            state.edits += 1;
            state.edits
        };
        self.after_edit(edit).await
    }

    /// Sets the note shown to the payer. Blank text clears it.
    pub async fn set_message(&self, message: Option<String>) -> RegenerateOutcome {
        let message = message
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty());
        let edit = {
            let mut state = self.state.lock().await;
            state.message = message;
            state.edits += 1;
            state.edits
        };
        self.after_edit(edit).await
    }

    /// Sets amount and note as a single edit, so at most one token is issued.
    pub async fn set_request(
        &self,
        amount: Option<Amount>,
        message: Option<String>,
    ) -> RegenerateOutcome {
        let message = message
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty());
        let edit = {
            let mut state = self.state.lock().await;
            state.amount = amount;
            state.message = message;
            state.edits += 1;
            state.edits
        };
        self.after_edit(edit).await
    }

    async fn after_edit(&self, edit: u64) -> RegenerateOutcome {
        if !self.policy.amount_debounce.is_zero() {
            tokio::time::sleep(self.policy.amount_debounce).await;
        }

        let (basis, settled) = {
            let mut state = self.state.lock().await;
            if state.edits != edit {
                return RegenerateOutcome::Superseded;
            }
            if !state.in_flight && state.is_live(self.clock.now()) {
                return RegenerateOutcome::Unchanged;
            }
            (state.claim(Trigger::Edit), self.settled.subscribe())
        };

        match basis {
            Some(basis) => self.run(basis).await,
            None => Self::wait_settled(settled).await,
        }
    }

    // The receiver is taken under the state lock, so the run it waits on
    // cannot finish unseen.
    async fn wait_settled(mut settled: watch::Receiver<u64>) -> RegenerateOutcome {
        let _ = settled.changed().await;
        RegenerateOutcome::Coalesced
    }

    /// One expiry-watch step. Starts at most one regeneration and returns
    /// without waiting for it.
    pub async fn on_tick(self: &Arc<Self>) -> TickOutcome {
        let now = self.clock.now();
        let basis = {
            let mut state = self.state.lock().await;
            match &state.current {
                None => return TickOutcome::Idle,
                Some(token) if !token.is_expired(now) => return TickOutcome::Fresh,
                Some(_) => {}
            }
            match state.claim(Trigger::Expiry) {
                Some(basis) => basis,
                None => return TickOutcome::Suppressed,
            }
        };

        debug!("payment token expired, regenerating");
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            manager.run(basis).await;
        });
        TickOutcome::Started
    }

    /// Drops the current token, e.g. when the receive screen is left or the
    /// session ends. A generation still in flight is discarded on arrival.
    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        state.current = None;
        state.pending = None;
        state.amount = None;
        state.message = None;
        state.epoch += 1;
    }

    /// The token on screen, if any. May be expired; see `time_remaining`.
    pub async fn current_token(&self) -> Option<Arc<PaymentToken>> {
        self.state.lock().await.current.clone()
    }

    /// Countdown of the current token at `now`.
    pub async fn time_remaining(&self, now: DateTime<Utc>) -> Option<TimeRemaining> {
        self.state
            .lock()
            .await
            .current
            .as_ref()
            .map(|token| token.time_remaining(now))
    }

    /// Token, countdown and whether a regeneration is running, read together.
    pub async fn snapshot(&self) -> TokenSnapshot {
        let now = self.clock.now();
        let state = self.state.lock().await;
        TokenSnapshot {
            token: state.current.clone(),
            time_remaining: state.current.as_ref().map(|t| t.time_remaining(now)),
            regenerating: state.in_flight,
        }
    }

    /// Canonical payload of the current token. Byte-identical across calls
    /// until the token is replaced.
    pub async fn export_payload(&self) -> Result<String> {
        let token = self
            .current_token()
            .await
            .ok_or(PaymentError::InvalidState("no payment token generated yet"))?;
        encode_payload(&token)
    }

    async fn run(&self, mut basis: Basis) -> RegenerateOutcome {
        loop {
            let (token, failure) = self.generate(&basis).await;

            let mut state = self.state.lock().await;
            let still_wanted = state.epoch == basis.epoch
                && state.current.as_ref().map(|t| t.token_id()) == basis.replaces.as_ref();
            let outcome = if still_wanted {
                let token = Arc::new(token);
                state.current = Some(Arc::clone(&token));
                if let Some(reason) = failure
                    && basis.trigger == Trigger::User
                {
                    let _ = self.notices.send(TokenNotice::Unverified {
                        token_id: token.token_id().clone(),
                        reason,
                    });
                }
                RegenerateOutcome::Applied(token)
            } else {
                debug!(token_id = %token.token_id(), "discarding token for a superseded request");
                RegenerateOutcome::Discarded
            };

            match state.pending.take() {
                Some(trigger) => basis = state.basis(trigger),
                None => {
                    state.in_flight = false;
                    self.settled.send_modify(|runs| *runs += 1);
                    return outcome;
                }
            }
        }
    }

    async fn generate(&self, basis: &Basis) -> (PaymentToken, Option<String>) {
        let timeout = self.policy.gateway_timeout;
        let issued = match tokio::time::timeout(timeout, self.gateway.create_token(&basis.request)).await {
            Ok(Ok(issued)) => PaymentToken::from_gateway(issued, &basis.request, &self.receiver),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(PaymentError::Timeout(timeout)),
        };

        match issued {
            Ok(token) => {
                debug!(token_id = %token.token_id(), trigger = ?basis.trigger, "payment token issued");
                (token, None)
            }
            Err(err) => {
                warn!(error = %err, trigger = ?basis.trigger, "token generation failed, using unsigned fallback");
                let token = PaymentToken::fallback(
                    self.receiver.clone(),
                    basis.request.amount,
                    basis.request.message.clone(),
                    self.clock.now(),
                    self.policy.token_ttl,
                );
                (token, Some(err.to_string()))
            }
        }
    }
}
