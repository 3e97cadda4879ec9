use super::draft::{Draft, Field};
use crate::domain::money::Balance;
use crate::domain::ports::{SharedGateway, TransferConfirmation};
use crate::domain::transfer::{
    Channel, SendMoneyRequest, SendMoneyResult, TransferFailure, TransferReceipt,
};
use crate::error::{PaymentError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const GENERIC_FAILURE: &str = "Payment failed. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Editing,
    Submitting,
    Succeeded,
    Failed,
}

/// Read-only view for the send-money screens.
#[derive(Debug, Clone)]
pub struct DispatcherSnapshot {
    pub state: DispatchState,
    pub draft: Draft,
    pub last_result: Option<SendMoneyResult>,
    pub balance: Option<Balance>,
}

struct DispatchInner {
    state: DispatchState,
    draft: Draft,
    last_result: Option<SendMoneyResult>,
    balance: Option<Balance>,
    /// Incremented per submission and per reset; an answer is applied only if
    /// the number it was sent under is still current.
    sequence: u64,
}

/// Clears the in-flight flag when the transfer call settles or is dropped.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Send-money state machine across the wallet, mobile-money and bank rails.
///
/// `Editing -> Submitting -> Succeeded | Failed`. At most one transfer is in
/// flight; the PIN leaves the form the moment a submission starts.
pub struct ChannelDispatcher {
    gateway: SharedGateway,
    timeout: Duration,
    inner: Mutex<DispatchInner>,
    /// Set while a transfer call is out, including one abandoned by `reset`.
    /// Only raised under the `inner` lock.
    transfer_in_flight: AtomicBool,
}

impl ChannelDispatcher {
    /// Creates a dispatcher with an empty wallet form. Gateway calls are
    /// abandoned after `timeout`.
    pub fn new(gateway: SharedGateway, timeout: Duration) -> Self {
        Self {
            gateway,
            timeout,
            inner: Mutex::new(DispatchInner {
                state: DispatchState::Editing,
                draft: Draft::default(),
                last_result: None,
                balance: None,
                sequence: 0,
            }),
            transfer_in_flight: AtomicBool::new(false),
        }
    }

    /// State, form, last result and balance, read together.
    pub async fn snapshot(&self) -> DispatcherSnapshot {
        let inner = self.inner.lock().await;
        DispatcherSnapshot {
            state: inner.state,
            draft: inner.draft.clone(),
            last_result: inner.last_result.clone(),
            balance: inner.balance,
        }
    }

    /// Current state of the send flow.
    pub async fn state(&self) -> DispatchState {
        self.inner.lock().await.state
    }

    /// Switches rail while editing. Destination fields are cleared on change.
    pub async fn select_channel(&self, channel: Channel) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.state != DispatchState::Editing {
            return Err(PaymentError::InvalidState(
                "channel can only change while editing",
            ));
        }
        inner.draft.switch_channel(channel);
        Ok(())
    }

    /// Sets one form field while editing. Fields the selected rail does not
    /// use are refused.
    pub async fn update_field(&self, field: Field, value: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.state != DispatchState::Editing {
            return Err(PaymentError::InvalidState("form is not editable"));
        }
        if !field.applies_to(inner.draft.channel()) {
            return Err(PaymentError::InvalidState(
                "field does not belong to the selected channel",
            ));
        }
        inner.draft.set(field, value);
        Ok(())
    }

    /// Validates the form and sends it on the selected rail.
    ///
    /// Rejected without side effects while another submission is in flight.
    /// Validation errors leave the form untouched. Otherwise the PIN is
    /// cleared and the outcome is both returned and recorded, unless the form
    /// was reset while the gateway was answering.
    pub async fn submit(&self) -> Result<SendMoneyResult> {
        let (request, sequence, in_flight) = {
            let mut inner = self.inner.lock().await;
            if self.transfer_in_flight.load(Ordering::SeqCst) {
                debug!("submit ignored, an abandoned transfer has not settled");
                return Err(PaymentError::InvalidState(
                    "a previous transfer is still in flight",
                ));
            }
            match inner.state {
                DispatchState::Editing => {}
                DispatchState::Submitting => {
                    debug!("submit ignored, a transfer is already in flight");
                    return Err(PaymentError::InvalidState(
                        "a submission is already in flight",
                    ));
                }
                DispatchState::Succeeded | DispatchState::Failed => {
                    return Err(PaymentError::InvalidState(
                        "previous result has not been acknowledged",
                    ));
                }
            }

            let request = match inner.draft.validate() {
                Ok(request) => request,
                Err(err) => {
                    debug!(error = %err, "draft rejected");
                    return Err(err.into());
                }
            };
            inner.draft.clear_pin();
            inner.state = DispatchState::Submitting;
            inner.last_result = None;
            inner.sequence += 1;
            self.transfer_in_flight.store(true, Ordering::SeqCst);
            (request, inner.sequence, InFlight(&self.transfer_in_flight))
        };

        info!(channel = %request.channel, amount = %request.amount, sequence, "submitting transfer");
        let answer = tokio::time::timeout(self.timeout, self.gateway.transfer(&request))
            .await
            .unwrap_or(Err(PaymentError::Timeout(self.timeout)));
        drop(in_flight);
        let result = settle(request, answer);

        let mut inner = self.inner.lock().await;
        if inner.sequence != sequence || inner.state != DispatchState::Submitting {
            debug!(sequence, "discarding answer for an abandoned submission");
            return Ok(result);
        }
        inner.state = match &result {
            SendMoneyResult::Success(receipt) => {
                info!(reference = %receipt.transaction_reference, "transfer succeeded");
                DispatchState::Succeeded
            }
            SendMoneyResult::Failure(failure) => {
                warn!(reason = %failure.reason_code, "transfer failed");
                DispatchState::Failed
            }
        };
        inner.last_result = Some(result.clone());
        Ok(result)
    }

    /// Dismisses a failure and returns to the retained form.
    pub async fn acknowledge(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.state != DispatchState::Failed {
            return Err(PaymentError::InvalidState("no failure to acknowledge"));
        }
        inner.state = DispatchState::Editing;
        Ok(())
    }

    /// Leaves the receipt for an empty form on the same rail.
    pub async fn new_payment(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.state != DispatchState::Succeeded {
            return Err(PaymentError::InvalidState(
                "a new payment starts from a completed one",
            ));
        }
        let channel = inner.draft.channel();
        inner.draft = Draft::new(channel);
        inner.last_result = None;
        inner.state = DispatchState::Editing;
        Ok(())
    }

    /// Abandons the form from any state. An answer still in flight is dropped,
    /// and `submit` stays refused until that call settles.
    pub async fn reset(&self) {
        let mut inner = self.inner.lock().await;
        let channel = inner.draft.channel();
        inner.draft = Draft::new(channel);
        inner.last_result = None;
        inner.state = DispatchState::Editing;
        inner.sequence += 1;
    }

    /// Fetches the wallet balance. A failure keeps the last known value.
    pub async fn refresh_balance(&self) -> Result<Balance> {
        let balance = tokio::time::timeout(self.timeout, self.gateway.get_balance())
            .await
            .unwrap_or(Err(PaymentError::Timeout(self.timeout)))?;
        self.inner.lock().await.balance = Some(balance);
        Ok(balance)
    }
}

/// Folds a gateway answer into the outcome shown to the payer.
pub(super) fn settle(
    request: SendMoneyRequest,
    answer: Result<TransferConfirmation>,
) -> SendMoneyResult {
    match answer {
        Ok(confirmation) => SendMoneyResult::Success(TransferReceipt {
            transaction_reference: confirmation.transaction_reference,
            channel: request.channel,
            amount: request.amount,
            destination: request.destination,
            note: request.note,
        }),
        Err(PaymentError::Gateway {
            reason_code,
            message,
        }) => SendMoneyResult::Failure(TransferFailure {
            reason_code,
            message,
        }),
        Err(PaymentError::Timeout(_)) => SendMoneyResult::Failure(TransferFailure {
            reason_code: "TIMEOUT".into(),
            message: GENERIC_FAILURE.into(),
        }),
        Err(err) => {
            debug!(error = %err, "transfer did not complete");
            SendMoneyResult::Failure(TransferFailure {
                reason_code: "SUBMISSION_FAILED".into(),
                message: GENERIC_FAILURE.into(),
            })
        }
    }
}
