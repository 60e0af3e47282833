//! State of one payment attempt and the transitions the view and the poller drive it through.

use std::{fmt::Display, sync::Arc};

use serde::Serialize;
use tokio::sync::watch;

use crate::gateway::{
    callback::CallbackResult,
    status::{StatusReport, TransactionStatus},
    stk::StkPushResponse,
};

#[derive(Debug, Clone)]
pub enum PaymentAction {
    InitiateRequested,
    InitiateSucceeded(StkPushResponse),
    InitiateFailed(String),
    StatusRequested,
    StatusSucceeded(StatusReport),
    StatusFailed(String),
    CallbackReceived(CallbackResult),
    Reset,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    TornDown,
    /// The action belongs to an attempt that has been reset since
    StaleAttempt { expected: u64, current: u64 },
    CheckoutAlreadyAssigned,
    AlreadyTerminal,
    UnknownCheckout,
}

impl std::error::Error for TransitionError {}

impl Display for TransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransitionError::TornDown => f.write_str("payment session is torn down"),
            TransitionError::StaleAttempt { expected, current } => {
                write!(f, "action of attempt {expected} while attempt {current} is active")
            }
            TransitionError::CheckoutAlreadyAssigned => {
                f.write_str("checkout request id is already assigned")
            }
            TransitionError::AlreadyTerminal => f.write_str("payment status is already final"),
            TransitionError::UnknownCheckout => {
                f.write_str("callback does not match the active checkout request")
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PaymentSession {
    pub checkout_request_id: Option<String>,
    /// Last result description reported by the provider
    pub transaction_status: Option<String>,
    pub status: Option<TransactionStatus>,
    pub error: Option<String>,
    pub is_loading: bool,
    pub last_payment_details: Option<StkPushResponse>,
    pub receipt: Option<String>,
    #[serde(skip)]
    attempt: u64,
    #[serde(skip)]
    torn_down: bool,
}

impl PaymentSession {
    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    pub fn is_terminal(&self) -> bool {
        self.status.as_ref().is_some_and(TransactionStatus::is_terminal)
    }

    /// True once any attempt has started or failed and a new one needs a [PaymentAction::Reset]
    pub fn is_dirty(&self) -> bool {
        self.checkout_request_id.is_some()
            || self.transaction_status.is_some()
            || self.error.is_some()
    }

    pub fn apply(&mut self, action: PaymentAction) -> Result<(), TransitionError> {
        if self.torn_down {
            return Err(TransitionError::TornDown);
        }
        match action {
            PaymentAction::InitiateRequested => {
                self.is_loading = true;
                self.error = None;
            }
            PaymentAction::InitiateSucceeded(response) => {
                if self.checkout_request_id.is_some() {
                    return Err(TransitionError::CheckoutAlreadyAssigned);
                }
                self.is_loading = false;
                self.checkout_request_id = Some(response.checkout_request_id.clone());
                self.last_payment_details = Some(response);
            }
            PaymentAction::InitiateFailed(message) => {
                self.is_loading = false;
                self.error = Some(message);
            }
            PaymentAction::StatusRequested => {
                if self.is_terminal() {
                    return Err(TransitionError::AlreadyTerminal);
                }
                self.is_loading = true;
            }
            PaymentAction::StatusSucceeded(report) => {
                if self.is_terminal() {
                    return Err(TransitionError::AlreadyTerminal);
                }
                self.is_loading = false;
                self.transaction_status = Some(report.result_description);
                self.status = Some(report.status);
            }
            PaymentAction::StatusFailed(message) => {
                self.is_loading = false;
                self.error = Some(message);
            }
            PaymentAction::CallbackReceived(result) => {
                if self.checkout_request_id.is_none() {
                    return Err(TransitionError::UnknownCheckout);
                }
                self.receipt = result.receipt;
            }
            PaymentAction::Reset => {
                self.error = None;
                self.checkout_request_id = None;
                self.transaction_status = None;
                self.status = None;
                self.receipt = None;
                self.attempt += 1;
            }
        }
        Ok(())
    }
}

/// Shared handle of one session. Accepted transitions are published to subscribers.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    state: Arc<watch::Sender<PaymentSession>>,
}

impl Default for SessionHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionHandle {
    pub fn new() -> Self {
        let (state, _) = watch::channel(PaymentSession::default());
        Self {
            state: Arc::new(state),
        }
    }

    pub fn dispatch(&self, action: PaymentAction) -> Result<(), TransitionError> {
        self.modify(None, action)
    }

    /// Dispatch on behalf of a specific attempt
    pub fn dispatch_for(&self, attempt: u64, action: PaymentAction) -> Result<(), TransitionError> {
        self.modify(Some(attempt), action)
    }

    fn modify(&self, attempt: Option<u64>, action: PaymentAction) -> Result<(), TransitionError> {
        let mut result = Ok(());
        self.state.send_if_modified(|session| {
            if let Some(expected) = attempt {
                if !session.torn_down && session.attempt != expected {
                    result = Err(TransitionError::StaleAttempt {
                        expected,
                        current: session.attempt,
                    });
                    return false;
                }
            }
            result = session.apply(action);
            result.is_ok()
        });
        if let Err(e) = &result {
            tracing::debug!("Rejected payment session transition: {e}");
        }
        result
    }

    pub fn snapshot(&self) -> PaymentSession {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PaymentSession> {
        self.state.subscribe()
    }

    /// Reject every further transition
    pub fn tear_down(&self) {
        self.state.send_if_modified(|session| {
            let changed = !session.torn_down;
            session.torn_down = true;
            session.is_loading = false;
            changed
        });
    }
}
