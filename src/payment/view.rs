use std::{sync::Arc, time::Duration};

use rust_decimal::Decimal;
use serde::Serialize;

use crate::{
    gateway::StkGateway,
    payment::{
        ACCOUNT_REFERENCE, PaymentError, PaymentRequest, ValidationError, normalize_phone_number,
        poller::{POLL_INTERVAL, PollHandle, PollingController},
        session::{PaymentAction, SessionHandle},
    },
};

/// Receives `true` when the payment went through and `false` when the provider reported a final
/// failure
pub type CompletionCallback = Arc<dyn Fn(bool) + Send + Sync>;

/// Everything a frontend needs to draw the payment form
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentViewModel {
    pub phone_number: String,
    pub input_disabled: bool,
    pub error: Option<String>,
    pub status: Option<String>,
    pub button_label: String,
    pub button_disabled: bool,
    pub loading: bool,
}

/// Headless M-Pesa payment form of one purchase.
///
/// Owns its session: dropping the view cancels polling and rejects every later transition.
pub struct PaymentView<G: StkGateway + ?Sized> {
    gateway: Arc<G>,
    session: SessionHandle,
    amount: Decimal,
    phone_number: String,
    on_complete: CompletionCallback,
    poller: Option<PollHandle>,
    poll_interval: Duration,
}

impl<G: StkGateway + ?Sized> PaymentView<G> {
    pub fn new(gateway: Arc<G>, amount: Decimal, on_complete: CompletionCallback) -> Self {
        Self {
            gateway,
            session: SessionHandle::new(),
            amount,
            phone_number: String::new(),
            on_complete,
            poller: None,
            poll_interval: POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn phone_number(&self) -> &str {
        &self.phone_number
    }

    pub fn set_phone_number(&mut self, phone_number: impl Into<String>) {
        self.phone_number = phone_number.into();
    }

    pub fn can_submit(&self) -> bool {
        !self.phone_number.trim().is_empty() && !self.session.snapshot().is_loading
    }

    pub fn render(&self) -> PaymentViewModel {
        let session = self.session.snapshot();
        let button_label = if session.is_loading {
            String::from("Processing...")
        } else {
            format!("Pay KES {}", self.amount)
        };
        PaymentViewModel {
            phone_number: self.phone_number.clone(),
            input_disabled: session.is_loading,
            error: session.error,
            status: session.transaction_status,
            button_label,
            button_disabled: session.is_loading || self.phone_number.trim().is_empty(),
            loading: session.is_loading,
        }
    }

    /// Initiate the payment for the entered phone number and start polling its status.
    ///
    /// Returns the checkout request id of the new attempt.
    pub async fn submit(&mut self) -> Result<String, PaymentError> {
        let snapshot = self.session.snapshot();
        if snapshot.is_loading {
            return Err(PaymentError::InProgress);
        }
        if self.phone_number.trim().is_empty() {
            return Err(self.reject(ValidationError::EmptyPhoneNumber));
        }

        self.cancel_polling();
        if snapshot.is_dirty() {
            self.session.dispatch(PaymentAction::Reset).map_err(|e| {
                tracing::warn!("Failed to reset payment session: {e}");
                PaymentError::InProgress
            })?;
        }

        let phone_number = normalize_phone_number(&self.phone_number);
        let request = match PaymentRequest::new(phone_number, self.amount, ACCOUNT_REFERENCE) {
            Ok(request) => request,
            Err(e) => return Err(self.reject(e)),
        };

        if let Err(e) = self.session.dispatch(PaymentAction::InitiateRequested) {
            tracing::warn!("Payment view no longer accepts submissions: {e}");
            return Err(PaymentError::InProgress);
        }
        match self.gateway.initiate(&request).await {
            Ok(response) => {
                let checkout_request_id = response.checkout_request_id.clone();
                if let Err(e) = self
                    .session
                    .dispatch(PaymentAction::InitiateSucceeded(response))
                {
                    tracing::warn!(%checkout_request_id, "Dropped initiation result: {e}");
                    return Err(PaymentError::InProgress);
                }
                self.arm_polling(checkout_request_id.clone());
                Ok(checkout_request_id)
            }
            Err(e) => {
                tracing::error!("Failed to initiate payment: {e}");
                let error = PaymentError::from(e);
                let _ = self
                    .session
                    .dispatch(PaymentAction::InitiateFailed(error.to_string()));
                Err(error)
            }
        }
    }

    fn reject(&self, error: ValidationError) -> PaymentError {
        let _ = self
            .session
            .dispatch(PaymentAction::InitiateFailed(error.to_string()));
        error.into()
    }

    fn arm_polling(&mut self, checkout_request_id: String) {
        let on_complete = self.on_complete.clone();
        let poller = PollingController::new(self.gateway.clone(), self.session.clone())
            .with_period(self.poll_interval)
            .arm(checkout_request_id, move |outcome| {
                on_complete(outcome.is_completed())
            });
        self.poller = Some(poller);
    }

    fn cancel_polling(&mut self) {
        if let Some(mut poller) = self.poller.take() {
            poller.cancel();
        }
    }

    /// Stop polling and close the session
    pub fn tear_down(&mut self) {
        self.cancel_polling();
        self.session.tear_down();
    }
}

impl<G: StkGateway + ?Sized> Drop for PaymentView<G> {
    fn drop(&mut self) {
        self.tear_down();
    }
}
