//! Status polling of an initiated STK push.
//!
//! A [PollingController] arms one background task per checkout request. The task issues one
//! status query per tick and stops when the provider reports a final status or when its
//! [PollHandle] is cancelled or dropped.

use std::{sync::Arc, time::Duration};

use tokio::{
    sync::{oneshot, watch},
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};

use crate::{
    gateway::StkGateway,
    payment::{
        PaymentOutcome,
        session::{PaymentAction, SessionHandle},
    },
};

pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Polling,
    Terminal,
}

pub struct PollingController<G: StkGateway + ?Sized> {
    gateway: Arc<G>,
    session: SessionHandle,
    period: Duration,
}

impl<G: StkGateway + ?Sized> PollingController<G> {
    pub fn new(gateway: Arc<G>, session: SessionHandle) -> Self {
        Self {
            gateway,
            session,
            period: POLL_INTERVAL,
        }
    }

    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Start polling `checkout_request_id` for the session's current attempt.
    ///
    /// `on_terminal` runs at most once, after the final status has been stored in the session.
    pub fn arm(
        &self,
        checkout_request_id: String,
        on_terminal: impl FnOnce(PaymentOutcome) + Send + 'static,
    ) -> PollHandle {
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let (state_tx, state_rx) = watch::channel(PollState::Polling);
        let task = PollTask {
            gateway: self.gateway.clone(),
            session: self.session.clone(),
            attempt: self.session.snapshot().attempt(),
            checkout_request_id,
            period: self.period,
        };
        tracing::debug!(
            checkout_request_id = %task.checkout_request_id,
            attempt = task.attempt,
            "Armed payment status polling"
        );
        let handle = tokio::spawn(async move {
            let state = task.run(cancel_rx, on_terminal).await;
            let _ = state_tx.send(state);
        });
        PollHandle {
            cancel: Some(cancel_tx),
            task: handle,
            state: state_rx,
        }
    }
}

struct PollTask<G: ?Sized> {
    gateway: Arc<G>,
    session: SessionHandle,
    attempt: u64,
    checkout_request_id: String,
    period: Duration,
}

impl<G: StkGateway + ?Sized> PollTask<G> {
    async fn run(
        self,
        mut cancel: oneshot::Receiver<()>,
        on_terminal: impl FnOnce(PaymentOutcome),
    ) -> PollState {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = &mut cancel => return PollState::Idle,
                _ = ticker.tick() => {}
            }

            if self
                .session
                .dispatch_for(self.attempt, PaymentAction::StatusRequested)
                .is_err()
            {
                return PollState::Idle;
            }

            let result = tokio::select! {
                biased;
                _ = &mut cancel => return PollState::Idle,
                result = self.gateway.query_status(&self.checkout_request_id) => result,
            };

            let action = match result {
                Ok(report) => {
                    tracing::debug!(
                        checkout_request_id = %self.checkout_request_id,
                        status = ?report.status,
                        "Polled payment status"
                    );
                    PaymentAction::StatusSucceeded(report)
                }
                Err(e) => {
                    // A failed tick is not final; the next tick queries again
                    tracing::warn!(
                        checkout_request_id = %self.checkout_request_id,
                        "Failed to query payment status: {e}"
                    );
                    PaymentAction::StatusFailed(format!("Failed to query payment status: {e}"))
                }
            };
            let status = match &action {
                PaymentAction::StatusSucceeded(report) => Some(report.status.clone()),
                _ => None,
            };
            if self.session.dispatch_for(self.attempt, action).is_err() {
                return PollState::Idle;
            }

            if let Some(status) = status.filter(|s| s.is_terminal()) {
                tracing::info!(
                    checkout_request_id = %self.checkout_request_id,
                    ?status,
                    "Payment reached final status"
                );
                let outcome = if status.is_success() {
                    PaymentOutcome::Completed
                } else {
                    PaymentOutcome::Failed(status)
                };
                on_terminal(outcome);
                return PollState::Terminal;
            }
        }
    }
}

/// Owner of a running poll task. Dropping the handle cancels the task.
#[derive(Debug)]
pub struct PollHandle {
    cancel: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
    state: watch::Receiver<PollState>,
}

impl PollHandle {
    pub fn state(&self) -> PollState {
        *self.state.borrow()
    }

    pub fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        self.task.abort();
    }

    /// Wait until the task has stopped
    pub async fn finished(&mut self) -> PollState {
        let _ = self.state.wait_for(|s| *s != PollState::Polling).await;
        match *self.state.borrow() {
            // aborted before reporting
            PollState::Polling => PollState::Idle,
            state => state,
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}
