//! Scripted in-memory gateway shared by the payment tests.

use std::{
    collections::VecDeque,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use crate::{
    gateway::{
        self, StkGateway,
        error::GatewayError,
        status::{SUCCESS_SENTINEL, StatusReport, TransactionStatus},
        stk::StkPushResponse,
    },
    payment::PaymentRequest,
};

pub fn accepted(id: &str) -> StkPushResponse {
    StkPushResponse {
        merchant_request_id: "29115-34620561-1".into(),
        checkout_request_id: id.into(),
        response_code: "0".into(),
        response_description: "Success. Request accepted for processing".into(),
        customer_message: "Success. Request accepted for processing".into(),
    }
}

pub fn pending() -> StatusReport {
    StatusReport::pending("The transaction is being processed")
}

pub fn success() -> StatusReport {
    StatusReport {
        result_description: SUCCESS_SENTINEL.into(),
        status: TransactionStatus::Success,
        raw: serde_json::Value::Null,
    }
}

pub fn cancelled() -> StatusReport {
    StatusReport {
        result_description: "Request cancelled by user".into(),
        status: TransactionStatus::CancelledByUser,
        raw: serde_json::Value::Null,
    }
}

/// Answers initiations with fresh checkout ids and queries from a script; an exhausted query
/// script keeps answering pending. `Err(status)` entries fail with that HTTP status.
#[derive(Default)]
pub struct ScriptedGateway {
    initiations: Mutex<VecDeque<Result<StkPushResponse, u16>>>,
    queries: Mutex<VecDeque<Result<StatusReport, ()>>>,
    initiated: Mutex<Vec<PaymentRequest>>,
    queried: Mutex<Vec<String>>,
    initiate_count: AtomicUsize,
    latency: Duration,
}

impl ScriptedGateway {
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn script_initiations(
        &self,
        answers: impl IntoIterator<Item = Result<StkPushResponse, u16>>,
    ) {
        self.initiations.lock().unwrap().extend(answers);
    }

    pub fn script_queries(&self, answers: impl IntoIterator<Item = Result<StatusReport, ()>>) {
        self.queries.lock().unwrap().extend(answers);
    }

    pub fn initiated(&self) -> Vec<PaymentRequest> {
        self.initiated.lock().unwrap().clone()
    }

    pub fn queried(&self) -> Vec<String> {
        self.queried.lock().unwrap().clone()
    }

    pub fn query_count(&self) -> usize {
        self.queried.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl StkGateway for ScriptedGateway {
    async fn initiate(&self, request: &PaymentRequest) -> gateway::Result<StkPushResponse> {
        self.initiated.lock().unwrap().push(request.clone());
        let n = self.initiate_count.fetch_add(1, Ordering::SeqCst) + 1;
        let answer = self.initiations.lock().unwrap().pop_front();
        match answer {
            Some(Ok(response)) => Ok(response),
            Some(Err(status)) => Err(GatewayError::UnexpectedStatus { status }),
            None => Ok(accepted(&format!("ws_CO_{n}"))),
        }
    }

    async fn query_status(&self, checkout_request_id: &str) -> gateway::Result<StatusReport> {
        self.queried
            .lock()
            .unwrap()
            .push(checkout_request_id.to_string());
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let answer = self.queries.lock().unwrap().pop_front();
        match answer {
            Some(Ok(report)) => Ok(report),
            Some(Err(())) => Err(GatewayError::UnexpectedStatus { status: 503 }),
            None => Ok(pending()),
        }
    }
}
