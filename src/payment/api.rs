use std::sync::{Arc, Mutex};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::instrument;

use crate::{
    gateway::mask,
    payment::{
        PaymentError,
        session::PaymentSession,
        view::{CompletionCallback, PaymentView},
    },
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct CreatePayment {
    pub phone_number: String,
    pub amount: Decimal,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    result: bool,
    #[serde(flatten)]
    data: T,
}

impl<T> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self { result: true, data }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> axum::response::Response {
        let value = match serde_json::to_value(&self) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!("Failed to serialize response: {e}");
                return ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
                    .into_response();
            }
        };
        tracing::debug!(data = %mask::secure_value(&value), "Payments API response payload");
        axum::Json(value).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    status: StatusCode,
    result: bool,
    error: String,
}

impl ApiError {
    pub fn new(status: StatusCode, error: String) -> Self {
        Self {
            status,
            result: false,
            error,
        }
    }
}

impl From<PaymentError> for ApiError {
    fn from(value: PaymentError) -> Self {
        let status = match &value {
            PaymentError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PaymentError::Gateway(_) => StatusCode::BAD_GATEWAY,
            PaymentError::InProgress => StatusCode::CONFLICT,
        };
        Self::new(status, value.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        tracing::debug!(status = %self.status, error = %self.error, "Payments API error response");
        (self.status, axum::Json(self)).into_response()
    }
}

#[instrument(skip_all)]
async fn create_payment(
    State(AppState { gateway, payments }): State<AppState>,
    Json(request): Json<CreatePayment>,
) -> Result<(StatusCode, ApiResponse<PaymentSession>), ApiError> {
    let (finished_tx, finished) = oneshot::channel();
    let finished_tx = Mutex::new(Some(finished_tx));
    let on_complete: CompletionCallback = Arc::new(move |completed: bool| {
        tracing::info!(completed, "Hosted payment finished");
        if let Some(tx) = finished_tx.lock().ok().and_then(|mut tx| tx.take()) {
            let _ = tx.send(());
        }
    });
    let mut view = PaymentView::new(gateway, request.amount, on_complete);
    view.set_phone_number(request.phone_number);
    let checkout_request_id = view.submit().await.map_err(|e| {
        tracing::warn!("Failed to create payment: {e}");
        ApiError::from(e)
    })?;

    let session = view.session().snapshot();
    payments
        .host(checkout_request_id.clone(), view, finished)
        .await;
    tracing::info!(%checkout_request_id, "Created payment");
    Ok((StatusCode::CREATED, ApiResponse::new(session)))
}

#[instrument(skip_all)]
async fn payment_status(
    State(AppState { payments, .. }): State<AppState>,
    Path(checkout_request_id): Path<String>,
) -> Result<ApiResponse<PaymentSession>, ApiError> {
    match payments.snapshot(&checkout_request_id).await {
        Some(session) => Ok(ApiResponse::new(session)),
        None => Err(ApiError::new(
            StatusCode::NOT_FOUND,
            format!("payment {checkout_request_id} is not found"),
        )),
    }
}

#[instrument(skip_all)]
async fn cancel_payment(
    State(AppState { payments, .. }): State<AppState>,
    Path(checkout_request_id): Path<String>,
) -> StatusCode {
    if payments.remove(&checkout_request_id).await {
        tracing::info!(%checkout_request_id, "Closed payment view");
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/payments", post(create_payment))
        .route(
            "/payments/{checkout_request_id}",
            get(payment_status).delete(cancel_payment),
        )
}

/// `Json` extractor wrapper that customizes the error from `axum::extract::Json`
pub struct Json<T>(pub T);

impl<S, T> axum::extract::FromRequest<S> for Json<T>
where
    T: serde::de::DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(
        req: axum::http::Request<axum::body::Body>,
        state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        match axum::Json::<T>::from_request(req, state).await {
            Ok(axum::Json(value)) => Ok(Self(value)),
            Err(e) => Err(ApiError::new(e.status(), e.body_text())),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use crate::{
        payment::{poller::POLL_INTERVAL, registry::FINISHED_RETENTION},
        state::AppState,
        testing::{ScriptedGateway, success},
    };

    fn app(gateway: Arc<ScriptedGateway>) -> (axum::Router, AppState) {
        let state = AppState::new(gateway);
        (super::router().with_state(state.clone()), state)
    }

    async fn call(app: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let value = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, value)
    }

    fn create(body: Value) -> Request<Body> {
        Request::post("/payments")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn create_then_fetch_payment() {
        let gateway = Arc::new(ScriptedGateway::default());
        let (app, state) = app(gateway.clone());

        let (status, body) = call(
            &app,
            create(json!({"phone_number": "0712345678", "amount": 500})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["result"], true);
        assert_eq!(body["checkout_request_id"], "ws_CO_1");
        assert_eq!(gateway.initiated()[0].phone_number(), "254712345678");
        assert_eq!(state.payments.len().await, 1);

        let (status, body) = call(
            &app,
            Request::get("/payments/ws_CO_1").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["checkout_request_id"], "ws_CO_1");

        let (status, _) = call(
            &app,
            Request::delete("/payments/ws_CO_1")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(state.payments.len().await, 0);
    }

    #[tokio::test]
    async fn invalid_phone_is_unprocessable() {
        let gateway = Arc::new(ScriptedGateway::default());
        let (app, _) = app(gateway.clone());
        let (status, body) = call(&app, create(json!({"phone_number": "", "amount": 500}))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["result"], false);
        assert!(gateway.initiated().is_empty());
    }

    #[tokio::test]
    async fn gateway_failure_is_bad_gateway() {
        let gateway = Arc::new(ScriptedGateway::default());
        gateway.script_initiations([Err(500)]);
        let (app, state) = app(gateway);
        let (status, body) = call(
            &app,
            create(json!({"phone_number": "254712345678", "amount": "500"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body["error"].as_str().unwrap().starts_with("Failed to initiate payment"));
        assert_eq!(state.payments.len().await, 0);
    }

    #[tokio::test]
    async fn unknown_payment() {
        let (app, _) = app(Arc::new(ScriptedGateway::default()));
        let (status, _) = call(
            &app,
            Request::get("/payments/ws_CO_404").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn malformed_body_is_rejected() {
        let (app, _) = app(Arc::new(ScriptedGateway::default()));
        let (status, body) = call(&app, create(json!({"amount": 500}))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["result"], false);
    }

    #[tokio::test(start_paused = true)]
    async fn finished_payments_are_evicted() {
        let gateway = Arc::new(ScriptedGateway::default());
        gateway.script_queries([Ok(success()), Ok(success()), Ok(success())]);
        let (app, state) = app(gateway.clone());
        for _ in 0..3 {
            let (status, _) = call(
                &app,
                create(json!({"phone_number": "0712345678", "amount": 500})),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED);
        }

        tokio::time::sleep(POLL_INTERVAL * 2).await;
        assert_eq!(gateway.query_count(), 3);
        assert_eq!(state.payments.len().await, 3);
        let (status, body) = call(
            &app,
            Request::get("/payments/ws_CO_2").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");

        tokio::time::sleep(FINISHED_RETENTION).await;
        assert_eq!(state.payments.len().await, 0);
        assert_eq!(gateway.query_count(), 3);
        let (status, _) = call(
            &app,
            Request::get("/payments/ws_CO_2").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
