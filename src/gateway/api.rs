use axum::{Json, extract::State, routing::post};
use reqwest::StatusCode;
use serde_json::json;
use tracing::instrument;

use crate::{
    gateway::{self, mask},
    payment::registry::Payments,
    state::AppState,
};

/// Receives the STK callback Daraja posts to `CallBackURL`
#[instrument(skip_all)]
async fn callback_handler(
    State(payments): State<Payments>,
    axum::Json(callback): Json<serde_json::Value>,
) -> (StatusCode, Json<serde_json::Value>) {
    tracing::trace!(
        data = %mask::secure_value(&callback),
        "Received callback from M-Pesa"
    );
    let Ok(envelope) = serde_json::from_value::<gateway::callback::CallbackEnvelope>(callback)
    else {
        tracing::warn!("Failed to deserialize callback body");
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"ResultCode": 1, "ResultDesc": "Rejected"})),
        );
    };
    let callback = envelope.body.stk_callback;
    let result = callback.result();
    tracing::info!(
        checkout_request_id = %callback.checkout_request_id,
        status = ?result.status,
        "M-Pesa reported payment result"
    );

    match payments
        .record_callback(&callback.checkout_request_id, result)
        .await
    {
        Some(Ok(())) => {}
        Some(Err(e)) => tracing::warn!("Callback was not applied to the payment session: {e}"),
        None => tracing::warn!(
            checkout_request_id = %callback.checkout_request_id,
            "Callback does not match any hosted payment yet, keeping it"
        ),
    }
    (
        StatusCode::OK,
        Json(json!({"ResultCode": 0, "ResultDesc": "Accepted"})),
    )
}

pub fn router() -> axum::Router<AppState> {
    axum::Router::new().route("/callback", post(callback_handler))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use rust_decimal_macros::dec;
    use serde_json::json;
    use tower::ServiceExt;

    use crate::{
        gateway::StkGateway, payment::view::PaymentView, state::AppState,
        testing::ScriptedGateway,
    };

    fn callback(body: serde_json::Value) -> Request<Body> {
        Request::post("/callback")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn records_receipt_on_hosted_payment() {
        let gateway: Arc<dyn StkGateway> = Arc::new(ScriptedGateway::default());
        let state = AppState::new(gateway.clone());
        let mut view = PaymentView::new(gateway, dec!(10), Arc::new(|_: bool| {}));
        view.set_phone_number("0712345678");
        let checkout_request_id = view.submit().await.unwrap();
        state.payments.insert(checkout_request_id.clone(), view).await;

        let app = super::router().with_state(state.clone());
        let response = app
            .oneshot(callback(json!({
                "Body": {"stkCallback": {
                    "MerchantRequestID": "29115-34620561-1",
                    "CheckoutRequestID": checkout_request_id,
                    "ResultCode": 0,
                    "ResultDesc": "The service request is processed successfully.",
                    "CallbackMetadata": {"Item": [
                        {"Name": "MpesaReceiptNumber", "Value": "NLJ7RT61SV"},
                        {"Name": "PhoneNumber", "Value": 254712345678u64}
                    ]}
                }}
            })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let session = state.payments.snapshot(&checkout_request_id).await.unwrap();
        assert_eq!(session.receipt.as_deref(), Some("NLJ7RT61SV"));
    }

    #[tokio::test]
    async fn unknown_checkout_is_acknowledged() {
        let state = AppState::new(Arc::new(ScriptedGateway::default()));
        let app = super::router().with_state(state);
        let response = app
            .clone()
            .oneshot(callback(json!({
                "Body": {"stkCallback": {
                    "MerchantRequestID": "1",
                    "CheckoutRequestID": "ws_CO_unknown",
                    "ResultCode": 1032,
                    "ResultDesc": "Request cancelled by user."
                }}
            })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(callback(json!({"unexpected": true})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn callback_before_hosting_is_kept() {
        let gateway: Arc<dyn StkGateway> = Arc::new(ScriptedGateway::default());
        let state = AppState::new(gateway.clone());
        let app = super::router().with_state(state.clone());
        let response = app
            .oneshot(callback(json!({
                "Body": {"stkCallback": {
                    "MerchantRequestID": "29115-34620561-1",
                    "CheckoutRequestID": "ws_CO_1",
                    "ResultCode": 0,
                    "ResultDesc": "The service request is processed successfully.",
                    "CallbackMetadata": {"Item": [
                        {"Name": "MpesaReceiptNumber", "Value": "NLJ7RT61SV"}
                    ]}
                }}
            })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let mut view = PaymentView::new(gateway, dec!(10), Arc::new(|_: bool| {}));
        view.set_phone_number("0712345678");
        let checkout_request_id = view.submit().await.unwrap();
        assert_eq!(checkout_request_id, "ws_CO_1");
        state.payments.insert(checkout_request_id.clone(), view).await;

        let session = state.payments.snapshot(&checkout_request_id).await.unwrap();
        assert_eq!(session.receipt.as_deref(), Some("NLJ7RT61SV"));
    }
}
