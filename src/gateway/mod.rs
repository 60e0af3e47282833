use axum::http::{HeaderMap, StatusCode};
use serde::{Serialize, de::DeserializeOwned};

use crate::{
    config::MpesaConfig,
    gateway::{
        auth::{StkPassword, authenticated_headers, basic_headers},
        error::{AuthError, ErrorResponse, GatewayError},
        stk::{StkPushRequest, StkPushResponse},
        status::StatusReport,
    },
    payment::PaymentRequest,
};

pub mod api;
pub mod auth;
/// Daraja STK callback payload
pub mod callback;
pub mod error;
/// Requisite masking
pub mod mask;
/// Daraja status query
pub mod status;
/// Daraja STK push
pub mod stk;

pub type Result<T> = std::result::Result<T, GatewayError>;

/// Daraja answers either with the expected body or with an [ErrorResponse]
#[derive(Debug, serde::Deserialize)]
pub enum DarajaResponse<T> {
    #[serde(untagged)]
    Ok(T),
    #[serde(untagged)]
    Err(ErrorResponse),
}

impl<T> DarajaResponse<T> {
    pub fn into_std_result(self) -> std::result::Result<T, ErrorResponse> {
        match self {
            DarajaResponse::Ok(ok) => Ok(ok),
            DarajaResponse::Err(e) => Err(e),
        }
    }
}

/// Decode a response body. Bodies of failed requests that match neither shape are reported by
/// their HTTP status.
fn decode<T: DeserializeOwned>(
    status: StatusCode,
    response: serde_json::Value,
) -> Result<std::result::Result<T, ErrorResponse>> {
    match serde_json::from_value::<DarajaResponse<T>>(response) {
        Ok(res) => Ok(res.into_std_result()),
        Err(_) if !status.is_success() => Err(GatewayError::UnexpectedStatus {
            status: status.as_u16(),
        }),
        Err(e) => Err(e.into()),
    }
}

#[derive(Debug, serde::Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Operations the payment session needs from a mobile-money provider
#[async_trait::async_trait]
pub trait StkGateway: Send + Sync + 'static {
    /// Send the payment prompt to the payer's phone
    async fn initiate(&self, request: &PaymentRequest) -> Result<StkPushResponse>;
    /// Ask for the outcome of a previously initiated prompt
    async fn query_status(&self, checkout_request_id: &str) -> Result<StatusReport>;
}

/// Safaricom Daraja client.
///
/// Every call exchanges credentials for a fresh access token; nothing but the connection pool is
/// kept between calls.
#[derive(Debug, Clone)]
pub struct MpesaGateway {
    client: reqwest::Client,
    config: MpesaConfig,
}

impl MpesaGateway {
    pub const TOKEN_PATH: &str = "/oauth/v1/generate?grant_type=client_credentials";
    pub const PUSH_PATH: &str = "/mpesa/stkpush/v1/processrequest";

    pub fn new(config: MpesaConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    pub fn with_client(client: reqwest::Client, config: MpesaConfig) -> Self {
        Self { client, config }
    }

    async fn access_token(&self) -> std::result::Result<String, AuthError> {
        let url = format!("{}{}", self.config.base_url, Self::TOKEN_PATH);
        tracing::debug!(%url, "Gateway API token request");
        let res = self
            .client
            .get(&url)
            .headers(basic_headers(
                &self.config.consumer_key,
                &self.config.consumer_secret,
            ))
            .send()
            .await
            .map_err(AuthError::RequestError)?;

        let status = res.status();
        if !status.is_success() {
            let body = match res.text().await {
                Ok(body) => body,
                Err(e) => {
                    tracing::warn!(%status, "Failed to read token rejection body: {e}");
                    String::new()
                }
            };
            tracing::warn!(%status, %body, "Gateway API token request rejected");
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        let token = res
            .json::<TokenResponse>()
            .await
            .map_err(AuthError::RequestError)?;
        if token.access_token.is_empty() {
            return Err(AuthError::InvalidToken);
        }
        Ok(token.access_token)
    }

    async fn post(
        &self,
        path: &str,
        headers: HeaderMap,
        request: &impl Serialize,
    ) -> Result<(StatusCode, serde_json::Value)> {
        let secured_request = mask::secure_serializable(request);
        let url = format!("{}{}", self.config.base_url, path);
        tracing::debug!(%url, data = %secured_request, "Gateway API request");
        let res = self
            .client
            .post(&url)
            .json(request)
            .headers(headers)
            .send()
            .await?;
        let status = res.status();

        let body = res.bytes().await?;
        let response = match serde_json::from_slice::<serde_json::Value>(&body) {
            Ok(response) => response,
            Err(_) if !status.is_success() => {
                tracing::warn!(%status, "Gateway API responded with a non json body");
                return Err(GatewayError::UnexpectedStatus {
                    status: status.as_u16(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        tracing::debug!(
            data = %mask::secure_value(&response),
            %status,
            "Gateway API response"
        );
        Ok((status, response))
    }

    pub async fn stk_push(&self, request: &PaymentRequest) -> Result<StkPushResponse> {
        let token = self.access_token().await?;
        let headers = authenticated_headers(&token)?;
        let password = StkPassword::now(&self.config.short_code, &self.config.passkey)?;
        let phone_number = request.phone_number();
        let push = StkPushRequest {
            business_short_code: &self.config.short_code,
            password: &password.password,
            timestamp: &password.timestamp,
            transaction_type: stk::TRANSACTION_TYPE,
            amount: request.amount(),
            party_a: phone_number,
            party_b: &self.config.short_code,
            phone_number,
            callback_url: &self.config.callback_url,
            account_reference: request.account_reference(),
            transaction_desc: stk::TRANSACTION_DESC,
        };

        let (status, response) = self.post(Self::PUSH_PATH, headers, &push).await?;
        let push = decode::<StkPushResponse>(status, response)?.map_err(GatewayError::from)?;
        if !status.is_success() {
            return Err(GatewayError::UnexpectedStatus {
                status: status.as_u16(),
            });
        }
        if !push.is_accepted() {
            return Err(GatewayError::Declined {
                code: push.response_code,
                description: push.response_description,
            });
        }
        tracing::info!(checkout_request_id = %push.checkout_request_id, "Initiated STK push");
        Ok(push)
    }
}

#[async_trait::async_trait]
impl StkGateway for MpesaGateway {
    async fn initiate(&self, request: &PaymentRequest) -> Result<StkPushResponse> {
        self.stk_push(request).await
    }

    async fn query_status(&self, checkout_request_id: &str) -> Result<StatusReport> {
        self.stk_query(checkout_request_id).await
    }
}
