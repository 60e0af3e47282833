use serde::{Deserialize, Serialize};

use crate::gateway::{
    MpesaGateway, Result, auth,
    error::GatewayError,
};

/// `ResultDesc` Daraja sends for a completed payment
pub const SUCCESS_SENTINEL: &str = "The service request is processed successfully.";

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StkQueryRequest<'a> {
    pub business_short_code: &'a str,
    pub password: &'a str,
    pub timestamp: &'a str,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: &'a str,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StkQueryResponse {
    #[serde(default)]
    pub response_code: String,
    #[serde(default)]
    pub response_description: String,
    #[serde(rename = "MerchantRequestID", default)]
    pub merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    #[serde(default)]
    pub result_code: ResultCode,
    #[serde(default)]
    pub result_desc: String,
}

/// Daraja sends result codes as strings in query responses and as numbers in callbacks
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResultCode {
    Text(String),
    Number(i64),
    #[default]
    Absent,
}

impl ResultCode {
    pub fn as_code(&self) -> Option<String> {
        match self {
            ResultCode::Text(code) if !code.trim().is_empty() => Some(code.trim().to_string()),
            ResultCode::Text(_) | ResultCode::Absent => None,
            ResultCode::Number(code) => Some(code.to_string()),
        }
    }
}

/// Payment state decoded from a provider result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Prompt is still on the payer's phone
    Pending,
    Success,
    CancelledByUser,
    /// Payer could not be reached or did not answer in time
    Timeout,
    InsufficientFunds,
    InvalidPin,
    Failed { code: String },
}

impl TransactionStatus {
    pub fn from_result(code: Option<&str>, description: &str) -> Self {
        match code {
            None if description.trim() == SUCCESS_SENTINEL => Self::Success,
            None => Self::Pending,
            Some("0") => Self::Success,
            Some("1032") => Self::CancelledByUser,
            Some("1037") | Some("1019") => Self::Timeout,
            Some("1") => Self::InsufficientFunds,
            Some("2001") => Self::InvalidPin,
            Some(other) => Self::Failed {
                code: other.to_string(),
            },
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Outcome of one status query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    pub result_description: String,
    pub status: TransactionStatus,
    pub raw: serde_json::Value,
}

impl StatusReport {
    pub fn pending(description: impl Into<String>) -> Self {
        Self {
            result_description: description.into(),
            status: TransactionStatus::Pending,
            raw: serde_json::Value::Null,
        }
    }
}

impl From<(StkQueryResponse, serde_json::Value)> for StatusReport {
    fn from((response, raw): (StkQueryResponse, serde_json::Value)) -> Self {
        let code = response.result_code.as_code();
        Self {
            status: TransactionStatus::from_result(code.as_deref(), &response.result_desc),
            result_description: response.result_desc,
            raw,
        }
    }
}

impl MpesaGateway {
    pub const QUERY_PATH: &str = "/mpesa/stkpushquery/v1/query";

    pub async fn stk_query(&self, checkout_request_id: &str) -> Result<StatusReport> {
        let token = self.access_token().await?;
        let headers = auth::authenticated_headers(&token)?;
        let password = auth::StkPassword::now(&self.config.short_code, &self.config.passkey)?;
        let request = StkQueryRequest {
            business_short_code: &self.config.short_code,
            password: &password.password,
            timestamp: &password.timestamp,
            checkout_request_id,
        };

        let (status, response) = self.post(Self::QUERY_PATH, headers, &request).await?;
        match super::decode::<StkQueryResponse>(status, response.clone())? {
            Ok(query) => Ok((query, response).into()),
            Err(e) if e.is_still_processing() => {
                tracing::debug!(%checkout_request_id, "Payment is still being processed");
                Ok(StatusReport {
                    raw: response,
                    ..StatusReport::pending(e.error_message)
                })
            }
            Err(e) => Err(GatewayError::from(e)),
        }
    }
}
