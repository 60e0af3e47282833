use std::fmt::Display;

use serde::de::Error;

/// Error payload Daraja returns for rejected requests
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ErrorResponse {
    #[serde(rename = "requestId", default)]
    pub request_id: String,
    #[serde(rename = "errorCode")]
    pub error_code: String,
    #[serde(rename = "errorMessage")]
    pub error_message: String,
}

impl ErrorResponse {
    /// Query answer for a push the payer has not acted on yet
    pub const STILL_PROCESSING: &str = "500.001.1001";

    pub fn is_still_processing(&self) -> bool {
        self.error_code == Self::STILL_PROCESSING
    }
}

/// Failure of the client credentials exchange
#[derive(Debug)]
pub enum AuthError {
    RequestError(reqwest::Error),
    Rejected { status: u16, body: String },
    InvalidToken,
}

impl std::error::Error for AuthError {}

impl Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::RequestError(e) => write!(f, "token request error: {e}"),
            AuthError::Rejected { status, body } => {
                write!(f, "token request rejected with status {status}: {body}")
            }
            AuthError::InvalidToken => f.write_str("token endpoint returned an unusable token"),
        }
    }
}

#[derive(Debug)]
pub enum GatewayError {
    Auth(AuthError),
    RequestError(reqwest::Error),
    GatewayResponse(ErrorResponse),
    /// Push accepted by HTTP but refused by the provider
    Declined {
        code: String,
        description: String,
    },
    UnexpectedStatus {
        status: u16,
    },
    GatewayDeserialization(serde_json::Error),
    Timestamp(time::error::Format),
}

impl GatewayError {
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }
}

impl From<AuthError> for GatewayError {
    fn from(value: AuthError) -> Self {
        Self::Auth(value)
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_decode() {
            return Self::GatewayDeserialization(serde_json::Error::custom(
                "failed to decode response body",
            ));
        }
        Self::RequestError(value)
    }
}

impl From<ErrorResponse> for GatewayError {
    fn from(value: ErrorResponse) -> Self {
        Self::GatewayResponse(value)
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(value: serde_json::Error) -> Self {
        Self::GatewayDeserialization(value)
    }
}

impl From<time::error::Format> for GatewayError {
    fn from(value: time::error::Format) -> Self {
        Self::Timestamp(value)
    }
}

impl std::error::Error for GatewayError {}

impl Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatewayError::Auth(e) => write!(f, "authentication failed: {e}"),
            GatewayError::RequestError(e) => write!(f, "http request error: {e}"),
            GatewayError::GatewayResponse(error_response) => {
                write!(
                    f,
                    "gateway response: {} ({})",
                    error_response.error_message, error_response.error_code
                )
            }
            GatewayError::Declined { code, description } => {
                write!(f, "gateway declined the request: {description} ({code})")
            }
            GatewayError::UnexpectedStatus { status } => {
                write!(f, "gateway responded with status {status}")
            }
            GatewayError::GatewayDeserialization(e) => {
                write!(f, "gateway response deserialization: {e}")
            }
            GatewayError::Timestamp(e) => write!(f, "failed to format request timestamp: {e}"),
        }
    }
}
