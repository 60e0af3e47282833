use axum::http::HeaderMap;
use axum_extra::headers::{self, HeaderMapExt};
use base64::{Engine, prelude::BASE64_STANDARD};
use time::{OffsetDateTime, format_description::BorrowedFormatItem, macros::format_description};

use crate::gateway::error::AuthError;

/// Daraja expects `YYYYMMDDHHmmss`
const TIMESTAMP_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year][month][day][hour][minute][second]");

/// Headers for the client credentials exchange
pub fn basic_headers(consumer_key: &str, consumer_secret: &str) -> HeaderMap {
    let mut map = HeaderMap::new();
    map.typed_insert(headers::Authorization::basic(consumer_key, consumer_secret));
    map
}

/// Headers for push and query requests
pub fn authenticated_headers(access_token: &str) -> Result<HeaderMap, AuthError> {
    let bearer =
        headers::Authorization::bearer(access_token).map_err(|_| AuthError::InvalidToken)?;
    let mut map = HeaderMap::new();
    map.typed_insert(bearer);
    map.typed_insert(headers::ContentType::json());
    Ok(map)
}

/// Signed part of every push/query payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StkPassword {
    pub password: String,
    pub timestamp: String,
}

impl StkPassword {
    pub fn now(short_code: &str, passkey: &str) -> Result<Self, time::error::Format> {
        Self::at(short_code, passkey, OffsetDateTime::now_utc())
    }

    pub fn at(
        short_code: &str,
        passkey: &str,
        at: OffsetDateTime,
    ) -> Result<Self, time::error::Format> {
        let timestamp = at.format(TIMESTAMP_FORMAT)?;
        let password = BASE64_STANDARD.encode(format!("{short_code}{passkey}{timestamp}"));
        Ok(Self {
            password,
            timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
    use base64::{Engine, prelude::BASE64_STANDARD};
    use time::macros::datetime;

    use super::{StkPassword, authenticated_headers, basic_headers};

    #[test]
    fn password_is_signed_with_timestamp() {
        let password = StkPassword::at("174379", "passkey", datetime!(2024-03-07 09:05:01 UTC))
            .unwrap();
        assert_eq!(password.timestamp, "20240307090501");
        let decoded = BASE64_STANDARD.decode(&password.password).unwrap();
        assert_eq!(decoded, b"174379passkey20240307090501");
    }

    #[test]
    fn basic_credentials() {
        let headers = basic_headers("key", "secret");
        let expected = format!("Basic {}", BASE64_STANDARD.encode("key:secret"));
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), expected.as_str());
    }

    #[test]
    fn bearer_credentials() {
        let headers = authenticated_headers("abc123").unwrap();
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer abc123");
        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "application/json");
        assert!(authenticated_headers("bad\ntoken").is_err());
    }
}
