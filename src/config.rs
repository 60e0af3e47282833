use std::fmt::Display;

/// Daraja deployment the client talks to
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum MpesaEnvironment {
    #[default]
    Sandbox,
    Production,
}

impl MpesaEnvironment {
    pub fn base_url(self) -> &'static str {
        match self {
            Self::Sandbox => "https://sandbox.safaricom.co.ke",
            Self::Production => "https://api.safaricom.co.ke",
        }
    }
}

impl std::str::FromStr for MpesaEnvironment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sandbox" => Ok(Self::Sandbox),
            "production" | "live" => Ok(Self::Production),
            _ => Err(ConfigError::Invalid {
                key: "MPESA_ENVIRONMENT",
                value: s.to_string(),
            }),
        }
    }
}

/// Credentials and endpoints of the M-Pesa gateway client.
///
/// Constructed once and handed to [crate::gateway::MpesaGateway::new]; the client never reads
/// the process environment on its own.
#[derive(Clone)]
pub struct MpesaConfig {
    pub base_url: String,
    pub consumer_key: String,
    pub consumer_secret: String,
    pub short_code: String,
    pub passkey: String,
    pub callback_url: String,
}

impl std::fmt::Debug for MpesaConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MpesaConfig")
            .field("base_url", &self.base_url)
            .field("consumer_key", &self.consumer_key)
            .field("consumer_secret", &"***")
            .field("short_code", &self.short_code)
            .field("passkey", &"***")
            .field("callback_url", &self.callback_url)
            .finish()
    }
}

impl MpesaConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |key: &'static str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(key))
        };

        let environment = match lookup("MPESA_ENVIRONMENT") {
            Some(env) => env.parse()?,
            None => {
                tracing::warn!("MPESA_ENVIRONMENT is not defined, using sandbox");
                MpesaEnvironment::default()
            }
        };
        let base_url = lookup("MPESA_API_URL")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| environment.base_url().to_string());

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            consumer_key: required("MPESA_CONSUMER_KEY")?,
            consumer_secret: required("MPESA_CONSUMER_SECRET")?,
            short_code: required("MPESA_BUSINESS_SHORT_CODE")?,
            passkey: required("MPESA_PASSKEY")?,
            callback_url: required("MPESA_CALLBACK_URL")?,
        })
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid { key: &'static str, value: String },
}

impl std::error::Error for ConfigError {}

impl Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "{key} is not defined"),
            ConfigError::Invalid { key, value } => write!(f, "{key} has invalid value {value:?}"),
        }
    }
}
