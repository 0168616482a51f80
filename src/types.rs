use serde::{Deserialize, Serialize};

/// Uniform response body returned by every dashboard endpoint.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Access token expiry, epoch milliseconds.
    #[serde(default)]
    pub expires: Option<i64>,
    /// Refresh token expiry, epoch milliseconds.
    #[serde(default)]
    pub refresh_expires: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Serialize)]
pub struct RefreshTokenRequest<'a> {
    pub refresh_token: &'a str,
}

pub(crate) fn default_token_type() -> String {
    "Bearer".to_string()
}
