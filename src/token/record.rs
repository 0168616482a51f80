use std::collections::HashSet;

use jiff::Timestamp;
use serde::Deserialize;

use crate::errors::Error;
use crate::types::{TokenResponse, default_token_type};

/// Metadata stored alongside the token pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenMeta {
    pub token_type: String,
    pub expires_at: Option<Timestamp>,
    pub refresh_expires_at: Option<Timestamp>,
}

impl Default for TokenMeta {
    fn default() -> Self {
        Self {
            token_type: default_token_type(),
            expires_at: None,
            refresh_expires_at: None,
        }
    }
}

impl TokenMeta {
    pub fn from_response(resp: &TokenResponse) -> Result<Self, Error> {
        Ok(Self {
            token_type: resp.token_type.clone(),
            expires_at: resp.expires.map(timestamp_from_millis).transpose()?,
            refresh_expires_at: resp.refresh_expires.map(timestamp_from_millis).transpose()?,
        })
    }
}

/// Snapshot of the credentials held by the token store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenRecord {
    pub access_token: String,
    pub refresh_token: String,
    pub meta: TokenMeta,
}

impl TokenRecord {
    pub fn new(access_token: String, refresh_token: String, meta: TokenMeta) -> Self {
        Self {
            access_token,
            refresh_token,
            meta,
        }
    }

    pub fn token_type(&self) -> &str {
        &self.meta.token_type
    }

    /// Value for the `Authorization` header.
    pub fn authorization(&self) -> String {
        format!("{} {}", self.meta.token_type, self.access_token)
    }

    /// Whether the access token is unusable at `now`.
    ///
    /// An explicit expiry wins; otherwise the `exp` claim is read when the token is a
    /// JWT. Opaque tokens without an expiry are assumed valid and left to the server.
    pub fn is_access_expired(&self, now: Timestamp) -> bool {
        if self.access_token.is_empty() {
            return true;
        }
        match self.meta.expires_at.or_else(|| jwt_expiry(&self.access_token)) {
            Some(expires_at) => now >= expires_at,
            None => false,
        }
    }

    pub fn is_refresh_expired(&self, now: Timestamp) -> bool {
        if self.refresh_token.is_empty() {
            return true;
        }
        self.meta
            .refresh_expires_at
            .is_some_and(|expires_at| now >= expires_at)
    }
}

pub(crate) fn timestamp_from_millis(ms: i64) -> Result<Timestamp, Error> {
    Timestamp::from_millisecond(ms)
        .map_err(|e| Error::Config(format!("token expiry {ms} out of range: {e}")))
}

#[derive(Deserialize)]
struct ExpiryClaim {
    exp: Option<i64>,
}

/// Reads the `exp` claim of a JWT without verifying its signature.
pub fn jwt_expiry(token: &str) -> Option<Timestamp> {
    let mut validation = jsonwebtoken::Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims = HashSet::new();
    let data = jsonwebtoken::decode::<ExpiryClaim>(
        token,
        &jsonwebtoken::DecodingKey::from_secret(&[]),
        &validation,
    )
    .ok()?;
    Timestamp::from_second(data.claims.exp?).ok()
}
