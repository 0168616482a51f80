use reqwest::{Method, StatusCode};
use serde_json::Value;

use crate::errors::Error;
use crate::types::Envelope;

use super::transport::RawResponse;

/// Unwraps `{code, message, data}`, resolving to `data` when `code` is the success code.
pub fn unwrap_envelope(body: &str, success_code: i64) -> Result<Value, Error> {
    let envelope: Envelope = serde_json::from_str(body)?;
    if envelope.code == success_code {
        Ok(envelope.data)
    } else {
        Err(Error::Business {
            code: envelope.code,
            message: envelope.message,
        })
    }
}

/// Normalizes a 2xx response. `204` on PUT/PATCH/DELETE carries no envelope.
pub fn normalize(method: &Method, raw: RawResponse, success_code: i64) -> Result<Value, Error> {
    if is_empty_ack(method, &raw) {
        return Ok(Value::Null);
    }
    unwrap_envelope(&raw.body, success_code)
}

/// The envelope exactly as sent, with no `code` check.
pub fn raw_envelope(method: &Method, raw: RawResponse) -> Result<Value, Error> {
    if is_empty_ack(method, &raw) {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(&raw.body)?)
}

fn is_empty_ack(method: &Method, raw: &RawResponse) -> bool {
    raw.status == StatusCode::NO_CONTENT
        && matches!(*method, Method::PUT | Method::PATCH | Method::DELETE)
}
