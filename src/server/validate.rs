// Request gatekeeping — API-key check and fail-fast JSON field validation.

use axum::http::HeaderMap;
use serde_json::Value;

use crate::config::{GatewayConfig, API_KEY_HEADER};
use crate::error::{Error, Result};

pub struct RequestValidator {
    enabled: bool,
    api_keys: Vec<String>,
}

impl RequestValidator {
    pub fn new(enabled: bool, api_keys: Vec<String>) -> Self {
        Self { enabled, api_keys }
    }

    pub fn from_config(config: &GatewayConfig) -> Self {
        Self::new(config.auth, config.api_key_list())
    }

    /// Pass when auth is off; otherwise `X-API-Key` must be in the allow-list.
    pub fn authorize(&self, headers: &HeaderMap) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let provided = headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();

        if provided.is_empty() || !self.api_keys.iter().any(|k| k == provided) {
            return Err(Error::Auth);
        }
        Ok(())
    }
}

/// Parse a request body that must be a non-empty JSON object.
pub fn parse_body(body: &[u8]) -> Result<Value> {
    let no_data = || Error::Validation("No JSON data provided".to_string());
    let value: Value = serde_json::from_slice(body).map_err(|_| no_data())?;
    match &value {
        Value::Object(map) if !map.is_empty() => Ok(value),
        _ => Err(no_data()),
    }
}

/// Only non-empty strings and numbers count as present, matching what
/// [`field_str`] can read. Null, booleans, arrays and objects are missing.
fn is_present(value: Option<&Value>) -> bool {
    match value {
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Number(_)) => true,
        _ => false,
    }
}

/// Fail on the first missing field, in the order given.
pub fn require_fields(body: &Value, names: &[&str]) -> Result<()> {
    for name in names {
        if !is_present(body.get(*name)) {
            return Err(Error::missing_field(name));
        }
    }
    Ok(())
}

/// Read a field as text; numbers are rendered in decimal.
pub fn field_str(body: &Value, name: &str) -> Option<String> {
    match body.get(name)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// `titlefix` is on when sent as `"on"` or `true`.
pub fn flag_on(body: &Value, name: &str) -> bool {
    match body.get(name) {
        Some(Value::String(s)) => s.eq_ignore_ascii_case("on"),
        Some(Value::Bool(b)) => *b,
        _ => false,
    }
}
