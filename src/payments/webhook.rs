//! Divpag webhook normalization
//!
//! The provider posts loosely shaped JSON: fields are sometimes wrapped in a
//! `requestBody` object and status codes arrive as numbers or strings. Every
//! payload is normalized here into a tagged [`WebhookEvent`] before the
//! reconciliation engine sees it.

use bigdecimal::BigDecimal;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::Sha256;
use std::str::FromStr;

use super::types::ProviderStatus;

pub const SIGNATURE_HEADER: &str = "x-divpag-signature";

const DEPOSIT_KIND: &str = "RECEIVEPIX";
const PAYOUT_KIND: &str = "PAYMENT";
const PAYOUT_CONFIRMED_STATUS_ID: i64 = 1;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WebhookError {
    #[error("webhook payload is empty")]
    EmptyPayload,

    #[error("webhook payload is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("unknown webhook transaction type '{0}'")]
    UnknownTransactionType(String),

    #[error("webhook payload is missing '{0}'")]
    MissingField(&'static str),

    #[error("webhook field '{field}' is invalid: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

impl WebhookError {
    /// Payloads that can never be processed, as opposed to recognized
    /// payloads carrying bad data.
    pub fn is_unreadable(&self) -> bool {
        matches!(self, WebhookError::EmptyPayload | WebhookError::InvalidJson(_))
    }
}

/// Inbound PIX payment notification (`RECEIVEPIX`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepositNotification {
    pub external_id: String,
    pub status: ProviderStatus,
    pub raw_status: String,
    pub amount: Option<BigDecimal>,
}

/// Outbound transfer notification (`PAYMENT`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutNotification {
    pub external_id: String,
    pub transaction_id: Option<String>,
    pub status_id: i64,
}

impl PayoutNotification {
    pub fn is_confirmed(&self) -> bool {
        self.status_id == PAYOUT_CONFIRMED_STATUS_ID
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WebhookEvent {
    Deposit(DepositNotification),
    Payout(PayoutNotification),
}

impl WebhookEvent {
    pub fn external_id(&self) -> &str {
        match self {
            WebhookEvent::Deposit(n) => &n.external_id,
            WebhookEvent::Payout(n) => &n.external_id,
        }
    }
}

/// Parse a raw request body. Empty bodies and empty JSON containers are
/// rejected the same way.
pub fn decode_body(body: &[u8]) -> Result<Value, WebhookError> {
    if body.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(WebhookError::EmptyPayload);
    }

    let value: Value =
        serde_json::from_slice(body).map_err(|e| WebhookError::InvalidJson(e.to_string()))?;

    let empty = match &value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    };
    if empty {
        return Err(WebhookError::EmptyPayload);
    }

    Ok(value)
}

/// Turn a decoded payload into a typed event.
pub fn normalize(payload: Value) -> Result<WebhookEvent, WebhookError> {
    let fields = unwrap_envelope(payload)?;

    let kind = match fields.get("transactionType") {
        Some(Value::String(kind)) => kind.trim().to_string(),
        Some(other) => {
            return Err(WebhookError::InvalidField {
                field: "transactionType",
                reason: format!("expected a string, got {}", other),
            })
        }
        None => return Err(WebhookError::MissingField("transactionType")),
    };

    match kind.as_str() {
        DEPOSIT_KIND => normalize_deposit(&fields).map(WebhookEvent::Deposit),
        PAYOUT_KIND => normalize_payout(&fields).map(WebhookEvent::Payout),
        _ => Err(WebhookError::UnknownTransactionType(kind)),
    }
}

fn unwrap_envelope(payload: Value) -> Result<Map<String, Value>, WebhookError> {
    let mut fields = match payload {
        Value::Object(map) => map,
        other => {
            return Err(WebhookError::InvalidField {
                field: "body",
                reason: format!("expected an object, got {}", type_name(&other)),
            })
        }
    };

    match fields.remove("requestBody") {
        Some(Value::Object(inner)) => Ok(inner),
        Some(other) => Err(WebhookError::InvalidField {
            field: "requestBody",
            reason: format!("expected an object, got {}", type_name(&other)),
        }),
        None => Ok(fields),
    }
}

fn normalize_deposit(fields: &Map<String, Value>) -> Result<DepositNotification, WebhookError> {
    let external_id = required_id(fields, "external_id")?;
    let raw_status = match fields.get("status") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(Value::String(_)) | None => return Err(WebhookError::MissingField("status")),
        Some(other) => {
            return Err(WebhookError::InvalidField {
                field: "status",
                reason: format!("expected a string, got {}", type_name(other)),
            })
        }
    };

    let amount = match fields.get("amount") {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) => Some(parse_amount(&n.to_string())?),
        Some(Value::String(s)) => Some(parse_amount(s)?),
        Some(other) => {
            return Err(WebhookError::InvalidField {
                field: "amount",
                reason: format!("expected a number, got {}", type_name(other)),
            })
        }
    };

    Ok(DepositNotification {
        external_id,
        status: ProviderStatus::from_provider(&raw_status),
        raw_status,
        amount,
    })
}

fn normalize_payout(fields: &Map<String, Value>) -> Result<PayoutNotification, WebhookError> {
    let external_id = required_id(fields, "external_id")?;
    let transaction_id = optional_id(fields.get("transactionId"));

    let status_value = fields
        .get("statusCode")
        .and_then(|code| code.get("statusId"))
        .ok_or(WebhookError::MissingField("statusCode.statusId"))?;

    let status_id = match status_value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
    .ok_or_else(|| WebhookError::InvalidField {
        field: "statusCode.statusId",
        reason: format!("expected an integer, got {}", status_value),
    })?;

    Ok(PayoutNotification {
        external_id,
        transaction_id,
        status_id,
    })
}

fn required_id(fields: &Map<String, Value>, field: &'static str) -> Result<String, WebhookError> {
    optional_id(fields.get(field)).ok_or(WebhookError::MissingField(field))
}

fn optional_id(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_amount(raw: &str) -> Result<BigDecimal, WebhookError> {
    BigDecimal::from_str(raw.trim()).map_err(|e| WebhookError::InvalidField {
        field: "amount",
        reason: e.to_string(),
    })
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ----------------------------------------------------------------------------
// Signatures
// ----------------------------------------------------------------------------

type HmacSha256 = Hmac<Sha256>;

/// Hex HMAC-SHA256 of the raw body.
pub fn sign(secret: &str, body: &[u8]) -> String {
    // HMAC accepts keys of any length
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time check of a hex signature against the raw body.
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let expected = match hex::decode(signature.trim()) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_bodies_are_rejected() {
        assert_eq!(decode_body(b""), Err(WebhookError::EmptyPayload));
        assert_eq!(decode_body(b"  \n"), Err(WebhookError::EmptyPayload));
        assert_eq!(decode_body(b"{}"), Err(WebhookError::EmptyPayload));
        assert_eq!(decode_body(b"null"), Err(WebhookError::EmptyPayload));
        assert!(matches!(decode_body(b"{not json"), Err(WebhookError::InvalidJson(_))));
    }

    #[test]
    fn deposit_event_is_normalized() {
        let event = normalize(json!({
            "transactionType": "RECEIVEPIX",
            "external_id": "ext-1",
            "status": "PAID",
            "amount": 100.5
        }))
        .unwrap();

        match event {
            WebhookEvent::Deposit(n) => {
                assert_eq!(n.external_id, "ext-1");
                assert_eq!(n.status, ProviderStatus::Paid);
                assert_eq!(n.amount, Some(BigDecimal::from_str("100.5").unwrap()));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn request_body_wrapper_is_unwrapped() {
        let event = normalize(json!({
            "requestBody": {
                "transactionType": "RECEIVEPIX",
                "external_id": "ext-2",
                "status": "PAID"
            }
        }))
        .unwrap();
        assert_eq!(event.external_id(), "ext-2");
    }

    #[test]
    fn payout_status_id_accepts_strings_and_numbers() {
        for status_id in [json!(1), json!("1")] {
            let event = normalize(json!({
                "transactionType": "PAYMENT",
                "transactionId": 555,
                "external_id": "wd-1",
                "statusCode": { "statusId": status_id }
            }))
            .unwrap();

            match event {
                WebhookEvent::Payout(n) => {
                    assert!(n.is_confirmed());
                    assert_eq!(n.transaction_id.as_deref(), Some("555"));
                }
                other => panic!("unexpected event {:?}", other),
            }
        }
    }

    #[test]
    fn unrecognized_shapes_are_typed_errors() {
        assert_eq!(
            normalize(json!({ "transactionType": "REFUND", "external_id": "x" })),
            Err(WebhookError::UnknownTransactionType("REFUND".to_string()))
        );
        assert_eq!(
            normalize(json!({ "external_id": "x" })),
            Err(WebhookError::MissingField("transactionType"))
        );
        assert_eq!(
            normalize(json!({ "transactionType": "RECEIVEPIX", "status": "PAID" })),
            Err(WebhookError::MissingField("external_id"))
        );
        assert!(matches!(
            normalize(json!({
                "transactionType": "PAYMENT",
                "external_id": "wd-1",
                "statusCode": { "statusId": "done" }
            })),
            Err(WebhookError::InvalidField { field: "statusCode.statusId", .. })
        ));
    }

    #[test]
    fn signature_round_trip() {
        let body = br#"{"transactionType":"RECEIVEPIX"}"#;
        let signature = sign("whsec", body);
        assert!(verify_signature("whsec", body, &signature));
        assert!(!verify_signature("other", body, &signature));
        assert!(!verify_signature("whsec", body, "zz"));
    }
}
