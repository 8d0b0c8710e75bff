//! Divpag (SuitPay-compatible) PIX gateway client
//!
//! Charges and payouts are form-encoded POSTs authenticated with the client
//! credentials in the body; the status consult is a GET authenticated with
//! `ci`/`cs` headers. Every request is bounded by the configured timeout.

use async_trait::async_trait;
use bigdecimal::{BigDecimal, Zero};
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::error::GatewayError;
use super::provider::PaymentGateway;
use super::types::{
    only_digits, PayoutReceipt, PayoutRequest, ProviderStatus, QrCode, QrCodeRequest,
};
use crate::config::{AmountLimits, GatewayConfig};
use crate::logging::{mask_pix_key, mask_tax_id, redact_sensitive_data};
use crate::middleware::logging::log_external_call;

const DEPOSIT_DESCRIPTION: &str = "Depósito via PIX";

pub struct DivpagClient {
    http: reqwest::Client,
    config: GatewayConfig,
    deposit_limits: AmountLimits,
}

impl DivpagClient {
    pub fn new(config: GatewayConfig, deposit_limits: AmountLimits) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::Unavailable(format!("failed to build http client: {}", e)))?;

        Ok(Self {
            http,
            config,
            deposit_limits,
        })
    }

    fn transport_error(&self, err: reqwest::Error) -> GatewayError {
        GatewayError::from_transport(err, self.config.timeout)
    }
}

#[async_trait]
impl PaymentGateway for DivpagClient {
    fn name(&self) -> &'static str {
        "divpag"
    }

    async fn request_qr_code(&self, request: QrCodeRequest) -> Result<QrCode, GatewayError> {
        if !self.deposit_limits.contains(&request.amount) {
            return Err(GatewayError::Validation(format!(
                "amount {} must be between {} and {}",
                request.amount, self.deposit_limits.min, self.deposit_limits.max
            )));
        }
        let tax_id = only_digits(&request.tax_id);
        if tax_id.is_empty() {
            return Err(GatewayError::Validation("cpf is required".to_string()));
        }

        let url = self.config.endpoint("pix/qrcode");
        let form = vec![
            ("client_id", self.config.client_id.clone()),
            ("client_secret", self.config.client_secret.clone()),
            ("nome", request.payer_name.clone()),
            ("cpf", tax_id.clone()),
            ("valor", format_amount(&request.amount)),
            ("descricao", DEPOSIT_DESCRIPTION.to_string()),
            ("urlnoty", self.config.webhook_url.clone()),
        ];

        info!(
            user_id = request.user_id,
            amount = %request.amount,
            cpf = %mask_tax_id(&tax_id),
            "Requesting PIX QR code"
        );

        let response = log_external_call("divpag", "POST /pix/qrcode", async {
            self.http.post(&url).form(&form).send().await
        })
        .await
        .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.transport_error(e))?;

        if !status.is_success() {
            warn!(
                status = status.as_u16(),
                body = %redact_sensitive_data(&body),
                "QR code request failed"
            );
            return Err(GatewayError::Unavailable(format!(
                "qrcode request failed with HTTP {}",
                status.as_u16()
            )));
        }

        let json: Value = serde_json::from_str(&body)
            .map_err(|e| GatewayError::Unavailable(format!("malformed qrcode response: {}", e)))?;

        let transaction_id = value_as_string(json.get("transactionId"))
            .ok_or_else(|| GatewayError::Unavailable("qrcode response missing transactionId".to_string()))?;
        let external_id = value_as_string(json.get("external_id"))
            .ok_or_else(|| GatewayError::Unavailable("qrcode response missing external_id".to_string()))?;
        let payload = json.get("qrcode").and_then(|v| v.as_str()).map(str::to_string);

        info!(
            transaction_id = %transaction_id,
            external_id = %external_id,
            "PIX QR code created"
        );

        Ok(QrCode {
            external_id,
            transaction_id,
            payload,
        })
    }

    async fn request_payout(&self, request: PayoutRequest) -> Result<PayoutReceipt, GatewayError> {
        if request.amount <= BigDecimal::zero() {
            return Err(GatewayError::Validation("payout amount must be positive".to_string()));
        }
        if request.pix_key.trim().is_empty() {
            return Err(GatewayError::Validation("pix key is required".to_string()));
        }

        let url = self.config.endpoint("pix/payment");
        let form = vec![
            ("client_id", self.config.client_id.clone()),
            ("client_secret", self.config.client_secret.clone()),
            ("nome", self.config.sender_name.clone()),
            ("cpf", only_digits(&self.config.sender_tax_id)),
            ("valor", format_amount(&request.amount)),
            ("chave_pix", request.pix_key.clone()),
            ("typeKey", request.key_type.wire_value().to_string()),
            ("external_id", request.reference.clone()),
            ("urlnoty", self.config.webhook_url.clone()),
        ];

        info!(
            reference = %request.reference,
            amount = %request.amount,
            pix_key = %mask_pix_key(&request.pix_key),
            key_type = %request.key_type,
            "Requesting PIX payout"
        );

        let response = log_external_call("divpag", "POST /pix/payment", async {
            self.http.post(&url).form(&form).send().await
        })
        .await
        .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.transport_error(e))?;
        let json: Value = serde_json::from_str(&body).unwrap_or(Value::Null);

        debug!(
            status = status.as_u16(),
            body = %redact_sensitive_data(&body),
            "Payout response received"
        );

        if status.is_server_error() {
            return Err(GatewayError::Unavailable(format!(
                "payout request failed with HTTP {}",
                status.as_u16()
            )));
        }

        let provider_code = json.get("statusCode").and_then(value_as_i64);
        let message = json
            .get("message")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        if status != StatusCode::OK || provider_code != Some(200) {
            let reason = message.unwrap_or_else(|| {
                format!(
                    "HTTP {} with provider statusCode {}",
                    status.as_u16(),
                    provider_code.map(|c| c.to_string()).unwrap_or_else(|| "missing".to_string())
                )
            });
            warn!(reference = %request.reference, reason = %reason, "Payout rejected by gateway");
            return Err(GatewayError::Rejected(reason));
        }

        let external_id =
            value_as_string(json.get("external_id")).unwrap_or_else(|| request.reference.clone());
        let provider_tx_id = value_as_string(json.get("transactionId"));

        info!(
            reference = %request.reference,
            external_id = %external_id,
            provider_tx_id = ?provider_tx_id,
            "Payout accepted by gateway"
        );

        Ok(PayoutReceipt {
            external_id,
            provider_tx_id,
            message: message.unwrap_or_else(|| "Transferência processada".to_string()),
        })
    }

    async fn query_status(&self, external_id: &str) -> ProviderStatus {
        let url = self.config.endpoint("libs/consult/transaction_status");

        let result = self
            .http
            .get(&url)
            .query(&[("id", external_id)])
            .header("ci", &self.config.client_id)
            .header("cs", &self.config.client_secret)
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                warn!(external_id = %external_id, error = %e, "Status consult failed");
                return ProviderStatus::Unknown;
            }
        };

        if !response.status().is_success() {
            warn!(
                external_id = %external_id,
                status = response.status().as_u16(),
                "Status consult returned non-success"
            );
            return ProviderStatus::Unknown;
        }

        let json: Value = match response.json().await {
            Ok(json) => json,
            Err(e) => {
                warn!(external_id = %external_id, error = %e, "Status consult returned malformed body");
                return ProviderStatus::Unknown;
            }
        };

        match json.pointer("/data/status").and_then(|v| v.as_str()) {
            Some(raw) => {
                let status = ProviderStatus::from_provider(raw);
                debug!(external_id = %external_id, raw = %raw, status = %status, "Status consulted");
                status
            }
            None => {
                warn!(external_id = %external_id, "Status consult response has no data.status");
                ProviderStatus::Unknown
            }
        }
    }
}

fn format_amount(amount: &BigDecimal) -> String {
    amount.round(2).with_scale(2).to_string()
}

/// Provider ids arrive as strings or numbers.
fn value_as_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::str::FromStr;

    #[test]
    fn amounts_are_sent_with_two_decimals() {
        assert_eq!(format_amount(&BigDecimal::from(100)), "100.00");
        assert_eq!(format_amount(&BigDecimal::from_str("10.5").unwrap()), "10.50");
    }

    #[test]
    fn ids_accept_strings_and_numbers() {
        let body = json!({ "transactionId": 991, "external_id": " ext-1 ", "blank": "" });
        assert_eq!(value_as_string(body.get("transactionId")), Some("991".to_string()));
        assert_eq!(value_as_string(body.get("external_id")), Some("ext-1".to_string()));
        assert_eq!(value_as_string(body.get("blank")), None);
        assert_eq!(value_as_string(body.get("missing")), None);
    }

    #[test]
    fn status_codes_accept_strings_and_numbers() {
        assert_eq!(value_as_i64(&json!(200)), Some(200));
        assert_eq!(value_as_i64(&json!("200")), Some(200));
        assert_eq!(value_as_i64(&json!({})), None);
    }
}
