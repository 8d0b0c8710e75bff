use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of PIX key ("chave PIX") a payout is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixKeyType {
    #[serde(alias = "cpf", alias = "cnpj")]
    Document,
    Email,
    #[serde(alias = "phone_number", alias = "phoneNumber")]
    Phone,
    #[serde(alias = "random_key", alias = "randomKey", alias = "evp")]
    Random,
}

impl PixKeyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PixKeyType::Document => "document",
            PixKeyType::Email => "email",
            PixKeyType::Phone => "phone",
            PixKeyType::Random => "random",
        }
    }

    /// Value of the `typeKey` form field on the wire.
    pub fn wire_value(&self) -> &'static str {
        match self {
            PixKeyType::Document => "document",
            PixKeyType::Email => "email",
            PixKeyType::Phone => "phoneNumber",
            PixKeyType::Random => "randomKey",
        }
    }
}

impl fmt::Display for PixKeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PixKeyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "document" | "cpf" | "cnpj" => Ok(PixKeyType::Document),
            "email" => Ok(PixKeyType::Email),
            "phone" | "phonenumber" | "phone_number" => Ok(PixKeyType::Phone),
            "random" | "randomkey" | "random_key" | "evp" => Ok(PixKeyType::Random),
            other => Err(format!("unknown pix key type '{}'", other)),
        }
    }
}

/// Status of a charge as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProviderStatus {
    Paid,
    Pending,
    Failed,
    /// The provider could not be asked or answered something unrecognised.
    Unknown,
}

impl ProviderStatus {
    pub fn from_provider(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "PAID" | "PAID_OUT" | "APPROVED" => ProviderStatus::Paid,
            "PENDING" | "WAITING_PAYMENT" | "WAITING" | "CREATED" => ProviderStatus::Pending,
            "FAILED" | "CANCELED" | "CANCELLED" | "EXPIRED" | "REJECTED" => ProviderStatus::Failed,
            _ => ProviderStatus::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderStatus::Paid => "PAID",
            ProviderStatus::Pending => "PENDING",
            ProviderStatus::Failed => "FAILED",
            ProviderStatus::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ProviderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct QrCodeRequest {
    pub user_id: i64,
    pub payer_name: String,
    /// Payer CPF, any formatting
    pub tax_id: String,
    pub amount: BigDecimal,
}

/// A charge created at the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct QrCode {
    pub external_id: String,
    pub transaction_id: String,
    /// PIX copy-and-paste payload
    pub payload: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PayoutRequest {
    /// Our correlation reference, echoed back by the provider
    pub reference: String,
    pub pix_key: String,
    pub key_type: PixKeyType,
    pub amount: BigDecimal,
}

/// A payout accepted by the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct PayoutReceipt {
    pub external_id: String,
    pub provider_tx_id: Option<String>,
    pub message: String,
}

/// Keep only the digits of a document number.
pub fn only_digits(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_status_mapping() {
        assert_eq!(ProviderStatus::from_provider("PAID"), ProviderStatus::Paid);
        assert_eq!(ProviderStatus::from_provider("paid"), ProviderStatus::Paid);
        assert_eq!(ProviderStatus::from_provider("WAITING_PAYMENT"), ProviderStatus::Pending);
        assert_eq!(ProviderStatus::from_provider("CANCELED"), ProviderStatus::Failed);
        assert_eq!(ProviderStatus::from_provider("???"), ProviderStatus::Unknown);
    }

    #[test]
    fn pix_key_type_accepts_provider_spellings() {
        assert_eq!("cpf".parse::<PixKeyType>().unwrap(), PixKeyType::Document);
        assert_eq!("phoneNumber".parse::<PixKeyType>().unwrap(), PixKeyType::Phone);
        assert_eq!("EVP".parse::<PixKeyType>().unwrap(), PixKeyType::Random);
        assert!("iban".parse::<PixKeyType>().is_err());

        let parsed: PixKeyType = serde_json::from_str("\"randomKey\"").unwrap();
        assert_eq!(parsed, PixKeyType::Random);
        assert_eq!(PixKeyType::Phone.wire_value(), "phoneNumber");
    }

    #[test]
    fn only_digits_strips_cpf_formatting() {
        assert_eq!(only_digits("123.456.789-01"), "12345678901");
        assert_eq!(only_digits("abc"), "");
    }
}
