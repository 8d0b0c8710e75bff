//! Tracing setup and log hygiene for the PIX backend.
//!
//! Production writes flattened JSON events; everything else gets the pretty
//! formatter with span close timings. The masking helpers exist so that PIX
//! keys, CPFs and gateway credentials never reach a log sink in clear text.

use std::env;
use std::sync::OnceLock;

use regex::Regex;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Output settings resolved from the process environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogProfile {
    pub deployment: String,
    pub json: bool,
    pub level: Level,
}

impl LogProfile {
    /// Reads `ENVIRONMENT` (or `ENV`) and an optional `LOG_FORMAT` override.
    pub fn from_env() -> Self {
        let deployment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("ENV"))
            .unwrap_or_default();
        Self::resolve(&deployment, env::var("LOG_FORMAT").ok().as_deref())
    }

    pub fn resolve(deployment: &str, format: Option<&str>) -> Self {
        let deployment = match deployment.to_ascii_lowercase().as_str() {
            "prod" | "production" => "production",
            "stage" | "staging" => "staging",
            _ => "development",
        };
        let json = match format.map(str::to_ascii_lowercase).as_deref() {
            Some("json") => true,
            Some(_) => false,
            None => deployment == "production",
        };
        let level = if deployment == "development" {
            Level::DEBUG
        } else {
            Level::INFO
        };

        Self {
            deployment: deployment.to_owned(),
            json,
            level,
        }
    }

    fn default_directives(&self) -> String {
        format!(
            "{crate_name}={level},tower_http=debug,axum=debug,sqlx=warn,hyper=warn,reqwest=warn",
            crate_name = env!("CARGO_CRATE_NAME"),
            level = self.level,
        )
    }
}

/// Install the global subscriber. `RUST_LOG` wins over the profile defaults.
///
/// A second call leaves the first subscriber in place.
pub fn init_tracing() {
    let profile = LogProfile::from_env();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(profile.default_directives()));

    let installed = if profile.json {
        let layer = fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(false)
            .with_file(false)
            .with_line_number(false)
            .with_filter(filter);
        tracing_subscriber::registry().with(layer).try_init()
    } else {
        let layer = fmt::layer()
            .pretty()
            .with_file(true)
            .with_line_number(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_filter(filter);
        tracing_subscriber::registry().with(layer).try_init()
    };

    if installed.is_ok() {
        tracing::info!(
            deployment = %profile.deployment,
            json = profile.json,
            "log subscriber installed"
        );
    }
}

/// Keep the first and last four characters of a PIX key.
///
/// ```
/// # use pixflow::logging::mask_pix_key;
/// assert_eq!(mask_pix_key("alice@example.com"), "alic....com");
/// assert_eq!(mask_pix_key("abc"), "****");
/// ```
pub fn mask_pix_key(key: &str) -> String {
    let key = key.trim();
    let len = key.chars().count();
    if len <= 8 {
        return "****".to_owned();
    }
    let head: String = key.chars().take(4).collect();
    let tail: String = key.chars().skip(len - 4).collect();
    format!("{head}...{tail}")
}

/// CPF or CNPJ reduced to its two check digits.
pub fn mask_tax_id(tax_id: &str) -> String {
    let digits: String = tax_id.chars().filter(char::is_ascii_digit).collect();
    match digits.len() {
        n if n < 4 => "***".to_owned(),
        n => format!("***-{}", &digits[n - 2..]),
    }
}

const SENSITIVE_FIELDS: &str = "client_secret|clientSecret|secret|password|token|api_key|authorization|cpf|chave_pix";

fn json_field_pattern() -> &'static Option<Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(&format!(r#""({SENSITIVE_FIELDS})"\s*:\s*"[^"]*""#)).ok())
}

fn form_field_pattern() -> &'static Option<Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(&format!(r"(^|&)({SENSITIVE_FIELDS})=[^&]*")).ok())
}

/// Blank out credential and personal fields in a JSON or form-encoded body.
pub fn redact_sensitive_data(text: &str) -> String {
    let mut out = text.to_owned();
    if let Some(json) = json_field_pattern() {
        out = json.replace_all(&out, r#""$1": "[REDACTED]""#).into_owned();
    }
    if let Some(form) = form_field_pattern() {
        out = form.replace_all(&out, "${1}${2}=[REDACTED]").into_owned();
    }
    out
}

/// Emit a ledger-relevant event under `event_type = "transaction"`.
///
/// ```no_run
/// # use pixflow::log_transaction;
/// log_transaction!(
///     event = "deposit_credited",
///     external_id = "ext-123",
///     user_id = 42,
///     amount = "100.00",
/// );
/// ```
#[macro_export]
macro_rules! log_transaction {
    ($($key:tt = $value:expr),* $(,)?) => {
        tracing::info!(
            event_type = "transaction",
            $($key = tracing::field::debug(&$value)),*
        );
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_follows_deployment() {
        let prod = LogProfile::resolve("PROD", None);
        assert_eq!(prod.deployment, "production");
        assert!(prod.json);
        assert_eq!(prod.level, Level::INFO);

        let stage = LogProfile::resolve("stage", None);
        assert_eq!(stage.deployment, "staging");
        assert!(!stage.json);

        let dev = LogProfile::resolve("", None);
        assert_eq!(dev.deployment, "development");
        assert_eq!(dev.level, Level::DEBUG);
    }

    #[test]
    fn log_format_overrides_profile() {
        assert!(LogProfile::resolve("development", Some("JSON")).json);
        assert!(!LogProfile::resolve("production", Some("pretty")).json);
    }

    #[test]
    fn pix_keys_keep_both_ends() {
        assert_eq!(mask_pix_key("+5511999998888"), "+551...8888");
        assert_eq!(mask_pix_key(" 12345678 "), "****");
    }

    #[test]
    fn tax_ids_keep_check_digits() {
        assert_eq!(mask_tax_id("123.456.789-01"), "***-01");
        assert_eq!(mask_tax_id("11.222.333/0001-44"), "***-44");
        assert_eq!(mask_tax_id("12"), "***");
    }

    #[test]
    fn redaction_covers_json_bodies() {
        let body = r#"{"client_secret": "s3cr3t", "cpf":"12345678901", "amount": 100}"#;
        let clean = redact_sensitive_data(body);
        assert!(!clean.contains("s3cr3t"));
        assert!(!clean.contains("12345678901"));
        assert!(clean.contains(r#""cpf": "[REDACTED]""#));
        assert!(clean.contains("100"));
    }

    #[test]
    fn redaction_covers_form_bodies() {
        let body = "client_id=abc&client_secret=s3cr3t&valor=10.00";
        assert_eq!(
            redact_sensitive_data(body),
            "client_id=abc&client_secret=[REDACTED]&valor=10.00"
        );
    }
}
