//! Configuration for the pixflow backend
//!
//! Process-level knobs (gateway credentials, worker cadence, server) are read
//! from environment variables with sensible defaults. Business rules that the
//! ledger depends on live in [`PlatformSettings`], layered from an optional
//! `config/platform.toml` under `PLATFORM_*` variables.

use bigdecimal::{BigDecimal, Zero};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("failed to load platform settings: {0}")]
    Load(#[from] config::ConfigError),
}

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

/// Credentials and endpoints for the Divpag PIX gateway.
#[derive(Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
    /// Public URL the gateway calls back for deposits and payouts
    pub webhook_url: String,
    /// Hard bound on every outbound request
    pub timeout: Duration,
    /// Originating account for payouts
    pub sender_name: String,
    pub sender_tax_id: String,
    /// When set, inbound webhooks must carry a valid HMAC signature
    pub webhook_secret: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            webhook_url: String::new(),
            timeout: Duration::from_secs(30),
            sender_name: String::new(),
            sender_tax_id: String::new(),
            webhook_secret: None,
        }
    }
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("base_url", &self.base_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("webhook_url", &self.webhook_url)
            .field("timeout", &self.timeout)
            .field("sender_name", &self.sender_name)
            .field("webhook_secret", &self.webhook_secret.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        cfg.base_url = std::env::var("DIVPAG_BASE_URL").unwrap_or_default();
        cfg.client_id = std::env::var("DIVPAG_CLIENT_ID").unwrap_or_default();
        cfg.client_secret = std::env::var("DIVPAG_CLIENT_SECRET").unwrap_or_default();
        cfg.webhook_url = std::env::var("DIVPAG_WEBHOOK_URL").unwrap_or_default();
        cfg.timeout = Duration::from_secs(
            std::env::var("DIVPAG_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(cfg.timeout.as_secs()),
        );
        cfg.sender_name = std::env::var("DIVPAG_SENDER_NAME").unwrap_or_default();
        cfg.sender_tax_id = std::env::var("DIVPAG_SENDER_TAX_ID").unwrap_or_default();
        cfg.webhook_secret = std::env::var("DIVPAG_WEBHOOK_SECRET")
            .ok()
            .filter(|s| !s.trim().is_empty());

        cfg
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.is_empty() {
            return Err(ConfigError::Missing("DIVPAG_BASE_URL"));
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ConfigError::Invalid {
                key: "DIVPAG_BASE_URL",
                reason: "must be an http(s) URL".to_string(),
            });
        }
        if self.client_id.is_empty() {
            return Err(ConfigError::Missing("DIVPAG_CLIENT_ID"));
        }
        if self.client_secret.is_empty() {
            return Err(ConfigError::Missing("DIVPAG_CLIENT_SECRET"));
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::Invalid {
                key: "DIVPAG_TIMEOUT_SECS",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Join a gateway path onto the base URL, tolerating a trailing slash.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

// ---------------------------------------------------------------------------
// Reconciliation worker
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// How often the polling fallback wakes up
    pub poll_interval: Duration,
    /// Pending transactions older than this are no longer polled
    pub max_age: Duration,
    pub batch_size: i64,
    /// A payout claim older than this is considered abandoned
    pub payout_lock_timeout: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            max_age: Duration::from_secs(10 * 60),
            batch_size: 5,
            payout_lock_timeout: Duration::from_secs(60),
        }
    }
}

impl ReconcilerConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        cfg.poll_interval = Duration::from_secs(
            std::env::var("RECONCILER_POLL_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .filter(|secs| *secs > 0)
                .unwrap_or(cfg.poll_interval.as_secs()),
        );

        cfg.max_age = Duration::from_secs(
            std::env::var("RECONCILER_MAX_AGE_MINS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(|m| m * 60)
                .unwrap_or(cfg.max_age.as_secs()),
        );

        cfg.batch_size = std::env::var("RECONCILER_BATCH_SIZE")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(cfg.batch_size);

        cfg.payout_lock_timeout = Duration::from_secs(
            std::env::var("RECONCILER_PAYOUT_LOCK_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(cfg.payout_lock_timeout.as_secs()),
        );

        cfg
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub database_url: Option<String>,
    pub max_connections: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            database_url: None,
            max_connections: 5,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.port = std::env::var("SERVER_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(cfg.port);
        cfg.database_url = std::env::var("DATABASE_URL").ok().filter(|s| !s.is_empty());
        cfg.max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(cfg.max_connections);
        cfg
    }
}

// ---------------------------------------------------------------------------
// Platform settings
// ---------------------------------------------------------------------------

/// A VIP tier; crossing `threshold` accrued points credits `bonus` once.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct VipTier {
    pub name: String,
    pub threshold: BigDecimal,
    pub bonus: BigDecimal,
}

/// Inclusive amount bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct AmountLimits {
    pub min: BigDecimal,
    pub max: BigDecimal,
}

impl AmountLimits {
    pub fn contains(&self, amount: &BigDecimal) -> bool {
        amount >= &self.min && amount <= &self.max
    }
}

/// Business settings shared by the gateway client, the ledger and the
/// withdrawal flow.
#[derive(Debug, Clone, Deserialize)]
pub struct PlatformSettings {
    pub currency_code: String,
    pub min_deposit: BigDecimal,
    pub max_deposit: BigDecimal,
    pub min_withdrawal: BigDecimal,
    pub max_withdrawal: BigDecimal,
    /// Percentage of the first deposit credited as bonus
    pub initial_bonus_pct: BigDecimal,
    pub bonus_rollover_multiplier: BigDecimal,
    pub deposit_rollover_multiplier: BigDecimal,
    pub vip_points_per_unit: BigDecimal,
    #[serde(default)]
    pub vip_tiers: Vec<VipTier>,
}

impl Default for PlatformSettings {
    fn default() -> Self {
        Self {
            currency_code: "BRL".to_string(),
            min_deposit: BigDecimal::from(10),
            max_deposit: BigDecimal::from(10_000),
            min_withdrawal: BigDecimal::from(20),
            max_withdrawal: BigDecimal::from(10_000),
            initial_bonus_pct: BigDecimal::zero(),
            bonus_rollover_multiplier: BigDecimal::from(1),
            deposit_rollover_multiplier: BigDecimal::from(1),
            vip_points_per_unit: BigDecimal::from(1),
            vip_tiers: Vec::new(),
        }
    }
}

impl PlatformSettings {
    /// Load settings from `config/platform.toml` (optional) overridden by
    /// `PLATFORM_*` environment variables, e.g. `PLATFORM_MIN_DEPOSIT=20`.
    pub fn load() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let raw = config::Config::builder()
            .set_default("currency_code", defaults.currency_code.clone())?
            .set_default("min_deposit", defaults.min_deposit.to_string())?
            .set_default("max_deposit", defaults.max_deposit.to_string())?
            .set_default("min_withdrawal", defaults.min_withdrawal.to_string())?
            .set_default("max_withdrawal", defaults.max_withdrawal.to_string())?
            .set_default("initial_bonus_pct", defaults.initial_bonus_pct.to_string())?
            .set_default(
                "bonus_rollover_multiplier",
                defaults.bonus_rollover_multiplier.to_string(),
            )?
            .set_default(
                "deposit_rollover_multiplier",
                defaults.deposit_rollover_multiplier.to_string(),
            )?
            .set_default("vip_points_per_unit", defaults.vip_points_per_unit.to_string())?
            .add_source(config::File::with_name("config/platform").required(false))
            .add_source(
                config::Environment::with_prefix("PLATFORM")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let settings: PlatformSettings = raw.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_deposit <= BigDecimal::zero() || self.min_deposit > self.max_deposit {
            return Err(ConfigError::Invalid {
                key: "min_deposit",
                reason: "must be positive and not exceed max_deposit".to_string(),
            });
        }
        if self.min_withdrawal <= BigDecimal::zero() || self.min_withdrawal > self.max_withdrawal {
            return Err(ConfigError::Invalid {
                key: "min_withdrawal",
                reason: "must be positive and not exceed max_withdrawal".to_string(),
            });
        }
        let non_negative = [
            ("initial_bonus_pct", &self.initial_bonus_pct),
            ("bonus_rollover_multiplier", &self.bonus_rollover_multiplier),
            ("deposit_rollover_multiplier", &self.deposit_rollover_multiplier),
            ("vip_points_per_unit", &self.vip_points_per_unit),
        ];
        for (key, value) in non_negative {
            if *value < BigDecimal::zero() {
                return Err(ConfigError::Invalid {
                    key,
                    reason: "must not be negative".to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn deposit_limits(&self) -> AmountLimits {
        AmountLimits {
            min: self.min_deposit.clone(),
            max: self.max_deposit.clone(),
        }
    }

    pub fn withdrawal_limits(&self) -> AmountLimits {
        AmountLimits {
            min: self.min_withdrawal.clone(),
            max: self.max_withdrawal.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn endpoint_joins_with_or_without_trailing_slash() {
        let mut cfg = GatewayConfig::default();
        cfg.base_url = "https://api.divpag.test/".to_string();
        assert_eq!(cfg.endpoint("pix/qrcode"), "https://api.divpag.test/pix/qrcode");

        cfg.base_url = "https://api.divpag.test".to_string();
        assert_eq!(cfg.endpoint("/pix/payment"), "https://api.divpag.test/pix/payment");
    }

    #[test]
    fn gateway_config_validation_requires_credentials() {
        let mut cfg = GatewayConfig::default();
        assert!(cfg.validate().is_err());

        cfg.base_url = "ftp://nope".to_string();
        assert!(cfg.validate().is_err());

        cfg.base_url = "https://api.divpag.test".to_string();
        assert!(cfg.validate().is_err());

        cfg.client_id = "ci".to_string();
        assert!(cfg.validate().is_err());

        cfg.client_secret = "cs".to_string();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn gateway_config_debug_hides_secret() {
        let mut cfg = GatewayConfig::default();
        cfg.client_secret = "super-secret".to_string();
        let rendered = format!("{:?}", cfg);
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn reconciler_defaults_match_backup_poll() {
        let cfg = ReconcilerConfig::default();
        assert_eq!(cfg.max_age, Duration::from_secs(600));
        assert_eq!(cfg.batch_size, 5);
    }

    #[test]
    fn amount_limits_are_inclusive() {
        let limits = AmountLimits {
            min: BigDecimal::from(10),
            max: BigDecimal::from(100),
        };
        assert!(limits.contains(&BigDecimal::from(10)));
        assert!(limits.contains(&BigDecimal::from(100)));
        assert!(!limits.contains(&BigDecimal::from_str("9.99").unwrap()));
        assert!(!limits.contains(&BigDecimal::from_str("100.01").unwrap()));
    }

    #[test]
    fn platform_settings_validation() {
        let mut settings = PlatformSettings::default();
        assert!(settings.validate().is_ok());

        settings.min_deposit = BigDecimal::from(20_000);
        assert!(settings.validate().is_err());

        settings = PlatformSettings::default();
        settings.initial_bonus_pct = BigDecimal::from(-1);
        assert!(settings.validate().is_err());
    }
}
