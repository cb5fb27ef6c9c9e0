//! Faucet Configuration
//!
//! YAML file with serde defaults, plus environment overrides so the
//! credential never has to live in the config file. Missing required
//! configuration (credential, data path) is the one fatal startup
//! condition in the system.

use std::fs;

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};

use crate::engine::EngineSettings;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FaucetConfig {
    /// Base URL of the funds-transfer service.
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Bearer credential of the funded faucet source account.
    /// Usually supplied via `FAUCET_SENDER_SECRET` rather than the file.
    #[serde(default)]
    pub sender_secret: String,
    /// Credits per successful claim.
    #[serde(default = "default_amount")]
    pub amount: u64,
    /// Cooldown window between successful claims, in seconds.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: i64,
    /// Age after which a dangling pending-claim marker is reclaimed.
    #[serde(default = "default_claim_stale_secs")]
    pub claim_stale_secs: i64,
    /// Path of the ledger document; the lock file is `<path>.lock`.
    #[serde(default = "default_data_file")]
    pub data_file: String,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LogConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: "logs".to_string(),
            log_file: "faucet.log".to_string(),
            use_json: false,
            rotation: "daily".to_string(),
        }
    }
}

fn default_api_base() -> String {
    "http://127.0.0.1:8000".to_string()
}

fn default_amount() -> u64 {
    5
}

fn default_cooldown_secs() -> i64 {
    24 * 3600
}

fn default_claim_stale_secs() -> i64 {
    300
}

fn default_data_file() -> String {
    "faucet_ledger.json".to_string()
}

impl Default for FaucetConfig {
    fn default() -> Self {
        // serde defaults and struct defaults must agree; an empty document
        // yields exactly this value.
        serde_yaml::from_str("{}").expect("empty config must deserialize")
    }
}

impl FaucetConfig {
    /// Load from a YAML file and apply environment overrides.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content =
            fs::read_to_string(path).with_context(|| format!("failed to read config file {path}"))?;
        let mut config: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse config file {path}"))?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Environment always wins over the file for these keys.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(secret) = std::env::var("FAUCET_SENDER_SECRET") {
            self.sender_secret = secret.trim().to_string();
        }
        if let Ok(base) = std::env::var("FAUCET_API_BASE") {
            self.api_base = base.trim().trim_end_matches('/').to_string();
        }
        if let Ok(path) = std::env::var("FAUCET_DATA_FILE") {
            self.data_file = path.trim().to_string();
        }
    }

    /// Reject configurations the process must not start with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.sender_secret.is_empty() {
            bail!("missing sender credential: set sender_secret or FAUCET_SENDER_SECRET");
        }
        if self.data_file.is_empty() {
            bail!("missing data_file: the ledger store needs a location");
        }
        if self.amount == 0 {
            bail!("amount must be a positive integer");
        }
        if self.cooldown_secs < 0 {
            bail!("cooldown_secs must not be negative");
        }
        Ok(())
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            amount: self.amount,
            cooldown_secs: self.cooldown_secs,
            claim_stale_secs: self.claim_stale_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_gets_defaults() {
        let config: FaucetConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.api_base, "http://127.0.0.1:8000");
        assert_eq!(config.amount, 5);
        assert_eq!(config.cooldown_secs, 86_400);
        assert_eq!(config.claim_stale_secs, 300);
        assert_eq!(config.data_file, "faucet_ledger.json");
        assert_eq!(config.gateway.port, 8080);
        assert_eq!(config.log.log_level, "info");
    }

    #[test]
    fn test_partial_document_overrides_defaults() {
        let yaml = r#"
api_base: "https://faucet.example.org"
amount: 10
cooldown_secs: 3600
gateway:
  host: "0.0.0.0"
  port: 9090
"#;
        let config: FaucetConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.api_base, "https://faucet.example.org");
        assert_eq!(config.amount, 10);
        assert_eq!(config.cooldown_secs, 3600);
        assert_eq!(config.gateway.host, "0.0.0.0");
        assert_eq!(config.gateway.port, 9090);
        // Untouched keys keep their defaults.
        assert_eq!(config.data_file, "faucet_ledger.json");
    }

    #[test]
    fn test_validate_requires_credential() {
        let config = FaucetConfig::default();
        assert!(config.validate().is_err());

        let mut config = FaucetConfig::default();
        config.sender_secret = "s3cret".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_amount() {
        let mut config = FaucetConfig::default();
        config.sender_secret = "s3cret".to_string();
        config.amount = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_data_file() {
        let mut config = FaucetConfig::default();
        config.sender_secret = "s3cret".to_string();
        config.data_file = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_engine_settings_projection() {
        let mut config = FaucetConfig::default();
        config.amount = 7;
        config.cooldown_secs = 60;
        let settings = config.engine_settings();
        assert_eq!(settings.amount, 7);
        assert_eq!(settings.cooldown_secs, 60);
        assert_eq!(settings.claim_stale_secs, 300);
    }
}
