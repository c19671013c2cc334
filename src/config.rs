//! Configuration management
//!
//! Loads configuration from config.toml with an embedded default. Secrets
//! (database URL, bot token, admin token, explorer API key) come from the
//! environment and are resolved once at startup; components receive plain
//! values at construction and never touch the process environment.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

/// Main configuration structure matching config.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub site: SiteConfig,
    pub server: ServerConfig,
    pub uploads: UploadsConfig,
    pub telegram: TelegramConfig,
    pub chain: ChainConfig,
    pub payments: PaymentsConfig,
}

/// Public site settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Personal referral links are issued under `<root_url>/ref/`
    pub root_url: String,
    pub community_group_link: String,
}

/// Server binding settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Proof screenshot storage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadsConfig {
    pub dir: String,
}

/// Telegram settings (the bot token itself comes from BOT_TOKEN)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub moderators_chat_id: String,
}

/// Block explorer and token settings for BSC payment verification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    pub api_url: String,
    /// Membership transfers must arrive at this address
    pub collection_address: String,
    pub token_contract: String,
    pub token_symbol: String,
    #[serde(default = "default_token_decimals")]
    pub token_decimals: u32,
}

fn default_token_decimals() -> u32 {
    18
}

/// Payment options shown to the website
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentsConfig {
    pub price_nis: u32,
    pub paybox_url: String,
    pub bit_url: String,
    pub paypal_url: String,
}

impl Config {
    /// Load from config.toml or use defaults
    pub fn load() -> Result<Self> {
        Self::load_from("config.toml")
    }

    /// Load from specific path
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if path.exists() {
            let content = std::fs::read_to_string(path).context("Failed to read config file")?;
            toml::from_str(&content).context("Failed to parse config file")
        } else {
            // Use embedded default config
            toml::from_str(DEFAULT_CONFIG).context("Failed to parse default config")
        }
    }

    /// Telegram bot token from BOT_TOKEN (required for notifications)
    pub fn bot_token(&self) -> Option<String> {
        non_empty_env("BOT_TOKEN")
    }

    /// Moderation dashboard secret from ADMIN_DASH_TOKEN. When unset, every
    /// admin call is refused.
    pub fn admin_token(&self) -> Option<String> {
        non_empty_env("ADMIN_DASH_TOKEN")
    }

    /// Explorer API key from BSCSCAN_API_KEY (optional)
    pub fn chain_api_key(&self) -> Option<String> {
        non_empty_env("BSCSCAN_API_KEY")
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_default_parses() {
        let config: Config = toml::from_str(DEFAULT_CONFIG).unwrap();

        assert_eq!(config.site.root_url, "https://slh-nft.com");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.chain.token_symbol, "SLH");
        assert_eq!(config.chain.token_decimals, 18);
        assert_eq!(config.payments.price_nis, 39);
        assert!(!config.telegram.moderators_chat_id.is_empty());
    }

    #[test]
    fn test_missing_file_falls_back_to_default() {
        let config = Config::load_from("definitely/not/a/config.toml").unwrap();
        assert_eq!(config.site.root_url, "https://slh-nft.com");
    }

    #[test]
    fn test_decimals_default_when_omitted() {
        let doc = DEFAULT_CONFIG.replace("token_decimals = 18\n", "");
        let config: Config = toml::from_str(&doc).unwrap();
        assert_eq!(config.chain.token_decimals, 18);
    }
}
