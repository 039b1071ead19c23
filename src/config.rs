//! Configuration and settings management
//!
//! Loads settings from config files and environment variables and defines
//! the fixed constants of the bot.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Order in which category buttons are shown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CategorySort {
    /// Keep the album order of the VK community.
    #[default]
    Original,
    /// Sort by name, case-insensitively.
    Alphabetical,
}

/// Application settings loaded from environment variables
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Telegram Bot API token
    pub telegram_token: String,

    /// VK community access token
    pub vk_token: String,
    /// Numeric id of the VK community (sign is ignored)
    pub vk_group_id: i64,
    #[serde(default = "default_vk_api_version")]
    pub vk_api_version: String,

    /// How long fetched content stays fresh
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Period of the background sweep that drops long-expired entries
    #[serde(default = "default_cache_sweep_interval_secs")]
    pub cache_sweep_interval_secs: u64,
    /// Maximum number of VK calls in flight
    #[serde(default = "default_api_rate_limit")]
    pub api_rate_limit: usize,
    /// Minimum spacing between two VK calls
    #[serde(default = "default_api_rate_limit_interval_ms")]
    pub api_rate_limit_interval_ms: u64,
    /// Period of the category index refresh
    #[serde(default = "default_preload_interval_secs")]
    pub preload_interval_secs: u64,
    /// Maximum number of cards in one carousel
    #[serde(default = "default_max_photos_per_page")]
    pub max_photos_per_page: usize,

    /// Comma-separated list of Telegram ids allowed to run admin commands
    #[serde(rename = "admin_ids")]
    pub admin_ids_str: Option<String>,

    #[serde(default)]
    pub category_sort: CategorySort,

    /// Greeting used when the community description is unavailable
    #[serde(default = "default_welcome_message")]
    pub welcome_message: String,
    #[serde(default = "default_vk_group_url")]
    pub vk_group_url: String,
    #[serde(default)]
    pub tg_channel_url: Option<String>,
    #[serde(default = "default_vk_partner_topic_url")]
    pub vk_partner_topic_url: String,
    #[serde(default = "default_vk_master_topic_url")]
    pub vk_master_topic_url: String,
}

fn default_vk_api_version() -> String {
    "5.199".to_string()
}

const fn default_cache_ttl_secs() -> u64 {
    3600
}

const fn default_cache_sweep_interval_secs() -> u64 {
    1800
}

const fn default_api_rate_limit() -> usize {
    3
}

const fn default_api_rate_limit_interval_ms() -> u64 {
    350
}

const fn default_preload_interval_secs() -> u64 {
    3600
}

const fn default_max_photos_per_page() -> usize {
    50
}

fn default_welcome_message() -> String {
    "👋 Добро пожаловать в бот сообщества «Строй Форум Белгород»!\n\n\
     Здесь можно найти проверенных мастеров и магазины-партнеры."
        .to_string()
}

fn default_vk_group_url() -> String {
    "https://vk.com/stroyforumbelgorod".to_string()
}

fn default_vk_partner_topic_url() -> String {
    "https://vk.com/topic-214342453_48769398".to_string()
}

fn default_vk_master_topic_url() -> String {
    "https://vk.com/topic-214342453_48769410".to_string()
}

impl Settings {
    /// Create new settings by loading from environment and files
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails or a required key is missing.
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
            // Local overrides, not checked into git
            .add_source(File::with_name("config/local").required(false))
            // `APP__CACHE_TTL_SECS=60` style overrides
            .add_source(Environment::with_prefix("APP").separator("__"))
            // Plain UPPER_SNAKE_CASE variables, empty values treated as unset
            .add_source(Environment::default().ignore_empty(true))
            .build()?;

        let settings: Self = s.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Rejects values the bot cannot run with.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Message` naming the first zero period.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let periods = [
            ("cache_sweep_interval_secs", self.cache_sweep_interval_secs),
            ("preload_interval_secs", self.preload_interval_secs),
        ];
        match periods.iter().find(|(_, secs)| *secs == 0) {
            Some((name, _)) => Err(ConfigError::Message(format!(
                "{name} must be greater than zero"
            ))),
            None => Ok(()),
        }
    }

    /// Returns the set of Telegram ids allowed to run admin commands
    #[must_use]
    pub fn admin_ids(&self) -> HashSet<i64> {
        self.admin_ids_str
            .as_ref()
            .map(|s| {
                s.split(|c: char| c == ',' || c == ';' || c.is_whitespace())
                    .filter(|token| !token.is_empty())
                    .filter_map(|id| id.parse::<i64>().ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    #[must_use]
    pub fn is_admin(&self, user_id: i64) -> bool {
        self.admin_ids().contains(&user_id)
    }

    #[must_use]
    pub const fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    #[must_use]
    pub const fn cache_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.cache_sweep_interval_secs)
    }

    #[must_use]
    pub const fn api_rate_limit_interval(&self) -> Duration {
        Duration::from_millis(self.api_rate_limit_interval_ms)
    }

    #[must_use]
    pub const fn preload_interval(&self) -> Duration {
        Duration::from_secs(self.preload_interval_secs)
    }
}

// VK API
/// Base URL of the VK API methods
pub const VK_API_BASE_URL: &str = "https://api.vk.com/method";
/// HTTP timeout for one VK call
pub const VK_HTTP_TIMEOUT_SECS: u64 = 30;
/// Retries after a flood-control or network error
pub const VK_API_MAX_RETRIES: usize = 3;
pub const VK_API_INITIAL_BACKOFF_MS: u64 = 500;
pub const VK_API_MAX_BACKOFF_MS: u64 = 4000;

// Telegram API
/// Maximum number of retry attempts for Telegram API operations
pub const TELEGRAM_API_MAX_RETRIES: usize = 3;
/// Initial backoff delay in milliseconds for Telegram API retries
pub const TELEGRAM_API_INITIAL_BACKOFF_MS: u64 = 500;
/// Maximum backoff delay in milliseconds for Telegram API retries
pub const TELEGRAM_API_MAX_BACKOFF_MS: u64 = 4000;
/// Maximum photo caption length accepted by Telegram
pub const TELEGRAM_CAPTION_LIMIT: usize = 1024;
/// Maximum text message length accepted by Telegram
pub const TELEGRAM_MESSAGE_LIMIT: usize = 4096;
