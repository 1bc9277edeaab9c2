use std::env;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    // Telegram
    pub telegram_token: String,
    pub telegram_api_base_url: Option<String>,
    pub bot_handle: String,
    pub support_contact: String,

    // Accounting backend
    pub supabase_url: String,
    pub supabase_key: String,
    pub backend_timeout: Duration,

    // Image provider
    pub pollinations_base_url: String,
    pub pollinations_model: String,
    pub pollinations_key: Option<String>,
    pub provider_timeout: Duration,

    // Liveness probe
    pub health_host: String,
    pub health_port: u16,
}

impl AppConfig {
    /// Load configuration from the environment (and `.env` when present).
    /// Fails when a required variable is missing or a number does not parse.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            telegram_token: required_env("TELEGRAM_BOT_TOKEN")?,
            telegram_api_base_url: optional_env("TELEGRAM_API_BASE_URL"),
            bot_handle: env::var("BOT_HANDLE").unwrap_or_else(|_| "iceboxai_bot".to_string()),
            support_contact: env::var("SUPPORT_CONTACT")
                .unwrap_or_else(|_| "@pinturusak".to_string()),
            supabase_url: required_env("SUPABASE_URL")?,
            supabase_key: required_env("SUPABASE_KEY")?,
            backend_timeout: Duration::from_secs(parsed_env("BACKEND_TIMEOUT_SECS", 30)?),
            pollinations_base_url: env::var("POLLINATIONS_BASE_URL")
                .unwrap_or_else(|_| pollinations_client::DEFAULT_BASE_URL.to_string()),
            pollinations_model: env::var("POLLINATIONS_MODEL")
                .unwrap_or_else(|_| "zimage".to_string()),
            pollinations_key: optional_env("POLLINATIONS_KEY"),
            provider_timeout: Duration::from_secs(parsed_env("PROVIDER_TIMEOUT_SECS", 120)?),
            health_host: env::var("HEALTH_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            health_port: parsed_env("HEALTH_PORT", 7860)?,
        };

        config.log_keys();
        Ok(config)
    }

    pub fn health_addr(&self) -> String {
        format!("{}:{}", self.health_host, self.health_port)
    }

    fn log_keys(&self) {
        fn preview(val: &str) -> String {
            let n = val.len().min(5);
            match val.get(..n) {
                Some(head) => format!("{head}...({} chars)", val.len()),
                None => format!("({} chars)", val.len()),
            }
        }
        fn preview_opt(val: &Option<String>) -> String {
            match val {
                Some(v) if !v.is_empty() => preview(v),
                _ => "<not set>".to_string(),
            }
        }

        tracing::info!("Config loaded:");
        tracing::info!("  TELEGRAM_BOT_TOKEN: {}", preview(&self.telegram_token));
        tracing::info!(
            "  TELEGRAM_API_BASE_URL: {}",
            self.telegram_api_base_url.as_deref().unwrap_or("<default>")
        );
        tracing::info!("  SUPABASE_URL: {}", self.supabase_url);
        tracing::info!("  SUPABASE_KEY: {}", preview(&self.supabase_key));
        tracing::info!("  POLLINATIONS_BASE_URL: {}", self.pollinations_base_url);
        tracing::info!("  POLLINATIONS_MODEL: {}", self.pollinations_model);
        tracing::info!("  POLLINATIONS_KEY: {}", preview_opt(&self.pollinations_key));
        tracing::info!("  PROVIDER_TIMEOUT: {:?}", self.provider_timeout);
        tracing::info!("  BACKEND_TIMEOUT: {:?}", self.backend_timeout);
        tracing::info!("  HEALTH_ADDR: {}", self.health_addr());
    }
}

fn required_env(key: &str) -> Result<String> {
    optional_env(key).ok_or_else(|| anyhow!("{key} environment variable is required"))
}

/// Unset and empty are treated the same.
fn optional_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_env(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} must be a number, got {raw:?}")),
        None => Ok(default),
    }
}
