use std::sync::Arc;

use anyhow::{Context, Result};
use teloxide::Bot;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use icebox_bot::controller::{BotSettings, Conversation};
use icebox_bot::health;
use icebox_bot::telegram::{self, TelegramTransport};
use icebox_common::AppConfig;
use pollinations_client::PollinationsClient;
use supabase_client::SupabaseClient;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("icebox=info".parse()?))
        .init();

    info!("Icebox bot starting...");

    // Load config (missing bot token is fatal here)
    let config = AppConfig::from_env()?;

    // Liveness probe runs on its own task and shares nothing with the bot
    let health_addr = config.health_addr();
    tokio::spawn(async move {
        if let Err(e) = health::serve(&health_addr).await {
            error!(error = %e, "Liveness probe stopped");
        }
    });

    let backend = SupabaseClient::new(
        &config.supabase_url,
        &config.supabase_key,
        config.backend_timeout,
    )?;
    let provider = PollinationsClient::new(
        &config.pollinations_base_url,
        &config.pollinations_model,
        config.pollinations_key.as_deref(),
        config.provider_timeout,
    )?;

    let mut bot = Bot::new(&config.telegram_token);
    if let Some(base) = &config.telegram_api_base_url {
        bot = bot.set_api_url(
            url::Url::parse(base).with_context(|| format!("Invalid TELEGRAM_API_BASE_URL {base}"))?,
        );
    }

    let conversation = Arc::new(Conversation::new(
        Arc::new(backend),
        Arc::new(provider),
        Arc::new(TelegramTransport::new(bot.clone())),
        BotSettings {
            bot_handle: config.bot_handle.clone(),
            support_contact: config.support_contact.clone(),
        },
    ));

    info!(model = config.pollinations_model.as_str(), "Dispatcher starting");
    telegram::run(bot, conversation).await;

    info!("Icebox bot stopped");
    Ok(())
}
