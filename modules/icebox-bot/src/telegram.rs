//! Telegram adapter: teloxide updates in, [`ChatTransport`] actions out.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use teloxide::payloads::{EditMessageTextSetters, SendMessageSetters};
use teloxide::prelude::*;
use teloxide::types::{
    InlineKeyboardButton, InlineKeyboardMarkup, InputFile, MessageId, ParseMode, User,
};
use tracing::{debug, warn};

use icebox_common::ChatIdentity;

use crate::controller::{Conversation, InboundEvent};
use crate::screens::{CallbackAction, Screen};
use crate::traits::ChatTransport;

pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

fn keyboard(screen: &Screen) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(screen.keyboard.iter().map(|row| {
        row.iter()
            .map(|b| InlineKeyboardButton::callback(b.label.clone(), b.action.payload()))
            .collect::<Vec<_>>()
    }))
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    async fn send(&self, chat_id: i64, screen: &Screen) -> Result<i32> {
        let request = self
            .bot
            .send_message(ChatId(chat_id), screen.text.clone())
            .parse_mode(ParseMode::Html);
        let message = if screen.keyboard.is_empty() {
            request.await?
        } else {
            request.reply_markup(keyboard(screen)).await?
        };
        Ok(message.id.0)
    }

    async fn edit(&self, chat_id: i64, message_id: i32, screen: &Screen) -> Result<()> {
        // An empty markup also clears buttons left from the previous screen.
        self.bot
            .edit_message_text(ChatId(chat_id), MessageId(message_id), screen.text.clone())
            .parse_mode(ParseMode::Html)
            .reply_markup(keyboard(screen))
            .await?;
        Ok(())
    }

    async fn delete(&self, chat_id: i64, message_id: i32) -> Result<()> {
        self.bot
            .delete_message(ChatId(chat_id), MessageId(message_id))
            .await?;
        Ok(())
    }

    async fn send_photo(&self, chat_id: i64, image: Vec<u8>) -> Result<()> {
        self.bot
            .send_photo(ChatId(chat_id), InputFile::memory(image))
            .await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

fn identity(chat_id: ChatId, user: Option<&User>) -> ChatIdentity {
    ChatIdentity {
        chat_id: chat_id.0,
        username: user.and_then(|u| u.username.clone()),
        first_name: user.map(|u| u.first_name.clone()),
        last_name: user.and_then(|u| u.last_name.clone()),
        language_code: user.and_then(|u| u.language_code.clone()),
        is_bot: user.is_some_and(|u| u.is_bot),
    }
}

/// `/start`, optionally addressed as `/start@handle` and followed by a payload.
fn is_start_command(text: &str) -> bool {
    let command = text.split_whitespace().next().unwrap_or_default();
    command == "/start" || command.starts_with("/start@")
}

async fn on_message(msg: Message, conversation: Arc<Conversation>) -> Result<()> {
    // Non-text messages are ignored.
    let Some(text) = msg.text() else {
        debug!(chat_id = msg.chat.id.0, "Non-text message ignored");
        return Ok(());
    };

    let identity = identity(msg.chat.id, msg.from.as_ref());
    let event = if is_start_command(text) {
        InboundEvent::start(identity)
    } else {
        InboundEvent::text(identity, text)
    };
    conversation.handle(event).await;
    Ok(())
}

async fn on_callback(bot: Bot, q: CallbackQuery, conversation: Arc<Conversation>) -> Result<()> {
    if let Err(e) = bot.answer_callback_query(q.id.clone()).await {
        warn!(error = %e, "Failed to answer callback query");
    }

    let (Some(data), Some(message)) = (q.data.as_deref(), q.message.as_ref()) else {
        debug!("Callback without data or message ignored");
        return Ok(());
    };

    let event = InboundEvent::action(
        identity(message.chat().id, Some(&q.from)),
        message.id().0,
        CallbackAction::parse(data),
    );
    conversation.handle(event).await;
    Ok(())
}

/// Poll for updates until ctrl-c. Updates from one chat are handled in order;
/// different chats run concurrently.
pub async fn run(bot: Bot, conversation: Arc<Conversation>) {
    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(on_message))
        .branch(Update::filter_callback_query().endpoint(on_callback));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![conversation])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_start_variants() {
        assert!(is_start_command("/start"));
        assert!(is_start_command("/start@iceboxai_bot"));
        assert!(is_start_command("/start ref123"));
        assert!(!is_start_command("/started"));
        assert!(!is_start_command("start"));
        assert!(!is_start_command(""));
    }

    #[test]
    fn identity_without_sender_is_anonymous() {
        let identity = identity(ChatId(5), None);
        assert_eq!(identity.chat_id, 5);
        assert_eq!(identity.display_name(), "User");
        assert!(!identity.is_bot);
    }
}
