use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use teloxide::payloads::SendMessageSetters;
use teloxide::requests::Requester;
use teloxide::types::{ChatId, ParseMode};
use teloxide::Bot;
use tracing::debug;

use crate::config::TelegramConfig;
use crate::platform::{Notifier, UserId};

/// Inbound webhook update. Only the fields the relay reads are modelled;
/// everything else Telegram sends is ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    #[serde(default)]
    pub update_id: Option<i64>,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub text: Option<String>,
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<Sender>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Sender {
    pub id: UserId,
}

impl Update {
    /// The message and its text, if this update carries a non-empty text
    /// message. Edits, reactions, stickers and the like yield `None`.
    pub fn text_message(&self) -> Option<(&Message, &str)> {
        let message = self.message.as_ref()?;
        let text = message.text.as_deref().filter(|t| !t.is_empty())?;
        Some((message, text))
    }
}

/// Sends MarkdownV2 messages through the Bot API.
pub struct TelegramNotifier {
    bot: Bot,
}

impl TelegramNotifier {
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        let api_url = reqwest::Url::parse(&config.api_url)
            .with_context(|| format!("Invalid Telegram API URL: {}", config.api_url))?;
        let bot = Bot::new(&config.bot_token).set_api_url(api_url);
        Ok(Self { bot })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        debug!("Sending Telegram message to chat {}", chat_id);
        self.bot
            .send_message(ChatId(chat_id), text)
            .parse_mode(ParseMode::MarkdownV2)
            .await
            .with_context(|| format!("Failed to send Telegram message to chat {}", chat_id))?;
        Ok(())
    }
}
