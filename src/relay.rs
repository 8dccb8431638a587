//! Per-request webhook handling.
//!
//! Every inbound update ends in a 200 response. Telegram retries any webhook
//! that does not get one, and a retried update would trigger the pipeline
//! again, so failures are reported to the chat or logged instead.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use crate::github::{DispatchRequest, Dispatcher};
use crate::markdown;
use crate::platform::telegram::Update;
use crate::platform::Notifier;

pub const START_COMMAND: &str = "/start";

/// Longest slice of a GitHub error body echoed back to the chat.
pub const ERROR_BODY_LIMIT: usize = 200;

// Static replies are already MarkdownV2-escaped.
pub const UNAUTHORIZED_TEXT: &str = "⛔ Unauthorized user\\.";
pub const WELCOME_TEXT: &str =
    "👋 DevOps Bot ready\\!\n\nSend me a message and I'll trigger a CI/CD pipeline\\.";
pub const ACK_TEXT: &str = "⏳ Got it\\! Triggering pipeline\\.\\.\\.";

/// Read-only state shared by every request.
pub struct RelayContext {
    pub allowed_user_id: String,
    pub notifier: Arc<dyn Notifier>,
    pub dispatcher: Arc<dyn Dispatcher>,
}

/// How a request ended. The HTTP response is the same for all of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Not a POST, not JSON, or not a text message.
    Ignored,
    Unauthorized,
    Started,
    Dispatched,
    DispatchFailed { status: u16 },
    /// An unexpected error was logged and swallowed.
    Failed,
}

impl RelayContext {
    pub fn new(
        allowed_user_id: impl Into<String>,
        notifier: Arc<dyn Notifier>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Self {
        Self {
            allowed_user_id: allowed_user_id.into(),
            notifier,
            dispatcher,
        }
    }

    /// Handle one raw webhook request. Never fails.
    pub async fn process(&self, is_post: bool, body: &[u8]) -> Outcome {
        if !is_post {
            return Outcome::Ignored;
        }

        match self.handle(body).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Webhook handling failed: {:#}", e);
                Outcome::Failed
            }
        }
    }

    async fn handle(&self, body: &[u8]) -> Result<Outcome> {
        let update: Update = match serde_json::from_slice(body) {
            Ok(update) => update,
            Err(e) => {
                info!("Ignoring unparseable update: {}", e);
                return Ok(Outcome::Ignored);
            }
        };

        let Some((message, text)) = update.text_message() else {
            return Ok(Outcome::Ignored);
        };

        let chat_id = message.chat.id;
        let user_id = message
            .from
            .as_ref()
            .map(|sender| sender.id.as_str())
            .context("Text message has no sender")?;

        if user_id != self.allowed_user_id {
            warn!("Rejected message from unauthorized user {}", user_id);
            self.notify(chat_id, UNAUTHORIZED_TEXT).await;
            return Ok(Outcome::Unauthorized);
        }

        match update.update_id {
            Some(update_id) => info!(
                "Message from user {} in chat {} (update {}): {}",
                user_id, chat_id, update_id, text
            ),
            None => info!("Message from user {} in chat {}: {}", user_id, chat_id, text),
        }

        if text.starts_with(START_COMMAND) {
            self.notify(chat_id, WELCOME_TEXT).await;
            return Ok(Outcome::Started);
        }

        // The ack goes out before the slower dispatch call.
        self.notify(chat_id, ACK_TEXT).await;

        let response = self
            .dispatcher
            .dispatch(&DispatchRequest::new(text, chat_id))
            .await?;

        if response.is_success() {
            info!("Dispatch accepted for chat {} ({})", chat_id, response.status);
            return Ok(Outcome::Dispatched);
        }

        warn!(
            "Dispatch rejected with status {}: {}",
            response.status, response.body
        );
        let failure = failure_text(response.status, &response.body);
        self.notify(chat_id, &failure).await;

        Ok(Outcome::DispatchFailed {
            status: response.status,
        })
    }

    /// Best-effort send; a failure here never changes the request's course.
    async fn notify(&self, chat_id: i64, text: &str) {
        if let Err(e) = self.notifier.send_message(chat_id, text).await {
            warn!("Notification to chat {} failed: {:#}", chat_id, e);
        }
    }
}

pub fn failure_text(status: u16, body: &str) -> String {
    format!(
        "❌ GitHub dispatch failed \\({}\\): {}",
        status,
        markdown::escape(markdown::truncate_chars(body, ERROR_BODY_LIMIT))
    )
}
