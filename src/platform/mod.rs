pub mod telegram;

use std::fmt;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Deserializer};

/// Sends a text message to a chat on the messaging platform.
///
/// Text is sent as MarkdownV2, so callers must escape anything dynamic with
/// [`crate::markdown::escape`] first.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<()>;
}

/// A platform user id in its normalized decimal string form.
///
/// Telegram sends ids as JSON numbers, configuration may carry them as either
/// numbers or strings; both compare equal once normalized.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserId(String);

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<i64> for UserId {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

impl<'de> Deserialize<'de> for UserId {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(i64),
            Text(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Number(n) => UserId::from(n),
            Raw::Text(s) => UserId::from(s.trim()),
        })
    }
}
