pub mod telegram;

pub use telegram::TelegramTransport;

use anyhow::Result;
use async_trait::async_trait;

/// One inline keyboard button. Exactly one of `callback_data` / `url` should
/// be set; Telegram rejects buttons with neither.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineButton {
    pub text: String,
    pub callback_data: Option<String>,
    pub url: Option<String>,
}

impl InlineButton {
    pub fn callback(text: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callback_data: Some(data.into()),
            url: None,
        }
    }

    pub fn link(text: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callback_data: None,
            url: Some(url.into()),
        }
    }
}

/// Rows of inline buttons attached below a message.
pub type Keyboard = Vec<Vec<InlineButton>>;

/// The primitives the dispatcher needs from a chat platform.
///
/// Handed to the dispatcher and the admin adapter at construction time — no
/// ambient globals. Implementations must be cheap to share behind an `Arc`.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    fn name(&self) -> &str;

    /// Send a message and return its platform message id for later
    /// edit/delete.
    async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<String>;

    async fn edit_message(
        &self,
        chat_id: &str,
        message_id: &str,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<()>;

    async fn delete_message(&self, chat_id: &str, message_id: &str) -> Result<()>;

    /// Toggle a member's permission to send messages.
    async fn restrict_member(&self, chat_id: &str, user_id: &str, can_send: bool) -> Result<()>;

    /// Set an emoji reaction on a message. Default: no-op for platforms
    /// without reactions.
    async fn set_reaction(&self, _chat_id: &str, _message_id: &str, _emoji: &str) -> Result<()> {
        Ok(())
    }

    /// Acknowledge a callback interaction so the client stops its spinner.
    /// Default: no-op.
    async fn answer_callback(&self, _callback_id: &str) -> Result<()> {
        Ok(())
    }
}
