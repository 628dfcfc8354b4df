use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The kind of chat an event originated from. Only group-like chats are
/// tenant scopes; private chats never create tenants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    Private,
    Group,
    Supergroup,
    Channel,
    #[serde(other)]
    Other,
}

impl ChatKind {
    pub fn from_api(kind: &str) -> Self {
        match kind {
            "private" => ChatKind::Private,
            "group" => ChatKind::Group,
            "supergroup" => ChatKind::Supergroup,
            "channel" => ChatKind::Channel,
            _ => ChatKind::Other,
        }
    }

    pub fn is_tenant_scope(self) -> bool {
        matches!(
            self,
            ChatKind::Group | ChatKind::Supergroup | ChatKind::Channel
        )
    }
}

/// An inbound text message from the chat transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEvent {
    pub chat_id: String,
    pub chat_title: String,
    pub chat_kind: ChatKind,
    pub sender_id: String,
    pub message_id: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// A follow-up interaction (inline keyboard press) carrying a
/// self-describing token in `data`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackEvent {
    pub chat_id: String,
    pub sender_id: String,
    /// Id of the message bearing the keyboard, edited in place on navigation.
    pub message_id: String,
    pub callback_id: String,
    pub data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum InboundEvent {
    Message(MessageEvent),
    Callback(CallbackEvent),
}

impl InboundEvent {
    /// Key used for per-sender rate limiting.
    pub fn sender_key(&self) -> String {
        match self {
            InboundEvent::Message(m) => format!("{}:{}", m.chat_id, m.sender_id),
            InboundEvent::Callback(c) => format!("{}:{}", c.chat_id, c.sender_id),
        }
    }
}
