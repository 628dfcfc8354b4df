use crate::bus::{CallbackEvent, ChatKind, InboundEvent, MessageEvent};
use crate::config::BotConfig;
use crate::transport::{ChatTransport, Keyboard};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const API_BASE: &str = "https://api.telegram.org";

/// Raw Telegram Bot API client. Outbound calls carry a short timeout and are
/// abandoned on failure; the long-poll loop uses its own unbounded client.
pub struct TelegramTransport {
    token: String,
    api_base: String,
    client: reqwest::Client,
    poll_client: reqwest::Client,
    poll_timeout_secs: u64,
}

impl TelegramTransport {
    pub fn new(config: &BotConfig) -> Result<Self> {
        Self::with_api_base(config, API_BASE)
    }

    /// Point the client at a different API host (tests use a local stub).
    pub fn with_api_base(config: &BotConfig, api_base: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;
        let poll_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.poll_timeout_secs + 10))
            .build()
            .context("Failed to build long-poll HTTP client")?;
        Ok(Self {
            token: config.token.clone(),
            api_base: api_base.trim_end_matches('/').to_string(),
            client,
            poll_client,
            poll_timeout_secs: config.poll_timeout_secs,
        })
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base, self.token)
    }

    async fn call(&self, method: &str, body: Value) -> Result<Value> {
        let resp = self
            .client
            .post(self.api_url(method))
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Telegram {} request failed", method))?;
        let data: Value = resp
            .json()
            .await
            .with_context(|| format!("Telegram {} returned non-JSON", method))?;
        if data.get("ok").and_then(Value::as_bool) != Some(true) {
            let description = data
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            return Err(anyhow!("Telegram {} rejected: {}", method, description));
        }
        Ok(data["result"].clone())
    }

    /// Long-poll getUpdates and feed events into the bus until the receiver
    /// side goes away. Poll errors back off and retry; this loop never ends
    /// on its own.
    pub async fn poll_updates(&self, tx: mpsc::UnboundedSender<InboundEvent>) {
        let mut offset: i64 = 0;
        info!("Telegram transport polling for updates...");

        loop {
            let body = json!({
                "offset": offset,
                "timeout": self.poll_timeout_secs,
                "allowed_updates": ["message", "channel_post", "callback_query"],
            });

            let resp = match self
                .poll_client
                .post(self.api_url("getUpdates"))
                .json(&body)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    warn!("Telegram poll error: {e}");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    continue;
                }
            };

            let data: Value = match resp.json().await {
                Ok(d) => d,
                Err(e) => {
                    warn!("Telegram poll parse error: {e}");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    continue;
                }
            };

            let Some(updates) = data.get("result").and_then(Value::as_array) else {
                continue;
            };
            for update in updates {
                if let Some(uid) = update.get("update_id").and_then(Value::as_i64) {
                    offset = offset.max(uid + 1);
                }
                let Some(event) = parse_update(update) else {
                    continue;
                };
                if tx.send(event).is_err() {
                    debug!("Event bus closed, stopping Telegram poll loop");
                    return;
                }
            }
        }
    }
}

/// Map one getUpdates entry to an inbound event. Non-text updates are
/// ignored.
pub(crate) fn parse_update(update: &Value) -> Option<InboundEvent> {
    if let Some(callback) = update.get("callback_query") {
        let message = callback.get("message")?;
        return Some(InboundEvent::Callback(CallbackEvent {
            chat_id: message["chat"]["id"].as_i64()?.to_string(),
            sender_id: callback["from"]["id"].as_i64()?.to_string(),
            message_id: message["message_id"].as_i64()?.to_string(),
            callback_id: callback["id"].as_str()?.to_string(),
            data: callback.get("data")?.as_str()?.to_string(),
        }));
    }

    let message = update.get("message").or_else(|| update.get("channel_post"))?;
    let text = message.get("text")?.as_str()?;
    let chat = message.get("chat")?;
    let timestamp = message
        .get("date")
        .and_then(Value::as_i64)
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .unwrap_or_else(Utc::now);

    Some(InboundEvent::Message(MessageEvent {
        chat_id: chat["id"].as_i64()?.to_string(),
        chat_title: chat
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        chat_kind: ChatKind::from_api(chat.get("type").and_then(Value::as_str).unwrap_or("")),
        // channel posts carry no sender
        sender_id: message
            .get("from")
            .and_then(|f| f.get("id"))
            .and_then(Value::as_i64)
            .map(|id| id.to_string())
            .unwrap_or_default(),
        message_id: message.get("message_id").and_then(Value::as_i64)?.to_string(),
        text: text.to_string(),
        timestamp,
    }))
}

fn keyboard_json(keyboard: &Keyboard) -> Value {
    let rows: Vec<Value> = keyboard
        .iter()
        .map(|row| {
            row.iter()
                .map(|btn| {
                    let mut obj = json!({ "text": btn.text });
                    if let Some(data) = &btn.callback_data {
                        obj["callback_data"] = Value::String(data.clone());
                    }
                    if let Some(url) = &btn.url {
                        obj["url"] = Value::String(url.clone());
                    }
                    obj
                })
                .collect::<Vec<_>>()
                .into()
        })
        .collect();
    json!({ "inline_keyboard": rows })
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<String> {
        let mut body = json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        });
        if let Some(kb) = keyboard {
            body["reply_markup"] = keyboard_json(kb);
        }
        let result = self.call("sendMessage", body).await?;
        result
            .get("message_id")
            .and_then(Value::as_i64)
            .map(|id| id.to_string())
            .context("sendMessage result missing message_id")
    }

    async fn edit_message(
        &self,
        chat_id: &str,
        message_id: &str,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<()> {
        let mut body = json!({
            "chat_id": chat_id,
            "message_id": message_id.parse::<i64>().context("non-numeric message id")?,
            "text": text,
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        });
        if let Some(kb) = keyboard {
            body["reply_markup"] = keyboard_json(kb);
        }
        self.call("editMessageText", body).await?;
        Ok(())
    }

    async fn delete_message(&self, chat_id: &str, message_id: &str) -> Result<()> {
        self.call(
            "deleteMessage",
            json!({
                "chat_id": chat_id,
                "message_id": message_id.parse::<i64>().context("non-numeric message id")?,
            }),
        )
        .await?;
        Ok(())
    }

    async fn restrict_member(&self, chat_id: &str, user_id: &str, can_send: bool) -> Result<()> {
        self.call(
            "restrictChatMember",
            json!({
                "chat_id": chat_id,
                "user_id": user_id.parse::<i64>().context("non-numeric user id")?,
                "permissions": {
                    "can_send_messages": can_send,
                    "can_send_other_messages": can_send,
                    "can_add_web_page_previews": can_send,
                },
            }),
        )
        .await?;
        Ok(())
    }

    async fn set_reaction(&self, chat_id: &str, message_id: &str, emoji: &str) -> Result<()> {
        self.call(
            "setMessageReaction",
            json!({
                "chat_id": chat_id,
                "message_id": message_id.parse::<i64>().context("non-numeric message id")?,
                "reaction": [{ "type": "emoji", "emoji": emoji }],
            }),
        )
        .await?;
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<()> {
        self.call(
            "answerCallbackQuery",
            json!({ "callback_query_id": callback_id }),
        )
        .await?;
        Ok(())
    }
}
