#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use rollcall::bus::{ChatKind, InboundEvent, MessageEvent};
use rollcall::dispatch::Dispatcher;
use rollcall::sched::ExpiryEnforcer;
use rollcall::store::Store;
use rollcall::transport::{ChatTransport, Keyboard};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone)]
pub struct SentMessage {
    pub chat_id: String,
    pub text: String,
    pub keyboard: Option<Keyboard>,
}

#[derive(Debug, Clone)]
pub struct EditedMessage {
    pub chat_id: String,
    pub message_id: String,
    pub text: String,
    pub keyboard: Option<Keyboard>,
}

/// Records every outbound call so tests can assert on exact traffic.
/// Message ids count up from 1000 to stay distinct from inbound ids.
#[derive(Default)]
pub struct MockTransport {
    pub sends: Mutex<Vec<SentMessage>>,
    pub edits: Mutex<Vec<EditedMessage>>,
    pub deletes: Mutex<Vec<(String, String)>>,
    pub restricts: Mutex<Vec<(String, String, bool)>>,
    pub reactions: Mutex<Vec<(String, String, String)>>,
    pub answered: Mutex<Vec<String>>,
    next_id: AtomicU64,
}

impl MockTransport {
    pub fn sent_texts(&self) -> Vec<String> {
        self.sends.lock().unwrap().iter().map(|m| m.text.clone()).collect()
    }

    pub fn last_send(&self) -> SentMessage {
        self.sends.lock().unwrap().last().cloned().expect("no message sent")
    }

    pub fn last_edit(&self) -> EditedMessage {
        self.edits.lock().unwrap().last().cloned().expect("no message edited")
    }
}

#[async_trait]
impl ChatTransport for MockTransport {
    fn name(&self) -> &str {
        "mock"
    }

    async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<String> {
        self.sends.lock().unwrap().push(SentMessage {
            chat_id: chat_id.to_string(),
            text: text.to_string(),
            keyboard: keyboard.cloned(),
        });
        Ok((1000 + self.next_id.fetch_add(1, Ordering::SeqCst)).to_string())
    }

    async fn edit_message(
        &self,
        chat_id: &str,
        message_id: &str,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<()> {
        self.edits.lock().unwrap().push(EditedMessage {
            chat_id: chat_id.to_string(),
            message_id: message_id.to_string(),
            text: text.to_string(),
            keyboard: keyboard.cloned(),
        });
        Ok(())
    }

    async fn delete_message(&self, chat_id: &str, message_id: &str) -> Result<()> {
        self.deletes
            .lock()
            .unwrap()
            .push((chat_id.to_string(), message_id.to_string()));
        Ok(())
    }

    async fn restrict_member(&self, chat_id: &str, user_id: &str, can_send: bool) -> Result<()> {
        self.restricts
            .lock()
            .unwrap()
            .push((chat_id.to_string(), user_id.to_string(), can_send));
        Ok(())
    }

    async fn set_reaction(&self, chat_id: &str, message_id: &str, emoji: &str) -> Result<()> {
        self.reactions.lock().unwrap().push((
            chat_id.to_string(),
            message_id.to_string(),
            emoji.to_string(),
        ));
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<()> {
        self.answered.lock().unwrap().push(callback_id.to_string());
        Ok(())
    }
}

pub struct Harness {
    pub store: Arc<Store>,
    pub transport: Arc<MockTransport>,
    pub dispatcher: Dispatcher,
    _dir: tempfile::TempDir,
}

pub fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(Store::open(dir.path().join("test.db")).unwrap());
    let transport = Arc::new(MockTransport::default());
    let enforcer = Arc::new(ExpiryEnforcer::new(store.clone(), transport.clone()));
    let dispatcher = Dispatcher::new(store.clone(), transport.clone(), enforcer);
    Harness {
        store,
        transport,
        dispatcher,
        _dir: dir,
    }
}

pub fn group_message(chat_id: &str, sender_id: &str, text: &str) -> InboundEvent {
    InboundEvent::Message(MessageEvent {
        chat_id: chat_id.to_string(),
        chat_title: "测试群".to_string(),
        chat_kind: ChatKind::Supergroup,
        sender_id: sender_id.to_string(),
        message_id: "1".to_string(),
        text: text.to_string(),
        timestamp: Utc::now(),
    })
}
