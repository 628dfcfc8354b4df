//! Ties the pieces together: one inbound event in, zero or more transport
//! calls out.
//!
//! Tenant config is re-resolved from the store on every event, so admin edits
//! take effect on the next message with no restart or cache invalidation.
//! Dispatch never fails on a malformed tenant blob — resolution falls back to
//! defaults upstream.

use crate::bus::{CallbackEvent, InboundEvent, MessageEvent};
use crate::config::{FieldDefinition, TenantSettings, parse_fields};
use crate::errors::{RollcallError, RollcallResult};
use crate::query::{self, NOOP_TOKEN, PageToken};
use crate::router::{self, Command};
use crate::sched::{ExpiryEnforcer, delete_after};
use crate::store::{Member, Store, Tenant};
use crate::transport::ChatTransport;
use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct Dispatcher {
    store: Arc<Store>,
    transport: Arc<dyn ChatTransport>,
    enforcer: Arc<ExpiryEnforcer>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<Store>,
        transport: Arc<dyn ChatTransport>,
        enforcer: Arc<ExpiryEnforcer>,
    ) -> Self {
        Self {
            store,
            transport,
            enforcer,
        }
    }

    pub async fn handle_event(&self, event: InboundEvent) -> RollcallResult<()> {
        match event {
            InboundEvent::Message(msg) => self.handle_message(msg).await,
            InboundEvent::Callback(cb) => {
                self.handle_callback(cb).await?;
                Ok(())
            }
        }
    }

    async fn handle_message(&self, msg: MessageEvent) -> RollcallResult<()> {
        if !msg.chat_kind.is_tenant_scope() {
            debug!("Ignoring {:?} message from {}", msg.chat_kind, msg.chat_id);
            return Ok(());
        }

        // Auto-discovery: unknown chats become inactive tenants, titles stay
        // in sync. Nothing else happens until an operator activates them.
        let tenant = self.store.get_or_create_tenant(&msg.chat_id, &msg.chat_title)?;
        if !tenant.active {
            return Err(RollcallError::TenantInactive {
                chat_id: msg.chat_id,
            });
        }

        let settings = TenantSettings::resolve(tenant.settings.as_deref());
        let fields = parse_fields(tenant.fields.as_deref());
        let now = msg.timestamp;

        // Opportunistic enforcement: a message from an expired member settles
        // their mute state before the command runs, without waiting for the
        // periodic sweep.
        if let Some(member) = self.store.member(tenant.id, &msg.sender_id)? {
            if let Err(e) = self
                .enforcer
                .enforce_member(&tenant, &settings, &member, now)
                .await
            {
                warn!("Inline expiry enforcement failed: {e:#}");
            }
            // registered members get the reaction on every message, command
            // or not
            if settings.auto_react {
                if let Err(e) = self
                    .transport
                    .set_reaction(&tenant.chat_id, &msg.message_id, &settings.react_emoji)
                    .await
                {
                    debug!("Reaction failed: {e:#}");
                }
            }
        }

        match router::route(&msg.text, &settings) {
            Command::CheckIn => self.handle_checkin(&tenant, &settings, &msg).await?,
            Command::Query { keyword, implicit } => {
                self.handle_query(&tenant, &settings, &fields, &msg, keyword.as_deref(), implicit)
                    .await?;
            }
            Command::Ignore => {}
        }
        Ok(())
    }

    async fn handle_checkin(
        &self,
        tenant: &Tenant,
        settings: &TenantSettings,
        msg: &MessageEvent,
    ) -> Result<()> {
        if !settings.checkin_enabled {
            return Ok(());
        }
        let now = msg.timestamp;

        let Some(member) = self.store.member(tenant.id, &msg.sender_id)? else {
            self.reply_ephemeral(tenant, settings, msg, &settings.msg_not_registered)
                .await;
            return Ok(());
        };

        if member.is_expired(now) {
            // inline enforcement above already muted them; just explain
            self.reply_ephemeral(tenant, settings, msg, &settings.msg_expired)
                .await;
            return Ok(());
        }

        let already_today = member
            .last_checkin
            .is_some_and(|at| settings.same_local_day(at, now));
        if already_today {
            self.reply_ephemeral(tenant, settings, msg, &settings.msg_checkin_repeat)
                .await;
            return Ok(());
        }

        self.store.mark_checkin(member.id, now)?;
        self.reply_ephemeral(tenant, settings, msg, &settings.msg_checkin_success)
            .await;
        Ok(())
    }

    async fn handle_query(
        &self,
        tenant: &Tenant,
        settings: &TenantSettings,
        fields: &[FieldDefinition],
        msg: &MessageEvent,
        keyword: Option<&str>,
        implicit: bool,
    ) -> Result<()> {
        if !settings.query_enabled {
            // implicit matches are just chat once the feature is off
            if !implicit {
                self.reply_ephemeral(tenant, settings, msg, &settings.msg_query_closed)
                    .await;
            }
            return Ok(());
        }

        let since = settings.local_day_start(msg.timestamp);
        let members = self.store.online_members(tenant.id, since, keyword)?;

        if members.is_empty() {
            // implicit queries stay silent on zero hits so ordinary short
            // messages are never answered
            if !implicit {
                self.reply_ephemeral(tenant, settings, msg, &settings.msg_no_results)
                    .await;
            }
            return Ok(());
        }

        let token = PageToken::new(1, keyword);
        let page = query::build_page(&members, fields, settings, &token);
        let keyboard = (!page.keyboard.is_empty()).then_some(&page.keyboard);
        let reply_id = self
            .transport
            .send_message(&tenant.chat_id, &page.text, keyboard)
            .await
            .context("query reply failed")?;
        self.schedule_cleanup(tenant, settings, &[&msg.message_id, &reply_id]);
        Ok(())
    }

    async fn handle_callback(&self, cb: CallbackEvent) -> Result<()> {
        // ack first so the client spinner stops even if re-rendering fails
        if let Err(e) = self.transport.answer_callback(&cb.callback_id).await {
            debug!("answer_callback failed: {e:#}");
        }
        if cb.data == NOOP_TOKEN {
            return Ok(());
        }
        let Some(token) = PageToken::decode(&cb.data) else {
            debug!("Unrecognized callback payload {:?}", cb.data);
            return Ok(());
        };

        let Some(tenant) = self.store.tenant_by_chat(&cb.chat_id)? else {
            return Ok(());
        };
        if !tenant.active {
            return Ok(());
        }
        let settings = TenantSettings::resolve(tenant.settings.as_deref());
        let fields = parse_fields(tenant.fields.as_deref());

        if !settings.query_enabled {
            self.transport
                .edit_message(&cb.chat_id, &cb.message_id, &settings.msg_query_closed, None)
                .await?;
            return Ok(());
        }

        // Re-run the query: the keyboard may be minutes old and the member
        // set has moved on. The token's page clamps to the current range.
        let since = settings.local_day_start(Utc::now());
        let members = self
            .store
            .online_members(tenant.id, since, token.keyword.as_deref())?;
        if members.is_empty() {
            self.transport
                .edit_message(&cb.chat_id, &cb.message_id, &settings.msg_no_results, None)
                .await?;
            return Ok(());
        }

        let page = query::build_page(&members, &fields, &settings, &token);
        let keyboard = (!page.keyboard.is_empty()).then_some(&page.keyboard);
        self.transport
            .edit_message(&cb.chat_id, &cb.message_id, &page.text, keyboard)
            .await?;
        Ok(())
    }

    /// Push one member's card to the tenant's configured push channel.
    /// Operator-triggered from the admin surface.
    pub async fn push_member(&self, tenant: &Tenant, member: &Member) -> Result<String> {
        let settings = TenantSettings::resolve(tenant.settings.as_deref());
        if settings.push_channel.is_empty() {
            return Err(anyhow!("tenant {} has no push channel configured", tenant.chat_id));
        }
        let fields = parse_fields(tenant.fields.as_deref());
        let emoji = if member.online {
            settings.online_emoji.as_str()
        } else {
            settings.offline_emoji.as_str()
        };
        let card = crate::template::render(
            &settings.card_template,
            &member.profile_map(),
            &fields,
            &[("onlineEmoji", emoji)],
        );
        self.transport
            .send_message(&settings.push_channel, &card, None)
            .await
            .context("push failed")
    }

    /// Send a short notice, scheduling both the triggering message and the
    /// notice for deletion.
    async fn reply_ephemeral(
        &self,
        tenant: &Tenant,
        settings: &TenantSettings,
        msg: &MessageEvent,
        text: &str,
    ) {
        match self.transport.send_message(&tenant.chat_id, text, None).await {
            Ok(reply_id) => self.schedule_cleanup(tenant, settings, &[&msg.message_id, &reply_id]),
            Err(e) => warn!("Reply to {} failed: {e:#}", tenant.chat_id),
        }
    }

    fn schedule_cleanup(&self, tenant: &Tenant, settings: &TenantSettings, message_ids: &[&str]) {
        for id in message_ids {
            delete_after(
                self.transport.clone(),
                tenant.chat_id.clone(),
                (*id).to_string(),
                settings.delete_after_secs,
            );
        }
    }
}
