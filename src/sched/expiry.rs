//! Membership expiry enforcement.
//!
//! Transitions key off the persisted `muted` flag, never off wall-clock
//! guesswork: an expired member is muted exactly once, and a renewed member
//! is unmuted exactly once. The store flag only flips after the platform
//! accepted the restriction, so a failed call is retried on the next sweep.

use crate::config::{TenantSettings, parse_fields};
use crate::store::{Member, Store, Tenant};
use crate::template;
use crate::transport::ChatTransport;
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MuteTransition {
    None,
    Mute,
    Unmute,
}

/// Decide which transition, if any, a member needs at `now`. Members without
/// an expiry never transition.
pub fn evaluate(member: &Member, now: DateTime<Utc>) -> MuteTransition {
    if member.expires_at.is_none() {
        return MuteTransition::None;
    }
    match (member.is_expired(now), member.muted) {
        (true, false) => MuteTransition::Mute,
        (false, true) => MuteTransition::Unmute,
        _ => MuteTransition::None,
    }
}

pub struct ExpiryEnforcer {
    store: Arc<Store>,
    transport: Arc<dyn ChatTransport>,
}

impl ExpiryEnforcer {
    pub fn new(store: Arc<Store>, transport: Arc<dyn ChatTransport>) -> Self {
        Self { store, transport }
    }

    /// Apply one member's pending transition, if any.
    pub async fn enforce_member(
        &self,
        tenant: &Tenant,
        settings: &TenantSettings,
        member: &Member,
        now: DateTime<Utc>,
    ) -> Result<MuteTransition> {
        let transition = evaluate(member, now);
        match transition {
            MuteTransition::None => {}
            MuteTransition::Mute => {
                self.transport
                    .restrict_member(&tenant.chat_id, &member.user_id, false)
                    .await?;
                self.store.set_muted(member.id, true)?;
                info!(
                    "Muted expired member {} in tenant {}",
                    member.user_id, tenant.chat_id
                );
                // the notice is a template too, so it can name the member
                let notice = template::render(
                    &settings.msg_expired,
                    &member.profile_map(),
                    &parse_fields(tenant.fields.as_deref()),
                    &[("onlineEmoji", settings.offline_emoji.as_str())],
                );
                if !notice.is_empty() {
                    if let Err(e) = self
                        .transport
                        .send_message(&tenant.chat_id, &notice, None)
                        .await
                    {
                        debug!("Expiry notice failed for {}: {e:#}", tenant.chat_id);
                    }
                }
            }
            MuteTransition::Unmute => {
                self.transport
                    .restrict_member(&tenant.chat_id, &member.user_id, true)
                    .await?;
                self.store.set_muted(member.id, false)?;
                info!(
                    "Unmuted renewed member {} in tenant {}",
                    member.user_id, tenant.chat_id
                );
            }
        }
        Ok(transition)
    }

    /// Sweep one tenant's candidates. Per-member failures are logged and
    /// skipped so one revoked bot permission cannot stall the rest.
    pub async fn enforce_tenant(
        &self,
        tenant: &Tenant,
        settings: &TenantSettings,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let mut applied = 0;
        for member in self.store.expiry_candidates(tenant.id, now)? {
            match self.enforce_member(tenant, settings, &member, now).await {
                Ok(MuteTransition::None) => {}
                Ok(_) => applied += 1,
                Err(e) => warn!(
                    "Expiry enforcement failed for {} in {}: {e:#}",
                    member.user_id, tenant.chat_id
                ),
            }
        }
        Ok(applied)
    }

    /// One pass over every active tenant.
    pub async fn sweep(&self, now: DateTime<Utc>) {
        let tenants = match self.store.list_tenants() {
            Ok(tenants) => tenants,
            Err(e) => {
                warn!("Expiry sweep could not list tenants: {e:#}");
                return;
            }
        };
        for tenant in tenants.into_iter().filter(|t| t.active) {
            let settings = TenantSettings::resolve(tenant.settings.as_deref());
            match self.enforce_tenant(&tenant, &settings, now).await {
                Ok(0) => {}
                Ok(n) => debug!("Expiry sweep applied {n} transitions in {}", tenant.chat_id),
                Err(e) => warn!("Expiry sweep failed for {}: {e:#}", tenant.chat_id),
            }
        }
    }

    /// Periodic sweep loop. Runs until the task is dropped.
    pub async fn run(self: Arc<Self>, interval_secs: u64) {
        let interval = Duration::from_secs(interval_secs.max(1));
        info!("Expiry sweep every {}s", interval.as_secs());
        loop {
            self.sweep(Utc::now()).await;
            tokio::time::sleep(interval).await;
        }
    }
}
