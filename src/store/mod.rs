//! Sqlite-backed tenant and member records.
//!
//! The store is the only shared mutable state between the chat dispatcher and
//! the admin API. Callers always re-read rather than cache, and each
//! read-modify-write happens under one connection lock, so staleness is
//! bounded by a single round trip.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde_json::Value;
use std::path::Path;
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub struct Tenant {
    pub id: i64,
    pub chat_id: String,
    pub title: String,
    pub active: bool,
    /// Sparse settings override blob, interpreted only by the ConfigResolver.
    pub settings: Option<String>,
    /// Field schema override blob; absent = global default schema.
    pub fields: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Member {
    pub id: i64,
    pub tenant_id: i64,
    pub user_id: String,
    /// JSON object of field-key → value. Shape is defined by the tenant's
    /// current schema but not enforced retroactively.
    pub profile: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub muted: bool,
    pub online: bool,
    pub last_checkin: Option<DateTime<Utc>>,
}

impl Member {
    pub fn profile_map(&self) -> serde_json::Map<String, Value> {
        serde_json::from_str::<Value>(&self.profile)
            .ok()
            .and_then(|v| match v {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .unwrap_or_default()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }
}

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!(
                    "Failed to create database parent directory: {}",
                    parent.display()
                )
            })?;
        }

        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database at: {}", db_path.display()))?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA busy_timeout=3000;
             PRAGMA foreign_keys=ON;",
        )?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.ensure_schema().with_context(|| {
            format!(
                "Failed to initialize database schema at: {}",
                db_path.display()
            )
        })?;
        Ok(store)
    }

    fn ensure_schema(&self) -> Result<()> {
        let conn = self.lock();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS tenants (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                chat_id    TEXT NOT NULL UNIQUE,
                title      TEXT NOT NULL DEFAULT '',
                active     INTEGER NOT NULL DEFAULT 0,
                settings   TEXT,
                fields     TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS members (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                tenant_id    INTEGER NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
                user_id      TEXT NOT NULL,
                profile      TEXT NOT NULL DEFAULT '{}',
                expires_at   TEXT,
                muted        INTEGER NOT NULL DEFAULT 0,
                online       INTEGER NOT NULL DEFAULT 0,
                last_checkin TEXT,
                UNIQUE(tenant_id, user_id)
            );
            CREATE INDEX IF NOT EXISTS idx_members_tenant_online
                ON members(tenant_id, online, last_checkin);",
        )?;
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    // --- tenants ---

    pub fn tenant_by_chat(&self, chat_id: &str) -> Result<Option<Tenant>> {
        let conn = self.lock();
        let tenant = conn
            .query_row(
                "SELECT id, chat_id, title, active, settings, fields, created_at, updated_at
                 FROM tenants WHERE chat_id = ?1",
                params![chat_id],
                tenant_from_row,
            )
            .optional()?;
        Ok(tenant)
    }

    pub fn tenant_by_id(&self, id: i64) -> Result<Option<Tenant>> {
        let conn = self.lock();
        let tenant = conn
            .query_row(
                "SELECT id, chat_id, title, active, settings, fields, created_at, updated_at
                 FROM tenants WHERE id = ?1",
                params![id],
                tenant_from_row,
            )
            .optional()?;
        Ok(tenant)
    }

    /// Look up a tenant by chat id, creating an inactive one on first sight.
    /// The stored title is re-synced on every call.
    pub fn get_or_create_tenant(&self, chat_id: &str, title: &str) -> Result<Tenant> {
        {
            let conn = self.lock();
            let now = Utc::now().to_rfc3339();
            conn.execute(
                "INSERT INTO tenants (chat_id, title, active, created_at, updated_at)
                 VALUES (?1, ?2, 0, ?3, ?3)
                 ON CONFLICT(chat_id) DO UPDATE SET title = ?2, updated_at = ?3",
                params![chat_id, title, now],
            )?;
        }
        self.tenant_by_chat(chat_id)?
            .context("tenant vanished after upsert")
    }

    pub fn list_tenants(&self) -> Result<Vec<Tenant>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, chat_id, title, active, settings, fields, created_at, updated_at
             FROM tenants ORDER BY updated_at DESC",
        )?;
        let tenants = stmt
            .query_map([], tenant_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(tenants)
    }

    pub fn set_tenant_active(&self, id: i64, active: bool) -> Result<bool> {
        let conn = self.lock();
        let changed = conn.execute(
            "UPDATE tenants SET active = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, active, Utc::now().to_rfc3339()],
        )?;
        Ok(changed > 0)
    }

    pub fn set_tenant_settings(&self, id: i64, blob: &str) -> Result<bool> {
        let conn = self.lock();
        let changed = conn.execute(
            "UPDATE tenants SET settings = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, blob, Utc::now().to_rfc3339()],
        )?;
        Ok(changed > 0)
    }

    pub fn set_tenant_fields(&self, id: i64, blob: &str) -> Result<bool> {
        let conn = self.lock();
        let changed = conn.execute(
            "UPDATE tenants SET fields = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, blob, Utc::now().to_rfc3339()],
        )?;
        Ok(changed > 0)
    }

    /// Hard-delete a tenant. Member rows cascade.
    pub fn delete_tenant(&self, id: i64) -> Result<bool> {
        let conn = self.lock();
        let changed = conn.execute("DELETE FROM tenants WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    // --- members ---

    pub fn member(&self, tenant_id: i64, user_id: &str) -> Result<Option<Member>> {
        let conn = self.lock();
        let member = conn
            .query_row(
                "SELECT id, tenant_id, user_id, profile, expires_at, muted, online, last_checkin
                 FROM members WHERE tenant_id = ?1 AND user_id = ?2",
                params![tenant_id, user_id],
                member_from_row,
            )
            .optional()?;
        Ok(member)
    }

    /// Create or update a member record from the admin surface.
    ///
    /// `extend_days` extends the expiry from max(now, current expiry), so
    /// renewing before expiration does not lose the remaining time.
    pub fn upsert_member(
        &self,
        tenant_id: i64,
        user_id: &str,
        profile: &serde_json::Map<String, Value>,
        extend_days: i64,
        now: DateTime<Utc>,
    ) -> Result<Member> {
        let profile_blob = Value::Object(profile.clone()).to_string();
        {
            let mut conn = self.lock();
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO members (tenant_id, user_id, profile)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(tenant_id, user_id) DO UPDATE SET profile = ?3",
                params![tenant_id, user_id, profile_blob],
            )?;
            if extend_days != 0 {
                let current: Option<String> = tx.query_row(
                    "SELECT expires_at FROM members WHERE tenant_id = ?1 AND user_id = ?2",
                    params![tenant_id, user_id],
                    |row| row.get(0),
                )?;
                let base = current
                    .as_deref()
                    .and_then(parse_ts)
                    .filter(|at| *at > now)
                    .unwrap_or(now);
                let new_expiry = base + chrono::Duration::days(extend_days);
                tx.execute(
                    "UPDATE members SET expires_at = ?3 WHERE tenant_id = ?1 AND user_id = ?2",
                    params![tenant_id, user_id, new_expiry.to_rfc3339()],
                )?;
            }
            tx.commit()?;
        }
        self.member(tenant_id, user_id)?
            .context("member vanished after upsert")
    }

    pub fn delete_member(&self, tenant_id: i64, user_id: &str) -> Result<bool> {
        let conn = self.lock();
        let changed = conn.execute(
            "DELETE FROM members WHERE tenant_id = ?1 AND user_id = ?2",
            params![tenant_id, user_id],
        )?;
        Ok(changed > 0)
    }

    /// Admin listing, newest first, optional substring filter over the
    /// serialized profile.
    pub fn list_members(&self, tenant_id: i64, filter: Option<&str>) -> Result<Vec<Member>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, tenant_id, user_id, profile, expires_at, muted, online, last_checkin
             FROM members
             WHERE tenant_id = ?1 AND (?2 IS NULL OR profile LIKE '%' || ?2 || '%')
             ORDER BY id DESC",
        )?;
        let members = stmt
            .query_map(params![tenant_id, filter], member_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(members)
    }

    /// Members counted as online for the query command: `online` flag set and
    /// last check-in at or after `since` (the tenant-local midnight). Ordered
    /// by most recent check-in first.
    pub fn online_members(
        &self,
        tenant_id: i64,
        since: DateTime<Utc>,
        keyword: Option<&str>,
    ) -> Result<Vec<Member>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, tenant_id, user_id, profile, expires_at, muted, online, last_checkin
             FROM members
             WHERE tenant_id = ?1 AND online = 1
               AND last_checkin IS NOT NULL AND last_checkin >= ?2
               AND (?3 IS NULL OR profile LIKE '%' || ?3 || '%')
             ORDER BY last_checkin DESC",
        )?;
        let members = stmt
            .query_map(
                params![tenant_id, since.to_rfc3339(), keyword],
                member_from_row,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(members)
    }

    pub fn mark_checkin(&self, member_id: i64, now: DateTime<Utc>) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE members SET online = 1, last_checkin = ?2 WHERE id = ?1",
            params![member_id, now.to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn set_muted(&self, member_id: i64, muted: bool) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE members SET muted = ?2 WHERE id = ?1",
            params![member_id, muted],
        )?;
        Ok(())
    }

    /// Members whose mute state may need a transition: expired but not yet
    /// muted, or muted but no longer expired. Members without an expiry are
    /// never candidates.
    pub fn expiry_candidates(&self, tenant_id: i64, now: DateTime<Utc>) -> Result<Vec<Member>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, tenant_id, user_id, profile, expires_at, muted, online, last_checkin
             FROM members
             WHERE tenant_id = ?1 AND expires_at IS NOT NULL
               AND ((expires_at <= ?2 AND muted = 0) OR (expires_at > ?2 AND muted = 1))",
        )?;
        let members = stmt
            .query_map(params![tenant_id, now.to_rfc3339()], member_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(members)
    }
}

fn tenant_from_row(row: &Row<'_>) -> rusqlite::Result<Tenant> {
    Ok(Tenant {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        title: row.get(2)?,
        active: row.get(3)?,
        settings: row.get(4)?,
        fields: row.get(5)?,
        created_at: get_ts(row, 6)?.unwrap_or_else(Utc::now),
        updated_at: get_ts(row, 7)?.unwrap_or_else(Utc::now),
    })
}

fn member_from_row(row: &Row<'_>) -> rusqlite::Result<Member> {
    Ok(Member {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        user_id: row.get(2)?,
        profile: row.get(3)?,
        expires_at: get_ts(row, 4)?,
        muted: row.get(5)?,
        online: row.get(6)?,
        last_checkin: get_ts(row, 7)?,
    })
}

fn get_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    Ok(raw.as_deref().and_then(parse_ts))
}

fn parse_ts(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone as _;

    fn test_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("test.db")).unwrap();
        (dir, store)
    }

    #[test]
    fn tenant_created_inactive_and_title_synced() {
        let (_dir, store) = test_store();
        let tenant = store.get_or_create_tenant("-100123", "深圳群").unwrap();
        assert!(!tenant.active);
        assert_eq!(tenant.title, "深圳群");

        let again = store.get_or_create_tenant("-100123", "深圳大群").unwrap();
        assert_eq!(again.id, tenant.id);
        assert_eq!(again.title, "深圳大群");
    }

    #[test]
    fn tenant_activation_round_trip() {
        let (_dir, store) = test_store();
        let tenant = store.get_or_create_tenant("-1", "t").unwrap();
        assert!(store.set_tenant_active(tenant.id, true).unwrap());
        assert!(store.tenant_by_id(tenant.id).unwrap().unwrap().active);
        assert!(!store.set_tenant_active(9999, true).unwrap());
    }

    #[test]
    fn upsert_member_extends_from_remaining_time() {
        let (_dir, store) = test_store();
        let tenant = store.get_or_create_tenant("-1", "t").unwrap();
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();

        let profile = serde_json::Map::new();
        let member = store
            .upsert_member(tenant.id, "u1", &profile, 30, now)
            .unwrap();
        assert_eq!(member.expires_at.unwrap(), now + chrono::Duration::days(30));

        // Renewing before expiry adds to the remaining time
        let later = now + chrono::Duration::days(10);
        let member = store
            .upsert_member(tenant.id, "u1", &profile, 30, later)
            .unwrap();
        assert_eq!(member.expires_at.unwrap(), now + chrono::Duration::days(60));

        // Renewing after expiry restarts from now
        let long_after = now + chrono::Duration::days(100);
        let member = store
            .upsert_member(tenant.id, "u1", &profile, 7, long_after)
            .unwrap();
        assert_eq!(
            member.expires_at.unwrap(),
            long_after + chrono::Duration::days(7)
        );
    }

    #[test]
    fn online_members_filters_window_and_keyword() {
        let (_dir, store) = test_store();
        let tenant = store.get_or_create_tenant("-1", "t").unwrap();
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let midnight = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();

        let mut profile = serde_json::Map::new();
        profile.insert("region".into(), Value::String("南山".into()));
        let a = store.upsert_member(tenant.id, "a", &profile, 0, now).unwrap();
        store.mark_checkin(a.id, now).unwrap();

        let mut profile_b = serde_json::Map::new();
        profile_b.insert("region".into(), Value::String("福田".into()));
        let b = store
            .upsert_member(tenant.id, "b", &profile_b, 0, now)
            .unwrap();
        // checked in yesterday — outside the window
        store
            .mark_checkin(b.id, midnight - chrono::Duration::hours(1))
            .unwrap();

        let online = store.online_members(tenant.id, midnight, None).unwrap();
        assert_eq!(online.len(), 1);
        assert_eq!(online[0].user_id, "a");

        let hits = store
            .online_members(tenant.id, midnight, Some("南山"))
            .unwrap();
        assert_eq!(hits.len(), 1);
        let misses = store
            .online_members(tenant.id, midnight, Some("罗湖"))
            .unwrap();
        assert!(misses.is_empty());
    }

    #[test]
    fn online_members_ordered_most_recent_first() {
        let (_dir, store) = test_store();
        let tenant = store.get_or_create_tenant("-1", "t").unwrap();
        let base = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();
        let profile = serde_json::Map::new();
        for (i, uid) in ["u1", "u2", "u3"].iter().enumerate() {
            let m = store.upsert_member(tenant.id, uid, &profile, 0, base).unwrap();
            store
                .mark_checkin(m.id, base + chrono::Duration::minutes(i as i64))
                .unwrap();
        }
        let online = store
            .online_members(tenant.id, base - chrono::Duration::hours(1), None)
            .unwrap();
        let ids: Vec<_> = online.iter().map(|m| m.user_id.as_str()).collect();
        assert_eq!(ids, vec!["u3", "u2", "u1"]);
    }

    #[test]
    fn delete_tenant_cascades_members(){
        let (_dir, store) = test_store();
        let tenant = store.get_or_create_tenant("-1", "t").unwrap();
        let profile = serde_json::Map::new();
        store
            .upsert_member(tenant.id, "u1", &profile, 0, Utc::now())
            .unwrap();
        assert!(store.delete_tenant(tenant.id).unwrap());
        assert!(store.list_members(tenant.id, None).unwrap().is_empty());
    }

    #[test]
    fn expiry_candidates_selects_both_directions() {
        let (_dir, store) = test_store();
        let tenant = store.get_or_create_tenant("-1", "t").unwrap();
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let profile = serde_json::Map::new();

        // expired, not muted → candidate
        store.upsert_member(tenant.id, "gone", &profile, -5, now).unwrap();
        // valid, muted → candidate
        let back = store.upsert_member(tenant.id, "back", &profile, 5, now).unwrap();
        store.set_muted(back.id, true).unwrap();
        // valid, unmuted → not a candidate
        store.upsert_member(tenant.id, "fine", &profile, 5, now).unwrap();
        // no expiry → never a candidate
        store.upsert_member(tenant.id, "forever", &profile, 0, now).unwrap();

        let mut ids: Vec<_> = store
            .expiry_candidates(tenant.id, now)
            .unwrap()
            .into_iter()
            .map(|m| m.user_id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["back", "gone"]);
    }

    #[test]
    fn member_profile_map_tolerates_garbage() {
        let member = Member {
            id: 1,
            tenant_id: 1,
            user_id: "u".into(),
            profile: "not json".into(),
            expires_at: None,
            muted: false,
            online: false,
            last_checkin: None,
        };
        assert!(member.profile_map().is_empty());
        assert!(!member.is_expired(Utc::now()));
    }
}
