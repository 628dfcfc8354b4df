use chrono::{DateTime, Datelike, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Operator-defined link button appended below the query navigation row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkButton {
    pub label: String,
    pub url: String,
}

/// The effective per-tenant configuration for one dispatch.
///
/// Produced by [`TenantSettings::resolve`] from the tenant's sparse override
/// blob layered onto the defaults below. Every documented key is a named
/// field; keys this version does not know about are preserved in `extra` so
/// an older binary never drops settings written by a newer admin surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantSettings {
    /// Comma-separated check-in command aliases, matched exactly.
    #[serde(default = "default_checkin_commands", rename = "checkinCommands")]
    pub checkin_commands: String,
    #[serde(default = "default_true", rename = "checkinEnabled")]
    pub checkin_enabled: bool,

    /// Comma-separated query command aliases.
    #[serde(default = "default_query_commands", rename = "queryCommands")]
    pub query_commands: String,
    #[serde(default = "default_true", rename = "queryEnabled")]
    pub query_enabled: bool,

    /// Treat any short, non-command message as a keyword search. Silent on
    /// zero matches, so ordinary chat is swallowed rather than answered.
    #[serde(default, rename = "implicitQuery")]
    pub implicit_query: bool,
    #[serde(default = "default_implicit_max_chars", rename = "implicitMaxChars")]
    pub implicit_max_chars: usize,

    #[serde(default = "default_page_size", rename = "pageSize")]
    pub page_size: usize,
    #[serde(default = "default_card_template", rename = "cardTemplate")]
    pub card_template: String,
    #[serde(default = "default_query_header", rename = "queryHeader")]
    pub query_header: String,
    #[serde(default = "default_online_emoji", rename = "onlineEmoji")]
    pub online_emoji: String,
    #[serde(default = "default_offline_emoji", rename = "offlineEmoji")]
    pub offline_emoji: String,

    #[serde(default = "default_msg_checkin_success", rename = "msgCheckinSuccess")]
    pub msg_checkin_success: String,
    #[serde(default = "default_msg_checkin_repeat", rename = "msgCheckinRepeat")]
    pub msg_checkin_repeat: String,
    #[serde(default = "default_msg_not_registered", rename = "msgNotRegistered")]
    pub msg_not_registered: String,
    #[serde(default = "default_msg_expired", rename = "msgExpired")]
    pub msg_expired: String,
    #[serde(default = "default_msg_no_results", rename = "msgNoResults")]
    pub msg_no_results: String,
    #[serde(default = "default_msg_query_closed", rename = "msgQueryClosed")]
    pub msg_query_closed: String,

    /// Seconds before command messages and replies are deleted. 0 disables.
    #[serde(default = "default_delete_after", rename = "deleteAfterSecs")]
    pub delete_after_secs: u64,

    #[serde(default, rename = "autoReact")]
    pub auto_react: bool,
    #[serde(default = "default_react_emoji", rename = "reactEmoji")]
    pub react_emoji: String,

    /// Outbound channel for pushed member cards. Empty = push disabled.
    #[serde(default, rename = "pushChannel")]
    pub push_channel: String,

    /// IANA timezone defining the tenant-local "today" window.
    #[serde(default = "default_timezone")]
    pub timezone: String,

    #[serde(default, rename = "extraLinks")]
    pub extra_links: Vec<LinkButton>,

    /// Unknown keys carried through untouched for forward compatibility.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

fn default_checkin_commands() -> String {
    "打卡".to_string()
}

fn default_query_commands() -> String {
    "查询".to_string()
}

fn default_true() -> bool {
    true
}

fn default_implicit_max_chars() -> usize {
    15
}

fn default_page_size() -> usize {
    10
}

fn default_card_template() -> String {
    "<b>{onlineEmoji} {名字}</b>\n📍 {地区}｜💰 {价位}".to_string()
}

fn default_query_header() -> String {
    "📋 今日在线".to_string()
}

fn default_online_emoji() -> String {
    "🟢".to_string()
}

fn default_offline_emoji() -> String {
    "🔴".to_string()
}

fn default_msg_checkin_success() -> String {
    "✅ 打卡成功！在线状态：🟢".to_string()
}

fn default_msg_checkin_repeat() -> String {
    "📅 今天已打卡！".to_string()
}

fn default_msg_not_registered() -> String {
    "⚠️ 请先联系管理员认证！".to_string()
}

fn default_msg_expired() -> String {
    "❌ 会员已过期，已暂停发言权限。".to_string()
}

fn default_msg_no_results() -> String {
    "😢 暂无打卡记录".to_string()
}

fn default_msg_query_closed() -> String {
    "⛔️ 查询功能已关闭".to_string()
}

fn default_delete_after() -> u64 {
    30
}

fn default_react_emoji() -> String {
    "❤️".to_string()
}

fn default_timezone() -> String {
    "Asia/Shanghai".to_string()
}

impl Default for TenantSettings {
    fn default() -> Self {
        // Deserializing an empty object applies every field default.
        serde_json::from_value(Value::Object(serde_json::Map::new()))
            .unwrap_or_else(|e| unreachable!("empty settings object must deserialize: {}", e))
    }
}

impl TenantSettings {
    /// Merge a tenant's stored override blob onto the defaults.
    ///
    /// Only non-null override keys replace defaults. A malformed blob is
    /// treated as an empty override — resolution never fails a dispatch.
    pub fn resolve(raw: Option<&str>) -> Self {
        let defaults = Self::default();
        let Some(raw) = raw else {
            return defaults;
        };
        let over = match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => map,
            Ok(_) | Err(_) => {
                warn!("Malformed tenant settings override, using defaults");
                return defaults;
            }
        };

        let Ok(Value::Object(mut base)) = serde_json::to_value(&defaults) else {
            return defaults;
        };
        for (key, value) in over {
            if !value.is_null() {
                base.insert(key, value);
            }
        }

        match serde_json::from_value(Value::Object(base)) {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Tenant settings override has invalid shape ({}), using defaults", e);
                defaults
            }
        }
    }

    pub fn checkin_aliases(&self) -> Vec<&str> {
        split_aliases(&self.checkin_commands)
    }

    pub fn query_aliases(&self) -> Vec<&str> {
        split_aliases(&self.query_commands)
    }

    pub fn tz(&self) -> Tz {
        self.timezone.parse().unwrap_or_else(|_| {
            warn!("Invalid timezone '{}', falling back to UTC", self.timezone);
            Tz::UTC
        })
    }

    /// Start of the tenant-local calendar day containing `now`, in UTC.
    pub fn local_day_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let tz = self.tz();
        let local = now.with_timezone(&tz);
        tz.with_ymd_and_hms(local.year(), local.month(), local.day(), 0, 0, 0)
            .earliest()
            .map_or(now, |midnight| midnight.with_timezone(&Utc))
    }

    /// Whether two instants fall on the same tenant-local calendar day.
    pub fn same_local_day(&self, a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
        let tz = self.tz();
        a.with_timezone(&tz).date_naive() == b.with_timezone(&tz).date_naive()
    }
}

fn split_aliases(raw: &str) -> Vec<&str> {
    raw.split([',', '，'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Apply a sparse patch to a stored override blob, keeping it sparse.
///
/// Explicit nulls delete the key (the tenant reverts to the default); other
/// values overwrite. Returns the new blob to store.
pub fn merge_override(current: Option<&str>, patch: &serde_json::Map<String, Value>) -> String {
    let mut base = current
        .and_then(|raw| serde_json::from_str::<Value>(raw).ok())
        .and_then(|v| match v {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .unwrap_or_default();

    for (key, value) in patch {
        if value.is_null() {
            base.remove(key);
        } else {
            base.insert(key.clone(), value.clone());
        }
    }

    Value::Object(base).to_string()
}
