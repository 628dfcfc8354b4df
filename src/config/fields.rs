use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Placeholder names reserved for context variables. The schema editor must
/// refuse these as labels so field substitution can never shadow them.
pub const RESERVED_LABELS: &[&str] = &["onlineEmoji"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// Free text.
    Text,
    /// Single choice from `options`.
    Select,
    /// Multiple choices from `options`; stored as a JSON array.
    Checkbox,
}

/// One profile field a tenant has defined. Templates reference fields by
/// `label`, so operators can rename labels without rewriting stored profiles;
/// resolution happens through the current schema at render time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub key: String,
    pub label: String,
    #[serde(rename = "type")]
    pub kind: FieldKind,
    #[serde(default)]
    pub options: Vec<String>,
    /// Whether this field participates in keyword search (admin-side hint).
    #[serde(default)]
    pub search: bool,
}

/// The global default schema used until a tenant defines its own.
pub fn default_fields() -> Vec<FieldDefinition> {
    let spec = [
        ("name", "名字", FieldKind::Text, vec![], true),
        ("link", "频道链接", FieldKind::Text, vec![], false),
        (
            "region",
            "地区",
            FieldKind::Select,
            vec!["福田", "南山", "罗湖", "宝安"],
            true,
        ),
        ("price", "价位", FieldKind::Text, vec![], true),
        (
            "tags",
            "类型",
            FieldKind::Checkbox,
            vec!["上门", "到店", "短发", "长发"],
            false,
        ),
    ];
    spec.into_iter()
        .map(|(key, label, kind, options, search)| FieldDefinition {
            key: key.to_string(),
            label: label.to_string(),
            kind,
            options: options.into_iter().map(str::to_string).collect(),
            search,
        })
        .collect()
}

/// Parse a tenant's stored schema override. Malformed or absent blobs fall
/// back to the global default schema.
pub fn parse_fields(raw: Option<&str>) -> Vec<FieldDefinition> {
    let Some(raw) = raw else {
        return default_fields();
    };
    match serde_json::from_str::<Vec<FieldDefinition>>(raw) {
        Ok(fields) if !fields.is_empty() => fields,
        Ok(_) => default_fields(),
        Err(e) => {
            warn!("Malformed field schema override ({}), using defaults", e);
            default_fields()
        }
    }
}

/// Validate a schema before it is stored: keys and labels must be unique and
/// non-empty, and labels must not shadow reserved context placeholders.
pub fn validate_fields(fields: &[FieldDefinition]) -> Result<()> {
    let mut seen_keys = std::collections::HashSet::new();
    let mut seen_labels = std::collections::HashSet::new();
    for field in fields {
        if field.key.trim().is_empty() || field.label.trim().is_empty() {
            bail!("field key and label must be non-empty");
        }
        if RESERVED_LABELS.contains(&field.label.as_str()) {
            bail!("label '{}' is reserved", field.label);
        }
        if !seen_keys.insert(field.key.as_str()) {
            bail!("duplicate field key '{}'", field.key);
        }
        if !seen_labels.insert(field.label.as_str()) {
            bail!("duplicate field label '{}'", field.label);
        }
    }
    Ok(())
}
