//! Member card rendering.
//!
//! Templates reference profile fields by their *label* (`{地区}`), resolved
//! through the tenant's current schema at render time, so renaming a label in
//! the schema editor is enough to retarget existing templates. Placeholders
//! that match nothing are stripped, so a template referencing a retired field
//! degrades to blank instead of leaking `{...}` syntax.
//!
//! Implemented as a single left-to-right scan over the template rather than
//! chained `replace` calls: each placeholder is resolved exactly once, and
//! unmatched-placeholder detection is exact.

use crate::config::FieldDefinition;
use serde_json::Value;

/// Reserved context variables substituted after field labels. Labels may not
/// shadow these (enforced by the schema editor, `config::validate_fields`).
pub type ContextVars<'a> = [(&'a str, &'a str)];

/// Render `template` against one member profile.
///
/// Profile and context values are HTML-escaped; template text passes through
/// untouched so operators can use Telegram HTML markup in templates.
pub fn render(
    template: &str,
    profile: &serde_json::Map<String, Value>,
    fields: &[FieldDefinition],
    context: &ContextVars<'_>,
) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after_open = &rest[open + 1..];

        let close = after_open.find('}');
        // A nested '{' before the '}' means the first brace is literal text.
        let inner_open = after_open.find('{');
        match close {
            Some(close) if inner_open.is_none_or(|i| close < i) => {
                let name = &after_open[..close];
                if let Some(value) = resolve(name, profile, fields, context) {
                    out.push_str(&html_escape::encode_text(&value));
                }
                // unmatched placeholders are dropped entirely
                rest = &after_open[close + 1..];
            }
            _ => {
                out.push('{');
                rest = after_open;
            }
        }
    }
    out.push_str(rest);
    out
}

fn resolve(
    name: &str,
    profile: &serde_json::Map<String, Value>,
    fields: &[FieldDefinition],
    context: &ContextVars<'_>,
) -> Option<String> {
    // Field labels first; context names are reserved and cannot be labels.
    if let Some(field) = fields.iter().find(|f| f.label == name) {
        return Some(
            profile
                .get(&field.key)
                .map(stringify_value)
                .unwrap_or_default(),
        );
    }
    context
        .iter()
        .find(|(key, _)| *key == name)
        .map(|(_, value)| (*value).to_string())
}

/// Default formatting for profile values: strings as-is, numbers/booleans via
/// `to_string`, arrays space-joined. No locale-aware formatting.
fn stringify_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(items) => items
            .iter()
            .map(stringify_value)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" "),
        Value::Null | Value::Object(_) => String::new(),
    }
}
