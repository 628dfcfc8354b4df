//! Maps inbound message text to a tenant operation.
//!
//! Matching is tenant-configured: alias lists for the check-in and query
//! commands, then an optional implicit-query fallback for short free text.
//! The router is pure — enablement flags (`checkinEnabled`, `queryEnabled`)
//! are the dispatcher's concern, so a disabled command can still answer with
//! its closed-notice instead of being silently ignored.

use crate::config::TenantSettings;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    CheckIn,
    Query {
        keyword: Option<String>,
        /// Set when the text matched as implicit free text rather than an
        /// explicit query alias. Implicit queries stay silent on zero hits.
        implicit: bool,
    },
    Ignore,
}

/// Resolve `text` against the tenant's command aliases.
///
/// Precedence: exact check-in alias, exact query alias, query alias followed
/// by a space and a keyword, then the implicit-query fallback. Within each
/// step, aliases match in their declared order.
pub fn route(text: &str, settings: &TenantSettings) -> Command {
    let text = text.trim();
    if text.is_empty() {
        return Command::Ignore;
    }

    if settings.checkin_aliases().contains(&text) {
        return Command::CheckIn;
    }

    let query_aliases = settings.query_aliases();
    if query_aliases.contains(&text) {
        return Command::Query {
            keyword: None,
            implicit: false,
        };
    }
    for alias in &query_aliases {
        if let Some(rest) = text.strip_prefix(alias) {
            if let Some(keyword) = rest.strip_prefix(' ') {
                let keyword = keyword.trim();
                return Command::Query {
                    keyword: (!keyword.is_empty()).then(|| keyword.to_string()),
                    implicit: false,
                };
            }
        }
    }

    if settings.implicit_query
        && !text.starts_with('/')
        && text.chars().count() <= settings.implicit_max_chars
    {
        return Command::Query {
            keyword: Some(text.to_string()),
            implicit: true,
        };
    }

    Command::Ignore
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> TenantSettings {
        TenantSettings::default()
    }

    #[test]
    fn exact_checkin_alias() {
        assert_eq!(route("打卡", &settings()), Command::CheckIn);
        assert_eq!(route("  打卡  ", &settings()), Command::CheckIn);
    }

    #[test]
    fn exact_query_alias_is_unfiltered() {
        assert_eq!(
            route("查询", &settings()),
            Command::Query {
                keyword: None,
                implicit: false
            }
        );
    }

    #[test]
    fn query_alias_with_keyword() {
        assert_eq!(
            route("查询 福田", &settings()),
            Command::Query {
                keyword: Some("福田".into()),
                implicit: false
            }
        );
        // trailing spaces after the alias mean no keyword
        assert_eq!(
            route("查询   ", &settings()),
            Command::Query {
                keyword: None,
                implicit: false
            }
        );
    }

    #[test]
    fn alias_prefix_without_space_is_not_a_query() {
        // "查询机" is ordinary chat, not "查询" + "机"
        assert_eq!(route("查询机", &settings()), Command::Ignore);
    }

    #[test]
    fn custom_aliases_match_in_declared_order() {
        let mut s = settings();
        s.checkin_commands = "签到,打卡".into();
        s.query_commands = "search，查询".into();
        assert_eq!(route("签到", &s), Command::CheckIn);
        assert_eq!(
            route("search 南山", &s),
            Command::Query {
                keyword: Some("南山".into()),
                implicit: false
            }
        );
    }

    #[test]
    fn checkin_alias_wins_over_query_alias() {
        let mut s = settings();
        s.checkin_commands = "go".into();
        s.query_commands = "go".into();
        assert_eq!(route("go", &s), Command::CheckIn);
    }

    #[test]
    fn implicit_query_disabled_by_default() {
        assert_eq!(route("南山", &settings()), Command::Ignore);
    }

    #[test]
    fn implicit_query_length_and_slash_gates() {
        let mut s = settings();
        s.implicit_query = true;
        assert_eq!(
            route("南山", &s),
            Command::Query {
                keyword: Some("南山".into()),
                implicit: true
            }
        );
        // counts chars, not bytes
        s.implicit_max_chars = 1;
        assert_eq!(route("南山", &s), Command::Ignore);
        s.implicit_max_chars = 15;
        assert_eq!(route("/start", &s), Command::Ignore);
        assert_eq!(
            route("这条消息肯定超过了十五个字符的隐式查询上限所以忽略", &s),
            Command::Ignore
        );
    }

    #[test]
    fn empty_text_ignored() {
        assert_eq!(route("   ", &settings()), Command::Ignore);
    }
}
