//! Online-member query results and inline-keyboard pagination.
//!
//! Navigation state lives entirely in the button payload (`pg|{page}|{kw}`),
//! so paging needs no server-side session: any press re-runs the query
//! against current data and re-renders the page in place. Out-of-range pages
//! (members dropped off since the keyboard was drawn) clamp instead of
//! erroring.

use crate::config::{FieldDefinition, TenantSettings};
use crate::store::Member;
use crate::template;
use crate::transport::{InlineButton, Keyboard};

const TOKEN_PREFIX: &str = "pg";

/// Payload of the page-indicator button. Pressing it is acknowledged but
/// changes nothing.
pub const NOOP_TOKEN: &str = "noop";

/// Self-describing pagination token carried in `callback_data`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageToken {
    /// 1-based requested page.
    pub page: usize,
    pub keyword: Option<String>,
}

impl PageToken {
    pub fn new(page: usize, keyword: Option<&str>) -> Self {
        Self {
            page: page.max(1),
            keyword: keyword
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(String::from),
        }
    }

    pub fn encode(&self) -> String {
        format!(
            "{TOKEN_PREFIX}|{}|{}",
            self.page,
            self.keyword.as_deref().unwrap_or_default()
        )
    }

    /// Parse a callback payload. Foreign payloads return `None` and are
    /// ignored upstream.
    pub fn decode(data: &str) -> Option<Self> {
        let mut parts = data.splitn(3, '|');
        if parts.next()? != TOKEN_PREFIX {
            return None;
        }
        let page = parts.next()?.parse::<usize>().ok()?;
        let keyword = parts.next()?;
        Some(Self::new(page, Some(keyword)))
    }
}

/// One rendered page of query results.
#[derive(Debug, Clone)]
pub struct QueryPage {
    pub text: String,
    pub keyboard: Keyboard,
    pub page: usize,
    pub total_pages: usize,
    pub match_count: usize,
}

/// Render the requested page of `members` (already filtered and ordered by
/// the store). Callers handle the zero-match case themselves; an empty slice
/// here still yields a well-formed page.
pub fn build_page(
    members: &[Member],
    fields: &[FieldDefinition],
    settings: &TenantSettings,
    token: &PageToken,
) -> QueryPage {
    let page_size = settings.page_size.max(1);
    let total_pages = members.len().div_ceil(page_size).max(1);
    let page = token.page.clamp(1, total_pages);

    let start = (page - 1) * page_size;
    let cards: Vec<String> = members
        .iter()
        .skip(start)
        .take(page_size)
        .map(|member| {
            let emoji = if member.online {
                settings.online_emoji.as_str()
            } else {
                settings.offline_emoji.as_str()
            };
            template::render(
                &settings.card_template,
                &member.profile_map(),
                fields,
                &[("onlineEmoji", emoji)],
            )
        })
        .collect();

    let mut text = format!("{}（{}）", settings.query_header, members.len());
    if let Some(keyword) = &token.keyword {
        text.push_str(&format!(
            "\n🔍 {}",
            html_escape::encode_text(keyword)
        ));
    }
    for card in &cards {
        text.push_str("\n\n");
        text.push_str(card);
    }

    let mut keyboard: Keyboard = Vec::new();
    if total_pages > 1 {
        let keyword = token.keyword.as_deref();
        let mut nav = Vec::new();
        if page > 1 {
            nav.push(InlineButton::callback(
                "⬅️",
                PageToken::new(page - 1, keyword).encode(),
            ));
        }
        nav.push(InlineButton::callback(
            format!("{page}/{total_pages}"),
            NOOP_TOKEN,
        ));
        if page < total_pages {
            nav.push(InlineButton::callback(
                "➡️",
                PageToken::new(page + 1, keyword).encode(),
            ));
        }
        keyboard.push(nav);
    }
    for pair in settings.extra_links.chunks(2) {
        keyboard.push(
            pair.iter()
                .map(|link| InlineButton::link(link.label.clone(), link.url.clone()))
                .collect(),
        );
    }

    QueryPage {
        text,
        keyboard,
        page,
        total_pages,
        match_count: members.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LinkButton, default_fields};
    use chrono::Utc;

    fn member(user_id: &str, name: &str) -> Member {
        Member {
            id: 0,
            tenant_id: 1,
            user_id: user_id.into(),
            profile: format!(r#"{{"name": "{name}", "region": "南山", "price": "800"}}"#),
            expires_at: None,
            muted: false,
            online: true,
            last_checkin: Some(Utc::now()),
        }
    }

    fn members(n: usize) -> Vec<Member> {
        (0..n).map(|i| member(&format!("u{i}"), &format!("m{i}"))).collect()
    }

    #[test]
    fn token_round_trip() {
        let token = PageToken::new(3, Some("福田"));
        assert_eq!(token.encode(), "pg|3|福田");
        assert_eq!(PageToken::decode("pg|3|福田"), Some(token));

        let bare = PageToken::new(1, None);
        assert_eq!(bare.encode(), "pg|1|");
        assert_eq!(PageToken::decode("pg|1|"), Some(bare));
    }

    #[test]
    fn token_rejects_foreign_payloads() {
        assert_eq!(PageToken::decode("noop"), None);
        assert_eq!(PageToken::decode("pg|x|kw"), None);
        assert_eq!(PageToken::decode("other|1|"), None);
        assert_eq!(PageToken::decode("pg|2"), None);
    }

    #[test]
    fn keyword_may_contain_separator() {
        let token = PageToken::decode("pg|2|a|b").unwrap();
        assert_eq!(token.keyword.as_deref(), Some("a|b"));
    }

    #[test]
    fn single_page_has_no_nav_row() {
        let settings = TenantSettings::default();
        let page = build_page(&members(3), &default_fields(), &settings, &PageToken::new(1, None));
        assert_eq!(page.total_pages, 1);
        assert!(page.keyboard.is_empty());
        assert_eq!(page.match_count, 3);
    }

    #[test]
    fn nav_row_shows_only_existing_neighbors() {
        let mut settings = TenantSettings::default();
        settings.page_size = 2;
        let all = members(5); // 3 pages

        let first = build_page(&all, &default_fields(), &settings, &PageToken::new(1, None));
        let nav = &first.keyboard[0];
        assert_eq!(nav.len(), 2);
        assert_eq!(nav[0].text, "1/3");
        assert_eq!(nav[0].callback_data.as_deref(), Some(NOOP_TOKEN));
        assert_eq!(nav[1].callback_data.as_deref(), Some("pg|2|"));

        let middle = build_page(&all, &default_fields(), &settings, &PageToken::new(2, None));
        let nav = &middle.keyboard[0];
        assert_eq!(nav.len(), 3);
        assert_eq!(nav[0].callback_data.as_deref(), Some("pg|1|"));
        assert_eq!(nav[2].callback_data.as_deref(), Some("pg|3|"));

        let last = build_page(&all, &default_fields(), &settings, &PageToken::new(3, None));
        assert_eq!(last.keyboard[0].len(), 2);
    }

    #[test]
    fn fifteen_members_split_ten_and_five() {
        let settings = TenantSettings::default(); // page size 10
        let all = members(15);

        let first = build_page(&all, &default_fields(), &settings, &PageToken::new(1, None));
        assert_eq!(first.total_pages, 2);
        assert_eq!(first.text.matches("<b>").count(), 10);
        let nav = &first.keyboard[0];
        // next only
        assert_eq!(nav.len(), 2);
        assert_eq!(nav[1].callback_data.as_deref(), Some("pg|2|"));

        let second = build_page(&all, &default_fields(), &settings, &PageToken::decode("pg|2|").unwrap());
        assert_eq!(second.text.matches("<b>").count(), 5);
        let nav = &second.keyboard[0];
        // previous only
        assert_eq!(nav.len(), 2);
        assert_eq!(nav[0].callback_data.as_deref(), Some("pg|1|"));
        assert_eq!(nav[1].callback_data.as_deref(), Some(NOOP_TOKEN));
    }

    #[test]
    fn out_of_range_page_clamps() {
        let mut settings = TenantSettings::default();
        settings.page_size = 2;
        let page = build_page(&members(3), &default_fields(), &settings, &PageToken::new(99, None));
        assert_eq!(page.page, 2);
        assert_eq!(page.total_pages, 2);
    }

    #[test]
    fn page_zero_clamps_to_first() {
        assert_eq!(PageToken::new(0, None).page, 1);

        let token = PageToken::decode("pg|0|").unwrap();
        assert_eq!(token.page, 1);

        let mut settings = TenantSettings::default();
        settings.page_size = 2;
        let page = build_page(&members(3), &default_fields(), &settings, &token);
        assert_eq!(page.page, 1);
        assert!(page.text.contains("m0"));
    }

    #[test]
    fn nav_buttons_carry_keyword() {
        let mut settings = TenantSettings::default();
        settings.page_size = 1;
        let page = build_page(
            &members(2),
            &default_fields(),
            &settings,
            &PageToken::new(1, Some("南山")),
        );
        assert_eq!(page.keyboard[0][1].callback_data.as_deref(), Some("pg|2|南山"));
        assert!(page.text.contains("🔍 南山"));
    }

    #[test]
    fn extra_links_two_per_row() {
        let mut settings = TenantSettings::default();
        settings.extra_links = vec![
            LinkButton { label: "a".into(), url: "https://a".into() },
            LinkButton { label: "b".into(), url: "https://b".into() },
            LinkButton { label: "c".into(), url: "https://c".into() },
        ];
        let page = build_page(&members(1), &default_fields(), &settings, &PageToken::new(1, None));
        assert_eq!(page.keyboard.len(), 2);
        assert_eq!(page.keyboard[0].len(), 2);
        assert_eq!(page.keyboard[1].len(), 1);
        assert_eq!(page.keyboard[1][0].url.as_deref(), Some("https://c"));
    }

    #[test]
    fn cards_render_through_template() {
        let settings = TenantSettings::default();
        let page = build_page(&members(1), &default_fields(), &settings, &PageToken::new(1, None));
        assert!(page.text.contains("<b>🟢 m0</b>"));
        assert!(page.text.contains("📍 南山｜💰 800"));
    }
}
