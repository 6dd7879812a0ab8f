//! Mention resolution for outgoing notices.

use chrono::{DateTime, Utc};

use crate::domain::{NoticeKind, TargetSettings};

/// Resolved mention for one notice.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mention {
    pub role: Option<String>,
    /// Unformatted text; see [`format_text`].
    pub text: Option<String>,
}

/// Values substituted into mention text.
#[derive(Debug, Clone)]
pub struct MentionContext<'a> {
    pub channel_name: &'a str,
    pub channel_id: &'a str,
    pub url: &'a str,
    pub timestamp: DateTime<Utc>,
}

/// Pick the mention a target wants for a notice of `kind`.
///
/// | Notice              | Role                                   |
/// |---------------------|----------------------------------------|
/// | upcoming            | upcoming role (none if members-only)   |
/// | creation            | creation role (none if members-only)   |
/// | members-only        | member role                            |
/// | upload / premiere   | upload role, else general role         |
/// | live                | general role                           |
///
/// Text is only attached to live, premiere and upload notices.
pub fn resolve_mention(
    settings: &TargetSettings,
    kind: NoticeKind,
    member_limited: bool,
) -> Option<Mention> {
    if !settings.mention_roles {
        return None;
    }
    let mentions = settings.mentions.as_ref()?;

    let role = match kind {
        NoticeKind::Upcoming if member_limited => None,
        NoticeKind::Upcoming => mentions.upcoming_role.clone(),
        NoticeKind::Creation if member_limited => None,
        NoticeKind::Creation => mentions.creation_role.clone(),
        _ if member_limited => mentions.member_role.clone(),
        NoticeKind::Upload | NoticeKind::Premiere => mentions
            .upload_role
            .clone()
            .or_else(|| mentions.role.clone()),
        NoticeKind::Live => mentions.role.clone(),
    };

    let text = match kind {
        NoticeKind::Upcoming | NoticeKind::Creation => None,
        _ if member_limited => mentions.member_text.clone(),
        _ => mentions.text.clone(),
    };

    if role.is_none() && text.is_none() {
        return None;
    }
    Some(Mention { role, text })
}

/// Expand `&name`, `&timestamp`, `&id` and `&url` in mention text.
pub fn format_text(text: &str, ctx: &MentionContext<'_>) -> String {
    text.replace("&name", ctx.channel_name)
        .replace("&timestamp", &ctx.timestamp.to_rfc3339())
        .replace("&id", ctx.channel_id)
        .replace("&url", ctx.url)
}

impl Mention {
    /// Message content line: role first, then the formatted text.
    pub fn render(&self, ctx: &MentionContext<'_>) -> Option<String> {
        let text = self.text.as_deref().map(|t| format_text(t, ctx));
        let parts: Vec<&str> = [self.role.as_deref(), text.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| !s.trim().is_empty())
            .collect();
        (!parts.is_empty()).then(|| parts.join(" "))
    }
}
