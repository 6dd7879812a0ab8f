//! Per-target destination settings.
//!
//! Stored as a JSON blob on the target row. Every field has a default so
//! older blobs keep deserializing as new toggles are added.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The kinds of notice a target can receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    /// A stream went live.
    Live,
    /// A premiere started.
    Premiere,
    /// A scheduled stream is about to start.
    Upcoming,
    /// A stream was scheduled.
    Creation,
    /// A regular video was uploaded.
    Upload,
}

/// Mention configuration for a target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MentionSettings {
    /// General mention, used when nothing more specific applies.
    pub role: Option<String>,
    /// Used for members-only content.
    pub member_role: Option<String>,
    /// Used for uploads and premieres, falls back to `role`.
    pub upload_role: Option<String>,
    pub upcoming_role: Option<String>,
    pub creation_role: Option<String>,
    /// Message text; supports `&name`, `&url`, `&id` and `&timestamp`.
    pub text: Option<String>,
    /// Message text for members-only content.
    pub member_text: Option<String>,
}

/// Feature toggles for one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetSettings {
    pub live_streams: bool,
    pub uploads: bool,
    pub premieres: bool,
    pub shorts: bool,
    /// Allow notices for members-only content.
    pub member_content: bool,
    pub stream_creation: bool,
    /// Send an "upcoming" reminder once the start is this close.
    pub upcoming_notice_secs: Option<u64>,
    /// Send "upcoming" reminders here instead of the target's destination.
    pub upcoming_destination: Option<String>,
    /// Edit live notices into a summary at stream end instead of deleting them.
    pub summaries: bool,
    /// Show viewer counts in summaries.
    pub viewers: bool,
    /// Large inline image instead of a thumbnail.
    pub inline_images: bool,
    pub include_url: bool,
    /// Resolve mentions at all.
    pub mention_roles: bool,
    pub mentions: Option<MentionSettings>,
    pub rename_on_live: bool,
    pub calendar_events: bool,
}

impl Default for TargetSettings {
    fn default() -> Self {
        Self {
            live_streams: true,
            uploads: true,
            premieres: true,
            shorts: true,
            member_content: true,
            stream_creation: false,
            upcoming_notice_secs: None,
            upcoming_destination: None,
            summaries: true,
            viewers: true,
            inline_images: false,
            include_url: false,
            mention_roles: true,
            mentions: None,
            rename_on_live: false,
            calendar_events: false,
        }
    }
}

impl TargetSettings {
    /// Parse the stored blob, treating an empty string as defaults.
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(raw)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn upcoming_notice_window(&self) -> Option<Duration> {
        self.upcoming_notice_secs.map(Duration::from_secs)
    }

    /// Whether this target wants `kind` for a video with the given flags.
    ///
    /// `Upcoming` only checks that a window is configured; whether the
    /// window currently covers the start time is decided by the caller.
    pub fn allows(&self, kind: NoticeKind, member_limited: bool, short: bool) -> bool {
        if member_limited && !self.member_content {
            return false;
        }
        match kind {
            NoticeKind::Live => self.live_streams,
            NoticeKind::Premiere => self.premieres,
            NoticeKind::Upcoming => self.upcoming_notice_secs.is_some(),
            NoticeKind::Creation => self.stream_creation,
            NoticeKind::Upload => self.uploads && (!short || self.shorts),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_empty_blob_is_default() {
        assert_eq!(TargetSettings::from_json("").unwrap(), TargetSettings::default());
        assert_eq!(TargetSettings::from_json("{}").unwrap(), TargetSettings::default());
    }

    #[test]
    fn test_partial_blob_keeps_defaults() {
        let settings =
            TargetSettings::from_json(r#"{"stream_creation": true, "upcoming_notice_secs": 600}"#)
                .unwrap();
        assert!(settings.stream_creation);
        assert!(settings.live_streams);
        assert_eq!(settings.upcoming_notice_window(), Some(Duration::from_secs(600)));
    }

    #[rstest]
    #[case(NoticeKind::Live, false, false, true)]
    #[case(NoticeKind::Creation, false, false, false)]
    #[case(NoticeKind::Upcoming, false, false, false)]
    #[case(NoticeKind::Upload, false, true, true)]
    #[case(NoticeKind::Upload, false, false, true)]
    fn test_default_allows(
        #[case] kind: NoticeKind,
        #[case] member: bool,
        #[case] short: bool,
        #[case] expected: bool,
    ) {
        assert_eq!(TargetSettings::default().allows(kind, member, short), expected);
    }

    #[test]
    fn test_member_content_gate() {
        let settings = TargetSettings {
            member_content: false,
            ..Default::default()
        };
        assert!(!settings.allows(NoticeKind::Live, true, false));
        assert!(settings.allows(NoticeKind::Live, false, false));
    }

    #[test]
    fn test_shorts_gate() {
        let settings = TargetSettings {
            shorts: false,
            ..Default::default()
        };
        assert!(!settings.allows(NoticeKind::Upload, false, true));
        assert!(settings.allows(NoticeKind::Upload, false, false));
    }
}
