//! Message content for each notice kind.
//!
//! Builders only assemble [`OutboundMessage`] values; how they render is up
//! to the messaging facade.

use chrono::{DateTime, Utc};

use crate::domain::{LiveStats, TargetSettings};
use crate::messaging::{Embed, EmbedField, OutboundMessage};
use crate::platform::VideoInfo;

pub const LIVE_COLOR: u32 = 16_711_680;
pub const INACTIVE_COLOR: u32 = 8_847_360;
pub const SCHEDULED_COLOR: u32 = 4_270_381;
pub const UPLOAD_COLOR: u32 = 16_748_800;
pub const CREATION_COLOR: u32 = 16_749_824;

const TITLE_MAX: usize = 256;
const AUTHOR_MAX: usize = 256;

/// Truncate to `max` characters, ending in `...` when shortened.
pub fn abbreviate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let keep = max.saturating_sub(3);
    let mut out: String = text.chars().take(keep).collect();
    out.push_str("...");
    out
}

/// `h:mm:ss`, or `m:ss` under an hour.
pub fn colon_time(total_secs: i64) -> String {
    let total = total_secs.max(0);
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes}:{seconds:02}")
    }
}

fn message_content(mention: Option<String>, settings: &TargetSettings, url: &str) -> Option<String> {
    let mut content = mention.unwrap_or_default();
    if settings.include_url {
        content.push('\n');
        content.push_str(url);
    }
    let trimmed = content.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn author_block(embed: &mut Embed, info: &VideoInfo, text: &str) {
    embed.author = Some(abbreviate(text, AUTHOR_MAX));
    embed.author_url = info.channel.url.clone();
    embed.author_icon = info.channel.avatar.clone();
}

fn picture(embed: &mut Embed, settings: &TargetSettings, url: Option<&String>) {
    if settings.inline_images {
        embed.image = url.cloned();
    } else {
        embed.thumbnail = url.cloned();
    }
}

/// How a live notice is phrased.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveNoticeStyle {
    /// First notice on the go-live transition.
    WentLive,
    /// Late notice for a stream that was already live.
    Backfill,
}

/// "X went live!" notice.
///
/// `stale` marks a stream old enough that the mention was dropped.
pub fn live_notice(
    info: &VideoInfo,
    settings: &TargetSettings,
    mention: Option<String>,
    style: LiveNoticeStyle,
    stale: bool,
) -> OutboundMessage {
    let action = if info.premiere {
        "is premiering a new video!"
    } else if style == LiveNoticeStyle::WentLive {
        "went live!"
    } else {
        "is live."
    };

    let member = if info.member_limited {
        "(Members-only content)\n"
    } else {
        ""
    };
    let since = info.live_since();
    let mut footer = String::new();
    if stale {
        footer.push_str("Skipping ping for old stream.\n");
    }
    footer.push_str(if since.is_some() { "Live since" } else { "Live" });

    let mut embed = Embed {
        url: Some(info.url.clone()),
        title: Some(abbreviate(&info.title, TITLE_MAX)),
        description: Some(format!("{member}{}", abbreviate(&info.description, 150))),
        color: if info.premiere { UPLOAD_COLOR } else { LIVE_COLOR },
        footer: Some(footer),
        timestamp: since,
        ..Default::default()
    };
    author_block(&mut embed, info, &format!("{} {action}", info.channel.name));
    picture(&mut embed, settings, info.thumbnail.as_ref());

    OutboundMessage {
        content: message_content(mention, settings, &info.url),
        embed,
    }
}

/// "X has an upcoming stream!" reminder.
pub fn upcoming_notice(
    info: &VideoInfo,
    start: DateTime<Utc>,
    settings: &TargetSettings,
    mention: Option<String>,
) -> OutboundMessage {
    let mut embed = Embed {
        url: Some(info.url.clone()),
        title: Some(abbreviate(&info.title, TITLE_MAX)),
        color: SCHEDULED_COLOR,
        thumbnail: info.thumbnail.clone(),
        footer: Some("Scheduled start time".to_string()),
        timestamp: Some(start),
        ..Default::default()
    };
    author_block(
        &mut embed,
        info,
        &format!("{} has an upcoming stream!", info.channel.name),
    );

    OutboundMessage {
        content: message_content(mention, settings, &info.url),
        embed,
    }
}

/// "X scheduled a new stream!" notice.
pub fn creation_notice(
    info: &VideoInfo,
    start: DateTime<Utc>,
    settings: &TargetSettings,
    mention: Option<String>,
) -> OutboundMessage {
    let first_line = info.description.lines().next().unwrap_or_default();
    let mut embed = Embed {
        url: Some(info.url.clone()),
        title: Some(abbreviate(&info.title, TITLE_MAX)),
        description: Some(format!(
            "Stream scheduled to start: {}\n\nVideo description: {}",
            start.to_rfc3339(),
            abbreviate(first_line, 120)
        )),
        color: CREATION_COLOR,
        thumbnail: info.thumbnail.clone(),
        footer: Some("Scheduled start time".to_string()),
        timestamp: Some(start),
        ..Default::default()
    };
    author_block(
        &mut embed,
        info,
        &format!("{} scheduled a new stream!", info.channel.name),
    );

    OutboundMessage {
        content: message_content(mention, settings, &info.url),
        embed,
    }
}

/// "X posted a new video!" notice.
pub fn upload_notice(
    info: &VideoInfo,
    settings: &TargetSettings,
    mention: Option<String>,
) -> OutboundMessage {
    let member = if info.member_limited {
        "Members-only content.\n"
    } else {
        ""
    };
    let length = info
        .duration_secs
        .map(colon_time)
        .unwrap_or_else(|| "unknown".to_string());
    let short = if info.short { " (short)" } else { "" };

    let mut embed = Embed {
        url: Some(info.url.clone()),
        title: Some(abbreviate(&info.title, TITLE_MAX)),
        description: Some(format!(
            "{member}Video description: {}",
            abbreviate(&info.description, 200)
        )),
        color: UPLOAD_COLOR,
        footer: Some(format!("Upload: {length}{short}")),
        timestamp: info.published,
        ..Default::default()
    };
    author_block(
        &mut embed,
        info,
        &format!("{} posted a new video!", info.channel.name),
    );
    picture(&mut embed, settings, info.thumbnail.as_ref());

    OutboundMessage {
        content: message_content(mention, settings, &info.url),
        embed,
    }
}

fn viewer_field(embed: &mut Embed, stats: &LiveStats, settings: &TargetSettings) {
    if settings.viewers && stats.peak_viewers > 0 {
        embed.fields.push(EmbedField {
            name: "Viewers".to_string(),
            value: format!(
                "{} avg. / {} peak",
                stats.average_viewers, stats.peak_viewers
            ),
            inline: true,
        });
    }
}

/// End-of-stream summary when the platform still has the video.
pub fn vod_summary(info: &VideoInfo, stats: &LiveStats, settings: &TargetSettings) -> OutboundMessage {
    let action = if stats.premiere {
        "premiered a new video!"
    } else {
        "was live."
    };
    let duration = info
        .duration_secs
        .map(colon_time)
        .unwrap_or_else(|| "premiere".to_string());
    let member = if info.member_limited {
        "Members-only content.\n"
    } else {
        ""
    };

    let mut embed = Embed {
        url: Some(info.url.clone()),
        title: Some(abbreviate(&info.title, TITLE_MAX)),
        description: Some(format!("{member}Video available: [{duration}]")),
        color: if stats.premiere { UPLOAD_COLOR } else { INACTIVE_COLOR },
        thumbnail: info.thumbnail.clone(),
        footer: Some("Stream ended".to_string()),
        timestamp: info.live_info.as_ref().and_then(|l| l.end_time),
        ..Default::default()
    };
    author_block(&mut embed, info, &format!("{} {action}", info.channel.name));
    viewer_field(&mut embed, stats, settings);

    OutboundMessage {
        content: None,
        embed,
    }
}

/// What is known locally about a stream the platform no longer returns.
#[derive(Debug, Clone)]
pub struct EndedSnapshot<'a> {
    pub channel_name: &'a str,
    pub last_title: Option<&'a str>,
    pub stats: &'a LiveStats,
}

/// End-of-stream summary built only from cached data.
pub fn no_vod_summary(
    snapshot: &EndedSnapshot<'_>,
    settings: &TargetSettings,
    now: DateTime<Utc>,
) -> OutboundMessage {
    let mut embed = Embed {
        author: Some(abbreviate(
            &format!("{} was live.", snapshot.channel_name),
            AUTHOR_MAX,
        )),
        title: Some("No VOD is available.".to_string()),
        description: Some(format!(
            "Last video title: {}",
            snapshot.last_title.unwrap_or("unknown")
        )),
        color: if snapshot.stats.premiere {
            UPLOAD_COLOR
        } else {
            INACTIVE_COLOR
        },
        thumbnail: snapshot.stats.thumbnail.clone(),
        footer: Some("Stream ended (approximate)".to_string()),
        timestamp: Some(now),
        ..Default::default()
    };
    viewer_field(&mut embed, snapshot.stats, settings);

    OutboundMessage {
        content: None,
        embed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{ChannelInfo, LiveInfo};

    fn info() -> VideoInfo {
        VideoInfo {
            id: "v1".into(),
            title: "Morning stream".into(),
            description: "line one\nline two".into(),
            thumbnail: Some("https://img/v1.jpg".into()),
            url: "https://example.com/v1".into(),
            live: true,
            live_info: Some(LiveInfo {
                start_time: DateTime::from_timestamp(1_700_000_000, 0),
                ..Default::default()
            }),
            channel: ChannelInfo {
                id: "UC1".into(),
                name: "Alice".into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_abbreviate() {
        assert_eq!(abbreviate("short", 10), "short");
        assert_eq!(abbreviate("abcdefghijk", 8), "abcde...");
    }

    #[test]
    fn test_colon_time() {
        assert_eq!(colon_time(59), "0:59");
        assert_eq!(colon_time(61), "1:01");
        assert_eq!(colon_time(3_725), "1:02:05");
    }

    #[test]
    fn test_live_notice_phrasing() {
        let settings = TargetSettings::default();
        let msg = live_notice(&info(), &settings, None, LiveNoticeStyle::WentLive, false);
        assert_eq!(msg.embed.author.as_deref(), Some("Alice went live!"));
        assert_eq!(msg.embed.footer.as_deref(), Some("Live since"));
        assert!(msg.embed.thumbnail.is_some() && msg.embed.image.is_none());
        assert!(msg.content.is_none());

        let msg = live_notice(&info(), &settings, None, LiveNoticeStyle::Backfill, true);
        assert_eq!(msg.embed.author.as_deref(), Some("Alice is live."));
        assert!(msg.embed.footer.unwrap().starts_with("Skipping ping"));
    }

    #[test]
    fn test_inline_image_and_url() {
        let settings = TargetSettings {
            inline_images: true,
            include_url: true,
            ..Default::default()
        };
        let msg = live_notice(
            &info(),
            &settings,
            Some("@live".into()),
            LiveNoticeStyle::WentLive,
            false,
        );
        assert!(msg.embed.image.is_some() && msg.embed.thumbnail.is_none());
        assert_eq!(msg.content.as_deref(), Some("@live\nhttps://example.com/v1"));
    }

    #[test]
    fn test_no_vod_summary_uses_snapshot() {
        let stats = LiveStats {
            peak_viewers: 120,
            average_viewers: 100,
            uptime_ticks: 3,
            thumbnail: Some("cached.jpg".into()),
            channel_name: Some("Alice".into()),
            premiere: false,
        };
        let snapshot = EndedSnapshot {
            channel_name: "Alice",
            last_title: Some("Morning stream"),
            stats: &stats,
        };
        let msg = no_vod_summary(&snapshot, &TargetSettings::default(), Utc::now());
        assert_eq!(msg.embed.title.as_deref(), Some("No VOD is available."));
        assert_eq!(msg.embed.description.as_deref(), Some("Last video title: Morning stream"));
        assert_eq!(msg.embed.thumbnail.as_deref(), Some("cached.jpg"));
        assert_eq!(msg.embed.fields[0].value, "100 avg. / 120 peak");
    }

    #[test]
    fn test_viewer_field_respects_setting() {
        let stats = LiveStats {
            peak_viewers: 10,
            ..Default::default()
        };
        let settings = TargetSettings {
            viewers: false,
            ..Default::default()
        };
        let msg = vod_summary(&info(), &stats, &settings);
        assert!(msg.embed.fields.is_empty());
        assert_eq!(msg.embed.footer.as_deref(), Some("Stream ended"));
    }
}
