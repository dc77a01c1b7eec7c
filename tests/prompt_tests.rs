use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use recap::core::models::Message;
use recap::prompt::{
    MAX_CHANNEL_NAME_LEN, format_period_bound, render_transcript, sanitize_channel_name,
    transcript_line,
};

fn at(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

#[test]
fn test_sanitize_channel_name() {
    assert_eq!(sanitize_channel_name("dev\u{0000}-chat\u{007F}"), "dev-chat");

    let long_name = "a".repeat(MAX_CHANNEL_NAME_LEN + 50);
    assert_eq!(
        sanitize_channel_name(&long_name).chars().count(),
        MAX_CHANNEL_NAME_LEN
    );
}

#[test]
fn test_period_bound_uses_zone_abbreviation() {
    let ts = at("2024-07-01T15:30:00Z");
    assert_eq!(format_period_bound(ts, Tz::UTC), "2024-07-01 15:30 UTC");
    assert_eq!(
        format_period_bound(ts, chrono_tz::Europe::Berlin),
        "2024-07-01 17:30 CEST"
    );
}

#[test]
fn test_transcript_lists_attachments_and_flattens_lines() {
    let message = Message {
        id: "1".into(),
        author: "alice".into(),
        content: "see the log\nit fails on boot".into(),
        timestamp: at("2024-07-01T09:00:00Z"),
        attachments: vec!["https://cdn.example/boot.log".into()],
    };
    assert_eq!(
        transcript_line(&message, Tz::UTC),
        "[2024-07-01 09:00] alice: see the log / it fails on boot \
         [attachments: https://cdn.example/boot.log]"
    );
}

#[test]
fn test_empty_transcript_renders_nothing() {
    assert_eq!(render_transcript(&[], Tz::UTC, 1_000), "");
}
