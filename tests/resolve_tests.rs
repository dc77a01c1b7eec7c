mod common;

use std::sync::atomic::Ordering;

use common::FakeSource;
use recap::core::models::{ChannelId, ChannelRef, DirectoryEntry, GroupId};
use recap::errors::RecapError;
use recap::worker::resolve::{ChannelTarget, display_name, match_by_name, resolve_channels};

fn entry(id: u64, name: &str, is_text: bool) -> DirectoryEntry {
    DirectoryEntry {
        id: ChannelId(id),
        name: name.to_string(),
        is_text,
    }
}

fn refs(tokens: &[&str]) -> Vec<ChannelRef> {
    tokens.iter().filter_map(|t| ChannelRef::parse(t)).collect()
}

#[tokio::test]
async fn numeric_references_pass_through_without_directory() {
    let source = FakeSource::new();
    let resolution = resolve_channels(&source, None, &refs(&["111", "222"]))
        .await
        .unwrap();

    let ids: Vec<_> = resolution.targets.iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![ChannelId(111), ChannelId(222)]);
    assert!(resolution.targets.iter().all(|t| t.known_name.is_none()));
    assert!(resolution.unresolved.is_empty());
    assert_eq!(source.directory_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn names_match_text_channels_only() {
    let source = FakeSource::new().with_directory(vec![
        entry(1, "general", false),
        entry(2, "general", true),
        entry(3, "dev-chat", true),
    ]);
    let resolution = resolve_channels(
        &source,
        Some(GroupId(9)),
        &refs(&["#general", "dev-chat"]),
    )
    .await
    .unwrap();

    assert_eq!(
        resolution.targets,
        vec![
            ChannelTarget {
                id: ChannelId(2),
                known_name: Some("general".into()),
            },
            ChannelTarget {
                id: ChannelId(3),
                known_name: Some("dev-chat".into()),
            },
        ]
    );
}

#[tokio::test]
async fn unknown_names_are_reported_and_others_still_resolve() {
    let source = FakeSource::new().with_directory(vec![entry(3, "dev-chat", true)]);
    let resolution = resolve_channels(
        &source,
        Some(GroupId(9)),
        &refs(&["#nonexistent", "dev-chat", "444"]),
    )
    .await
    .unwrap();

    let ids: Vec<_> = resolution.targets.iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![ChannelId(3), ChannelId(444)]);
    assert_eq!(resolution.unresolved.len(), 1);
    assert_eq!(
        resolution.unresolved[0].0,
        ChannelRef::Name("nonexistent".into())
    );
}

#[tokio::test]
async fn directory_is_listed_once_per_resolution() {
    let source = FakeSource::new().with_directory(vec![
        entry(1, "alpha", true),
        entry(2, "beta", true),
        entry(3, "gamma", true),
    ]);
    resolve_channels(
        &source,
        Some(GroupId(9)),
        &refs(&["alpha", "beta", "gamma"]),
    )
    .await
    .unwrap();

    assert_eq!(source.directory_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn broken_directory_only_drops_name_references() {
    let source = FakeSource::new().with_broken_directory();
    let resolution = resolve_channels(&source, Some(GroupId(9)), &refs(&["general", "555"]))
        .await
        .unwrap();

    assert_eq!(resolution.targets.len(), 1);
    assert_eq!(resolution.targets[0].id, ChannelId(555));
    assert_eq!(resolution.unresolved.len(), 1);
    assert!(resolution.unresolved[0].1.contains("directory unavailable"));
}

#[tokio::test]
async fn names_without_guild_are_a_configuration_error() {
    let source = FakeSource::new();
    let result = resolve_channels(&source, None, &refs(&["general"])).await;
    assert!(matches!(result, Err(RecapError::ConfigError(_))));
}

#[tokio::test]
async fn duplicate_references_collapse_to_one_target() {
    let source = FakeSource::new().with_directory(vec![entry(77, "general", true)]);
    let resolution = resolve_channels(
        &source,
        Some(GroupId(9)),
        &refs(&["77", "#general", "general"]),
    )
    .await
    .unwrap();

    assert_eq!(resolution.targets.len(), 1);
    assert_eq!(resolution.targets[0].id, ChannelId(77));
    // the name learned from the directory fills in the numeric reference
    assert_eq!(resolution.targets[0].known_name.as_deref(), Some("general"));
}

#[test]
fn match_by_name_is_exact() {
    let directory = vec![entry(1, "General", true), entry(2, "general-chat", true)];
    assert!(match_by_name(&directory, "general").is_none());
    assert_eq!(match_by_name(&directory, "General").map(|e| e.id), Some(ChannelId(1)));
}

#[tokio::test]
async fn display_name_prefers_known_name_then_source() {
    let source = FakeSource::new().with_channel(10, "announcements");

    let known = ChannelTarget {
        id: ChannelId(10),
        known_name: Some("from-directory".into()),
    };
    assert_eq!(
        display_name(&source, &known).await.unwrap().name,
        "from-directory"
    );

    let bare = ChannelTarget {
        id: ChannelId(10),
        known_name: None,
    };
    assert_eq!(
        display_name(&source, &bare).await.unwrap().name,
        "announcements"
    );
}

#[tokio::test]
async fn display_name_fails_for_missing_channel() {
    let source = FakeSource::new();
    let target = ChannelTarget {
        id: ChannelId(404),
        known_name: None,
    };
    assert!(matches!(
        display_name(&source, &target).await,
        Err(RecapError::ResolutionError(_))
    ));
}

#[tokio::test]
async fn display_name_falls_back_when_lookup_is_unavailable() {
    let source = FakeSource::new()
        .with_channel(10, "announcements")
        .with_names_unavailable();
    let target = ChannelTarget {
        id: ChannelId(10),
        known_name: None,
    };
    let resolved = display_name(&source, &target).await.unwrap();
    assert_eq!(resolved.id, ChannelId(10));
    assert_eq!(resolved.name, "channel-10");
}
