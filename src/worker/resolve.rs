//! Channel reference resolution
//!
//! Numeric references pass through; names are looked up once per run in the
//! guild directory, matching text channels by exact name.

use std::collections::HashSet;
use tracing::{info, warn};

use crate::clients::MessageSource;
use crate::core::models::{ChannelId, ChannelRef, DirectoryEntry, GroupId, ResolvedChannel};
use crate::errors::RecapError;

/// A canonical channel, with its display name when the directory already supplied it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelTarget {
    pub id: ChannelId,
    pub known_name: Option<String>,
}

#[derive(Debug, Default)]
pub struct Resolution {
    pub targets: Vec<ChannelTarget>,
    pub unresolved: Vec<(ChannelRef, String)>,
}

/// First text channel whose name matches exactly.
#[must_use]
pub fn match_by_name<'a>(directory: &'a [DirectoryEntry], name: &str) -> Option<&'a DirectoryEntry> {
    directory.iter().find(|entry| entry.is_text && entry.name == name)
}

/// Turns configured references into canonical channels, dropping duplicates.
///
/// # Errors
///
/// Returns `RecapError::ConfigError` when a name must be resolved but no guild is configured.
pub async fn resolve_channels(
    source: &dyn MessageSource,
    group: Option<GroupId>,
    refs: &[ChannelRef],
) -> Result<Resolution, RecapError> {
    let needs_directory = refs.iter().any(ChannelRef::is_name);

    let directory: Result<Vec<DirectoryEntry>, String> = if needs_directory {
        let group = group.ok_or_else(|| {
            RecapError::ConfigError("GUILD_ID is required to resolve channel names".into())
        })?;
        match source.list_channels(group).await {
            Ok(entries) => Ok(entries),
            Err(e) => {
                warn!("Failed to load channel directory for guild {}: {}", group, e);
                Err(e.to_string())
            }
        }
    } else {
        Ok(Vec::new())
    };

    let mut resolution = Resolution::default();
    let mut seen = HashSet::new();

    for channel_ref in refs {
        let target = match channel_ref {
            ChannelRef::Id(id) => ChannelTarget {
                id: *id,
                known_name: None,
            },
            ChannelRef::Name(name) => {
                let entries = match &directory {
                    Ok(entries) => entries,
                    Err(reason) => {
                        resolution
                            .unresolved
                            .push((channel_ref.clone(), format!("directory unavailable: {reason}")));
                        continue;
                    }
                };
                match match_by_name(entries, name) {
                    Some(entry) => {
                        info!("Resolved #{} to channel {}", name, entry.id);
                        ChannelTarget {
                            id: entry.id,
                            known_name: Some(entry.name.clone()),
                        }
                    }
                    None => {
                        warn!("Channel #{} not found among text channels, skipping", name);
                        resolution
                            .unresolved
                            .push((channel_ref.clone(), "no text channel with that name".into()));
                        continue;
                    }
                }
            }
        };

        if seen.insert(target.id) {
            resolution.targets.push(target);
        } else if let Some(name) = target.known_name
            && let Some(existing) = resolution.targets.iter_mut().find(|t| t.id == target.id)
            && existing.known_name.is_none()
        {
            existing.known_name = Some(name);
        }
    }

    Ok(resolution)
}

/// Completes a target with its display name.
///
/// A channel the source reports as missing fails resolution; any other lookup
/// failure falls back to `channel-<id>` so the channel is still summarized.
///
/// # Errors
///
/// Returns `RecapError::ResolutionError` when the channel does not exist.
pub async fn display_name(
    source: &dyn MessageSource,
    target: &ChannelTarget,
) -> Result<ResolvedChannel, RecapError> {
    if let Some(name) = &target.known_name {
        return Ok(ResolvedChannel {
            id: target.id,
            name: name.clone(),
        });
    }

    let name = match source.channel_name(target.id).await {
        Ok(name) => name,
        Err(e @ RecapError::ResolutionError(_)) => return Err(e),
        Err(RecapError::Cancelled) => return Err(RecapError::Cancelled),
        Err(e) => {
            warn!(
                "Failed to look up name of channel {}, using fallback: {}",
                target.id, e
            );
            format!("channel-{}", target.id)
        }
    };

    Ok(ResolvedChannel {
        id: target.id,
        name,
    })
}
