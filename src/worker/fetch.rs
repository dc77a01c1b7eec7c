use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::clients::MessageSource;
use crate::core::models::{ChannelId, Message, MessageBatch, PageCursor};
use crate::errors::RecapError;
use crate::utils::filters::{compare_message_ids, filter_user_messages};

/// Collects every human-authored message of `channel` posted in `(since, until]`,
/// oldest first, up to `max_messages`.
///
/// Pages are requested forward in time; bot messages are dropped before they
/// count toward the maximum and ids already seen on an earlier page are skipped.
/// Paging stops at the first page that reaches past `until`.
///
/// A capped batch never splits messages sharing one timestamp: the cut moves
/// back to the start of the tied group, or past its end when the group fills
/// the whole batch, so the next run's strict `> since` bound loses nothing.
///
/// # Errors
///
/// Any failed page request abandons the whole fetch; nothing collected so far is returned.
pub async fn fetch_messages(
    source: &dyn MessageSource,
    channel: ChannelId,
    since: DateTime<Utc>,
    until: DateTime<Utc>,
    max_messages: usize,
) -> Result<MessageBatch, RecapError> {
    let max_messages = max_messages.max(1);
    // one extra message shows whether the cap cut through a tied timestamp
    let page_size = source.page_limit().min(max_messages.saturating_add(1)).max(1);
    let mut cursor = PageCursor::Since(since);
    let mut seen: HashSet<String> = HashSet::new();
    let mut collected: Vec<Message> = Vec::new();
    let mut pages = 0usize;

    loop {
        let page = source.fetch_page(channel, &cursor, page_size).await?;
        pages += 1;

        let newest_id = page
            .messages
            .iter()
            .map(|m| m.id.as_str())
            .max_by(|a, b| compare_message_ids(a, b))
            .map(str::to_string);
        let reached_until = page.messages.iter().any(|m| m.timestamp > until);

        collected.extend(
            filter_user_messages(page.messages)
                .into_iter()
                .filter(|m| m.timestamp > since && m.timestamp <= until)
                .filter(|m| seen.insert(m.id.clone())),
        );

        if !page.has_more || reached_until {
            break;
        }
        if collected.len() > max_messages && !single_instant(&collected) {
            break;
        }

        let Some(next_id) = newest_id else {
            break;
        };
        // a source that hands back the same page again would loop forever
        if let PageCursor::AfterMessage(previous) = &cursor
            && compare_message_ids(&next_id, previous).is_le()
        {
            break;
        }
        cursor = PageCursor::AfterMessage(next_id);
    }

    collected.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| compare_message_ids(&a.id, &b.id))
    });

    let cut = cut_index(&collected, max_messages);
    if cut > max_messages {
        warn!(
            "Channel {} has {} messages sharing one timestamp, exceeding the cap of {}",
            channel, cut, max_messages
        );
    }
    let truncated = cut < collected.len();
    collected.truncate(cut);
    let batch = MessageBatch {
        messages: collected,
        truncated,
    };

    debug!(
        "Fetched {} message(s) from channel {} in {} page(s){}",
        batch.len(),
        channel,
        pages,
        if batch.truncated { " (truncated)" } else { "" }
    );
    Ok(batch)
}

fn single_instant(messages: &[Message]) -> bool {
    let first = messages.iter().map(|m| m.timestamp).min();
    let last = messages.iter().map(|m| m.timestamp).max();
    first == last
}

/// Number of leading `sorted` messages to keep under `max` without splitting a timestamp.
fn cut_index(sorted: &[Message], max: usize) -> usize {
    if sorted.len() <= max {
        return sorted.len();
    }
    let boundary = sorted[max].timestamp;
    if sorted[max - 1].timestamp != boundary {
        return max;
    }
    let group_start = sorted.partition_point(|m| m.timestamp < boundary);
    if group_start > 0 {
        return group_start;
    }
    sorted.partition_point(|m| m.timestamp <= boundary)
}
