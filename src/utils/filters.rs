use std::cmp::Ordering;

use crate::core::models::{Message, SourceMessage};

/// Drops messages posted by automated authors (bots, webhooks) and converts
/// the rest into batch messages, preserving order.
#[must_use]
pub fn filter_user_messages(messages: Vec<SourceMessage>) -> Vec<Message> {
    messages
        .into_iter()
        .filter(|msg| !msg.author_is_bot)
        .map(Message::from)
        .collect()
}

/// Orders snowflake ids numerically, falling back to string order for non-numeric ids.
#[must_use]
pub fn compare_message_ids(left: &str, right: &str) -> Ordering {
    match (left.trim().parse::<u128>(), right.trim().parse::<u128>()) {
        (Ok(left), Ok(right)) => left.cmp(&right),
        _ => left.cmp(right),
    }
}
