#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use openai_api_rs::v1::chat_completion::{ChatCompletionMessage, Content};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use recap::clients::{MessageSource, SummaryRelay, TextGenerator};
use recap::core::models::{
    ChannelId, DirectoryEntry, GroupId, MessagePage, PageCursor, SourceMessage, SummaryRecord,
};
use recap::errors::RecapError;

pub fn at(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

/// A message `minutes` after `base`; ids grow with time like snowflakes.
pub fn message(id: u64, base: DateTime<Utc>, minutes: i64, author: &str, bot: bool) -> SourceMessage {
    SourceMessage {
        id: id.to_string(),
        author: author.to_string(),
        author_is_bot: bot,
        content: format!("message {id} from {author}"),
        timestamp: base + TimeDelta::minutes(minutes),
        attachments: Vec::new(),
    }
}

/// Bound-based in-memory message source that pages like the Discord API.
pub struct FakeSource {
    page_limit: usize,
    history: Mutex<HashMap<ChannelId, Vec<SourceMessage>>>,
    names: HashMap<ChannelId, String>,
    directory: Option<Vec<DirectoryEntry>>,
    failing_pages: Mutex<HashMap<ChannelId, usize>>,
    overlap_pages: bool,
    names_unavailable: bool,
    pub page_calls: Mutex<Vec<(ChannelId, PageCursor, usize)>>,
    pub directory_calls: AtomicUsize,
}

impl Default for FakeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeSource {
    pub fn new() -> Self {
        Self {
            page_limit: 100,
            history: Mutex::new(HashMap::new()),
            names: HashMap::new(),
            directory: Some(Vec::new()),
            failing_pages: Mutex::new(HashMap::new()),
            overlap_pages: false,
            names_unavailable: false,
            page_calls: Mutex::new(Vec::new()),
            directory_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_page_limit(mut self, limit: usize) -> Self {
        self.page_limit = limit;
        self
    }

    pub fn with_channel(mut self, id: u64, name: &str) -> Self {
        self.names.insert(ChannelId(id), name.to_string());
        self.history.lock().unwrap().entry(ChannelId(id)).or_default();
        self
    }

    pub fn with_messages(self, id: u64, messages: Vec<SourceMessage>) -> Self {
        self.history
            .lock()
            .unwrap()
            .entry(ChannelId(id))
            .or_default()
            .extend(messages);
        self
    }

    pub fn with_directory(mut self, entries: Vec<DirectoryEntry>) -> Self {
        self.directory = Some(entries);
        self
    }

    pub fn with_broken_directory(mut self) -> Self {
        self.directory = None;
        self
    }

    /// Later pages repeat the message the cursor points at.
    pub fn with_overlapping_pages(mut self) -> Self {
        self.overlap_pages = true;
        self
    }

    /// Channel name lookups fail with a transport error.
    pub fn with_names_unavailable(mut self) -> Self {
        self.names_unavailable = true;
        self
    }

    /// The `page`-th request (1-based, counted per channel) fails.
    pub fn fail_page(&self, id: u64, page: usize) {
        self.failing_pages
            .lock()
            .unwrap()
            .insert(ChannelId(id), page);
    }

    pub fn clear_failures(&self) {
        self.failing_pages.lock().unwrap().clear();
    }

    pub fn post(&self, id: u64, message: SourceMessage) {
        self.history
            .lock()
            .unwrap()
            .entry(ChannelId(id))
            .or_default()
            .push(message);
    }

    pub fn pages_requested(&self, id: u64) -> usize {
        self.page_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(channel, _, _)| *channel == ChannelId(id))
            .count()
    }

    pub fn reset_calls(&self) {
        self.page_calls.lock().unwrap().clear();
    }
}

fn id_of(message: &SourceMessage) -> u64 {
    message.id.parse().unwrap()
}

#[async_trait]
impl MessageSource for FakeSource {
    fn page_limit(&self) -> usize {
        self.page_limit
    }

    async fn list_channels(&self, _group: GroupId) -> Result<Vec<DirectoryEntry>, RecapError> {
        self.directory_calls.fetch_add(1, Ordering::SeqCst);
        self.directory
            .clone()
            .ok_or_else(|| RecapError::HttpError("directory unavailable".into()))
    }

    async fn channel_name(&self, channel: ChannelId) -> Result<String, RecapError> {
        if self.names_unavailable {
            return Err(RecapError::HttpError("timed out".into()));
        }
        self.names
            .get(&channel)
            .cloned()
            .ok_or_else(|| RecapError::ResolutionError(format!("channel {channel} does not exist")))
    }

    async fn fetch_page(
        &self,
        channel: ChannelId,
        cursor: &PageCursor,
        limit: usize,
    ) -> Result<MessagePage, RecapError> {
        let call_index = {
            let mut calls = self.page_calls.lock().unwrap();
            calls.push((channel, cursor.clone(), limit));
            calls.iter().filter(|(c, _, _)| *c == channel).count()
        };
        if self.failing_pages.lock().unwrap().get(&channel) == Some(&call_index) {
            return Err(RecapError::HttpError("connection reset".into()));
        }

        let history = self.history.lock().unwrap();
        let Some(all) = history.get(&channel) else {
            return Err(RecapError::ApiError {
                status: 404,
                message: "Unknown Channel".into(),
            });
        };

        let mut eligible: Vec<SourceMessage> = all
            .iter()
            .filter(|m| match cursor {
                PageCursor::Since(ts) => m.timestamp >= *ts,
                PageCursor::AfterMessage(after) => {
                    let after: u64 = after.parse().unwrap();
                    if self.overlap_pages {
                        id_of(m) >= after
                    } else {
                        id_of(m) > after
                    }
                }
            })
            .cloned()
            .collect();
        eligible.sort_by_key(id_of);

        let has_more = eligible.len() > limit;
        eligible.truncate(limit);
        // Discord lists each page newest first
        eligible.reverse();

        Ok(MessagePage {
            messages: eligible,
            has_more,
        })
    }
}

/// Generator that answers with a canned summary unless told to fail for a channel.
#[derive(Default)]
pub struct FakeGenerator {
    failing_channels: Mutex<HashSet<String>>,
    pub calls: AtomicUsize,
    pub prompts: Mutex<Vec<String>>,
}

impl FakeGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_for(&self, channel_name: &str) {
        self.failing_channels
            .lock()
            .unwrap()
            .insert(channel_name.to_string());
    }

    pub fn recover(&self) {
        self.failing_channels.lock().unwrap().clear();
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextGenerator for FakeGenerator {
    async fn generate(&self, prompt: Vec<ChatCompletionMessage>) -> Result<String, RecapError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let user_text = prompt
            .iter()
            .filter_map(|m| match &m.content {
                Content::Text(text) => Some(text.clone()),
                _ => None,
            })
            .next_back()
            .unwrap_or_default();
        self.prompts.lock().unwrap().push(user_text.clone());

        let failing = self.failing_channels.lock().unwrap();
        if failing
            .iter()
            .any(|name| user_text.starts_with(&format!("Channel: #{name}\n")))
        {
            return Err(RecapError::GenerationError("quota exceeded".into()));
        }

        let lines = user_text.lines().filter(|l| l.starts_with('[')).count();
        Ok(format!("Discussion summary covering {lines} message(s)."))
    }
}

#[derive(Default)]
pub struct FakeRelay {
    pub fail: bool,
    pub relayed: Mutex<Vec<String>>,
}

#[async_trait]
impl SummaryRelay for FakeRelay {
    async fn relay(&self, record: &SummaryRecord) -> Result<(), RecapError> {
        self.relayed.lock().unwrap().push(record.channel_name.clone());
        if self.fail {
            Err(RecapError::RelayError("webhook answered 500".into()))
        } else {
            Ok(())
        }
    }
}
