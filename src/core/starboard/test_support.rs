// Test doubles shared by the starboard tests.

use super::platform::{ChatPlatform, PlatformError};
use super::render::PostContent;
use super::starboard_models::{Emote, Reactor, SourceMessage};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

pub fn human(user_id: u64) -> Reactor {
    Reactor {
        user_id,
        is_bot: false,
    }
}

pub fn robot(user_id: u64) -> Reactor {
    Reactor {
        user_id,
        is_bot: true,
    }
}

#[derive(Debug, Clone)]
pub struct SentMessage {
    pub channel_id: u64,
    pub content: PostContent,
}

/// In-process stand-in for Discord.
pub struct FakePlatform {
    messages: Mutex<HashMap<u64, SourceMessage>>,
    reactors: Mutex<HashMap<(u64, Emote), Vec<Reactor>>>,
    sent: Mutex<HashMap<u64, SentMessage>>,
    // Message ids per channel in posting order.
    history: Mutex<HashMap<u64, Vec<u64>>>,
    muted_channels: Mutex<HashSet<u64>>,
    next_failure: Mutex<Option<PlatformError>>,
    next_id: AtomicU64,
    reactor_fetches: AtomicUsize,
    sends: AtomicUsize,
    edits: AtomicUsize,
    deletes: AtomicUsize,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self {
            messages: Mutex::new(HashMap::new()),
            reactors: Mutex::new(HashMap::new()),
            sent: Mutex::new(HashMap::new()),
            history: Mutex::new(HashMap::new()),
            muted_channels: Mutex::new(HashSet::new()),
            next_failure: Mutex::new(None),
            next_id: AtomicU64::new(10_000),
            reactor_fetches: AtomicUsize::new(0),
            sends: AtomicUsize::new(0),
            edits: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
        }
    }

    pub fn add_message(&self, guild_id: u64, channel_id: u64, message_id: u64, author_id: u64, content: &str) {
        self.messages.lock().unwrap().insert(
            message_id,
            SourceMessage {
                id: message_id,
                channel_id,
                guild_id,
                content: content.to_string(),
                attachments: Vec::new(),
                author_id,
                author_display_name: format!("user-{}", author_id),
                author_avatar_url: None,
                timestamp: Utc::now(),
            },
        );
    }

    pub fn edit_source(&self, message_id: u64, content: &str) {
        if let Some(message) = self.messages.lock().unwrap().get_mut(&message_id) {
            message.content = content.to_string();
        }
    }

    pub fn remove_source(&self, message_id: u64) {
        self.messages.lock().unwrap().remove(&message_id);
    }

    pub fn set_reactors(&self, message_id: u64, emote: &Emote, reactors: Vec<Reactor>) {
        self.reactors
            .lock()
            .unwrap()
            .insert((message_id, emote.clone()), reactors);
    }

    pub fn add_reactor(&self, message_id: u64, emote: &Emote, reactor: Reactor) {
        self.reactors
            .lock()
            .unwrap()
            .entry((message_id, emote.clone()))
            .or_default()
            .push(reactor);
    }

    pub fn remove_reactor(&self, message_id: u64, emote: &Emote, user_id: u64) {
        if let Some(list) = self
            .reactors
            .lock()
            .unwrap()
            .get_mut(&(message_id, emote.clone()))
        {
            list.retain(|r| r.user_id != user_id);
        }
    }

    pub fn clear_reactors(&self, message_id: u64) {
        self.reactors
            .lock()
            .unwrap()
            .retain(|(id, _), _| *id != message_id);
    }

    pub fn mute_channel(&self, channel_id: u64) {
        self.muted_channels.lock().unwrap().insert(channel_id);
    }

    /// Make the next platform call fail with `error`.
    pub fn fail_next(&self, error: PlatformError) {
        *self.next_failure.lock().unwrap() = Some(error);
    }

    /// Simulate unrelated chatter in a channel.
    pub fn post_filler(&self, channel_id: u64, count: usize) {
        let mut history = self.history.lock().unwrap();
        let entry = history.entry(channel_id).or_default();
        for _ in 0..count {
            entry.push(self.next_id.fetch_add(1, Ordering::SeqCst));
        }
    }

    /// A moderator deleted an output message behind the bot's back.
    pub fn delete_out_of_band(&self, message_id: u64) {
        self.sent.lock().unwrap().remove(&message_id);
    }

    pub fn sent_message(&self, message_id: u64) -> Option<SentMessage> {
        self.sent.lock().unwrap().get(&message_id).cloned()
    }

    pub fn live_output_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn reactor_fetches(&self) -> usize {
        self.reactor_fetches.load(Ordering::SeqCst)
    }

    pub fn sends(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }

    pub fn edits(&self) -> usize {
        self.edits.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    fn take_failure(&self) -> Result<(), PlatformError> {
        match self.next_failure.lock().unwrap().take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ChatPlatform for FakePlatform {
    async fn fetch_reactors(
        &self,
        _channel_id: u64,
        message_id: u64,
        emote: &Emote,
    ) -> Result<Vec<Reactor>, PlatformError> {
        self.take_failure()?;
        self.reactor_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .reactors
            .lock()
            .unwrap()
            .get(&(message_id, emote.clone()))
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_message(
        &self,
        _channel_id: u64,
        message_id: u64,
    ) -> Result<SourceMessage, PlatformError> {
        self.take_failure()?;
        self.messages
            .lock()
            .unwrap()
            .get(&message_id)
            .cloned()
            .ok_or(PlatformError::NotFound)
    }

    async fn send_message(
        &self,
        channel_id: u64,
        content: &PostContent,
    ) -> Result<u64, PlatformError> {
        self.take_failure()?;
        if self.muted_channels.lock().unwrap().contains(&channel_id) {
            return Err(PlatformError::Forbidden);
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.sent.lock().unwrap().insert(
            id,
            SentMessage {
                channel_id,
                content: content.clone(),
            },
        );
        self.history
            .lock()
            .unwrap()
            .entry(channel_id)
            .or_default()
            .push(id);
        self.sends.fetch_add(1, Ordering::SeqCst);
        Ok(id)
    }

    async fn edit_message(
        &self,
        _channel_id: u64,
        message_id: u64,
        content: &PostContent,
    ) -> Result<(), PlatformError> {
        self.take_failure()?;
        let mut sent = self.sent.lock().unwrap();
        let existing = sent.get_mut(&message_id).ok_or(PlatformError::NotFound)?;
        existing.content = content.clone();
        self.edits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete_message(&self, _channel_id: u64, message_id: u64) -> Result<(), PlatformError> {
        self.take_failure()?;
        self.sent
            .lock()
            .unwrap()
            .remove(&message_id)
            .ok_or(PlatformError::NotFound)?;
        self.deletes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn message_exists(&self, _channel_id: u64, message_id: u64) -> Result<bool, PlatformError> {
        self.take_failure()?;
        Ok(self.sent.lock().unwrap().contains_key(&message_id))
    }

    async fn can_send(&self, channel_id: u64) -> Result<bool, PlatformError> {
        self.take_failure()?;
        Ok(!self.muted_channels.lock().unwrap().contains(&channel_id))
    }

    async fn messages_after(
        &self,
        channel_id: u64,
        message_id: u64,
        limit: u32,
    ) -> Result<usize, PlatformError> {
        self.take_failure()?;
        if !self.sent.lock().unwrap().contains_key(&message_id) {
            return Err(PlatformError::NotFound);
        }
        let history = self.history.lock().unwrap();
        let after = history
            .get(&channel_id)
            .and_then(|ids| ids.iter().position(|id| *id == message_id).map(|pos| ids.len() - pos - 1))
            .unwrap_or(0);
        Ok(after.min(limit as usize))
    }
}
