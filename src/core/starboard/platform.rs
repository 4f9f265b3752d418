// Chat-platform port.
//
// Everything the starboard asks of Discord goes through this trait so the
// core can be tested against a fake platform.

use super::render::PostContent;
use super::starboard_models::{Emote, Reactor, SourceMessage};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
    /// The message or channel no longer exists.
    #[error("Not found")]
    NotFound,

    #[error("Missing permissions")]
    Forbidden,

    /// Timeouts, rate limits, gateway hiccups.
    #[error("Platform request failed: {0}")]
    Transient(String),
}

#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Authoritative list of users who reacted with `emote`.
    async fn fetch_reactors(
        &self,
        channel_id: u64,
        message_id: u64,
        emote: &Emote,
    ) -> Result<Vec<Reactor>, PlatformError>;

    async fn fetch_message(
        &self,
        channel_id: u64,
        message_id: u64,
    ) -> Result<SourceMessage, PlatformError>;

    /// Returns the id of the new message.
    async fn send_message(
        &self,
        channel_id: u64,
        content: &PostContent,
    ) -> Result<u64, PlatformError>;

    async fn edit_message(
        &self,
        channel_id: u64,
        message_id: u64,
        content: &PostContent,
    ) -> Result<(), PlatformError>;

    async fn delete_message(&self, channel_id: u64, message_id: u64) -> Result<(), PlatformError>;

    /// Whether a message the bot posted is still there.
    async fn message_exists(&self, channel_id: u64, message_id: u64) -> Result<bool, PlatformError>;

    /// Whether the bot may post highlights in `channel_id`.
    async fn can_send(&self, channel_id: u64) -> Result<bool, PlatformError>;

    /// How many messages (up to `limit`) were posted after `message_id`.
    async fn messages_after(
        &self,
        channel_id: u64,
        message_id: u64,
        limit: u32,
    ) -> Result<usize, PlatformError>;
}
