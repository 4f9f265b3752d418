// Storage ports for the starboard.
//
// The core defines WHAT it needs persisted; `infra/starboard` provides the
// SQLite and in-memory implementations.

use super::platform::PlatformError;
use super::starboard_models::{
    BoardConfig, Emote, ReactionAttribution, ReactionSample, StarPost,
};
use async_trait::async_trait;
use thiserror::Error;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum StarboardError {
    #[error("Emote {emote} is already used by board #{board_id} in this server")]
    EmoteCollision { emote: Emote, board_id: u64 },

    #[error("Board #{0} would have no emotes left; delete the board instead")]
    LastEmoteRemoval(u64),

    #[error("A board needs at least one emote")]
    EmptyEmoteSet,

    #[error("Emote {emote} is not part of board #{board_id}")]
    EmoteNotOnBoard { emote: Emote, board_id: u64 },

    #[error("Threshold must be at least 1 (got {0})")]
    InvalidThreshold(u32),

    #[error("Board #{0} does not exist")]
    BoardNotFound(u64),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),
}

// ============================================================================
// STORAGE TRAITS (PORTS)
// ============================================================================

/// Durable home of board configuration. The registry keeps the in-memory copy.
#[async_trait]
pub trait BoardStore: Send + Sync {
    /// Load every board of every guild (startup read-through).
    async fn load_boards(&self) -> Result<Vec<BoardConfig>, StarboardError>;

    /// Insert a new board and return its assigned id. `board.id` is ignored.
    async fn insert_board(&self, board: &BoardConfig) -> Result<u64, StarboardError>;

    /// Overwrite an existing board.
    async fn update_board(&self, board: &BoardConfig) -> Result<(), StarboardError>;

    /// Delete a board along with its posts.
    async fn delete_board(&self, board_id: u64) -> Result<(), StarboardError>;
}

/// Rows linking source messages to highlight posts.
#[async_trait]
pub trait StarPostStore: Send + Sync {
    async fn get_post(
        &self,
        source_message_id: u64,
        board_id: u64,
    ) -> Result<Option<StarPost>, StarboardError>;

    /// Insert or replace the row for `(source_message_id, board_id)`.
    async fn upsert_post(&self, post: &StarPost) -> Result<(), StarboardError>;

    /// Returns whether a row was removed.
    async fn delete_post(&self, source_message_id: u64, board_id: u64)
        -> Result<bool, StarboardError>;

    /// All posts for a source message, across boards.
    async fn posts_for_message(
        &self,
        source_message_id: u64,
    ) -> Result<Vec<StarPost>, StarboardError>;
}

/// Reaction samples and attributions for statistics.
#[async_trait]
pub trait ReactionStatsStore: Send + Sync {
    async fn get_sample(
        &self,
        message_id: u64,
        board_id: u64,
        emote: &Emote,
    ) -> Result<Option<ReactionSample>, StarboardError>;

    /// Implementations must keep `peak_count` at the maximum ever stored.
    async fn upsert_sample(&self, sample: &ReactionSample) -> Result<(), StarboardError>;

    async fn samples_for_boards(
        &self,
        board_ids: &[u64],
    ) -> Result<Vec<ReactionSample>, StarboardError>;

    /// Insert-once. Returns `false` if the attribution already existed.
    async fn insert_attribution(
        &self,
        attribution: &ReactionAttribution,
    ) -> Result<bool, StarboardError>;

    async fn attributions_for_guild(
        &self,
        guild_id: u64,
    ) -> Result<Vec<ReactionAttribution>, StarboardError>;
}

/// Everything the engine persists.
pub trait StarboardStore: BoardStore + StarPostStore + ReactionStatsStore {}

impl<T: BoardStore + StarPostStore + ReactionStatsStore> StarboardStore for T {}
