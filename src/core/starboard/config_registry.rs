// Board configuration registry.
//
// All boards are loaded once at startup and served from memory. Mutations go
// through `mutate`, which persists the new version before swapping it in, so a
// failed write never becomes visible to readers.

use super::starboard_models::{BoardConfig, ChannelFilterMode, Emote, RemovalTrigger};
use super::starboard_store::{BoardStore, StarboardError};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

pub struct ConfigRegistry<S: BoardStore> {
    store: Arc<S>,
    boards: DashMap<u64, BoardConfig>,
    // One writer per guild keeps the collision check and the write atomic.
    guild_locks: DashMap<u64, Arc<Mutex<()>>>,
}

impl<S: BoardStore> ConfigRegistry<S> {
    /// Build the registry from everything the store holds.
    pub async fn load(store: Arc<S>) -> Result<Self, StarboardError> {
        let boards = DashMap::new();
        for board in store.load_boards().await? {
            boards.insert(board.id, board);
        }
        tracing::info!(boards = boards.len(), "Loaded starboard configuration");

        Ok(Self {
            store,
            boards,
            guild_locks: DashMap::new(),
        })
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn get(&self, board_id: u64) -> Option<BoardConfig> {
        self.boards.get(&board_id).map(|b| b.clone())
    }

    /// Boards of a guild, ordered by id.
    pub fn boards_for_guild(&self, guild_id: u64) -> Vec<BoardConfig> {
        let mut boards: Vec<BoardConfig> = self
            .boards
            .iter()
            .filter(|entry| entry.guild_id == guild_id)
            .map(|entry| entry.value().clone())
            .collect();
        boards.sort_by_key(|b| b.id);
        boards
    }

    /// Boards of a guild triggered by `emote`. Collision prevention means
    /// there is at most one, but callers should not rely on that.
    pub fn boards_for_emote(&self, guild_id: u64, emote: &Emote) -> Vec<BoardConfig> {
        self.boards_for_guild(guild_id)
            .into_iter()
            .filter(|b| b.watches(emote))
            .collect()
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    pub async fn create_board(
        &self,
        guild_id: u64,
        output_channel_id: u64,
        emote_set: Vec<Emote>,
        threshold: u32,
    ) -> Result<u64, StarboardError> {
        if threshold == 0 {
            return Err(StarboardError::InvalidThreshold(threshold));
        }

        let mut emotes: Vec<Emote> = Vec::with_capacity(emote_set.len());
        for emote in emote_set {
            if !emotes.contains(&emote) {
                emotes.push(emote);
            }
        }
        if emotes.is_empty() {
            return Err(StarboardError::EmptyEmoteSet);
        }

        let lock = self.guild_lock(guild_id);
        let _guard = lock.lock().await;

        for emote in &emotes {
            self.check_collision(guild_id, None, emote)?;
        }

        let mut board = BoardConfig::new(guild_id, output_channel_id, emotes, threshold);
        board.id = self.store.insert_board(&board).await?;
        let board_id = board.id;
        self.boards.insert(board_id, board);

        tracing::info!(guild_id, board_id, output_channel_id, "Created starboard");
        Ok(board_id)
    }

    pub async fn delete_board(&self, board_id: u64) -> Result<(), StarboardError> {
        let guild_id = self.guild_of(board_id)?;
        let lock = self.guild_lock(guild_id);
        let _guard = lock.lock().await;

        if !self.boards.contains_key(&board_id) {
            return Err(StarboardError::BoardNotFound(board_id));
        }
        self.store.delete_board(board_id).await?;
        self.boards.remove(&board_id);

        tracing::info!(guild_id, board_id, "Deleted starboard");
        Ok(())
    }

    pub async fn add_emote(&self, board_id: u64, emote: Emote) -> Result<(), StarboardError> {
        let guild_id = self.guild_of(board_id)?;
        self.check_collision(guild_id, Some(board_id), &emote)?;
        self.mutate(board_id, |board| {
            if !board.emote_set.contains(&emote) {
                board.emote_set.push(emote);
            }
            Ok(())
        })
        .await
    }

    pub async fn remove_emote(&self, board_id: u64, emote: &Emote) -> Result<(), StarboardError> {
        self.mutate(board_id, |board| {
            if !board.emote_set.contains(emote) {
                return Err(StarboardError::EmoteNotOnBoard {
                    emote: emote.clone(),
                    board_id,
                });
            }
            if board.emote_set.len() == 1 {
                return Err(StarboardError::LastEmoteRemoval(board_id));
            }
            board.emote_set.retain(|e| e != emote);
            Ok(())
        })
        .await
    }

    pub async fn set_threshold(&self, board_id: u64, threshold: u32) -> Result<(), StarboardError> {
        if threshold == 0 {
            return Err(StarboardError::InvalidThreshold(threshold));
        }
        self.mutate(board_id, |board| {
            board.threshold = threshold;
            Ok(())
        })
        .await
    }

    pub async fn set_repost_threshold(
        &self,
        board_id: u64,
        repost_threshold: u32,
    ) -> Result<(), StarboardError> {
        self.mutate(board_id, |board| {
            board.repost_threshold = repost_threshold;
            Ok(())
        })
        .await
    }

    pub async fn set_channel_filter_mode(
        &self,
        board_id: u64,
        mode: ChannelFilterMode,
    ) -> Result<(), StarboardError> {
        self.mutate(board_id, |board| {
            board.channel_filter_mode = mode;
            Ok(())
        })
        .await
    }

    /// Returns `true` if the channel was added, `false` if it was removed.
    pub async fn toggle_channel_filter(
        &self,
        board_id: u64,
        channel_id: u64,
    ) -> Result<bool, StarboardError> {
        self.mutate(board_id, |board| {
            if let Some(pos) = board.channel_filter_list.iter().position(|c| *c == channel_id) {
                board.channel_filter_list.remove(pos);
                Ok(false)
            } else {
                board.channel_filter_list.push(channel_id);
                Ok(true)
            }
        })
        .await
    }

    pub async fn set_allow_bots(&self, board_id: u64, allow: bool) -> Result<(), StarboardError> {
        self.mutate(board_id, |board| {
            board.allow_bots = allow;
            Ok(())
        })
        .await
    }

    pub async fn set_allow_self_star(
        &self,
        board_id: u64,
        allow: bool,
    ) -> Result<(), StarboardError> {
        self.mutate(board_id, |board| {
            board.allow_self_star = allow;
            Ok(())
        })
        .await
    }

    pub async fn set_removal_policy(
        &self,
        board_id: u64,
        trigger: RemovalTrigger,
        enabled: bool,
    ) -> Result<(), StarboardError> {
        self.mutate(board_id, |board| {
            board.removal.set(trigger, enabled);
            Ok(())
        })
        .await
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    /// Apply `change` to a copy of the board, persist it, then publish it.
    async fn mutate<T>(
        &self,
        board_id: u64,
        change: impl FnOnce(&mut BoardConfig) -> Result<T, StarboardError>,
    ) -> Result<T, StarboardError> {
        let guild_id = self.guild_of(board_id)?;
        let lock = self.guild_lock(guild_id);
        let _guard = lock.lock().await;

        // Re-read under the lock; the board may have been deleted meanwhile.
        let mut updated = self
            .get(board_id)
            .ok_or(StarboardError::BoardNotFound(board_id))?;
        let result = change(&mut updated)?;

        // Emotes added by `change` were checked before the lock was taken.
        for emote in &updated.emote_set {
            self.check_collision(guild_id, Some(board_id), emote)?;
        }

        self.store.update_board(&updated).await?;
        self.boards.insert(board_id, updated);
        tracing::debug!(guild_id, board_id, "Updated starboard configuration");
        Ok(result)
    }

    fn check_collision(
        &self,
        guild_id: u64,
        except_board: Option<u64>,
        emote: &Emote,
    ) -> Result<(), StarboardError> {
        let owner = self.boards.iter().find(|entry| {
            entry.guild_id == guild_id && Some(entry.id) != except_board && entry.watches(emote)
        });
        match owner {
            Some(entry) => Err(StarboardError::EmoteCollision {
                emote: emote.clone(),
                board_id: entry.id,
            }),
            None => Ok(()),
        }
    }

    fn guild_of(&self, board_id: u64) -> Result<u64, StarboardError> {
        self.boards
            .get(&board_id)
            .map(|b| b.guild_id)
            .ok_or(StarboardError::BoardNotFound(board_id))
    }

    fn guild_lock(&self, guild_id: u64) -> Arc<Mutex<()>> {
        self.guild_locks
            .entry(guild_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

// ============================================================================
// TESTS
// ============================================================================
