// In-memory implementation of the starboard stores.
//
// Backs the core's tests and can stand in for SQLite when persistence is not
// wanted. DashMap lets concurrent event handlers write without a global lock.

use crate::core::starboard::{
    BoardConfig, BoardStore, Emote, ReactionAttribution, ReactionSample, ReactionStatsStore,
    StarPost, StarPostStore, StarboardError,
};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

pub struct InMemoryStarboardStore {
    boards: DashMap<u64, BoardConfig>,
    next_board_id: AtomicU64,
    /// (source_message_id, board_id) -> post
    posts: DashMap<(u64, u64), StarPost>,
    samples: DashMap<(u64, u64, Emote), ReactionSample>,
    attributions: DashMap<(u64, u64, Emote), ReactionAttribution>,
}

impl InMemoryStarboardStore {
    pub fn new() -> Self {
        Self {
            boards: DashMap::new(),
            next_board_id: AtomicU64::new(1),
            posts: DashMap::new(),
            samples: DashMap::new(),
            attributions: DashMap::new(),
        }
    }
}

impl Default for InMemoryStarboardStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BoardStore for InMemoryStarboardStore {
    async fn load_boards(&self) -> Result<Vec<BoardConfig>, StarboardError> {
        Ok(self.boards.iter().map(|b| b.value().clone()).collect())
    }

    async fn insert_board(&self, board: &BoardConfig) -> Result<u64, StarboardError> {
        let id = self.next_board_id.fetch_add(1, Ordering::SeqCst);
        let mut stored = board.clone();
        stored.id = id;
        self.boards.insert(id, stored);
        Ok(id)
    }

    async fn update_board(&self, board: &BoardConfig) -> Result<(), StarboardError> {
        match self.boards.get_mut(&board.id) {
            Some(mut existing) => {
                *existing = board.clone();
                Ok(())
            }
            None => Err(StarboardError::BoardNotFound(board.id)),
        }
    }

    async fn delete_board(&self, board_id: u64) -> Result<(), StarboardError> {
        self.boards.remove(&board_id);
        self.posts.retain(|(_, board), _| *board != board_id);
        Ok(())
    }
}

#[async_trait]
impl StarPostStore for InMemoryStarboardStore {
    async fn get_post(
        &self,
        source_message_id: u64,
        board_id: u64,
    ) -> Result<Option<StarPost>, StarboardError> {
        Ok(self
            .posts
            .get(&(source_message_id, board_id))
            .map(|p| p.clone()))
    }

    async fn upsert_post(&self, post: &StarPost) -> Result<(), StarboardError> {
        self.posts
            .insert((post.source_message_id, post.board_id), post.clone());
        Ok(())
    }

    async fn delete_post(
        &self,
        source_message_id: u64,
        board_id: u64,
    ) -> Result<bool, StarboardError> {
        Ok(self.posts.remove(&(source_message_id, board_id)).is_some())
    }

    async fn posts_for_message(
        &self,
        source_message_id: u64,
    ) -> Result<Vec<StarPost>, StarboardError> {
        let mut posts: Vec<StarPost> = self
            .posts
            .iter()
            .filter(|entry| entry.key().0 == source_message_id)
            .map(|entry| entry.value().clone())
            .collect();
        posts.sort_by_key(|p| p.board_id);
        Ok(posts)
    }
}

#[async_trait]
impl ReactionStatsStore for InMemoryStarboardStore {
    async fn get_sample(
        &self,
        message_id: u64,
        board_id: u64,
        emote: &Emote,
    ) -> Result<Option<ReactionSample>, StarboardError> {
        Ok(self
            .samples
            .get(&(message_id, board_id, emote.clone()))
            .map(|s| s.clone()))
    }

    async fn upsert_sample(&self, sample: &ReactionSample) -> Result<(), StarboardError> {
        let key = (sample.message_id, sample.board_id, sample.emote.clone());
        match self.samples.entry(key) {
            Entry::Occupied(mut entry) => {
                let peak = entry.get().peak_count.max(sample.peak_count);
                let stored = entry.get_mut();
                *stored = sample.clone();
                stored.peak_count = peak;
            }
            Entry::Vacant(entry) => {
                entry.insert(sample.clone());
            }
        }
        Ok(())
    }

    async fn samples_for_boards(
        &self,
        board_ids: &[u64],
    ) -> Result<Vec<ReactionSample>, StarboardError> {
        Ok(self
            .samples
            .iter()
            .filter(|entry| board_ids.contains(&entry.board_id))
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn insert_attribution(
        &self,
        attribution: &ReactionAttribution,
    ) -> Result<bool, StarboardError> {
        let key = (
            attribution.message_id,
            attribution.user_id,
            attribution.emote.clone(),
        );
        match self.attributions.entry(key) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(entry) => {
                entry.insert(attribution.clone());
                Ok(true)
            }
        }
    }

    async fn attributions_for_guild(
        &self,
        guild_id: u64,
    ) -> Result<Vec<ReactionAttribution>, StarboardError> {
        Ok(self
            .attributions
            .iter()
            .filter(|entry| entry.guild_id == guild_id)
            .map(|entry| entry.value().clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(count: u32, peak: u32) -> ReactionSample {
        ReactionSample {
            message_id: 1,
            board_id: 2,
            emote: Emote::Unicode("⭐".into()),
            author_id: 3,
            source_channel_id: 4,
            current_count: count,
            peak_count: peak,
            is_active: count > 0,
        }
    }

    #[tokio::test]
    async fn stored_peak_only_grows() {
        let store = InMemoryStarboardStore::new();
        store.upsert_sample(&sample(5, 5)).await.unwrap();
        store.upsert_sample(&sample(2, 2)).await.unwrap();

        let stored = store
            .get_sample(1, 2, &Emote::Unicode("⭐".into()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.current_count, 2);
        assert_eq!(stored.peak_count, 5);
    }

    #[tokio::test]
    async fn deleting_a_board_drops_its_posts() {
        let store = InMemoryStarboardStore::new();
        let id = store
            .insert_board(&BoardConfig::new(1, 2, vec![Emote::Unicode("⭐".into())], 3))
            .await
            .unwrap();
        store
            .upsert_post(&StarPost {
                source_message_id: 10,
                board_id: id,
                source_channel_id: 11,
                output_message_id: 12,
                last_known_count: 3,
            })
            .await
            .unwrap();

        store.delete_board(id).await.unwrap();
        assert!(store.get_post(10, id).await.unwrap().is_none());
        assert!(store.load_boards().await.unwrap().is_empty());
    }
}
