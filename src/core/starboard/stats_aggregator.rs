// Starboard statistics.
//
// Samples and attributions are written as a side effect of evaluation. The
// query side joins them against the guild's boards in memory; nothing here
// ever feeds back into vote counting.

use super::starboard_models::{
    BoardConfig, Emote, GuildStarStats, Ranked, ReactionAttribution, ReactionSample,
    UserStarStats,
};
use super::starboard_store::{ReactionStatsStore, StarboardError};
use super::threshold_evaluator::Evaluation;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub struct StatsAggregator<S: ReactionStatsStore> {
    store: Arc<S>,
}

impl<S: ReactionStatsStore> StatsAggregator<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Upsert one sample per board emote from a fresh evaluation.
    /// Evaluations that produced no counts are ignored.
    pub async fn record_evaluation(
        &self,
        board: &BoardConfig,
        evaluation: &Evaluation,
    ) -> Result<(), StarboardError> {
        let Some(message) = evaluation.message.as_ref() else {
            return Ok(());
        };

        for entry in &evaluation.per_emote {
            let previous_peak = self
                .store
                .get_sample(evaluation.message_id, board.id, &entry.emote)
                .await?
                .map(|s| s.peak_count)
                .unwrap_or(0);

            let sample = ReactionSample {
                message_id: evaluation.message_id,
                board_id: board.id,
                emote: entry.emote.clone(),
                author_id: message.author_id,
                source_channel_id: evaluation.channel_id,
                current_count: entry.count,
                peak_count: previous_peak.max(entry.count),
                is_active: entry.count > 0,
            };
            self.store.upsert_sample(&sample).await?;
        }
        Ok(())
    }

    /// Remember that `user_id` starred the message. Returns `false` if this
    /// was already known.
    pub async fn record_attribution(
        &self,
        board: &BoardConfig,
        message_id: u64,
        author_id: u64,
        user_id: u64,
        emote: &Emote,
    ) -> Result<bool, StarboardError> {
        let attribution = ReactionAttribution {
            message_id,
            user_id,
            emote: emote.clone(),
            guild_id: board.guild_id,
            author_id,
            created_at: Utc::now(),
        };
        self.store.insert_attribution(&attribution).await
    }

    pub async fn guild_stats(
        &self,
        guild_id: u64,
        boards: &[BoardConfig],
    ) -> Result<GuildStarStats, StarboardError> {
        let boards = guild_boards(guild_id, boards);
        let samples = self.active_samples(&boards).await?;
        let attributions = self.attributions(guild_id, &boards).await?;

        let mut by_author: HashMap<u64, u64> = HashMap::new();
        let mut by_output_channel: HashMap<u64, u64> = HashMap::new();
        let mut messages: HashSet<u64> = HashSet::new();
        let mut total_stars = 0u64;

        for sample in &samples {
            let stars = sample.current_count as u64;
            total_stars += stars;
            messages.insert(sample.message_id);
            *by_author.entry(sample.author_id).or_default() += stars;
            if let Some(board) = boards.iter().find(|b| b.id == sample.board_id) {
                *by_output_channel.entry(board.output_channel_id).or_default() += stars;
            }
        }

        let mut by_reactor: HashMap<u64, u64> = HashMap::new();
        for attribution in &attributions {
            *by_reactor.entry(attribution.user_id).or_default() += 1;
        }

        Ok(GuildStarStats {
            guild_id,
            total_stars,
            starred_messages: messages.len() as u64,
            top_author: top(by_author, 1).into_iter().next(),
            top_output_channel: top(by_output_channel, 1).into_iter().next(),
            top_reactor: top(by_reactor, 1).into_iter().next(),
        })
    }

    pub async fn user_stats(
        &self,
        guild_id: u64,
        user_id: u64,
        boards: &[BoardConfig],
        limit: usize,
    ) -> Result<UserStarStats, StarboardError> {
        let boards = guild_boards(guild_id, boards);
        let samples = self.active_samples(&boards).await?;
        let attributions = self.attributions(guild_id, &boards).await?;

        let mut messages: HashSet<u64> = HashSet::new();
        let mut stars_received = 0u64;
        for sample in samples.iter().filter(|s| s.author_id == user_id) {
            messages.insert(sample.message_id);
            stars_received += sample.current_count as u64;
        }

        let mut stars_given = 0u64;
        let mut fans: HashMap<u64, u64> = HashMap::new();
        let mut idols: HashMap<u64, u64> = HashMap::new();
        for attribution in &attributions {
            if attribution.user_id == user_id {
                stars_given += 1;
            }
            if attribution.user_id == attribution.author_id {
                continue;
            }
            if attribution.author_id == user_id {
                *fans.entry(attribution.user_id).or_default() += 1;
            }
            if attribution.user_id == user_id {
                *idols.entry(attribution.author_id).or_default() += 1;
            }
        }

        Ok(UserStarStats {
            user_id,
            messages_starred: messages.len() as u64,
            stars_received,
            stars_given,
            top_fans: top(fans, limit),
            top_idols: top(idols, limit),
        })
    }

    async fn active_samples(
        &self,
        boards: &[&BoardConfig],
    ) -> Result<Vec<ReactionSample>, StarboardError> {
        if boards.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<u64> = boards.iter().map(|b| b.id).collect();
        let samples = self.store.samples_for_boards(&ids).await?;
        Ok(samples.into_iter().filter(|s| s.is_active).collect())
    }

    /// Attributions whose emote still triggers one of the guild's boards.
    async fn attributions(
        &self,
        guild_id: u64,
        boards: &[&BoardConfig],
    ) -> Result<Vec<ReactionAttribution>, StarboardError> {
        let emotes: HashSet<&Emote> = boards.iter().flat_map(|b| b.emote_set.iter()).collect();
        let attributions = self.store.attributions_for_guild(guild_id).await?;
        Ok(attributions
            .into_iter()
            .filter(|a| emotes.contains(&a.emote))
            .collect())
    }
}

fn guild_boards(guild_id: u64, boards: &[BoardConfig]) -> Vec<&BoardConfig> {
    boards.iter().filter(|b| b.guild_id == guild_id).collect()
}

/// Highest counts first; ties go to the lower id so results are stable.
fn top(counts: HashMap<u64, u64>, limit: usize) -> Vec<Ranked> {
    let mut ranked: Vec<Ranked> = counts
        .into_iter()
        .filter(|(_, count)| *count > 0)
        .map(|(id, count)| Ranked { id, count })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then(a.id.cmp(&b.id)));
    ranked.truncate(limit);
    ranked
}
