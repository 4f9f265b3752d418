// Reaction event routing - the starboard engine's entry point.
//
// Each platform event is fanned out to the boards it concerns. Every board is
// processed under its own (message, board) lock, concurrently with the other
// boards, and a failure on one board is logged and contained.

use super::config_registry::ConfigRegistry;
use super::events::{MessageRef, PlatformEvent, PlatformEventObserver, ReactionEvent};
use super::key_locks::KeyedLocks;
use super::platform::ChatPlatform;
use super::post_lifecycle::{PostLifecycleManager, PostTransition};
use super::starboard_models::{BoardConfig, Emote, RemovalTrigger};
use super::starboard_store::{StarboardError, StarboardStore};
use super::stats_aggregator::StatsAggregator;
use super::threshold_evaluator::ThresholdEvaluator;
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;

/// Result of processing one board for one event.
#[derive(Debug)]
pub struct BoardOutcome {
    pub board_id: u64,
    pub result: Result<PostTransition, StarboardError>,
}

/// The user whose reaction triggered an evaluation.
#[derive(Debug, Clone, Copy)]
struct Actor<'a> {
    user_id: u64,
    is_bot: bool,
    emote: &'a Emote,
}

pub struct StarboardEngine<S: StarboardStore, P: ChatPlatform> {
    registry: Arc<ConfigRegistry<S>>,
    store: Arc<S>,
    evaluator: ThresholdEvaluator<P>,
    lifecycle: PostLifecycleManager<S, P>,
    stats: StatsAggregator<S>,
    locks: KeyedLocks<(u64, u64)>,
    self_user_id: u64,
}

impl<S: StarboardStore, P: ChatPlatform> StarboardEngine<S, P> {
    pub fn new(
        registry: Arc<ConfigRegistry<S>>,
        store: Arc<S>,
        platform: Arc<P>,
        self_user_id: u64,
    ) -> Self {
        Self {
            registry,
            evaluator: ThresholdEvaluator::new(Arc::clone(&platform)),
            lifecycle: PostLifecycleManager::new(Arc::clone(&store), platform),
            stats: StatsAggregator::new(Arc::clone(&store)),
            store,
            locks: KeyedLocks::new(),
            self_user_id,
        }
    }

    pub fn registry(&self) -> &ConfigRegistry<S> {
        &self.registry
    }

    pub fn stats(&self) -> &StatsAggregator<S> {
        &self.stats
    }

    // ------------------------------------------------------------------
    // Event handlers
    // ------------------------------------------------------------------

    pub async fn on_reaction_added(&self, event: &ReactionEvent) -> Vec<BoardOutcome> {
        self.route_reaction(event, true).await
    }

    pub async fn on_reaction_removed(&self, event: &ReactionEvent) -> Vec<BoardOutcome> {
        self.route_reaction(event, false).await
    }

    /// A moderator removed every reaction of one emote.
    pub async fn on_emote_cleared(&self, message: &MessageRef, emote: &Emote) -> Vec<BoardOutcome> {
        let Some(guild_id) = message.guild_id else {
            return Vec::new();
        };
        let boards = self.boards_for(guild_id, message.channel_id, emote);
        self.evaluate_all(boards, message.channel_id, message.message_id, None, false)
            .await
    }

    pub async fn on_reactions_cleared(&self, message: &MessageRef) -> Vec<BoardOutcome> {
        self.remove_everywhere(message.message_id, RemovalTrigger::ReactionsCleared)
            .await
    }

    pub async fn on_message_deleted(&self, message: &MessageRef) -> Vec<BoardOutcome> {
        self.remove_everywhere(message.message_id, RemovalTrigger::SourceDeleted)
            .await
    }

    /// Re-render existing highlights of an edited message.
    pub async fn on_message_edited(&self, message: &MessageRef) -> Vec<BoardOutcome> {
        let boards = match self.boards_with_posts(message.message_id).await {
            Ok(boards) => boards,
            Err(e) => {
                tracing::warn!(message_id = message.message_id, "Failed to look up highlights: {}", e);
                return Vec::new();
            }
        };
        self.evaluate_all(boards, message.channel_id, message.message_id, None, true)
            .await
    }

    /// Force a re-evaluation of a message on every board of its guild.
    /// Used to catch up on events missed while the bot was offline.
    pub async fn refresh_message(
        &self,
        guild_id: u64,
        channel_id: u64,
        message_id: u64,
    ) -> Vec<BoardOutcome> {
        let boards: Vec<BoardConfig> = self
            .registry
            .boards_for_guild(guild_id)
            .into_iter()
            .filter(|b| b.output_channel_id != channel_id)
            .collect();
        self.evaluate_all(boards, channel_id, message_id, None, true)
            .await
    }

    // ------------------------------------------------------------------
    // Routing
    // ------------------------------------------------------------------

    async fn route_reaction(&self, event: &ReactionEvent, added: bool) -> Vec<BoardOutcome> {
        if event.user_id == self.self_user_id {
            tracing::trace!(message_id = event.message_id, "Ignoring own reaction");
            return Vec::new();
        }
        let Some(guild_id) = event.guild_id else {
            return Vec::new();
        };

        let boards = self.boards_for(guild_id, event.channel_id, &event.emote);
        if boards.is_empty() {
            return Vec::new();
        }

        let actor = added.then_some(Actor {
            user_id: event.user_id,
            is_bot: event.user_is_bot,
            emote: &event.emote,
        });
        self.evaluate_all(boards, event.channel_id, event.message_id, actor, false)
            .await
    }

    /// Boards triggered by `emote`, minus any board whose output channel the
    /// reaction happened in.
    fn boards_for(&self, guild_id: u64, channel_id: u64, emote: &Emote) -> Vec<BoardConfig> {
        self.registry
            .boards_for_emote(guild_id, emote)
            .into_iter()
            .filter(|b| b.output_channel_id != channel_id)
            .collect()
    }

    async fn boards_with_posts(&self, message_id: u64) -> Result<Vec<BoardConfig>, StarboardError> {
        let posts = self.store.posts_for_message(message_id).await?;
        Ok(posts
            .iter()
            .filter_map(|post| self.registry.get(post.board_id))
            .collect())
    }

    async fn evaluate_all(
        &self,
        boards: Vec<BoardConfig>,
        channel_id: u64,
        message_id: u64,
        actor: Option<Actor<'_>>,
        force_refresh: bool,
    ) -> Vec<BoardOutcome> {
        let work = boards.iter().map(|board| async move {
            let result = self
                .evaluate_board(board, channel_id, message_id, actor, force_refresh)
                .await;
            outcome(board.id, message_id, result)
        });
        join_all(work).await
    }

    async fn evaluate_board(
        &self,
        board: &BoardConfig,
        channel_id: u64,
        message_id: u64,
        actor: Option<Actor<'_>>,
        force_refresh: bool,
    ) -> Result<PostTransition, StarboardError> {
        let _guard = self.locks.lock((message_id, board.id)).await;

        let evaluation = self.evaluator.compute(board, channel_id, message_id).await?;
        if let Err(e) = self.stats.record_evaluation(board, &evaluation).await {
            tracing::warn!(board_id = board.id, message_id, "Failed to record reaction samples: {}", e);
        }

        if let (Some(actor), Some(message)) = (actor, evaluation.message.as_ref()) {
            if evaluation.is_eligible() && (board.allow_bots || !actor.is_bot) {
                if let Err(e) = self
                    .stats
                    .record_attribution(board, message_id, message.author_id, actor.user_id, actor.emote)
                    .await
                {
                    tracing::warn!(board_id = board.id, message_id, "Failed to record attribution: {}", e);
                }
            }
        }

        self.lifecycle.apply(board, &evaluation, force_refresh).await
    }

    async fn remove_everywhere(&self, message_id: u64, trigger: RemovalTrigger) -> Vec<BoardOutcome> {
        let boards = match self.boards_with_posts(message_id).await {
            Ok(boards) => boards,
            Err(e) => {
                tracing::warn!(message_id, "Failed to look up highlights: {}", e);
                return Vec::new();
            }
        };

        let work = boards.iter().map(|board| async move {
            let _guard = self.locks.lock((message_id, board.id)).await;
            let result = self.lifecycle.remove(board, message_id, trigger).await;
            outcome(board.id, message_id, result)
        });
        join_all(work).await
    }
}

fn outcome(
    board_id: u64,
    message_id: u64,
    result: Result<PostTransition, StarboardError>,
) -> BoardOutcome {
    if let Err(e) = &result {
        tracing::warn!(board_id, message_id, "Starboard processing failed: {}", e);
    }
    BoardOutcome { board_id, result }
}

#[async_trait]
impl<S, P> PlatformEventObserver for StarboardEngine<S, P>
where
    S: StarboardStore + 'static,
    P: ChatPlatform + 'static,
{
    async fn on_event(&self, event: &PlatformEvent) {
        match event {
            PlatformEvent::ReactionAdded(reaction) => {
                self.on_reaction_added(reaction).await;
            }
            PlatformEvent::ReactionRemoved(reaction) => {
                self.on_reaction_removed(reaction).await;
            }
            PlatformEvent::EmoteCleared { message, emote } => {
                self.on_emote_cleared(message, emote).await;
            }
            PlatformEvent::ReactionsCleared(message) => {
                self.on_reactions_cleared(message).await;
            }
            PlatformEvent::MessageDeleted(message) => {
                self.on_message_deleted(message).await;
            }
            PlatformEvent::MessageEdited(message) => {
                self.on_message_edited(message).await;
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::starboard::test_support::{human, robot, FakePlatform};
    use crate::core::starboard::{
        BoardStore, EventHub, PlatformError, ReactionAttribution, ReactionSample, ReactionStatsStore,
        StarPost, StarPostStore,
    };
    use crate::infra::starboard::InMemoryStarboardStore;

    const BOT: u64 = 1;
    const GUILD: u64 = 50;
    const CHANNEL: u64 = 60;
    const OUTPUT_A: u64 = 70;
    const OUTPUT_B: u64 = 71;
    const MESSAGE: u64 = 80;
    const AUTHOR: u64 = 90;

    type Engine = StarboardEngine<InMemoryStarboardStore, FakePlatform>;

    struct Harness {
        engine: Arc<Engine>,
        platform: Arc<FakePlatform>,
        store: Arc<InMemoryStarboardStore>,
        board_id: u64,
    }

    fn star() -> Emote {
        Emote::Unicode("⭐".into())
    }

    async fn harness() -> Harness {
        let platform = Arc::new(FakePlatform::new());
        let store = Arc::new(InMemoryStarboardStore::new());
        let registry = Arc::new(ConfigRegistry::load(Arc::clone(&store)).await.unwrap());
        let board_id = registry
            .create_board(GUILD, OUTPUT_A, vec![star()], 3)
            .await
            .unwrap();
        platform.add_message(GUILD, CHANNEL, MESSAGE, AUTHOR, "a great message");

        let engine = Arc::new(StarboardEngine::new(
            registry,
            Arc::clone(&store),
            Arc::clone(&platform),
            BOT,
        ));
        Harness {
            engine,
            platform,
            store,
            board_id,
        }
    }

    fn reaction(user_id: u64, is_bot: bool) -> ReactionEvent {
        ReactionEvent {
            guild_id: Some(GUILD),
            channel_id: CHANNEL,
            message_id: MESSAGE,
            emote: star(),
            user_id,
            user_is_bot: is_bot,
        }
    }

    fn source() -> MessageRef {
        MessageRef {
            guild_id: Some(GUILD),
            channel_id: CHANNEL,
            message_id: MESSAGE,
        }
    }

    impl Harness {
        async fn react(&self, user_id: u64, is_bot: bool) -> Vec<BoardOutcome> {
            let reactor = if is_bot { robot(user_id) } else { human(user_id) };
            self.platform.add_reactor(MESSAGE, &star(), reactor);
            self.engine.on_reaction_added(&reaction(user_id, is_bot)).await
        }

        async fn unreact(&self, user_id: u64) -> Vec<BoardOutcome> {
            self.platform.remove_reactor(MESSAGE, &star(), user_id);
            self.engine.on_reaction_removed(&reaction(user_id, false)).await
        }

        async fn post(&self) -> Option<crate::core::starboard::StarPost> {
            self.store.get_post(MESSAGE, self.board_id).await.unwrap()
        }
    }

    #[tokio::test]
    async fn scenarios_a_to_c_bots_threshold_and_removal() {
        let h = harness().await;

        // A: two humans and five bots do not reach a threshold of 3.
        h.react(100, false).await;
        h.react(101, false).await;
        for bot in 200..205 {
            h.react(bot, true).await;
        }
        assert!(h.post().await.is_none());
        assert_eq!(h.platform.sends(), 0);

        // B: a third human does.
        let outcomes = h.react(102, false).await;
        assert!(matches!(
            outcomes[0].result,
            Ok(PostTransition::Created { .. })
        ));
        assert_eq!(h.post().await.unwrap().last_known_count, 3);

        // C: one human leaves and the post goes away.
        let outcomes = h.unreact(101).await;
        assert!(matches!(outcomes[0].result, Ok(PostTransition::Removed)));
        assert!(h.post().await.is_none());
        assert_eq!(h.platform.live_output_count(), 0);
    }

    #[tokio::test]
    async fn duplicate_events_are_idempotent() {
        let h = harness().await;
        for user in [100, 101, 102] {
            h.platform.add_reactor(MESSAGE, &star(), human(user));
        }

        let first = h.engine.on_reaction_added(&reaction(102, false)).await;
        let second = h.engine.on_reaction_added(&reaction(102, false)).await;

        assert!(matches!(first[0].result, Ok(PostTransition::Created { .. })));
        assert!(matches!(second[0].result, Ok(PostTransition::Unchanged)));
        assert_eq!(h.platform.sends(), 1);
        assert_eq!(h.post().await.unwrap().last_known_count, 3);
    }

    #[tokio::test]
    async fn concurrent_events_create_one_post() {
        let h = harness().await;
        for user in 100..110 {
            h.platform.add_reactor(MESSAGE, &star(), human(user));
        }

        let mut tasks = Vec::new();
        for user in 100..110 {
            let engine = Arc::clone(&h.engine);
            tasks.push(tokio::spawn(async move {
                engine.on_reaction_added(&reaction(user, false)).await;
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(h.platform.sends(), 1);
        assert_eq!(h.platform.live_output_count(), 1);
        assert_eq!(h.store.posts_for_message(MESSAGE).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn scenario_e_source_deletion_is_idempotent() {
        let h = harness().await;
        for user in [100, 101, 102] {
            h.react(user, false).await;
        }
        assert!(h.post().await.is_some());

        h.platform.remove_source(MESSAGE);
        let outcomes = h.engine.on_message_deleted(&source()).await;
        assert!(matches!(outcomes[0].result, Ok(PostTransition::Removed)));
        assert!(h.post().await.is_none());
        assert_eq!(h.platform.live_output_count(), 0);

        let outcomes = h.engine.on_message_deleted(&source()).await;
        assert!(outcomes.is_empty());
        assert_eq!(h.platform.deletes(), 1);
    }

    #[tokio::test]
    async fn reactions_cleared_follows_board_flag() {
        let h = harness().await;
        for user in [100, 101, 102] {
            h.react(user, false).await;
        }
        h.engine
            .registry()
            .set_removal_policy(h.board_id, RemovalTrigger::ReactionsCleared, false)
            .await
            .unwrap();

        h.platform.clear_reactors(MESSAGE);
        h.engine.on_reactions_cleared(&source()).await;
        assert!(h.post().await.is_some());

        h.engine
            .registry()
            .set_removal_policy(h.board_id, RemovalTrigger::ReactionsCleared, true)
            .await
            .unwrap();
        h.engine.on_reactions_cleared(&source()).await;
        assert!(h.post().await.is_none());
    }

    #[tokio::test]
    async fn own_reactions_and_dms_are_ignored() {
        let h = harness().await;

        assert!(h.engine.on_reaction_added(&reaction(BOT, true)).await.is_empty());

        let mut dm = reaction(100, false);
        dm.guild_id = None;
        assert!(h.engine.on_reaction_added(&dm).await.is_empty());
        assert_eq!(h.platform.reactor_fetches(), 0);
    }

    #[tokio::test]
    async fn unrelated_emotes_and_output_channel_are_ignored() {
        let h = harness().await;

        let mut other = reaction(100, false);
        other.emote = Emote::Unicode("👍".into());
        assert!(h.engine.on_reaction_added(&other).await.is_empty());

        let mut on_board = reaction(100, false);
        on_board.channel_id = OUTPUT_A;
        assert!(h.engine.on_reaction_added(&on_board).await.is_empty());
    }

    #[tokio::test]
    async fn failures_stay_on_their_board() {
        let h = harness().await;
        let fire = Emote::Unicode("🔥".into());
        h.engine
            .registry()
            .create_board(GUILD, OUTPUT_B, vec![fire.clone()], 1)
            .await
            .unwrap();

        for user in [100, 101, 102] {
            h.react(user, false).await;
        }
        h.platform.add_reactor(MESSAGE, &fire, human(100));
        h.engine
            .on_reaction_added(&ReactionEvent {
                emote: fire.clone(),
                ..reaction(100, false)
            })
            .await;
        assert_eq!(h.store.posts_for_message(MESSAGE).await.unwrap().len(), 2);

        // The first delete fails; the other board is still cleaned up.
        h.platform.remove_source(MESSAGE);
        h.platform.fail_next(PlatformError::Transient("timeout".into()));
        let outcomes = h.engine.on_message_deleted(&source()).await;
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes.iter().filter(|o| o.result.is_err()).count(), 1);
        assert_eq!(
            outcomes
                .iter()
                .filter(|o| matches!(o.result, Ok(PostTransition::Removed)))
                .count(),
            1
        );
        assert_eq!(h.store.posts_for_message(MESSAGE).await.unwrap().len(), 1);

        // A redelivered event finishes the job.
        h.engine.on_message_deleted(&source()).await;
        assert!(h.store.posts_for_message(MESSAGE).await.unwrap().is_empty());
        assert_eq!(h.platform.live_output_count(), 0);
    }

    #[tokio::test]
    async fn edits_refresh_existing_highlights() {
        let h = harness().await;
        for user in [100, 101, 102] {
            h.react(user, false).await;
        }
        let post = h.post().await.unwrap();

        let edits_before = h.platform.edits();

        h.platform.edit_source(MESSAGE, "now with more context");
        let outcomes = h.engine.on_message_edited(&source()).await;
        assert!(matches!(outcomes[0].result, Ok(PostTransition::Edited { .. })));
        assert_eq!(h.platform.edits(), edits_before + 1);
        let sent = h.platform.sent_message(post.output_message_id).unwrap();
        assert_eq!(sent.content.body, "now with more context");
    }

    #[tokio::test]
    async fn reaction_adds_record_stats() {
        let h = harness().await;
        h.react(100, false).await;
        h.react(200, true).await;

        let attributions = h.store.attributions_for_guild(GUILD).await.unwrap();
        assert_eq!(attributions.len(), 1);
        assert_eq!(attributions[0].user_id, 100);
        assert_eq!(attributions[0].author_id, AUTHOR);

        let sample = h
            .store
            .get_sample(MESSAGE, h.board_id, &star())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sample.current_count, 1);
        assert_eq!(sample.peak_count, 1);
    }

    #[tokio::test]
    async fn refresh_catches_up_after_missed_events() {
        let h = harness().await;
        for user in [100, 101, 102] {
            h.platform.add_reactor(MESSAGE, &star(), human(user));
        }

        let outcomes = h.engine.refresh_message(GUILD, CHANNEL, MESSAGE).await;
        assert!(matches!(outcomes[0].result, Ok(PostTransition::Created { .. })));
    }

    #[tokio::test]
    async fn engine_is_driven_through_the_hub() {
        let h = harness().await;
        let hub = EventHub::new();
        let handle = hub.register(h.engine.clone());

        for user in [100, 101, 102] {
            h.platform.add_reactor(MESSAGE, &star(), human(user));
        }
        hub.dispatch(&PlatformEvent::ReactionAdded(reaction(102, false)))
            .await;
        assert!(h.post().await.is_some());

        handle.revoke();
        h.platform.remove_source(MESSAGE);
        hub.dispatch(&PlatformEvent::MessageDeleted(source())).await;
        assert!(h.post().await.is_some());
    }

    /// Store whose statistics tables reject every write.
    struct StatsDownStore {
        inner: InMemoryStarboardStore,
    }

    #[async_trait]
    impl BoardStore for StatsDownStore {
        async fn load_boards(&self) -> Result<Vec<BoardConfig>, StarboardError> {
            self.inner.load_boards().await
        }

        async fn insert_board(&self, board: &BoardConfig) -> Result<u64, StarboardError> {
            self.inner.insert_board(board).await
        }

        async fn update_board(&self, board: &BoardConfig) -> Result<(), StarboardError> {
            self.inner.update_board(board).await
        }

        async fn delete_board(&self, board_id: u64) -> Result<(), StarboardError> {
            self.inner.delete_board(board_id).await
        }
    }

    #[async_trait]
    impl StarPostStore for StatsDownStore {
        async fn get_post(
            &self,
            source_message_id: u64,
            board_id: u64,
        ) -> Result<Option<StarPost>, StarboardError> {
            self.inner.get_post(source_message_id, board_id).await
        }

        async fn upsert_post(&self, post: &StarPost) -> Result<(), StarboardError> {
            self.inner.upsert_post(post).await
        }

        async fn delete_post(
            &self,
            source_message_id: u64,
            board_id: u64,
        ) -> Result<bool, StarboardError> {
            self.inner.delete_post(source_message_id, board_id).await
        }

        async fn posts_for_message(
            &self,
            source_message_id: u64,
        ) -> Result<Vec<StarPost>, StarboardError> {
            self.inner.posts_for_message(source_message_id).await
        }
    }

    #[async_trait]
    impl ReactionStatsStore for StatsDownStore {
        async fn get_sample(
            &self,
            message_id: u64,
            board_id: u64,
            emote: &Emote,
        ) -> Result<Option<ReactionSample>, StarboardError> {
            self.inner.get_sample(message_id, board_id, emote).await
        }

        async fn upsert_sample(&self, _sample: &ReactionSample) -> Result<(), StarboardError> {
            Err(StarboardError::StorageError("stats table locked".into()))
        }

        async fn samples_for_boards(
            &self,
            board_ids: &[u64],
        ) -> Result<Vec<ReactionSample>, StarboardError> {
            self.inner.samples_for_boards(board_ids).await
        }

        async fn insert_attribution(
            &self,
            _attribution: &ReactionAttribution,
        ) -> Result<bool, StarboardError> {
            Err(StarboardError::StorageError("stats table locked".into()))
        }

        async fn attributions_for_guild(
            &self,
            guild_id: u64,
        ) -> Result<Vec<ReactionAttribution>, StarboardError> {
            self.inner.attributions_for_guild(guild_id).await
        }
    }

    #[tokio::test]
    async fn stats_failures_do_not_block_highlights() {
        let platform = Arc::new(FakePlatform::new());
        let store = Arc::new(StatsDownStore {
            inner: InMemoryStarboardStore::new(),
        });
        let registry = Arc::new(ConfigRegistry::load(Arc::clone(&store)).await.unwrap());
        let board_id = registry
            .create_board(GUILD, OUTPUT_A, vec![star()], 2)
            .await
            .unwrap();
        platform.add_message(GUILD, CHANNEL, MESSAGE, AUTHOR, "a great message");
        let engine = StarboardEngine::new(registry, Arc::clone(&store), Arc::clone(&platform), BOT);

        platform.add_reactor(MESSAGE, &star(), human(100));
        engine.on_reaction_added(&reaction(100, false)).await;
        platform.add_reactor(MESSAGE, &star(), human(101));
        let outcomes = engine.on_reaction_added(&reaction(101, false)).await;

        assert!(matches!(outcomes[0].result, Ok(PostTransition::Created { .. })));
        assert!(store.get_post(MESSAGE, board_id).await.unwrap().is_some());
        assert_eq!(platform.live_output_count(), 1);
    }
}
