// Starboard: reaction-driven highlights.
//
// Reactions come in as platform events, are counted fresh from the platform,
// and drive each (message, board) pair between Absent and Live.

pub mod config_registry;
pub mod event_router;
pub mod events;
pub mod key_locks;
pub mod platform;
pub mod post_lifecycle;
pub mod render;
pub mod starboard_models;
pub mod starboard_store;
pub mod stats_aggregator;
pub mod threshold_evaluator;

#[cfg(test)]
pub mod test_support;

pub use config_registry::ConfigRegistry;
pub use event_router::{BoardOutcome, StarboardEngine};
pub use events::{EventHub, MessageRef, ObserverHandle, PlatformEvent, PlatformEventObserver, ReactionEvent};
pub use platform::{ChatPlatform, PlatformError};
pub use post_lifecycle::{PostLifecycleManager, PostTransition, SkipReason};
pub use render::{render_post, PostContent};
pub use starboard_models::{
    BoardConfig, ChannelFilterMode, Emote, GuildStarStats, Ranked, ReactionAttribution,
    ReactionSample, Reactor, RemovalPolicy, RemovalTrigger, SourceAttachment, SourceMessage,
    StarPost, UserStarStats,
};
pub use starboard_store::{
    BoardStore, ReactionStatsStore, StarPostStore, StarboardError, StarboardStore,
};
pub use stats_aggregator::StatsAggregator;
pub use threshold_evaluator::{Eligibility, EmoteCount, Evaluation, ThresholdEvaluator};
