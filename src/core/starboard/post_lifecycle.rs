// Highlight post lifecycle.
//
// Each (source message, board) pair is either Absent or Live. Every transition
// starts by re-reading the stored row; callers hold the per-key lock, so the
// row cannot change underneath us and at most one post is ever Live per key.

use super::platform::{ChatPlatform, PlatformError};
use super::render::{render_post, PostContent};
use super::starboard_models::{BoardConfig, RemovalTrigger, StarPost};
use super::starboard_store::{StarPostStore, StarboardError};
use super::threshold_evaluator::Evaluation;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Ineligible,
    BelowThreshold,
    CannotSend,
    PolicyKeepsPost,
}

/// What happened to the pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostTransition {
    /// Absent -> Live.
    Created { output_message_id: u64 },
    /// Live -> Live, edited in place.
    Edited { output_message_id: u64 },
    /// Live -> Live, old output deleted and sent again near the top.
    Reposted { output_message_id: u64 },
    /// Live -> Live, old output was gone so a new one was sent.
    Recreated { output_message_id: u64 },
    /// Live -> Absent.
    Removed,
    /// Live and already up to date, or Absent with nothing to remove.
    Unchanged,
    Skipped(SkipReason),
}

pub struct PostLifecycleManager<S: StarPostStore, P: ChatPlatform> {
    store: Arc<S>,
    platform: Arc<P>,
}

impl<S: StarPostStore, P: ChatPlatform> PostLifecycleManager<S, P> {
    pub fn new(store: Arc<S>, platform: Arc<P>) -> Self {
        Self { store, platform }
    }

    /// Drive the pair towards the state the evaluation calls for.
    ///
    /// `force_refresh` re-renders a Live post even if its count is unchanged
    /// (source edited, manual resync).
    pub async fn apply(
        &self,
        board: &BoardConfig,
        evaluation: &Evaluation,
        force_refresh: bool,
    ) -> Result<PostTransition, StarboardError> {
        let existing = self.store.get_post(evaluation.message_id, board.id).await?;

        let message = match (&evaluation.message, evaluation.is_eligible()) {
            (Some(message), true) => message,
            _ => return Ok(PostTransition::Skipped(SkipReason::Ineligible)),
        };
        let meets_threshold = evaluation.total >= board.threshold;

        match existing {
            None if !meets_threshold => Ok(PostTransition::Skipped(SkipReason::BelowThreshold)),
            None => {
                let content = render_post(board, message, evaluation.total);
                self.create(board, evaluation, &content).await
            }
            Some(post) if !meets_threshold && board.removal.on_below_threshold => {
                self.evict(board, &post, RemovalTrigger::BelowThreshold).await
            }
            Some(post) => {
                let unchanged = post.last_known_count == evaluation.total && !force_refresh;
                if unchanged && self.output_exists(board, &post).await? {
                    return Ok(PostTransition::Unchanged);
                }
                let content = render_post(board, message, evaluation.total);
                self.refresh(board, post, evaluation.total, &content).await
            }
        }
    }

    /// Remove the post for `trigger` if the board's policy asks for it.
    pub async fn remove(
        &self,
        board: &BoardConfig,
        source_message_id: u64,
        trigger: RemovalTrigger,
    ) -> Result<PostTransition, StarboardError> {
        let Some(post) = self.store.get_post(source_message_id, board.id).await? else {
            return Ok(PostTransition::Unchanged);
        };
        if !board.removal.applies(trigger) {
            return Ok(PostTransition::Skipped(SkipReason::PolicyKeepsPost));
        }
        self.evict(board, &post, trigger).await
    }

    async fn create(
        &self,
        board: &BoardConfig,
        evaluation: &Evaluation,
        content: &PostContent,
    ) -> Result<PostTransition, StarboardError> {
        if !self.platform.can_send(board.output_channel_id).await? {
            tracing::warn!(
                board_id = board.id,
                channel_id = board.output_channel_id,
                "Cannot post highlight: missing permissions in output channel"
            );
            return Ok(PostTransition::Skipped(SkipReason::CannotSend));
        }

        let output_message_id = self
            .platform
            .send_message(board.output_channel_id, content)
            .await?;

        let post = StarPost {
            source_message_id: evaluation.message_id,
            board_id: board.id,
            source_channel_id: evaluation.channel_id,
            output_message_id,
            last_known_count: evaluation.total,
        };
        if let Err(e) = self.store.upsert_post(&post).await {
            // Without a row nobody would ever clean this message up.
            self.delete_output(board.output_channel_id, output_message_id)
                .await
                .ok();
            return Err(e);
        }

        tracing::info!(
            board_id = board.id,
            message_id = evaluation.message_id,
            output_message_id,
            count = evaluation.total,
            "Highlight created"
        );
        Ok(PostTransition::Created { output_message_id })
    }

    async fn refresh(
        &self,
        board: &BoardConfig,
        mut post: StarPost,
        total: u32,
        content: &PostContent,
    ) -> Result<PostTransition, StarboardError> {
        let channel_id = board.output_channel_id;

        let transition = if self.buried(board, &post).await? {
            self.delete_output(channel_id, post.output_message_id).await?;
            let id = self.platform.send_message(channel_id, content).await?;
            PostTransition::Reposted {
                output_message_id: id,
            }
        } else {
            match self
                .platform
                .edit_message(channel_id, post.output_message_id, content)
                .await
            {
                Ok(()) => PostTransition::Edited {
                    output_message_id: post.output_message_id,
                },
                Err(PlatformError::NotFound) => {
                    let id = self.platform.send_message(channel_id, content).await?;
                    PostTransition::Recreated {
                        output_message_id: id,
                    }
                }
                Err(e) => return Err(e.into()),
            }
        };

        if let PostTransition::Reposted { output_message_id }
        | PostTransition::Recreated { output_message_id } = transition
        {
            post.output_message_id = output_message_id;
        }
        post.last_known_count = total;
        self.store.upsert_post(&post).await?;

        tracing::debug!(
            board_id = board.id,
            message_id = post.source_message_id,
            output_message_id = post.output_message_id,
            count = total,
            ?transition,
            "Highlight refreshed"
        );
        Ok(transition)
    }

    /// Whether the output message is deeper than the board's repost threshold.
    /// A vanished output counts as buried so it gets sent again.
    async fn buried(&self, board: &BoardConfig, post: &StarPost) -> Result<bool, StarboardError> {
        if board.repost_threshold == 0 {
            return Ok(false);
        }
        let limit = board.repost_threshold.saturating_add(1);
        match self
            .platform
            .messages_after(board.output_channel_id, post.output_message_id, limit)
            .await
        {
            Ok(depth) => Ok(depth as u32 > board.repost_threshold),
            Err(PlatformError::NotFound) => Ok(true),
            Err(e) => Err(e.into()),
        }
    }

    async fn output_exists(&self, board: &BoardConfig, post: &StarPost) -> Result<bool, StarboardError> {
        Ok(self
            .platform
            .message_exists(board.output_channel_id, post.output_message_id)
            .await?)
    }

    async fn evict(
        &self,
        board: &BoardConfig,
        post: &StarPost,
        trigger: RemovalTrigger,
    ) -> Result<PostTransition, StarboardError> {
        self.delete_output(board.output_channel_id, post.output_message_id)
            .await?;
        self.store
            .delete_post(post.source_message_id, post.board_id)
            .await?;

        tracing::info!(
            board_id = board.id,
            message_id = post.source_message_id,
            reason = %trigger,
            "Highlight removed"
        );
        Ok(PostTransition::Removed)
    }

    /// Delete an output message; one that is already gone counts as deleted.
    async fn delete_output(&self, channel_id: u64, message_id: u64) -> Result<(), PlatformError> {
        match self.platform.delete_message(channel_id, message_id).await {
            Ok(()) | Err(PlatformError::NotFound) => Ok(()),
            Err(e) => Err(e),
        }
    }
}
