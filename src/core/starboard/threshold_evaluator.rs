// Threshold evaluation.
//
// Counts are always re-derived from the platform's reactor lists. Events only
// tell us *when* to look, never *what* the count is, so a dropped or doubled
// event cannot leave a permanent drift.

use super::platform::{ChatPlatform, PlatformError};
use super::starboard_models::{BoardConfig, Emote, SourceMessage};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    /// The source message could not be fetched (usually deleted).
    SourceUnavailable,
    /// No text and no attachments.
    EmptyContent,
    /// Excluded by the board's channel filter.
    ChannelFiltered,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmoteCount {
    pub emote: Emote,
    pub count: u32,
}

#[derive(Debug, Clone)]
pub struct Evaluation {
    pub message_id: u64,
    pub channel_id: u64,
    pub eligibility: Eligibility,
    pub total: u32,
    /// Empty unless the message was eligible and counted.
    pub per_emote: Vec<EmoteCount>,
    pub message: Option<SourceMessage>,
}

impl Evaluation {
    pub fn is_eligible(&self) -> bool {
        self.eligibility == Eligibility::Eligible
    }

    fn ineligible(
        message_id: u64,
        channel_id: u64,
        eligibility: Eligibility,
        message: Option<SourceMessage>,
    ) -> Self {
        Self {
            message_id,
            channel_id,
            eligibility,
            total: 0,
            per_emote: Vec::new(),
            message,
        }
    }
}

pub struct ThresholdEvaluator<P: ChatPlatform> {
    platform: Arc<P>,
}

impl<P: ChatPlatform> ThresholdEvaluator<P> {
    pub fn new(platform: Arc<P>) -> Self {
        Self { platform }
    }

    /// Recompute the qualifying-reactor total for one message on one board.
    pub async fn compute(
        &self,
        board: &BoardConfig,
        channel_id: u64,
        message_id: u64,
    ) -> Result<Evaluation, PlatformError> {
        if !board.accepts_channel(channel_id) {
            return Ok(Evaluation::ineligible(
                message_id,
                channel_id,
                Eligibility::ChannelFiltered,
                None,
            ));
        }

        let message = match self.platform.fetch_message(channel_id, message_id).await {
            Ok(message) => message,
            Err(PlatformError::NotFound) => {
                return Ok(Evaluation::ineligible(
                    message_id,
                    channel_id,
                    Eligibility::SourceUnavailable,
                    None,
                ));
            }
            Err(e) => return Err(e),
        };

        if !message.has_content() {
            return Ok(Evaluation::ineligible(
                message_id,
                channel_id,
                Eligibility::EmptyContent,
                Some(message),
            ));
        }

        let mut per_emote = Vec::with_capacity(board.emote_set.len());
        let mut total = 0u32;
        for emote in &board.emote_set {
            let reactors = match self
                .platform
                .fetch_reactors(channel_id, message_id, emote)
                .await
            {
                Ok(reactors) => reactors,
                // Nobody has reacted with this emote yet.
                Err(PlatformError::NotFound) => Vec::new(),
                Err(e) => return Err(e),
            };

            let count = reactors
                .iter()
                .filter(|r| board.allow_bots || !r.is_bot)
                .filter(|r| board.allow_self_star || r.user_id != message.author_id)
                .count() as u32;

            total = total.saturating_add(count);
            per_emote.push(EmoteCount {
                emote: emote.clone(),
                count,
            });
        }

        tracing::debug!(
            board_id = board.id,
            message_id,
            total,
            threshold = board.threshold,
            "Evaluated message"
        );

        Ok(Evaluation {
            message_id,
            channel_id,
            eligibility: Eligibility::Eligible,
            total,
            per_emote,
            message: Some(message),
        })
    }
}
