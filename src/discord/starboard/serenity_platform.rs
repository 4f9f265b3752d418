// `ChatPlatform` backed by serenity's HTTP client and cache.

use super::embeds;
use super::events::reaction_type;
use crate::core::starboard::{
    ChatPlatform, Emote, PlatformError, PostContent, Reactor, SourceAttachment, SourceMessage,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use poise::serenity_prelude as serenity;
use std::sync::Arc;

/// Discord returns at most 100 reactors per page.
const REACTORS_PER_PAGE: u8 = 100;

/// Discord returns at most 100 messages per history request.
const HISTORY_PER_PAGE: u32 = 100;

pub struct SerenityPlatform {
    http: Arc<serenity::Http>,
    cache: Arc<serenity::Cache>,
}

impl SerenityPlatform {
    pub fn new(http: Arc<serenity::Http>, cache: Arc<serenity::Cache>) -> Self {
        Self { http, cache }
    }

    /// Guild of a channel, from the cache when possible.
    async fn guild_of(&self, channel_id: serenity::ChannelId) -> Option<u64> {
        let cached = self.cache.channel(channel_id).map(|c| c.guild_id);
        if let Some(guild_id) = cached {
            return Some(guild_id.get());
        }
        channel_id
            .to_channel(&self.http)
            .await
            .ok()
            .and_then(|c| c.guild())
            .map(|c| c.guild_id.get())
    }

    /// `None` when the cache does not know enough to decide.
    fn cached_send_permission(&self, channel_id: serenity::ChannelId) -> Option<bool> {
        let guild_id = self.cache.channel(channel_id).map(|c| c.guild_id)?;
        let me = self.cache.current_user().id;
        let guild = self.cache.guild(guild_id)?;
        let channel = guild.channels.get(&channel_id)?;
        let member = guild.members.get(&me)?;

        let permissions = guild.user_permissions_in(channel, member);
        Some(permissions.send_messages() && permissions.embed_links())
    }
}

fn classify(error: serenity::Error) -> PlatformError {
    if let serenity::Error::Http(http_error) = &error {
        match http_error.status_code().map(|s| s.as_u16()) {
            Some(404) => return PlatformError::NotFound,
            Some(403) => return PlatformError::Forbidden,
            _ => {}
        }
    }
    PlatformError::Transient(error.to_string())
}

fn is_image(attachment: &serenity::Attachment) -> bool {
    attachment
        .content_type
        .as_deref()
        .map(|t| t.starts_with("image/"))
        .unwrap_or(false)
        || attachment.width.is_some()
}

#[async_trait]
impl ChatPlatform for SerenityPlatform {
    async fn fetch_reactors(
        &self,
        channel_id: u64,
        message_id: u64,
        emote: &Emote,
    ) -> Result<Vec<Reactor>, PlatformError> {
        let channel = serenity::ChannelId::new(channel_id);
        let message = serenity::MessageId::new(message_id);
        let reaction = reaction_type(emote);

        let mut reactors = Vec::new();
        let mut after: Option<serenity::UserId> = None;
        loop {
            let page = channel
                .reaction_users(
                    &self.http,
                    message,
                    reaction.clone(),
                    Some(REACTORS_PER_PAGE),
                    after,
                )
                .await
                .map_err(classify)?;

            let full_page = page.len() == REACTORS_PER_PAGE as usize;
            after = page.last().map(|u| u.id);
            reactors.extend(page.into_iter().map(|user| Reactor {
                user_id: user.id.get(),
                is_bot: user.bot,
            }));

            if !full_page || after.is_none() {
                break;
            }
        }

        tracing::trace!(message_id, %emote, count = reactors.len(), "Fetched reactors");
        Ok(reactors)
    }

    async fn fetch_message(
        &self,
        channel_id: u64,
        message_id: u64,
    ) -> Result<SourceMessage, PlatformError> {
        let channel = serenity::ChannelId::new(channel_id);
        let message = channel
            .message(&self.http, serenity::MessageId::new(message_id))
            .await
            .map_err(classify)?;

        // Messages fetched over HTTP do not carry their guild.
        let guild_id = match message.guild_id {
            Some(id) => id.get(),
            None => self.guild_of(channel).await.ok_or(PlatformError::NotFound)?,
        };

        let attachments = message
            .attachments
            .iter()
            .map(|a| SourceAttachment {
                filename: a.filename.clone(),
                url: a.url.clone(),
                is_image: is_image(a),
            })
            .collect();

        Ok(SourceMessage {
            id: message.id.get(),
            channel_id,
            guild_id,
            content: message.content.clone(),
            attachments,
            author_id: message.author.id.get(),
            author_display_name: message.author.display_name().to_string(),
            author_avatar_url: Some(message.author.face()),
            timestamp: DateTime::<Utc>::from_timestamp(message.timestamp.unix_timestamp(), 0)
                .unwrap_or_else(Utc::now),
        })
    }

    async fn send_message(
        &self,
        channel_id: u64,
        content: &PostContent,
    ) -> Result<u64, PlatformError> {
        let sent = serenity::ChannelId::new(channel_id)
            .send_message(&self.http, embeds::create_message(content))
            .await
            .map_err(classify)?;
        Ok(sent.id.get())
    }

    async fn edit_message(
        &self,
        channel_id: u64,
        message_id: u64,
        content: &PostContent,
    ) -> Result<(), PlatformError> {
        serenity::ChannelId::new(channel_id)
            .edit_message(
                &self.http,
                serenity::MessageId::new(message_id),
                embeds::edit_message(content),
            )
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn delete_message(&self, channel_id: u64, message_id: u64) -> Result<(), PlatformError> {
        serenity::ChannelId::new(channel_id)
            .delete_message(&self.http, serenity::MessageId::new(message_id))
            .await
            .map_err(classify)
    }

    async fn message_exists(&self, channel_id: u64, message_id: u64) -> Result<bool, PlatformError> {
        match serenity::ChannelId::new(channel_id)
            .message(&self.http, serenity::MessageId::new(message_id))
            .await
            .map_err(classify)
        {
            Ok(_) => Ok(true),
            Err(PlatformError::NotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn can_send(&self, channel_id: u64) -> Result<bool, PlatformError> {
        // Without cached data let the send itself find out.
        Ok(self
            .cached_send_permission(serenity::ChannelId::new(channel_id))
            .unwrap_or(true))
    }

    async fn messages_after(
        &self,
        channel_id: u64,
        message_id: u64,
        limit: u32,
    ) -> Result<usize, PlatformError> {
        let channel = serenity::ChannelId::new(channel_id);
        let mut after = serenity::MessageId::new(message_id);
        let mut seen = 0u32;

        while seen < limit {
            let page_size = (limit - seen).min(HISTORY_PER_PAGE);
            let page = channel
                .messages(
                    &self.http,
                    serenity::GetMessages::new().after(after).limit(page_size as u8),
                )
                .await
                .map_err(classify)?;

            seen += page.len() as u32;
            // Pages come back newest first.
            match page.iter().map(|m| m.id).max() {
                Some(newest) if page.len() as u32 == page_size => after = newest,
                _ => break,
            }
        }
        Ok(seen.min(limit) as usize)
    }
}
