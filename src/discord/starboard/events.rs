// Serenity gateway events -> typed starboard events.
//
// The translation is lossless for what the core needs and drops everything
// else. Reactions with an emoji type we do not understand are ignored.

use crate::core::starboard::{Emote, MessageRef, PlatformEvent, ReactionEvent};
use poise::serenity_prelude as serenity;

/// Starboard events carried by a gateway event. Usually zero or one; a bulk
/// delete yields one per message.
pub fn translate_event(event: &serenity::FullEvent) -> Vec<PlatformEvent> {
    match event {
        serenity::FullEvent::ReactionAdd { add_reaction } => reaction_event(add_reaction)
            .map(PlatformEvent::ReactionAdded)
            .into_iter()
            .collect(),
        serenity::FullEvent::ReactionRemove { removed_reaction } => {
            reaction_event(removed_reaction)
                .map(PlatformEvent::ReactionRemoved)
                .into_iter()
                .collect()
        }
        serenity::FullEvent::ReactionRemoveEmoji { removed_reactions } => {
            let Some(emote) = emote_from_reaction(&removed_reactions.emoji) else {
                return Vec::new();
            };
            vec![PlatformEvent::EmoteCleared {
                message: message_ref(
                    removed_reactions.guild_id,
                    removed_reactions.channel_id,
                    removed_reactions.message_id,
                ),
                emote,
            }]
        }
        serenity::FullEvent::ReactionRemoveAll {
            channel_id,
            removed_from_message_id,
        } => vec![PlatformEvent::ReactionsCleared(message_ref(
            None,
            *channel_id,
            *removed_from_message_id,
        ))],
        serenity::FullEvent::MessageDelete {
            channel_id,
            deleted_message_id,
            guild_id,
        } => vec![PlatformEvent::MessageDeleted(message_ref(
            *guild_id,
            *channel_id,
            *deleted_message_id,
        ))],
        serenity::FullEvent::MessageDeleteBulk {
            channel_id,
            multiple_deleted_messages_ids,
            guild_id,
        } => multiple_deleted_messages_ids
            .iter()
            .map(|id| PlatformEvent::MessageDeleted(message_ref(*guild_id, *channel_id, *id)))
            .collect(),
        serenity::FullEvent::MessageUpdate { event, .. } => {
            vec![PlatformEvent::MessageEdited(message_ref(
                event.guild_id,
                event.channel_id,
                event.id,
            ))]
        }
        _ => Vec::new(),
    }
}

fn reaction_event(reaction: &serenity::Reaction) -> Option<ReactionEvent> {
    let user_id = reaction.user_id?;
    let emote = emote_from_reaction(&reaction.emoji)?;
    let user_is_bot = reaction
        .member
        .as_ref()
        .map(|m| m.user.bot)
        .unwrap_or(false);

    Some(ReactionEvent {
        guild_id: reaction.guild_id.map(|id| id.get()),
        channel_id: reaction.channel_id.get(),
        message_id: reaction.message_id.get(),
        emote,
        user_id: user_id.get(),
        user_is_bot,
    })
}

fn message_ref(
    guild_id: Option<serenity::GuildId>,
    channel_id: serenity::ChannelId,
    message_id: serenity::MessageId,
) -> MessageRef {
    MessageRef {
        guild_id: guild_id.map(|id| id.get()),
        channel_id: channel_id.get(),
        message_id: message_id.get(),
    }
}

pub fn emote_from_reaction(reaction: &serenity::ReactionType) -> Option<Emote> {
    match reaction {
        serenity::ReactionType::Unicode(value) => Some(Emote::Unicode(value.clone())),
        serenity::ReactionType::Custom { animated, id, name } => Some(Emote::Custom {
            id: id.get(),
            name: name.clone().unwrap_or_else(|| "_".to_string()),
            animated: *animated,
        }),
        _ => None,
    }
}

pub fn reaction_type(emote: &Emote) -> serenity::ReactionType {
    match emote {
        Emote::Unicode(value) => serenity::ReactionType::Unicode(value.clone()),
        Emote::Custom { id, name, animated } => serenity::ReactionType::Custom {
            animated: *animated,
            id: serenity::EmojiId::new(*id),
            name: Some(name.clone()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_emotes_keep_their_id() {
        let reaction = serenity::ReactionType::Custom {
            animated: false,
            id: serenity::EmojiId::new(42),
            name: None,
        };
        let emote = emote_from_reaction(&reaction).unwrap();

        assert_eq!(emote.custom_id(), Some(42));
        assert!(matches!(
            reaction_type(&emote),
            serenity::ReactionType::Custom { id, .. } if id.get() == 42
        ));
    }

    #[test]
    fn unicode_emotes_map_both_ways() {
        let emote = Emote::Unicode("⭐".into());
        assert_eq!(emote_from_reaction(&reaction_type(&emote)), Some(emote));
    }

    #[test]
    fn bulk_deletes_fan_out() {
        let event = serenity::FullEvent::MessageDeleteBulk {
            channel_id: serenity::ChannelId::new(10),
            multiple_deleted_messages_ids: vec![
                serenity::MessageId::new(1),
                serenity::MessageId::new(2),
            ],
            guild_id: Some(serenity::GuildId::new(5)),
        };

        let events = translate_event(&event);
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[1],
            PlatformEvent::MessageDeleted(MessageRef {
                guild_id: Some(5),
                channel_id: 10,
                message_id: 2,
            })
        );
    }
}
