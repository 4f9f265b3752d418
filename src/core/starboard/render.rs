// Output rendering boundary.
//
// Turns a source message into platform-agnostic highlight content. The
// Discord layer decides how that content becomes an embed.

use super::starboard_models::{BoardConfig, SourceMessage};
use chrono::{DateTime, Utc};

/// Embed descriptions are capped at 4096 characters.
const MAX_BODY_CHARS: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostContent {
    /// e.g. `⭐ **5** | <#123>`
    pub headline: String,
    pub author_name: String,
    pub author_avatar_url: Option<String>,
    pub body: String,
    pub image_url: Option<String>,
    /// (filename, url) for attachments that are not shown as the image.
    pub attachment_links: Vec<(String, String)>,
    pub jump_url: String,
    pub timestamp: DateTime<Utc>,
}

pub fn render_post(board: &BoardConfig, message: &SourceMessage, total: u32) -> PostContent {
    let headline = format!(
        "{} **{}** | <#{}>",
        board.display_emote(),
        total,
        message.channel_id
    );

    let mut image_url = None;
    let mut attachment_links = Vec::new();
    for attachment in &message.attachments {
        if attachment.is_image && image_url.is_none() {
            image_url = Some(attachment.url.clone());
        } else {
            attachment_links.push((attachment.filename.clone(), attachment.url.clone()));
        }
    }

    PostContent {
        headline,
        author_name: message.author_display_name.clone(),
        author_avatar_url: message.author_avatar_url.clone(),
        body: truncate_chars(&message.content, MAX_BODY_CHARS),
        image_url,
        attachment_links,
        jump_url: message.jump_url(),
        timestamp: message.timestamp,
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::starboard::{Emote, SourceAttachment};

    fn message(content: &str, attachments: Vec<SourceAttachment>) -> SourceMessage {
        SourceMessage {
            id: 10,
            channel_id: 20,
            guild_id: 30,
            content: content.to_string(),
            attachments,
            author_id: 40,
            author_display_name: "Ferris".into(),
            author_avatar_url: Some("https://cdn/avatar.png".into()),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn headline_uses_first_board_emote_and_count() {
        let board = BoardConfig::new(30, 99, vec![Emote::Unicode("🔥".into())], 2);
        let content = render_post(&board, &message("hot take", vec![]), 7);

        assert_eq!(content.headline, "🔥 **7** | <#20>");
        assert_eq!(content.body, "hot take");
        assert_eq!(content.jump_url, "https://discord.com/channels/30/20/10");
    }

    #[test]
    fn first_image_becomes_embed_image() {
        let board = BoardConfig::new(30, 99, vec![Emote::Unicode("⭐".into())], 2);
        let attachments = vec![
            SourceAttachment {
                filename: "notes.txt".into(),
                url: "https://cdn/notes.txt".into(),
                is_image: false,
            },
            SourceAttachment {
                filename: "cat.png".into(),
                url: "https://cdn/cat.png".into(),
                is_image: true,
            },
            SourceAttachment {
                filename: "dog.png".into(),
                url: "https://cdn/dog.png".into(),
                is_image: true,
            },
        ];
        let content = render_post(&board, &message("", attachments), 3);

        assert_eq!(content.image_url.as_deref(), Some("https://cdn/cat.png"));
        assert_eq!(content.attachment_links.len(), 2);
    }

    #[test]
    fn long_bodies_are_truncated() {
        let board = BoardConfig::new(30, 99, vec![Emote::Unicode("⭐".into())], 2);
        let long = "a".repeat(5000);
        let content = render_post(&board, &message(&long, vec![]), 3);

        assert_eq!(content.body.chars().count(), MAX_BODY_CHARS);
        assert!(content.body.ends_with('…'));
    }
}
