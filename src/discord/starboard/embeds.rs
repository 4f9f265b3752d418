// Highlight embeds.

use crate::core::starboard::PostContent;
use poise::serenity_prelude as serenity;

const STARBOARD_GOLD: u32 = 0xFFAC33;

/// Embed fields are capped at 1024 characters.
const MAX_FIELD_CHARS: usize = 1024;

pub fn build_embed(content: &PostContent) -> serenity::CreateEmbed {
    let mut author = serenity::CreateEmbedAuthor::new(&content.author_name);
    if let Some(avatar) = &content.author_avatar_url {
        author = author.icon_url(avatar);
    }

    let mut embed = serenity::CreateEmbed::new()
        .author(author)
        .color(STARBOARD_GOLD);

    if !content.body.is_empty() {
        embed = embed.description(&content.body);
    }

    let links = attachment_field(&content.attachment_links);
    if !links.is_empty() {
        embed = embed.field("Attachments", links, false);
    }

    embed = embed.field(
        "Original",
        format!("[Jump to message]({})", content.jump_url),
        false,
    );

    if let Some(image) = &content.image_url {
        embed = embed.image(image);
    }

    if let Ok(timestamp) = serenity::Timestamp::from_unix_timestamp(content.timestamp.timestamp()) {
        embed = embed.timestamp(timestamp);
    }

    embed
}

pub fn create_message(content: &PostContent) -> serenity::CreateMessage {
    serenity::CreateMessage::new()
        .content(&content.headline)
        .embed(build_embed(content))
}

pub fn edit_message(content: &PostContent) -> serenity::EditMessage {
    serenity::EditMessage::new()
        .content(&content.headline)
        .embed(build_embed(content))
}

/// One markdown link per line, dropping whatever does not fit.
fn attachment_field(links: &[(String, String)]) -> String {
    let mut field = String::new();
    for (name, url) in links {
        let line = format!("[{}]({})", name, url);
        let needed = line.chars().count() + usize::from(!field.is_empty());
        if field.chars().count() + needed > MAX_FIELD_CHARS {
            break;
        }
        if !field.is_empty() {
            field.push('\n');
        }
        field.push_str(&line);
    }
    field
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn content() -> PostContent {
        PostContent {
            headline: "⭐ **3** | <#10>".into(),
            author_name: "ferris".into(),
            author_avatar_url: None,
            body: "hello".into(),
            image_url: Some("https://cdn.example/cat.png".into()),
            attachment_links: vec![("notes.txt".into(), "https://cdn.example/notes.txt".into())],
            jump_url: "https://discord.com/channels/1/10/100".into(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn embed_carries_body_image_and_links() {
        let json = serde_json::to_value(build_embed(&content())).unwrap();

        assert_eq!(json["description"], "hello");
        assert_eq!(json["image"]["url"], "https://cdn.example/cat.png");
        assert_eq!(json["color"], STARBOARD_GOLD);

        let fields = json["fields"].as_array().unwrap();
        assert_eq!(fields[0]["value"], "[notes.txt](https://cdn.example/notes.txt)");
        assert_eq!(fields[1]["name"], "Original");
    }

    #[test]
    fn attachment_field_stops_at_the_limit() {
        let links: Vec<(String, String)> = (0..100)
            .map(|i| (format!("file{}.bin", i), format!("https://cdn.example/{}", i)))
            .collect();
        let field = attachment_field(&links);

        assert!(field.chars().count() <= MAX_FIELD_CHARS);
        assert!(field.starts_with("[file0.bin]"));
    }
}
