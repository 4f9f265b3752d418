// Starboard statistics commands.

use crate::core::starboard::Ranked;
use crate::discord::{Context, Error};
use poise::serenity_prelude as serenity;

const TOP_LIMIT: usize = 5;

/// Starboard statistics
#[poise::command(slash_command, guild_only, subcommands("server", "user"))]
pub async fn starstats(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Server-wide starboard statistics
#[poise::command(slash_command, guild_only)]
pub async fn server(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be in a guild")?.get();
    let starboard = &ctx.data().starboard;
    let boards = starboard.registry().boards_for_guild(guild_id);
    let stats = starboard.stats().guild_stats(guild_id, &boards).await?;

    let embed = serenity::CreateEmbed::default()
        .title("⭐ Server Star Stats")
        .color(serenity::Color::GOLD)
        .field("Total stars", stats.total_stars.to_string(), true)
        .field("Starred messages", stats.starred_messages.to_string(), true)
        .field("Top author", ranked_user(stats.top_author.as_ref()), false)
        .field("Top reactor", ranked_user(stats.top_reactor.as_ref()), false)
        .field(
            "Busiest board",
            stats
                .top_output_channel
                .map(|r| format!("<#{}> ({} ⭐)", r.id, r.count))
                .unwrap_or_else(|| "Nobody yet".to_string()),
            false,
        );

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Starboard statistics for a member
#[poise::command(slash_command, guild_only)]
pub async fn user(
    ctx: Context<'_>,
    #[description = "User to check (defaults to you)"] user: Option<serenity::User>,
) -> Result<(), Error> {
    let target = user.as_ref().unwrap_or_else(|| ctx.author());
    let guild_id = ctx.guild_id().ok_or("Must be in a guild")?.get();
    let starboard = &ctx.data().starboard;
    let boards = starboard.registry().boards_for_guild(guild_id);
    let stats = starboard
        .stats()
        .user_stats(guild_id, target.id.get(), &boards, TOP_LIMIT)
        .await?;

    let embed = serenity::CreateEmbed::default()
        .title(format!("⭐ Star Stats for {}", target.name))
        .thumbnail(target.face())
        .color(serenity::Color::GOLD)
        .field("Stars received", stats.stars_received.to_string(), true)
        .field("Stars given", stats.stars_given.to_string(), true)
        .field("Messages starred", stats.messages_starred.to_string(), true)
        .field("Biggest fans", ranked_list(&stats.top_fans), false)
        .field("Favourite authors", ranked_list(&stats.top_idols), false);

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

fn ranked_user(entry: Option<&Ranked>) -> String {
    entry
        .map(|r| format!("<@{}> ({} ⭐)", r.id, r.count))
        .unwrap_or_else(|| "Nobody yet".to_string())
}

fn ranked_list(entries: &[Ranked]) -> String {
    if entries.is_empty() {
        return "Nobody yet".to_string();
    }
    entries
        .iter()
        .enumerate()
        .map(|(i, r)| format!("{}. <@{}> ({})", i + 1, r.id, r.count))
        .collect::<Vec<_>>()
        .join("\n")
}
