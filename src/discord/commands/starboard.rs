// Starboard admin commands.
//
// Thin translation layer: parse arguments, call the registry or engine,
// report the outcome. All rules live in `core::starboard`.

use crate::core::starboard::{
    BoardConfig, ChannelFilterMode, Emote, EventHub, ObserverHandle, PostTransition,
    RemovalTrigger, StarboardEngine, StarboardError,
};
use crate::discord::starboard::SerenityPlatform;
use crate::infra::starboard::SqliteStarboardStore;
use poise::serenity_prelude as serenity;
use std::sync::Arc;

pub type Starboard = StarboardEngine<SqliteStarboardStore, SerenityPlatform>;

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;

pub struct Data {
    pub starboard: Arc<Starboard>,
    pub events: Arc<EventHub>,
    /// Keeps `starboard` subscribed to `events`.
    pub subscription: ObserverHandle,
}

#[derive(Debug, Clone, Copy, poise::ChoiceParameter)]
pub enum FilterModeChoice {
    #[name = "Allow listed channels only"]
    Allow,
    #[name = "Deny listed channels"]
    Deny,
}

impl From<FilterModeChoice> for ChannelFilterMode {
    fn from(choice: FilterModeChoice) -> Self {
        match choice {
            FilterModeChoice::Allow => ChannelFilterMode::Allow,
            FilterModeChoice::Deny => ChannelFilterMode::Deny,
        }
    }
}

#[derive(Debug, Clone, Copy, poise::ChoiceParameter)]
pub enum RemovalChoice {
    #[name = "Source message deleted"]
    SourceDeleted,
    #[name = "All reactions cleared"]
    ReactionsCleared,
    #[name = "Count drops below threshold"]
    BelowThreshold,
}

impl From<RemovalChoice> for RemovalTrigger {
    fn from(choice: RemovalChoice) -> Self {
        match choice {
            RemovalChoice::SourceDeleted => RemovalTrigger::SourceDeleted,
            RemovalChoice::ReactionsCleared => RemovalTrigger::ReactionsCleared,
            RemovalChoice::BelowThreshold => RemovalTrigger::BelowThreshold,
        }
    }
}

/// Manage starboards
#[poise::command(
    slash_command,
    guild_only,
    required_permissions = "ADMINISTRATOR",
    subcommands(
        "create",
        "delete",
        "list",
        "emote_add",
        "emote_remove",
        "threshold",
        "repost_threshold",
        "filter_mode",
        "filter_toggle",
        "allow_bots",
        "self_star",
        "removal",
        "refresh"
    )
)]
pub async fn starboard(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Create a board that highlights messages in a channel
#[poise::command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn create(
    ctx: Context<'_>,
    #[description = "Channel highlights are posted to"] channel: serenity::Channel,
    #[description = "Trigger emotes, separated by spaces"] emotes: String,
    #[description = "Reactions needed (default: 3)"]
    #[min = 1]
    threshold: Option<u32>,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be in a guild")?.get();
    let emotes = match parse_emotes(&emotes) {
        Ok(emotes) => emotes,
        Err(message) => {
            ctx.say(format!("❌ {}", message)).await?;
            return Ok(());
        }
    };

    let result = ctx
        .data()
        .starboard
        .registry()
        .create_board(guild_id, channel.id().get(), emotes, threshold.unwrap_or(3))
        .await;

    match result {
        Ok(board_id) => {
            ctx.say(format!(
                "✅ Board #{} created. Highlights go to <#{}>.",
                board_id,
                channel.id()
            ))
            .await?;
        }
        Err(e) => report(ctx, e).await?,
    }
    Ok(())
}

/// Delete a board (existing highlights stay where they are)
#[poise::command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn delete(
    ctx: Context<'_>,
    #[description = "Board id"] board: u64,
) -> Result<(), Error> {
    if owned_board(ctx, board).await?.is_none() {
        return Ok(());
    }
    let result = ctx.data().starboard.registry().delete_board(board).await;
    respond(ctx, result, format!("🗑️ Board #{} deleted.", board)).await
}

/// List the boards of this server
#[poise::command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn list(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be in a guild")?.get();
    let boards = ctx.data().starboard.registry().boards_for_guild(guild_id);

    if boards.is_empty() {
        ctx.say("This server has no starboards yet. Create one with `/starboard create`.")
            .await?;
        return Ok(());
    }

    let mut embed = serenity::CreateEmbed::default()
        .title("⭐ Starboards")
        .color(serenity::Color::GOLD);
    for board in boards.iter().take(25) {
        embed = embed.field(format!("Board #{}", board.id), describe_board(board), false);
    }

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Add a trigger emote to a board
#[poise::command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn emote_add(
    ctx: Context<'_>,
    #[description = "Board id"] board: u64,
    #[description = "Emote to add"] emote: String,
) -> Result<(), Error> {
    let Some(emote) = parse_one(ctx, &emote).await? else {
        return Ok(());
    };
    if owned_board(ctx, board).await?.is_none() {
        return Ok(());
    }
    let message = format!("✅ {} now triggers board #{}.", emote, board);
    let result = ctx.data().starboard.registry().add_emote(board, emote).await;
    respond(ctx, result, message).await
}

/// Remove a trigger emote from a board
#[poise::command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn emote_remove(
    ctx: Context<'_>,
    #[description = "Board id"] board: u64,
    #[description = "Emote to remove"] emote: String,
) -> Result<(), Error> {
    let Some(emote) = parse_one(ctx, &emote).await? else {
        return Ok(());
    };
    if owned_board(ctx, board).await?.is_none() {
        return Ok(());
    }
    let result = ctx.data().starboard.registry().remove_emote(board, &emote).await;
    respond(
        ctx,
        result,
        format!("✅ {} no longer triggers board #{}.", emote, board),
    )
    .await
}

/// Set how many reactions a message needs
#[poise::command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn threshold(
    ctx: Context<'_>,
    #[description = "Board id"] board: u64,
    #[description = "Reactions needed"]
    #[min = 1]
    value: u32,
) -> Result<(), Error> {
    if owned_board(ctx, board).await?.is_none() {
        return Ok(());
    }
    let result = ctx.data().starboard.registry().set_threshold(board, value).await;
    respond(
        ctx,
        result,
        format!("✅ Board #{} now needs {} reactions.", board, value),
    )
    .await
}

/// Repost highlights buried under this many newer messages (0 disables)
#[poise::command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn repost_threshold(
    ctx: Context<'_>,
    #[description = "Board id"] board: u64,
    #[description = "Messages after a highlight before it is reposted"] value: u32,
) -> Result<(), Error> {
    if owned_board(ctx, board).await?.is_none() {
        return Ok(());
    }
    let result = ctx
        .data()
        .starboard
        .registry()
        .set_repost_threshold(board, value)
        .await;
    let message = if value == 0 {
        format!("✅ Reposting disabled for board #{}.", board)
    } else {
        format!(
            "✅ Board #{} reposts highlights buried under {} messages.",
            board, value
        )
    };
    respond(ctx, result, message).await
}

/// Choose whether the channel list is an allow list or a deny list
#[poise::command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn filter_mode(
    ctx: Context<'_>,
    #[description = "Board id"] board: u64,
    #[description = "How to treat listed channels"] mode: FilterModeChoice,
) -> Result<(), Error> {
    if owned_board(ctx, board).await?.is_none() {
        return Ok(());
    }
    let mode = ChannelFilterMode::from(mode);
    let result = ctx
        .data()
        .starboard
        .registry()
        .set_channel_filter_mode(board, mode)
        .await;
    respond(
        ctx,
        result,
        format!("✅ Board #{} channel filter is now `{}`.", board, mode),
    )
    .await
}

/// Add a channel to the board's list, or remove it if already listed
#[poise::command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn filter_toggle(
    ctx: Context<'_>,
    #[description = "Board id"] board: u64,
    #[description = "Channel to toggle"] channel: serenity::Channel,
) -> Result<(), Error> {
    if owned_board(ctx, board).await?.is_none() {
        return Ok(());
    }
    let result = ctx
        .data()
        .starboard
        .registry()
        .toggle_channel_filter(board, channel.id().get())
        .await;

    match result {
        Ok(true) => {
            ctx.say(format!("✅ <#{}> added to board #{}'s list.", channel.id(), board))
                .await?;
        }
        Ok(false) => {
            ctx.say(format!(
                "✅ <#{}> removed from board #{}'s list.",
                channel.id(),
                board
            ))
            .await?;
        }
        Err(e) => report(ctx, e).await?,
    }
    Ok(())
}

/// Choose whether bot reactions count
#[poise::command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn allow_bots(
    ctx: Context<'_>,
    #[description = "Board id"] board: u64,
    #[description = "Count reactions from bots"] enabled: bool,
) -> Result<(), Error> {
    if owned_board(ctx, board).await?.is_none() {
        return Ok(());
    }
    let result = ctx
        .data()
        .starboard
        .registry()
        .set_allow_bots(board, enabled)
        .await;
    respond(
        ctx,
        result,
        format!(
            "✅ Bot reactions {} on board #{}.",
            if enabled { "count" } else { "no longer count" },
            board
        ),
    )
    .await
}

/// Choose whether authors can star their own messages
#[poise::command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn self_star(
    ctx: Context<'_>,
    #[description = "Board id"] board: u64,
    #[description = "Count the author's own reaction"] enabled: bool,
) -> Result<(), Error> {
    if owned_board(ctx, board).await?.is_none() {
        return Ok(());
    }
    let result = ctx
        .data()
        .starboard
        .registry()
        .set_allow_self_star(board, enabled)
        .await;
    respond(
        ctx,
        result,
        format!(
            "✅ Self-stars {} on board #{}.",
            if enabled { "count" } else { "no longer count" },
            board
        ),
    )
    .await
}

/// Choose which events remove a highlight
#[poise::command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn removal(
    ctx: Context<'_>,
    #[description = "Board id"] board: u64,
    #[description = "Event"] trigger: RemovalChoice,
    #[description = "Remove the highlight when this happens"] enabled: bool,
) -> Result<(), Error> {
    if owned_board(ctx, board).await?.is_none() {
        return Ok(());
    }
    let trigger = RemovalTrigger::from(trigger);
    let result = ctx
        .data()
        .starboard
        .registry()
        .set_removal_policy(board, trigger, enabled)
        .await;
    respond(
        ctx,
        result,
        format!(
            "✅ Board #{} {} highlights when the {}.",
            board,
            if enabled { "removes" } else { "keeps" },
            trigger
        ),
    )
    .await
}

/// Re-check a message on every board, e.g. after the bot was offline
#[poise::command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn refresh(
    ctx: Context<'_>,
    #[description = "Message link"] link: String,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be in a guild")?.get();
    let Some((link_guild, channel_id, message_id)) = parse_message_link(&link) else {
        ctx.say("❌ That doesn't look like a message link.").await?;
        return Ok(());
    };
    if link_guild != guild_id {
        ctx.say("❌ That message belongs to another server.").await?;
        return Ok(());
    }

    ctx.defer().await?;
    let outcomes = ctx
        .data()
        .starboard
        .refresh_message(guild_id, channel_id, message_id)
        .await;

    if outcomes.is_empty() {
        ctx.say("This server has no boards to refresh.").await?;
        return Ok(());
    }

    let lines: Vec<String> = outcomes
        .iter()
        .map(|outcome| match &outcome.result {
            Ok(transition) => format!("Board #{}: {}", outcome.board_id, describe_transition(transition)),
            Err(e) => format!("Board #{}: ❌ {}", outcome.board_id, e),
        })
        .collect();
    ctx.say(lines.join("\n")).await?;
    Ok(())
}

// ============================================================================
// HELPERS
// ============================================================================

/// Board `board_id` if it belongs to the invoking guild; otherwise tells the
/// user so and returns `None`.
async fn owned_board(ctx: Context<'_>, board_id: u64) -> Result<Option<BoardConfig>, Error> {
    let guild_id = ctx.guild_id().ok_or("Must be in a guild")?.get();
    match ctx.data().starboard.registry().get(board_id) {
        Some(board) if board.guild_id == guild_id => Ok(Some(board)),
        _ => {
            ctx.say(format!("❌ {}", StarboardError::BoardNotFound(board_id)))
                .await?;
            Ok(None)
        }
    }
}

async fn parse_one(ctx: Context<'_>, raw: &str) -> Result<Option<Emote>, Error> {
    match raw.parse::<Emote>() {
        Ok(emote) => Ok(Some(emote)),
        Err(e) => {
            ctx.say(format!("❌ {}", e)).await?;
            Ok(None)
        }
    }
}

async fn respond(
    ctx: Context<'_>,
    result: Result<(), StarboardError>,
    success: String,
) -> Result<(), Error> {
    match result {
        Ok(()) => {
            ctx.say(success).await?;
        }
        Err(e) => report(ctx, e).await?,
    }
    Ok(())
}

/// Configuration mistakes are shown to the admin; storage failures are logged.
async fn report(ctx: Context<'_>, error: StarboardError) -> Result<(), Error> {
    if let StarboardError::StorageError(_) | StarboardError::Platform(_) = &error {
        tracing::error!("Starboard command failed: {}", error);
        ctx.say("❌ Something went wrong saving that change. Please try again.")
            .await?;
    } else {
        ctx.say(format!("❌ {}", error)).await?;
    }
    Ok(())
}

fn parse_emotes(raw: &str) -> Result<Vec<Emote>, String> {
    let emotes = raw
        .split_whitespace()
        .map(|part| part.parse::<Emote>().map_err(|e| e.to_string()))
        .collect::<Result<Vec<_>, _>>()?;
    if emotes.is_empty() {
        return Err(StarboardError::EmptyEmoteSet.to_string());
    }
    Ok(emotes)
}

/// `https://discord.com/channels/<guild>/<channel>/<message>`
fn parse_message_link(link: &str) -> Option<(u64, u64, u64)> {
    let path = link.trim().split("/channels/").nth(1)?;
    let mut parts = path.split('/');
    let guild = parts.next()?.parse().ok()?;
    let channel = parts.next()?.parse().ok()?;
    let message = parts.next()?.parse().ok()?;
    Some((guild, channel, message))
}

fn describe_board(board: &BoardConfig) -> String {
    let emotes: Vec<String> = board.emote_set.iter().map(|e| e.to_string()).collect();
    let channels = if board.channel_filter_list.is_empty() {
        "none".to_string()
    } else {
        board
            .channel_filter_list
            .iter()
            .map(|id| format!("<#{}>", id))
            .collect::<Vec<_>>()
            .join(" ")
    };
    let on_off = |flag: bool| if flag { "on" } else { "off" };

    format!(
        "Output: <#{}>\nEmotes: {}\nThreshold: {} • Repost after: {}\nFilter: {} ({})\nBots: {} • Self-star: {}\nRemove on delete/clear/below: {}/{}/{}",
        board.output_channel_id,
        emotes.join(" "),
        board.threshold,
        if board.repost_threshold == 0 {
            "off".to_string()
        } else {
            board.repost_threshold.to_string()
        },
        board.channel_filter_mode,
        channels,
        on_off(board.allow_bots),
        on_off(board.allow_self_star),
        on_off(board.removal.on_source_delete),
        on_off(board.removal.on_reactions_cleared),
        on_off(board.removal.on_below_threshold),
    )
}

fn describe_transition(transition: &PostTransition) -> &'static str {
    match transition {
        PostTransition::Created { .. } => "highlight posted",
        PostTransition::Edited { .. } => "highlight updated",
        PostTransition::Reposted { .. } => "highlight reposted",
        PostTransition::Recreated { .. } => "highlight recreated",
        PostTransition::Removed => "highlight removed",
        PostTransition::Unchanged => "already up to date",
        PostTransition::Skipped(_) => "not eligible",
    }
}
