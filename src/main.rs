// This is the entry point of the starboard bot.
//
// **Architecture Overview:**
// - `core/` = Business logic (platform-agnostic)
// - `infra/` = Implementations of core traits (databases)
// - `discord/` = Discord-specific adapters (commands, events, embeds)
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize services (dependency injection)
// 3. Set up the Discord framework
// 4. Forward gateway events to the starboard

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with half a dozen mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
mod core;
#[path = "discord/discord_layer.rs"]
mod discord;
#[path = "infra/infra_layer.rs"]
mod infra;

use crate::core::starboard::{ConfigRegistry, EventHub, StarboardEngine};
use crate::discord::starboard::{translate_event, SerenityPlatform};
use crate::discord::{Data, Error};
use crate::infra::starboard::SqliteStarboardStore;
use anyhow::Context as _;
use poise::serenity_prelude as serenity;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Settings read from the environment (and `.env`, if present).
struct Settings {
    token: String,
    database_path: PathBuf,
    /// Register commands in this guild only, for instant updates while developing.
    dev_guild_id: Option<u64>,
}

impl Settings {
    fn from_env() -> anyhow::Result<Self> {
        let token = std::env::var("DISCORD_TOKEN").context(
            "Missing DISCORD_TOKEN environment variable! Create a .env file with your bot token.",
        )?;

        // Keep runtime databases in a dedicated folder so the repo root stays tidy.
        let data_dir = std::env::var("STARBOARD_DATA_DIR").unwrap_or_else(|_| "data".to_string());
        let db_file =
            std::env::var("STARBOARD_DB_FILE").unwrap_or_else(|_| "starboard.db".to_string());

        let dev_guild_id = match std::env::var("STARBOARD_DEV_GUILD_ID") {
            Ok(raw) => Some(
                raw.parse::<u64>()
                    .with_context(|| format!("STARBOARD_DEV_GUILD_ID is not a guild id: {}", raw))?,
            ),
            Err(_) => None,
        };

        Ok(Self {
            token,
            database_path: PathBuf::from(data_dir).join(db_file),
            dev_guild_id,
        })
    }
}

/// Event handler for non-command Discord events.
/// Everything the starboard cares about goes through the event hub.
async fn event_handler(
    _ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    for starboard_event in translate_event(event) {
        data.events.dispatch(&starboard_event).await;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    // RUST_LOG overrides the default level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::from_env()?;

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================
    // Storage and configuration are ready before we connect; the engine itself
    // needs the HTTP client and cache, so it is built in `setup`.

    let database_path = settings.database_path.to_string_lossy().to_string();
    let store = Arc::new(
        SqliteStarboardStore::new(&database_path)
            .await
            .with_context(|| format!("Failed to open starboard database at {}", database_path))?,
    );
    let registry = Arc::new(
        ConfigRegistry::load(Arc::clone(&store))
            .await
            .context("Failed to load starboard configuration")?,
    );
    let dev_guild_id = settings.dev_guild_id;

    // ========================================================================
    // DISCORD FRAMEWORK SETUP
    // ========================================================================

    let intents = serenity::GatewayIntents::GUILDS
        | serenity::GatewayIntents::GUILD_MESSAGES
        | serenity::GatewayIntents::GUILD_MESSAGE_REACTIONS
        | serenity::GatewayIntents::MESSAGE_CONTENT; // Required to mirror message content

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![
                discord::commands::starboard::starboard(),
                discord::commands::starstats::starstats(),
            ],
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            ..Default::default()
        })
        .setup(move |ctx, ready, framework| {
            Box::pin(async move {
                tracing::info!("Bot is starting up...");

                match dev_guild_id {
                    Some(guild_id) => {
                        poise::builtins::register_in_guild(
                            ctx,
                            &framework.options().commands,
                            serenity::GuildId::new(guild_id),
                        )
                        .await?;
                        tracing::info!(guild_id, "Commands registered in development guild");
                    }
                    None => {
                        // Global registration can take up to an hour to propagate
                        poise::builtins::register_globally(ctx, &framework.options().commands)
                            .await?;
                        tracing::info!("Commands registered globally");
                    }
                }

                let platform = Arc::new(SerenityPlatform::new(
                    Arc::clone(&ctx.http),
                    Arc::clone(&ctx.cache),
                ));
                let starboard = Arc::new(StarboardEngine::new(
                    registry,
                    store,
                    platform,
                    ready.user.id.get(),
                ));

                let events = EventHub::new();
                let subscription = events.register(starboard.clone());

                tracing::info!(user = %ready.user.name, "Bot is ready");
                Ok(Data {
                    starboard,
                    events,
                    subscription,
                })
            })
        })
        .build();

    let mut client = serenity::ClientBuilder::new(settings.token, intents)
        .framework(framework)
        .await
        .context("Error creating client")?;

    client.start().await.context("Error running bot")?;
    Ok(())
}
