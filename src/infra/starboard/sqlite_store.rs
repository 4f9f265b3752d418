// SQLite-backed starboard store.
//
// Tables:
// - starboard_boards: Board configuration (emote set and filter list as JSON)
// - starboard_posts: Source message -> highlight message, one row per board
// - starboard_reaction_samples: Latest and peak counts per message/board/emote
// - starboard_attributions: Who starred what, recorded once
//
// Emotes are keyed by `emote_key` so a renamed custom emote still matches its
// existing rows.

use crate::core::starboard::{
    BoardConfig, BoardStore, ChannelFilterMode, Emote, ReactionAttribution, ReactionSample,
    ReactionStatsStore, RemovalPolicy, StarPost, StarPostStore, StarboardError,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use std::path::Path;

pub struct SqliteStarboardStore {
    pool: Pool<Sqlite>,
}

fn storage(e: impl std::fmt::Display) -> StarboardError {
    StarboardError::StorageError(e.to_string())
}

/// Identity of an emote as stored in key columns.
fn emote_key(emote: &Emote) -> String {
    match emote.custom_id() {
        Some(id) => format!("custom:{}", id),
        None => emote.to_string(),
    }
}

fn parse_emote(raw: &str) -> Result<Emote, StarboardError> {
    raw.parse::<Emote>().map_err(storage)
}

impl SqliteStarboardStore {
    /// Open (creating if needed) the database at `path` and run migrations.
    pub async fn new(path: &str) -> anyhow::Result<Self> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let pool = SqlitePoolOptions::new()
            .connect(&format!("sqlite://{}?mode=rwc", path))
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Run database migrations to create required tables.
    pub async fn migrate(&self) -> Result<(), StarboardError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS starboard_boards (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                guild_id INTEGER NOT NULL,
                output_channel_id INTEGER NOT NULL,
                emote_set TEXT NOT NULL DEFAULT '[]',
                threshold INTEGER NOT NULL,
                repost_threshold INTEGER NOT NULL DEFAULT 0,
                channel_filter_mode TEXT NOT NULL DEFAULT 'deny',
                channel_filter_list TEXT NOT NULL DEFAULT '[]',
                allow_bots BOOLEAN NOT NULL DEFAULT 0,
                allow_self_star BOOLEAN NOT NULL DEFAULT 1,
                remove_on_source_delete BOOLEAN NOT NULL DEFAULT 1,
                remove_on_reactions_cleared BOOLEAN NOT NULL DEFAULT 1,
                remove_on_below_threshold BOOLEAN NOT NULL DEFAULT 1
            );
            CREATE INDEX IF NOT EXISTS idx_starboard_boards_guild
                ON starboard_boards(guild_id);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS starboard_posts (
                source_message_id INTEGER NOT NULL,
                board_id INTEGER NOT NULL,
                source_channel_id INTEGER NOT NULL,
                output_message_id INTEGER NOT NULL,
                last_known_count INTEGER NOT NULL,
                PRIMARY KEY (source_message_id, board_id)
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS starboard_reaction_samples (
                message_id INTEGER NOT NULL,
                board_id INTEGER NOT NULL,
                emote_key TEXT NOT NULL,
                emote TEXT NOT NULL,
                author_id INTEGER NOT NULL,
                source_channel_id INTEGER NOT NULL,
                current_count INTEGER NOT NULL,
                peak_count INTEGER NOT NULL,
                is_active BOOLEAN NOT NULL,
                PRIMARY KEY (message_id, board_id, emote_key)
            );
            CREATE INDEX IF NOT EXISTS idx_starboard_samples_board
                ON starboard_reaction_samples(board_id);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS starboard_attributions (
                message_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                emote_key TEXT NOT NULL,
                emote TEXT NOT NULL,
                guild_id INTEGER NOT NULL,
                author_id INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (message_id, user_id, emote_key)
            );
            CREATE INDEX IF NOT EXISTS idx_starboard_attributions_guild
                ON starboard_attributions(guild_id);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        Ok(())
    }
}

fn board_from_row(row: &SqliteRow) -> Result<BoardConfig, StarboardError> {
    let emote_set: String = row.get("emote_set");
    let filter_list: String = row.get("channel_filter_list");
    let filter_mode: String = row.get("channel_filter_mode");

    Ok(BoardConfig {
        id: row.get::<i64, _>("id") as u64,
        guild_id: row.get::<i64, _>("guild_id") as u64,
        output_channel_id: row.get::<i64, _>("output_channel_id") as u64,
        emote_set: serde_json::from_str(&emote_set).map_err(storage)?,
        threshold: row.get::<i64, _>("threshold") as u32,
        repost_threshold: row.get::<i64, _>("repost_threshold") as u32,
        channel_filter_mode: filter_mode
            .parse::<ChannelFilterMode>()
            .map_err(StarboardError::StorageError)?,
        channel_filter_list: serde_json::from_str(&filter_list).map_err(storage)?,
        allow_bots: row.get("allow_bots"),
        allow_self_star: row.get("allow_self_star"),
        removal: RemovalPolicy {
            on_source_delete: row.get("remove_on_source_delete"),
            on_reactions_cleared: row.get("remove_on_reactions_cleared"),
            on_below_threshold: row.get("remove_on_below_threshold"),
        },
    })
}

fn post_from_row(row: &SqliteRow) -> StarPost {
    StarPost {
        source_message_id: row.get::<i64, _>("source_message_id") as u64,
        board_id: row.get::<i64, _>("board_id") as u64,
        source_channel_id: row.get::<i64, _>("source_channel_id") as u64,
        output_message_id: row.get::<i64, _>("output_message_id") as u64,
        last_known_count: row.get::<i64, _>("last_known_count") as u32,
    }
}

fn sample_from_row(row: &SqliteRow) -> Result<ReactionSample, StarboardError> {
    let emote: String = row.get("emote");
    Ok(ReactionSample {
        message_id: row.get::<i64, _>("message_id") as u64,
        board_id: row.get::<i64, _>("board_id") as u64,
        emote: parse_emote(&emote)?,
        author_id: row.get::<i64, _>("author_id") as u64,
        source_channel_id: row.get::<i64, _>("source_channel_id") as u64,
        current_count: row.get::<i64, _>("current_count") as u32,
        peak_count: row.get::<i64, _>("peak_count") as u32,
        is_active: row.get("is_active"),
    })
}

#[async_trait]
impl BoardStore for SqliteStarboardStore {
    async fn load_boards(&self) -> Result<Vec<BoardConfig>, StarboardError> {
        let rows = sqlx::query("SELECT * FROM starboard_boards ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(storage)?;

        let mut boards = Vec::with_capacity(rows.len());
        for row in &rows {
            match board_from_row(row) {
                Ok(board) => boards.push(board),
                Err(e) => {
                    let id: i64 = row.get("id");
                    tracing::error!(board_id = id, "Skipping unreadable starboard row: {}", e);
                }
            }
        }
        Ok(boards)
    }

    async fn insert_board(&self, board: &BoardConfig) -> Result<u64, StarboardError> {
        let result = sqlx::query(
            r#"
            INSERT INTO starboard_boards (
                guild_id, output_channel_id, emote_set, threshold, repost_threshold,
                channel_filter_mode, channel_filter_list, allow_bots, allow_self_star,
                remove_on_source_delete, remove_on_reactions_cleared, remove_on_below_threshold
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(board.guild_id as i64)
        .bind(board.output_channel_id as i64)
        .bind(serde_json::to_string(&board.emote_set).map_err(storage)?)
        .bind(board.threshold as i64)
        .bind(board.repost_threshold as i64)
        .bind(board.channel_filter_mode.to_string())
        .bind(serde_json::to_string(&board.channel_filter_list).map_err(storage)?)
        .bind(board.allow_bots)
        .bind(board.allow_self_star)
        .bind(board.removal.on_source_delete)
        .bind(board.removal.on_reactions_cleared)
        .bind(board.removal.on_below_threshold)
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        Ok(result.last_insert_rowid() as u64)
    }

    async fn update_board(&self, board: &BoardConfig) -> Result<(), StarboardError> {
        let result = sqlx::query(
            r#"
            UPDATE starboard_boards SET
                output_channel_id = ?,
                emote_set = ?,
                threshold = ?,
                repost_threshold = ?,
                channel_filter_mode = ?,
                channel_filter_list = ?,
                allow_bots = ?,
                allow_self_star = ?,
                remove_on_source_delete = ?,
                remove_on_reactions_cleared = ?,
                remove_on_below_threshold = ?
            WHERE id = ?
            "#,
        )
        .bind(board.output_channel_id as i64)
        .bind(serde_json::to_string(&board.emote_set).map_err(storage)?)
        .bind(board.threshold as i64)
        .bind(board.repost_threshold as i64)
        .bind(board.channel_filter_mode.to_string())
        .bind(serde_json::to_string(&board.channel_filter_list).map_err(storage)?)
        .bind(board.allow_bots)
        .bind(board.allow_self_star)
        .bind(board.removal.on_source_delete)
        .bind(board.removal.on_reactions_cleared)
        .bind(board.removal.on_below_threshold)
        .bind(board.id as i64)
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        if result.rows_affected() == 0 {
            return Err(StarboardError::BoardNotFound(board.id));
        }
        Ok(())
    }

    async fn delete_board(&self, board_id: u64) -> Result<(), StarboardError> {
        let mut tx = self.pool.begin().await.map_err(storage)?;

        sqlx::query("DELETE FROM starboard_posts WHERE board_id = ?")
            .bind(board_id as i64)
            .execute(&mut *tx)
            .await
            .map_err(storage)?;

        sqlx::query("DELETE FROM starboard_boards WHERE id = ?")
            .bind(board_id as i64)
            .execute(&mut *tx)
            .await
            .map_err(storage)?;

        tx.commit().await.map_err(storage)?;
        Ok(())
    }
}

#[async_trait]
impl StarPostStore for SqliteStarboardStore {
    async fn get_post(
        &self,
        source_message_id: u64,
        board_id: u64,
    ) -> Result<Option<StarPost>, StarboardError> {
        let row = sqlx::query(
            "SELECT * FROM starboard_posts WHERE source_message_id = ? AND board_id = ?",
        )
        .bind(source_message_id as i64)
        .bind(board_id as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;

        Ok(row.as_ref().map(post_from_row))
    }

    async fn upsert_post(&self, post: &StarPost) -> Result<(), StarboardError> {
        sqlx::query(
            r#"
            INSERT INTO starboard_posts (
                source_message_id, board_id, source_channel_id, output_message_id, last_known_count
            )
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(source_message_id, board_id) DO UPDATE SET
                source_channel_id = excluded.source_channel_id,
                output_message_id = excluded.output_message_id,
                last_known_count = excluded.last_known_count
            "#,
        )
        .bind(post.source_message_id as i64)
        .bind(post.board_id as i64)
        .bind(post.source_channel_id as i64)
        .bind(post.output_message_id as i64)
        .bind(post.last_known_count as i64)
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(())
    }

    async fn delete_post(
        &self,
        source_message_id: u64,
        board_id: u64,
    ) -> Result<bool, StarboardError> {
        let result =
            sqlx::query("DELETE FROM starboard_posts WHERE source_message_id = ? AND board_id = ?")
                .bind(source_message_id as i64)
                .bind(board_id as i64)
                .execute(&self.pool)
                .await
                .map_err(storage)?;

        Ok(result.rows_affected() > 0)
    }

    async fn posts_for_message(
        &self,
        source_message_id: u64,
    ) -> Result<Vec<StarPost>, StarboardError> {
        let rows = sqlx::query(
            "SELECT * FROM starboard_posts WHERE source_message_id = ? ORDER BY board_id",
        )
        .bind(source_message_id as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        Ok(rows.iter().map(post_from_row).collect())
    }
}

#[async_trait]
impl ReactionStatsStore for SqliteStarboardStore {
    async fn get_sample(
        &self,
        message_id: u64,
        board_id: u64,
        emote: &Emote,
    ) -> Result<Option<ReactionSample>, StarboardError> {
        let row = sqlx::query(
            r#"
            SELECT * FROM starboard_reaction_samples
            WHERE message_id = ? AND board_id = ? AND emote_key = ?
            "#,
        )
        .bind(message_id as i64)
        .bind(board_id as i64)
        .bind(emote_key(emote))
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;

        row.as_ref().map(sample_from_row).transpose()
    }

    async fn upsert_sample(&self, sample: &ReactionSample) -> Result<(), StarboardError> {
        sqlx::query(
            r#"
            INSERT INTO starboard_reaction_samples (
                message_id, board_id, emote_key, emote, author_id, source_channel_id,
                current_count, peak_count, is_active
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(message_id, board_id, emote_key) DO UPDATE SET
                emote = excluded.emote,
                author_id = excluded.author_id,
                source_channel_id = excluded.source_channel_id,
                current_count = excluded.current_count,
                peak_count = MAX(peak_count, excluded.peak_count),
                is_active = excluded.is_active
            "#,
        )
        .bind(sample.message_id as i64)
        .bind(sample.board_id as i64)
        .bind(emote_key(&sample.emote))
        .bind(sample.emote.to_string())
        .bind(sample.author_id as i64)
        .bind(sample.source_channel_id as i64)
        .bind(sample.current_count as i64)
        .bind(sample.peak_count as i64)
        .bind(sample.is_active)
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(())
    }

    async fn samples_for_boards(
        &self,
        board_ids: &[u64],
    ) -> Result<Vec<ReactionSample>, StarboardError> {
        if board_ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; board_ids.len()].join(", ");
        let sql = format!(
            "SELECT * FROM starboard_reaction_samples WHERE board_id IN ({})",
            placeholders
        );
        let mut query = sqlx::query(&sql);
        for id in board_ids {
            query = query.bind(*id as i64);
        }

        let rows = query.fetch_all(&self.pool).await.map_err(storage)?;
        rows.iter().map(sample_from_row).collect()
    }

    async fn insert_attribution(
        &self,
        attribution: &ReactionAttribution,
    ) -> Result<bool, StarboardError> {
        let result = sqlx::query(
            r#"
            INSERT INTO starboard_attributions (
                message_id, user_id, emote_key, emote, guild_id, author_id, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(message_id, user_id, emote_key) DO NOTHING
            "#,
        )
        .bind(attribution.message_id as i64)
        .bind(attribution.user_id as i64)
        .bind(emote_key(&attribution.emote))
        .bind(attribution.emote.to_string())
        .bind(attribution.guild_id as i64)
        .bind(attribution.author_id as i64)
        .bind(attribution.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        Ok(result.rows_affected() > 0)
    }

    async fn attributions_for_guild(
        &self,
        guild_id: u64,
    ) -> Result<Vec<ReactionAttribution>, StarboardError> {
        let rows = sqlx::query("SELECT * FROM starboard_attributions WHERE guild_id = ?")
            .bind(guild_id as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(storage)?;

        let mut attributions = Vec::with_capacity(rows.len());
        for row in rows {
            let emote: String = row.get("emote");
            let created_at: String = row.get("created_at");
            let created_at = DateTime::parse_from_rfc3339(&created_at)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now());

            attributions.push(ReactionAttribution {
                message_id: row.get::<i64, _>("message_id") as u64,
                user_id: row.get::<i64, _>("user_id") as u64,
                emote: parse_emote(&emote)?,
                guild_id: row.get::<i64, _>("guild_id") as u64,
                author_id: row.get::<i64, _>("author_id") as u64,
                created_at,
            });
        }
        Ok(attributions)
    }
}
