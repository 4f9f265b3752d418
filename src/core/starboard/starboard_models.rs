// Starboard domain models.
//
// Pure data types with no Discord dependencies. The Discord layer converts
// serenity types into these before calling into the core.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

// ============================================================================
// EMOTES
// ============================================================================

/// A trigger emote, compared by identity.
///
/// Two custom emotes are the same emote when their ids match, even if the
/// name changed since the board was configured.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Emote {
    Unicode(String),
    Custom {
        id: u64,
        name: String,
        animated: bool,
    },
}

impl Emote {
    pub fn custom_id(&self) -> Option<u64> {
        match self {
            Emote::Custom { id, .. } => Some(*id),
            Emote::Unicode(_) => None,
        }
    }
}

impl PartialEq for Emote {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Emote::Unicode(a), Emote::Unicode(b)) => a == b,
            (Emote::Custom { id: a, .. }, Emote::Custom { id: b, .. }) => a == b,
            _ => false,
        }
    }
}

impl Eq for Emote {}

impl Hash for Emote {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Emote::Unicode(value) => {
                0u8.hash(state);
                value.hash(state);
            }
            Emote::Custom { id, .. } => {
                1u8.hash(state);
                id.hash(state);
            }
        }
    }
}

impl fmt::Display for Emote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Emote::Unicode(value) => write!(f, "{}", value),
            Emote::Custom {
                id,
                name,
                animated: true,
            } => write!(f, "<a:{}:{}>", name, id),
            Emote::Custom { id, name, .. } => write!(f, "<:{}:{}>", name, id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Not a valid emote: {0:?}")]
pub struct InvalidEmote(pub String);

impl FromStr for Emote {
    type Err = InvalidEmote;

    /// Accepts `<:name:id>`, `<a:name:id>` or a plain unicode emoji.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(InvalidEmote(raw.to_string()));
        }

        if let Some(inner) = trimmed.strip_prefix('<').and_then(|s| s.strip_suffix('>')) {
            let (animated, rest) = match inner.strip_prefix("a:") {
                Some(rest) => (true, rest),
                None => (false, inner.strip_prefix(':').unwrap_or(inner)),
            };
            let (name, id) = rest
                .rsplit_once(':')
                .ok_or_else(|| InvalidEmote(raw.to_string()))?;
            let id = id
                .parse::<u64>()
                .map_err(|_| InvalidEmote(raw.to_string()))?;
            let name = if name.is_empty() { "_" } else { name };
            return Ok(Emote::Custom {
                id,
                name: name.to_string(),
                animated,
            });
        }

        // Plain ASCII is a typo, not an emoji. Keycaps like 1️⃣ still pass.
        if trimmed.is_ascii() || trimmed.contains(char::is_whitespace) {
            return Err(InvalidEmote(raw.to_string()));
        }

        Ok(Emote::Unicode(trimmed.to_string()))
    }
}

impl From<Emote> for String {
    fn from(emote: Emote) -> Self {
        emote.to_string()
    }
}

impl TryFrom<String> for Emote {
    type Error = InvalidEmote;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

// ============================================================================
// BOARD CONFIGURATION
// ============================================================================

/// How `channel_filter_list` is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChannelFilterMode {
    /// Only listed channels can be highlighted.
    Allow,
    /// Every channel except the listed ones can be highlighted.
    #[default]
    Deny,
}

impl fmt::Display for ChannelFilterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelFilterMode::Allow => write!(f, "allow"),
            ChannelFilterMode::Deny => write!(f, "deny"),
        }
    }
}

impl FromStr for ChannelFilterMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "allow" => Ok(ChannelFilterMode::Allow),
            "deny" => Ok(ChannelFilterMode::Deny),
            other => Err(format!("unknown channel filter mode: {}", other)),
        }
    }
}

/// Why a live post is being considered for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalTrigger {
    SourceDeleted,
    ReactionsCleared,
    BelowThreshold,
}

impl fmt::Display for RemovalTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemovalTrigger::SourceDeleted => write!(f, "source deleted"),
            RemovalTrigger::ReactionsCleared => write!(f, "reactions cleared"),
            RemovalTrigger::BelowThreshold => write!(f, "below threshold"),
        }
    }
}

/// Which lifecycle events remove a live post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovalPolicy {
    pub on_source_delete: bool,
    pub on_reactions_cleared: bool,
    pub on_below_threshold: bool,
}

impl Default for RemovalPolicy {
    fn default() -> Self {
        Self {
            on_source_delete: true,
            on_reactions_cleared: true,
            on_below_threshold: true,
        }
    }
}

impl RemovalPolicy {
    pub fn applies(&self, trigger: RemovalTrigger) -> bool {
        match trigger {
            RemovalTrigger::SourceDeleted => self.on_source_delete,
            RemovalTrigger::ReactionsCleared => self.on_reactions_cleared,
            RemovalTrigger::BelowThreshold => self.on_below_threshold,
        }
    }

    pub fn set(&mut self, trigger: RemovalTrigger, enabled: bool) {
        match trigger {
            RemovalTrigger::SourceDeleted => self.on_source_delete = enabled,
            RemovalTrigger::ReactionsCleared => self.on_reactions_cleared = enabled,
            RemovalTrigger::BelowThreshold => self.on_below_threshold = enabled,
        }
    }
}

/// One highlight destination within a guild.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardConfig {
    pub id: u64,
    pub guild_id: u64,
    pub output_channel_id: u64,
    /// Ordered set; an emote appears at most once across all boards of a guild.
    pub emote_set: Vec<Emote>,
    pub threshold: u32,
    /// 0 disables reposting.
    pub repost_threshold: u32,
    pub channel_filter_mode: ChannelFilterMode,
    pub channel_filter_list: Vec<u64>,
    pub allow_bots: bool,
    pub allow_self_star: bool,
    pub removal: RemovalPolicy,
}

impl BoardConfig {
    /// A board with default policy. The id is assigned by the store.
    pub fn new(guild_id: u64, output_channel_id: u64, emote_set: Vec<Emote>, threshold: u32) -> Self {
        Self {
            id: 0,
            guild_id,
            output_channel_id,
            emote_set,
            threshold,
            repost_threshold: 0,
            channel_filter_mode: ChannelFilterMode::default(),
            channel_filter_list: Vec::new(),
            allow_bots: false,
            allow_self_star: true,
            removal: RemovalPolicy::default(),
        }
    }

    pub fn watches(&self, emote: &Emote) -> bool {
        self.emote_set.contains(emote)
    }

    pub fn accepts_channel(&self, channel_id: u64) -> bool {
        let listed = self.channel_filter_list.contains(&channel_id);
        match self.channel_filter_mode {
            ChannelFilterMode::Allow => listed,
            ChannelFilterMode::Deny => !listed,
        }
    }

    /// The emote shown next to the count on a highlight.
    pub fn display_emote(&self) -> String {
        self.emote_set
            .first()
            .map(|e| e.to_string())
            .unwrap_or_else(|| "⭐".to_string())
    }
}

// ============================================================================
// DERIVED RECORDS
// ============================================================================

/// Link between a source message and its highlight on one board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StarPost {
    pub source_message_id: u64,
    pub board_id: u64,
    pub source_channel_id: u64,
    pub output_message_id: u64,
    pub last_known_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactionSample {
    pub message_id: u64,
    pub board_id: u64,
    pub emote: Emote,
    pub author_id: u64,
    pub source_channel_id: u64,
    pub current_count: u32,
    /// Never decreases.
    pub peak_count: u32,
    pub is_active: bool,
}

/// "user starred message with emote", recorded once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactionAttribution {
    pub message_id: u64,
    pub user_id: u64,
    pub emote: Emote,
    pub guild_id: u64,
    pub author_id: u64,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// PLATFORM SNAPSHOTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reactor {
    pub user_id: u64,
    pub is_bot: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceAttachment {
    pub filename: String,
    pub url: String,
    pub is_image: bool,
}

/// What the core needs to know about a source message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceMessage {
    pub id: u64,
    pub channel_id: u64,
    pub guild_id: u64,
    pub content: String,
    pub attachments: Vec<SourceAttachment>,
    pub author_id: u64,
    pub author_display_name: String,
    pub author_avatar_url: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl SourceMessage {
    /// Messages with neither text nor attachments are never highlighted.
    pub fn has_content(&self) -> bool {
        !self.content.trim().is_empty() || !self.attachments.is_empty()
    }

    pub fn jump_url(&self) -> String {
        format!(
            "https://discord.com/channels/{}/{}/{}",
            self.guild_id, self.channel_id, self.id
        )
    }
}

// ============================================================================
// STATISTICS
// ============================================================================

/// An id with the count that ranked it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ranked {
    pub id: u64,
    pub count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GuildStarStats {
    pub guild_id: u64,
    pub total_stars: u64,
    pub starred_messages: u64,
    pub top_author: Option<Ranked>,
    pub top_output_channel: Option<Ranked>,
    pub top_reactor: Option<Ranked>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserStarStats {
    pub user_id: u64,
    pub messages_starred: u64,
    pub stars_received: u64,
    pub stars_given: u64,
    /// Users who star this user most.
    pub top_fans: Vec<Ranked>,
    /// Users this user stars most.
    pub top_idols: Vec<Ranked>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_emotes_compare_by_id() {
        let a: Emote = "<:star:42>".parse().unwrap();
        let b: Emote = "<:renamed:42>".parse().unwrap();
        let c: Emote = "<a:star:43>".parse().unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(c.to_string(), "<a:star:43>");
    }

    #[test]
    fn unicode_emotes_parse_and_reject_text() {
        assert_eq!("⭐".parse::<Emote>().unwrap(), Emote::Unicode("⭐".into()));
        assert!("star".parse::<Emote>().is_err());
        assert!("".parse::<Emote>().is_err());
        assert!("<:broken>".parse::<Emote>().is_err());
    }

    #[test]
    fn emote_serializes_as_display_string() {
        let emote: Emote = "<:star:42>".parse().unwrap();
        let json = serde_json::to_string(&vec![emote.clone()]).unwrap();
        assert_eq!(json, r#"["<:star:42>"]"#);

        let back: Vec<Emote> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, vec![emote]);
    }

    #[test]
    fn channel_filter_modes() {
        let mut board = BoardConfig::new(1, 2, vec![Emote::Unicode("⭐".into())], 3);
        board.channel_filter_list = vec![10];

        assert!(!board.accepts_channel(10));
        assert!(board.accepts_channel(11));

        board.channel_filter_mode = ChannelFilterMode::Allow;
        assert!(board.accepts_channel(10));
        assert!(!board.accepts_channel(11));
    }

    #[test]
    fn empty_message_has_no_content() {
        let message = SourceMessage {
            id: 1,
            channel_id: 2,
            guild_id: 3,
            content: "   ".into(),
            attachments: vec![],
            author_id: 4,
            author_display_name: "someone".into(),
            author_avatar_url: None,
            timestamp: Utc::now(),
        };
        assert!(!message.has_content());
        assert_eq!(message.jump_url(), "https://discord.com/channels/3/2/1");
    }
}
