// Discord side of the starboard: serenity event translation, the
// `ChatPlatform` implementation and embed rendering.

pub mod embeds;
pub mod events;
pub mod serenity_platform;

pub use events::translate_event;
pub use serenity_platform::SerenityPlatform;
