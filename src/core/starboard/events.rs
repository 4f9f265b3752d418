// Typed platform events and observer registration.
//
// Observers register with the hub and get back a handle; revoking (or
// dropping) the handle unsubscribes them.

use super::starboard_models::Emote;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// A reaction added to or removed from a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactionEvent {
    /// `None` for direct messages.
    pub guild_id: Option<u64>,
    pub channel_id: u64,
    pub message_id: u64,
    pub emote: Emote,
    pub user_id: u64,
    pub user_is_bot: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRef {
    pub guild_id: Option<u64>,
    pub channel_id: u64,
    pub message_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformEvent {
    ReactionAdded(ReactionEvent),
    ReactionRemoved(ReactionEvent),
    /// Every reaction of one emote was removed.
    EmoteCleared { message: MessageRef, emote: Emote },
    /// Every reaction was removed.
    ReactionsCleared(MessageRef),
    MessageDeleted(MessageRef),
    MessageEdited(MessageRef),
}

#[async_trait]
pub trait PlatformEventObserver: Send + Sync {
    async fn on_event(&self, event: &PlatformEvent);
}

pub struct EventHub {
    observers: DashMap<u64, Arc<dyn PlatformEventObserver>>,
    next_id: AtomicU64,
}

impl EventHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            observers: DashMap::new(),
            next_id: AtomicU64::new(1),
        })
    }

    /// Subscribe `observer`. Keep the handle alive for as long as the
    /// subscription should last.
    pub fn register(self: &Arc<Self>, observer: Arc<dyn PlatformEventObserver>) -> ObserverHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.observers.insert(id, observer);
        ObserverHandle {
            id,
            hub: Arc::downgrade(self),
        }
    }

    /// Deliver `event` to every current observer.
    pub async fn dispatch(&self, event: &PlatformEvent) {
        // Snapshot so no map guard is held while observers run.
        let observers: Vec<Arc<dyn PlatformEventObserver>> = self
            .observers
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        for observer in observers {
            observer.on_event(event).await;
        }
    }

    #[cfg(test)]
    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    fn unregister(&self, id: u64) {
        self.observers.remove(&id);
    }
}

/// Revocable subscription. Dropping it also unsubscribes.
pub struct ObserverHandle {
    id: u64,
    hub: Weak<EventHub>,
}

impl ObserverHandle {
    pub fn revoke(self) {
        // Drop does the work.
    }
}

impl Drop for ObserverHandle {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.unregister(self.id);
        }
    }
}
