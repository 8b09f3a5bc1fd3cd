//! Queue engine seam: the ordered request queue plus the currently playing
//! entry. The controller only talks to [`QueueEngine`]; lifecycle changes
//! come back as [`EngineEvent`]s.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

pub mod deck;
pub mod player;

pub use deck::Deck;
pub use player::{ClockPlayer, CommandPlayer, Player};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Media {
    pub title:    String,
    pub url:      String,
    pub duration: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Stable for the life of the request, also across restarts.
    #[serde(default = "Uuid::new_v4")]
    pub id:    Uuid,
    pub media: Media,
    pub owner: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dedication: Option<String>,
}

impl QueueEntry {
    pub fn new(media: Media, owner: &str) -> Self {
        Self { id: Uuid::new_v4(), media, owner: owner.to_string(), dedication: None }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineErr {
    #[error("index {0} out of range")]
    OutOfRange(usize),

    #[error("entry at index {0} changed")]
    Moved(usize),
}

#[derive(Debug, Clone)]
pub enum EngineEvent {
    NewSong(QueueEntry),
    SongEnd(QueueEntry),
    PlaybackError(String),
}

pub trait QueueEngine: Send + Sync {
    fn append(&self, entry: QueueEntry);
    fn remove_at(&self, index: usize) -> Result<QueueEntry, EngineErr>;
    fn replace_at(&self, index: usize, entry: QueueEntry) -> Result<(), EngineErr>;
    fn entry_at(&self, index: usize) -> Result<QueueEntry, EngineErr>;
    fn list(&self) -> Vec<QueueEntry>;
    /// Playing entry and how long it has been playing.
    fn current_item(&self) -> Option<(QueueEntry, Duration)>;
    /// Queue indices of every entry owned by `user`, ascending.
    fn positions_of(&self, user: &str) -> Vec<usize>;
    /// Wait before each of `user`'s entries starts, aligned with `positions_of`.
    fn durations_until(&self, user: &str) -> Vec<Duration>;

    /// Queued durations plus what is left of the current entry.
    fn total_queued(&self) -> Duration {
        let queued: Duration = self.list().iter().map(|e| e.media.duration).sum();
        let left = self
            .current_item()
            .map(|(e, elapsed)| e.media.duration.saturating_sub(elapsed))
            .unwrap_or_default();
        queued + left
    }

    /// Removes the entry at `index` only if it is still `expected`.
    fn remove_exact(&self, index: usize, expected: &QueueEntry) -> Result<QueueEntry, EngineErr> {
        if self.entry_at(index)? != *expected {
            return Err(EngineErr::Moved(index));
        }
        self.remove_at(index)
    }

    /// Replaces the entry at `index` only if it is still `expected`.
    fn replace_exact(
        &self,
        index: usize,
        expected: &QueueEntry,
        entry: QueueEntry,
    ) -> Result<(), EngineErr> {
        if self.entry_at(index)? != *expected {
            return Err(EngineErr::Moved(index));
        }
        self.replace_at(index, entry)
    }
}
