//! Forwards to the queue engine and persists the queue after every change.

use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use tracing::info;

use crate::{
    engine::{EngineErr, QueueEngine, QueueEntry},
    store::{load_json, save_json, Store, QUEUE_KEY},
};

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct LocalQueueSnapshot {
    pub queue: Vec<QueueEntry>,
}

/// Last saved queue, or empty when there is none or it cannot be read.
pub async fn load_snapshot(store: &dyn Store) -> Vec<QueueEntry> {
    let snap: LocalQueueSnapshot = load_json(store, QUEUE_KEY).await.unwrap_or_default();
    info!("loaded playlist with {} songs", snap.queue.len());
    snap.queue
}

#[derive(Clone)]
pub struct QueueFacade {
    engine: Arc<dyn QueueEngine>,
    store:  Arc<dyn Store>,
}

impl QueueFacade {
    pub fn new(engine: Arc<dyn QueueEngine>, store: Arc<dyn Store>) -> Self {
        Self { engine, store }
    }

    pub async fn persist(&self) {
        let snap = LocalQueueSnapshot { queue: self.engine.list() };
        save_json(self.store.as_ref(), QUEUE_KEY, &snap).await;
    }

    pub async fn add(&self, entry: QueueEntry) {
        self.engine.append(entry);
        self.persist().await;
    }

    /// Removes `expected` from `index`; fails if the queue shifted meanwhile.
    pub async fn remove_at(&self, index: usize, expected: &QueueEntry) -> Result<QueueEntry, EngineErr> {
        let removed = self.engine.remove_exact(index, expected)?;
        self.persist().await;
        Ok(removed)
    }

    pub async fn replace_at(
        &self,
        index: usize,
        expected: &QueueEntry,
        entry: QueueEntry,
    ) -> Result<(), EngineErr> {
        self.engine.replace_exact(index, expected, entry)?;
        self.persist().await;
        Ok(())
    }

    pub fn entry_at(&self, index: usize) -> Result<QueueEntry, EngineErr> {
        self.engine.entry_at(index)
    }

    pub fn list(&self) -> Vec<QueueEntry> {
        self.engine.list()
    }

    pub fn current(&self) -> Option<(QueueEntry, Duration)> {
        self.engine.current_item()
    }

    pub fn positions_of(&self, user: &str) -> Vec<usize> {
        self.engine.positions_of(user)
    }

    pub fn durations_until(&self, user: &str) -> Vec<Duration> {
        self.engine.durations_until(user)
    }

    /// Everything still to play, including what is left of the current song.
    pub fn total_queued(&self) -> Duration {
        self.engine.total_queued()
    }
}
