use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};
use tokio::{
    sync::{mpsc, Notify},
    time::Instant,
};
use tracing::{error, info};

use super::{EngineErr, EngineEvent, Player, QueueEngine, QueueEntry};

#[derive(Default)]
struct DeckState {
    queue:   VecDeque<QueueEntry>,
    current: Option<(QueueEntry, Instant)>,
}

/// In-process queue engine.
#[derive(Default)]
pub struct Deck {
    state: Mutex<DeckState>,
    wake:  Notify,
}

impl Deck {
    pub fn new(seed: Vec<QueueEntry>) -> Self {
        Self {
            state: Mutex::new(DeckState { queue: seed.into(), current: None }),
            wake:  Notify::new(),
        }
    }

    fn state(&self) -> MutexGuard<'_, DeckState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Moves the head of the queue into the playing slot.
    pub(crate) fn start_next(&self) -> Option<QueueEntry> {
        let mut st = self.state();
        let entry = st.queue.pop_front()?;
        st.current = Some((entry.clone(), Instant::now()));
        Some(entry)
    }

    fn finish(&self) {
        self.state().current = None;
    }

    /// Plays entries until the event receiver goes away.
    pub async fn run(self: Arc<Self>, player: Arc<dyn Player>, events: mpsc::Sender<EngineEvent>) {
        loop {
            let Some(entry) = self.start_next() else {
                self.wake.notified().await;
                continue;
            };
            info!("▶ {} ({})", entry.media.title, entry.owner);
            if events.send(EngineEvent::NewSong(entry.clone())).await.is_err() {
                break;
            }

            if let Err(e) = player.play(&entry).await {
                error!("playback of '{}' failed: {e}", entry.media.title);
                if events.send(EngineEvent::PlaybackError(e.to_string())).await.is_err() {
                    break;
                }
            }

            self.finish();
            if events.send(EngineEvent::SongEnd(entry)).await.is_err() {
                break;
            }
        }
        info!("deck stopped");
    }
}

fn remaining(current: &Option<(QueueEntry, Instant)>) -> Duration {
    current
        .as_ref()
        .map(|(e, started)| e.media.duration.saturating_sub(started.elapsed()))
        .unwrap_or_default()
}

impl QueueEngine for Deck {
    fn append(&self, entry: QueueEntry) {
        self.state().queue.push_back(entry);
        self.wake.notify_one();
    }

    fn remove_at(&self, index: usize) -> Result<QueueEntry, EngineErr> {
        self.state().queue.remove(index).ok_or(EngineErr::OutOfRange(index))
    }

    fn replace_at(&self, index: usize, entry: QueueEntry) -> Result<(), EngineErr> {
        let mut st = self.state();
        let slot = st.queue.get_mut(index).ok_or(EngineErr::OutOfRange(index))?;
        *slot = entry;
        Ok(())
    }

    fn entry_at(&self, index: usize) -> Result<QueueEntry, EngineErr> {
        self.state().queue.get(index).cloned().ok_or(EngineErr::OutOfRange(index))
    }

    fn remove_exact(&self, index: usize, expected: &QueueEntry) -> Result<QueueEntry, EngineErr> {
        let mut st = self.state();
        let matches = *st.queue.get(index).ok_or(EngineErr::OutOfRange(index))? == *expected;
        if !matches {
            return Err(EngineErr::Moved(index));
        }
        st.queue.remove(index).ok_or(EngineErr::OutOfRange(index))
    }

    fn replace_exact(
        &self,
        index: usize,
        expected: &QueueEntry,
        entry: QueueEntry,
    ) -> Result<(), EngineErr> {
        let mut st = self.state();
        let slot = st.queue.get_mut(index).ok_or(EngineErr::OutOfRange(index))?;
        if *slot != *expected {
            return Err(EngineErr::Moved(index));
        }
        *slot = entry;
        Ok(())
    }

    fn list(&self) -> Vec<QueueEntry> {
        self.state().queue.iter().cloned().collect()
    }

    fn current_item(&self) -> Option<(QueueEntry, Duration)> {
        self.state()
            .current
            .as_ref()
            .map(|(e, started)| (e.clone(), started.elapsed().min(e.media.duration)))
    }

    fn positions_of(&self, user: &str) -> Vec<usize> {
        self.state()
            .queue
            .iter()
            .enumerate()
            .filter(|(_, e)| e.owner == user)
            .map(|(i, _)| i)
            .collect()
    }

    fn total_queued(&self) -> Duration {
        let st = self.state();
        st.queue.iter().map(|e| e.media.duration).sum::<Duration>() + remaining(&st.current)
    }

    fn durations_until(&self, user: &str) -> Vec<Duration> {
        let st = self.state();
        let mut ahead = remaining(&st.current);
        let mut out = Vec::new();
        for e in &st.queue {
            if e.owner == user {
                out.push(ahead);
            }
            ahead += e.media.duration;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{ClockPlayer, Media};

    fn entry(title: &str, owner: &str, mins: u64) -> QueueEntry {
        QueueEntry::new(
            Media {
                title:    title.into(),
                url:      format!("https://www.youtube.com/watch?v={title}"),
                duration: Duration::from_secs(mins * 60),
            },
            owner,
        )
    }

    #[test]
    fn positions_and_durations_line_up() {
        let deck = Deck::new(vec![
            entry("a", "ann", 3),
            entry("b", "ben", 4),
            entry("c", "ann", 5),
        ]);
        assert_eq!(deck.positions_of("ann"), vec![0, 2]);
        assert_eq!(
            deck.durations_until("ann"),
            vec![Duration::ZERO, Duration::from_secs(7 * 60)]
        );
        assert!(deck.positions_of("nobody").is_empty());
    }

    #[test]
    fn index_operations_reject_out_of_range() {
        let deck = Deck::new(vec![entry("a", "ann", 3)]);
        assert_eq!(deck.remove_at(1), Err(EngineErr::OutOfRange(1)));
        assert_eq!(deck.replace_at(4, entry("x", "x", 1)), Err(EngineErr::OutOfRange(4)));
        assert!(deck.entry_at(0).is_ok());
        assert_eq!(deck.remove_at(0).map(|e| e.media.title), Ok("a".to_string()));
        assert!(deck.list().is_empty());
    }

    #[test]
    fn exact_operations_notice_shifted_entries() {
        let deck = Deck::new(vec![entry("a", "ann", 3), entry("b", "ben", 3)]);
        let b = deck.entry_at(1).unwrap();
        deck.remove_at(0).unwrap();
        assert_eq!(deck.remove_exact(1, &b), Err(EngineErr::OutOfRange(1)));
        deck.append(entry("c", "cat", 1));
        assert_eq!(deck.replace_exact(1, &b, entry("x", "x", 1)), Err(EngineErr::Moved(1)));
        assert_eq!(deck.remove_exact(0, &b), Ok(b));
    }

    #[tokio::test(start_paused = true)]
    async fn total_queued_counts_the_playing_entry_once() {
        let deck = Deck::new(vec![entry("a", "ann", 3), entry("b", "ben", 4)]);
        assert_eq!(deck.total_queued(), Duration::from_secs(7 * 60));
        deck.start_next();
        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(deck.total_queued(), Duration::from_secs(6 * 60));
    }

    #[tokio::test(start_paused = true)]
    async fn run_emits_lifecycle_events_in_order() {
        let deck = Arc::new(Deck::default());
        let (tx, mut rx) = mpsc::channel(8);
        tokio::spawn(deck.clone().run(Arc::new(ClockPlayer), tx));

        deck.append(entry("a", "ann", 2));
        match rx.recv().await {
            Some(EngineEvent::NewSong(e)) => assert_eq!(e.media.title, "a"),
            other => panic!("unexpected {other:?}"),
        }
        tokio::time::advance(Duration::from_secs(60)).await;
        let (_, elapsed) = deck.current_item().expect("playing");
        assert!(elapsed >= Duration::from_secs(60));

        deck.append(entry("b", "ben", 1));
        assert_eq!(deck.durations_until("ben"), vec![Duration::from_secs(60)]);

        match rx.recv().await {
            Some(EngineEvent::SongEnd(e)) => assert_eq!(e.media.title, "a"),
            other => panic!("unexpected {other:?}"),
        }
        match rx.recv().await {
            Some(EngineEvent::NewSong(e)) => assert_eq!(e.media.title, "b"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
