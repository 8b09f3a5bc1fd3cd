//! Request handling and engine callbacks. Every user-facing operation
//! returns the reply text, or a [`RequestErr`] whose text is the reply.

use std::{fmt::Write, sync::Arc};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::{
    admission,
    config::{Config, RemovalPolicy},
    dispatch::Notifier,
    engine::{EngineEvent, QueueEntry},
    error::{RequestErr, RequestResult},
    facade::QueueFacade,
    format::{duration_bar, fmt_duration, people, playlist},
    metadata::{self, MetadataService},
    publish::TextPublisher,
    state::{Lookup, PlaylistLink, SongLikes, UserSet},
    store::{save_json, Store, SUBSCRIBERS_KEY},
};

const BAR_WIDTH: usize = 15;

pub struct Controller {
    queue:          QueueFacade,
    store:          Arc<dyn Store>,
    metadata:       Arc<dyn MetadataService>,
    publisher:      TextPublisher,
    notifier:       Notifier,
    likes:          SongLikes,
    subscribers:    UserSet,
    playlist:       PlaylistLink,
    moderators:     Vec<String>,
    removal_policy: RemovalPolicy,
}

impl Controller {
    pub fn new(
        queue: QueueFacade,
        store: Arc<dyn Store>,
        metadata: Arc<dyn MetadataService>,
        publisher: TextPublisher,
        notifier: Notifier,
        subscribers: UserSet,
        cfg: &Config,
    ) -> Self {
        Self {
            queue,
            store,
            metadata,
            publisher,
            notifier,
            likes: SongLikes::default(),
            subscribers,
            playlist: PlaylistLink::default(),
            moderators: cfg.moderators.clone(),
            removal_policy: cfg.removal_policy,
        }
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /* ---------------- submissions ---------------- */

    pub async fn submit(&self, text: &str, requester: &str) -> RequestResult<String> {
        let id = metadata::extract_id(text).ok_or(RequestErr::InvalidLink)?;
        let media = match self.metadata.resolve(id).await {
            Ok(Some(media)) => media,
            Ok(None) => return Err(RequestErr::InvalidLink),
            Err(e) => {
                error!("metadata lookup for {id} failed: {e}");
                return Err(RequestErr::MetadataLookupFailed);
            }
        };

        admission::check(self.queue.total_queued(), media.duration)?;

        let entry = QueueEntry::new(media, requester);
        let title = entry.media.title.clone();
        self.queue.add(entry).await;
        self.playlist.invalidate();

        info!("added song '{title}' for {requester}");
        Ok(format!("Added your request '{title}' to the queue."))
    }

    /* ---------------- queries ---------------- */

    pub fn currently_playing(&self) -> RequestResult<String> {
        let (entry, elapsed) = self.queue.current().ok_or(RequestErr::NothingPlaying)?;
        let total = entry.media.duration;
        Ok(format!(
            "`{}` `{}/{}` currently playing: 🎶 \"{}\" 🎶 requested by {}",
            duration_bar(BAR_WIDTH, elapsed, total),
            fmt_duration(elapsed),
            fmt_duration(total),
            entry.media.title,
            entry.owner,
        ))
    }

    pub fn next_up(&self) -> RequestResult<String> {
        let queue = self.queue.list();
        let next = queue.first().ok_or(RequestErr::QueueEmpty)?;
        Ok(format!("up next: '{}' requested by {}", next.media.title, next.owner))
    }

    pub fn queue_position(&self, user: &str) -> RequestResult<String> {
        let total = self.queue.list().len();
        let positions = self.queue.positions_of(user);
        let durations = self.queue.durations_until(user);
        if positions.len() != durations.len() {
            error!(
                "position/duration mismatch for {user}: {} vs {}",
                positions.len(),
                durations.len()
            );
            return Err(RequestErr::InternalInconsistency);
        }

        let mut reply = format!("There are currently {total} songs in the queue");
        for (pos, wait) in positions.iter().zip(&durations) {
            let _ = write!(
                reply,
                ", your song is in position {} and will play in {}",
                pos + 1,
                fmt_duration(*wait)
            );
        }
        Ok(reply)
    }

    pub async fn playlist_link(&self) -> RequestResult<String> {
        let epoch = match self.playlist.lookup() {
            Lookup::Fresh(url) => return Ok(playlist_reply(&url)),
            Lookup::Stale(epoch) => epoch,
        };

        let current = self.queue.current().map(|(e, _)| e);
        let text = playlist(&self.queue.list(), current.as_ref());
        let url = self.publisher.publish(&text).await.map_err(|e| {
            error!("failed to upload playlist: {e}");
            RequestErr::PublishFailed
        })?;

        info!("📝 generated playlist");
        if !self.playlist.store(&url, epoch) {
            info!("queue changed during upload, playlist stays dirty");
        }
        Ok(playlist_reply(&url))
    }

    /* ---------------- per-user state ---------------- */

    pub fn like(&self, requester: &str) -> RequestResult<String> {
        let (playing, _) = self.queue.current().ok_or(RequestErr::NothingPlaying)?;
        if !self.likes.add(playing.id, requester) {
            return Err(RequestErr::AlreadyLiked);
        }
        Ok(format!("I will tell {} you liked \"{}\"", playing.owner, playing.media.title))
    }

    pub async fn toggle_updates(&self, requester: &str) -> RequestResult<String> {
        let subscribed = self.subscribers.toggle(requester);
        save_json(self.store.as_ref(), SUBSCRIBERS_KEY, &self.subscribers.snapshot()).await;
        Ok(if subscribed {
            "You will now get a message every time a new song plays. send `-updateme` again to turn it off.".into()
        } else {
            "You will no longer get notifications.".into()
        })
    }

    /* ---------------- queue mutations ---------------- */

    fn is_moderator(&self, nick: &str) -> bool {
        self.moderators.iter().any(|m| m == nick)
    }

    pub async fn remove_by_index(&self, arg: &str, requester: &str) -> RequestResult<String> {
        let index: i64 = arg.trim().parse().map_err(|_| RequestErr::InvalidArgument)?;
        let index = usize::try_from(index).map_err(|_| RequestErr::IndexOutOfRange)?;
        let entry = self.queue.entry_at(index).map_err(|_| RequestErr::IndexOutOfRange)?;

        let allowed = self
            .removal_policy
            .allows(entry.owner == requester, self.is_moderator(requester));
        if !allowed {
            return Err(RequestErr::NotAuthorized { nick: requester.to_string() });
        }

        self.queue.remove_at(index, &entry).await.map_err(|e| {
            warn!("remove {index} for {requester} failed: {e}");
            RequestErr::IndexOutOfRange
        })?;
        self.playlist.invalidate();
        info!("{requester} removed '{}' at {index}", entry.media.title);
        Ok("Successfully removed item at index".into())
    }

    pub async fn dedicate(&self, target: &str, requester: &str) -> RequestResult<String> {
        let positions = self.queue.positions_of(requester);
        let &first = positions.first().ok_or(RequestErr::NoQueuedSong)?;
        let entry = self.queue.entry_at(first).map_err(|_| RequestErr::InternalInconsistency)?;

        let target = target.trim();
        let mut updated = entry.clone();
        updated.dedication = (!target.is_empty()).then(|| target.to_string());
        self.queue.replace_at(first, &entry, updated).await.map_err(|e| {
            warn!("dedication for {requester} failed: {e}");
            RequestErr::InternalInconsistency
        })?;
        self.playlist.invalidate();

        if target.is_empty() {
            return Ok(format!("Removed the dedication from {}", entry.media.title));
        }
        Ok(format!("Dedicated {} to {target}", entry.media.title))
    }

    /* ---------------- engine callbacks ---------------- */

    pub async fn on_new_song(&self, entry: &QueueEntry) {
        self.playlist.invalidate();
        let msg = format!("Now Playing {}'s request: {}", entry.owner, entry.media.title);
        info!("▶ {msg}");

        for nick in self.subscribers.snapshot() {
            self.notifier.send(&nick, msg.as_str()).await;
        }
        if let Some(to) = &entry.dedication {
            self.notifier.send(to, format!("{} dedicated this song to you.", entry.owner)).await;
        }
        self.notifier.send(&entry.owner, "Playing your song now").await;
    }

    pub async fn on_song_end(&self, entry: &QueueEntry) {
        self.playlist.invalidate();
        info!("🛑 done playing '{}'", entry.media.title);
        self.queue.persist().await;

        let likes = self.likes.take(entry.id);
        if likes > 0 {
            let msg = format!("{likes} {} really liked your song PeepoHappy", people(likes));
            self.notifier.send(&entry.owner, msg).await;
        }
    }

    pub fn on_playback_error(&self, err: &str) {
        error!("there was an error during song playback: {err}");
    }

    /// Feeds engine events into the callbacks, one at a time.
    pub async fn run_events(self: Arc<Self>, mut events: mpsc::Receiver<EngineEvent>) {
        while let Some(ev) = events.recv().await {
            match ev {
                EngineEvent::NewSong(entry)     => self.on_new_song(&entry).await,
                EngineEvent::SongEnd(entry)     => self.on_song_end(&entry).await,
                EngineEvent::PlaybackError(err) => self.on_playback_error(&err),
            }
        }
        info!("engine event stream closed");
    }
}

fn playlist_reply(url: &str) -> String {
    format!("you can find the current playlist here: {url}")
}


#[cfg(test)]
mod tests {
    use super::harness::*;
    use super::*;
    use crate::{
        config::RemovalPolicy,
        dispatch::{self, fake::FakeChat},
        engine::{ClockPlayer, EngineErr, QueueEngine},
        publish::fake::{CapturingFileHost, SlowHost},
        store::{memory::MemoryStore, QUEUE_KEY},
    };
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn short_song_on_empty_queue_is_accepted() {
        let h = harness();
        h.video("abc", mins(3));
        let reply = h.ctl.submit("https://www.youtube.com/watch?v=abc", "ann").await;
        assert_eq!(reply, Ok("Added your request 'song abc' to the queue.".to_string()));
        assert_eq!(h.deck.list().len(), 1);
        assert_eq!(h.deck.list()[0].owner, "ann");
        assert_eq!(h.store.saves(QUEUE_KEY), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn long_song_on_busy_queue_is_rejected_without_side_effects() {
        let h = harness();
        h.enqueue("q1", "ben", mins(25));
        h.enqueue("q2", "ben", mins(20));
        h.video("long", mins(12));

        let reply = h.ctl.submit("youtu.be/long", "ann").await;
        assert_eq!(reply, Err(RequestErr::SongTooLong { max_minutes: 10 }));
        assert_eq!(h.deck.list().len(), 2);
        assert_eq!(h.store.saves(QUEUE_KEY), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn remaining_time_of_current_song_counts_towards_load() {
        let h = harness();
        h.enqueue("now", "ben", mins(30));
        h.deck.start_next();
        tokio::time::advance(mins(9)).await;
        // 21 minutes left → 10 minute cap
        h.video("x", mins(11));
        assert_eq!(
            h.ctl.submit("youtu.be/x", "ann").await,
            Err(RequestErr::SongTooLong { max_minutes: 10 })
        );
        h.video("y", mins(9));
        assert!(h.ctl.submit("youtu.be/y", "ann").await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn bad_links_and_lookup_failures() {
        let h = harness();
        assert_eq!(h.ctl.submit("https://vimeo.com/1", "ann").await, Err(RequestErr::InvalidLink));
        assert_eq!(h.ctl.submit("youtu.be/unknown", "ann").await, Err(RequestErr::InvalidLink));
        *h.meta.down.lock().unwrap() = true;
        assert_eq!(
            h.ctl.submit("youtu.be/abc", "ann").await,
            Err(RequestErr::MetadataLookupFailed)
        );
        assert!(h.deck.list().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn idle_queries() {
        let h = harness();
        assert_eq!(h.ctl.currently_playing(), Err(RequestErr::NothingPlaying));
        assert_eq!(h.ctl.next_up(), Err(RequestErr::QueueEmpty));
        assert_eq!(h.ctl.like("ann"), Err(RequestErr::NothingPlaying));
        assert_eq!(
            h.ctl.queue_position("ann"),
            Ok("There are currently 0 songs in the queue".to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn playing_reply_shows_progress() {
        let h = harness();
        h.enqueue("a", "ben", mins(2));
        h.deck.start_next();
        tokio::time::advance(mins(1)).await;
        let reply = h.ctl.currently_playing().unwrap();
        assert!(reply.contains("`01:00/02:00`"), "{reply}");
        assert!(reply.ends_with("currently playing: 🎶 \"song a\" 🎶 requested by ben"), "{reply}");
    }

    #[tokio::test(start_paused = true)]
    async fn queue_position_lists_every_owned_entry() {
        let h = harness();
        h.enqueue("a", "ann", mins(3));
        h.enqueue("b", "ben", mins(4));
        h.enqueue("c", "ann", mins(5));
        assert_eq!(h.ctl.next_up(), Ok("up next: 'song a' requested by ann".to_string()));
        assert_eq!(
            h.ctl.queue_position("ann"),
            Ok("There are currently 3 songs in the queue, your song is in position 1 and will play in 00:00, your song is in position 3 and will play in 07:00".to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn like_is_idempotent_and_reported_at_song_end() {
        let h = harness();
        h.enqueue("a", "ben", mins(2));
        h.deck.start_next();
        assert_eq!(h.ctl.like("ann"), Ok("I will tell ben you liked \"song a\"".to_string()));
        assert_eq!(h.ctl.like("ann"), Err(RequestErr::AlreadyLiked));
        assert!(h.ctl.like("cat").is_ok());

        let (entry, _) = h.deck.current_item().unwrap();
        h.ctl.on_song_end(&entry).await;
        h.settle().await;
        assert_eq!(h.chat.texts_for("ben"), vec!["2 people really liked your song PeepoHappy"]);
        assert_eq!(h.store.saves(QUEUE_KEY), 1);

        // likes were reset; a song nobody liked sends nothing
        h.ctl.on_song_end(&entry).await;
        h.settle().await;
        assert_eq!(h.chat.texts_for("ben").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn toggle_updates_flips_and_persists() {
        let h = harness();
        let on = h.ctl.toggle_updates("ann").await.unwrap();
        assert!(on.starts_with("You will now get a message"));
        let off = h.ctl.toggle_updates("ann").await.unwrap();
        assert_eq!(off, "You will no longer get notifications.");
        assert_eq!(h.store.saves(SUBSCRIBERS_KEY), 2);
        let saved: Vec<String> =
            crate::store::load_json(h.store.as_ref(), SUBSCRIBERS_KEY).await.unwrap();
        assert!(saved.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn remove_checks_argument_range_and_permission() {
        let h = harness();
        h.enqueue("a", "ann", mins(3));
        h.enqueue("b", "ben", mins(3));

        assert_eq!(h.ctl.remove_by_index("x", "ann").await, Err(RequestErr::InvalidArgument));
        assert_eq!(h.ctl.remove_by_index("7", "ann").await, Err(RequestErr::IndexOutOfRange));
        assert_eq!(h.ctl.remove_by_index("-1", "ann").await, Err(RequestErr::IndexOutOfRange));
        assert_eq!(
            h.ctl.remove_by_index("0", "cat").await,
            Err(RequestErr::NotAuthorized { nick: "cat".into() })
        );
        assert_eq!(h.deck.list().len(), 2);

        assert!(h.ctl.remove_by_index("1", "ben").await.is_ok());
        assert!(h.ctl.remove_by_index("0", "mod").await.is_ok());
        assert!(h.deck.list().is_empty());
        assert_eq!(h.store.saves(QUEUE_KEY), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn literal_removal_policy_requires_both() {
        let cfg = Config {
            moderators: vec!["mod".into()],
            removal_policy: RemovalPolicy::OwnerAndModerator,
            ..Config::default()
        };
        let h = build(cfg, SlowHost::new(Duration::from_millis(10)));
        h.enqueue("a", "ann", mins(3));
        h.enqueue("b", "mod", mins(3));
        assert!(matches!(h.ctl.remove_by_index("0", "ann").await, Err(RequestErr::NotAuthorized { .. })));
        assert!(matches!(h.ctl.remove_by_index("0", "mod").await, Err(RequestErr::NotAuthorized { .. })));
        assert!(h.ctl.remove_by_index("1", "mod").await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn dedication_goes_to_first_owned_entry() {
        let h = harness();
        assert_eq!(h.ctl.dedicate("cat", "ann").await, Err(RequestErr::NoQueuedSong));
        h.enqueue("a", "ben", mins(3));
        h.enqueue("b", "ann", mins(3));
        h.enqueue("c", "ann", mins(3));

        assert_eq!(h.ctl.dedicate(" cat ", "ann").await, Ok("Dedicated song b to cat".to_string()));
        let q = h.deck.list();
        assert_eq!(q[1].dedication.as_deref(), Some("cat"));
        assert_eq!(q[2].dedication, None);
        assert_eq!(h.store.saves(QUEUE_KEY), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn new_song_fans_out_notifications() {
        let h = harness();
        h.ctl.toggle_updates("cat").await.unwrap();
        h.ctl.toggle_updates("ghost").await.unwrap();
        h.enqueue("a", "ann", mins(3));
        h.ctl.dedicate("ben", "ann").await.unwrap();
        h.settle().await;

        let entry = h.deck.start_next().unwrap();
        h.ctl.on_new_song(&entry).await;
        h.settle().await;

        assert_eq!(h.chat.texts_for("cat").last().map(String::as_str), Some("Now Playing ann's request: song a"));
        assert_eq!(h.chat.texts_for("ben"), vec!["ann dedicated this song to you."]);
        assert_eq!(h.chat.texts_for("ann"), vec!["Playing your song now"]);
        assert!(h.chat.texts_for("ghost").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn playlist_is_published_once_per_change() {
        let h = harness();
        h.enqueue("a", "ann", mins(3));
        let first = h.ctl.playlist_link().await.unwrap();
        assert_eq!(first, "you can find the current playlist here: https://primary.test/raw/1");
        assert_eq!(h.ctl.playlist_link().await.unwrap(), first);
        assert_eq!(h.primary.calls(), 1);

        h.video("b", mins(3));
        h.ctl.submit("youtu.be/b", "ben").await.unwrap();
        let second = h.ctl.playlist_link().await.unwrap();
        assert!(second.ends_with("/raw/2"));
        assert_eq!(h.primary.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_publish_keeps_playlist_dirty() {
        let h = build(Config::default(), SlowHost::failing());
        assert_eq!(h.ctl.playlist_link().await, Err(RequestErr::PublishFailed));
        assert_eq!(h.ctl.playlist_link().await, Err(RequestErr::PublishFailed));
        assert_eq!(h.primary.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_primary_publishes_through_fallback() {
        let h = build(Config::default(), SlowHost::new(Duration::from_secs(5)));
        h.enqueue("a", "ann", mins(3));
        let reply = h.ctl.playlist_link().await.unwrap();
        assert_eq!(reply, "you can find the current playlist here: https://fallback.test/f.txt");
        let seen = h.fallback.seen.lock().unwrap();
        assert!(seen[0].1.contains("song a"));
    }

    #[tokio::test(start_paused = true)]
    async fn event_pump_drives_callbacks() {
        let h = harness();
        h.ctl.toggle_updates("cat").await.unwrap();
        let (tx, rx) = mpsc::channel(4);
        tokio::spawn(h.ctl.clone().run_events(rx));

        let entry = QueueEntry::new(media("a", mins(1)), "ann");
        tx.send(EngineEvent::NewSong(entry.clone())).await.unwrap();
        tx.send(EngineEvent::PlaybackError("boom".into())).await.unwrap();
        tx.send(EngineEvent::SongEnd(entry)).await.unwrap();
        h.settle().await;

        assert!(h.chat.texts_for("cat").contains(&"Now Playing ann's request: song a".to_string()));
        assert_eq!(h.store.saves(QUEUE_KEY), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn likes_stay_with_the_song_they_were_made_on() {
        let cfg = Config { moderators: vec!["mod".into()], ..Config::default() };
        let store = Arc::new(MemoryStore::slow(Duration::from_secs(2)));
        let h = build_with_store(cfg, SlowHost::new(Duration::from_millis(10)), store);
        h.enqueue("a", "ann", mins(1));
        h.enqueue("b", "ben", mins(10));

        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(h.ctl.clone().run_events(rx));
        tokio::spawn(h.deck.clone().run(Arc::new(ClockPlayer), tx));

        // b has started while a's end-of-song persist is still in flight
        tokio::time::sleep(Duration::from_millis(60_500)).await;
        assert_eq!(h.deck.current_item().map(|(e, _)| e.owner), Some("ben".to_string()));
        assert_eq!(h.ctl.like("cat"), Ok("I will tell ben you liked \"song b\"".to_string()));

        h.settle().await;
        assert_eq!(h.ctl.like("cat"), Err(RequestErr::AlreadyLiked));
        assert_eq!(h.chat.texts_for("ann"), vec!["Playing your song now"]);

        tokio::time::sleep(mins(10)).await;
        assert_eq!(
            h.chat.texts_for("ben"),
            vec!["Playing your song now", "1 person really liked your song PeepoHappy"]
        );
    }

    /// Engine whose position and wait lists disagree.
    struct Skewed;

    impl QueueEngine for Skewed {
        fn append(&self, _entry: QueueEntry) {}
        fn remove_at(&self, index: usize) -> Result<QueueEntry, EngineErr> {
            Err(EngineErr::OutOfRange(index))
        }
        fn replace_at(&self, index: usize, _entry: QueueEntry) -> Result<(), EngineErr> {
            Err(EngineErr::OutOfRange(index))
        }
        fn entry_at(&self, index: usize) -> Result<QueueEntry, EngineErr> {
            Err(EngineErr::OutOfRange(index))
        }
        fn list(&self) -> Vec<QueueEntry> {
            vec![QueueEntry::new(media("a", mins(3)), "ann")]
        }
        fn current_item(&self) -> Option<(QueueEntry, Duration)> {
            None
        }
        fn positions_of(&self, _user: &str) -> Vec<usize> {
            vec![0]
        }
        fn durations_until(&self, _user: &str) -> Vec<Duration> {
            Vec::new()
        }
    }

    #[tokio::test]
    async fn mismatched_positions_surface_as_a_generic_error() {
        let store = Arc::new(MemoryStore::default());
        let (notifier, _dispatcher) =
            dispatch::channel(FakeChat::with(&["ann"]), 10, Duration::from_millis(450));
        let scratch = tempfile::tempdir().unwrap();
        let ctl = Controller::new(
            QueueFacade::new(Arc::new(Skewed), store.clone()),
            store,
            Arc::new(FakeMeta::default()),
            TextPublisher::new(
                SlowHost::new(Duration::ZERO),
                Arc::new(CapturingFileHost::default()),
                Duration::from_secs(1),
                scratch.path().to_path_buf(),
            ),
            notifier,
            UserSet::default(),
            &Config::default(),
        );

        let reply = ctl.queue_position("ann");
        assert_eq!(reply, Err(RequestErr::InternalInconsistency));
        assert_eq!(reply.unwrap_err().to_string(), "there was an error");
    }
}
