use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

pub type Tx = mpsc::UnboundedSender<String>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/* ------------ user sets (likers / update subscribers) ------------ */

/// Order-preserving set of nicks. The lock is held only inside each call,
/// so iteration goes through [`UserSet::snapshot`].
#[derive(Debug, Default)]
pub struct UserSet {
    users: Mutex<Vec<String>>,
}

impl UserSet {
    pub fn new<I: IntoIterator<Item = String>>(users: I) -> Self {
        let set = Self::default();
        for u in users {
            set.add(&u);
        }
        set
    }

    /// Returns `false` when the nick was already present.
    pub fn add(&self, nick: &str) -> bool {
        let mut users = lock(&self.users);
        if users.iter().any(|u| u == nick) {
            return false;
        }
        users.push(nick.to_string());
        true
    }

    pub fn remove(&self, nick: &str) -> bool {
        let mut users = lock(&self.users);
        let before = users.len();
        users.retain(|u| u != nick);
        users.len() != before
    }

    /// Flips membership and returns the new state.
    pub fn toggle(&self, nick: &str) -> bool {
        let mut users = lock(&self.users);
        if let Some(i) = users.iter().position(|u| u == nick) {
            users.remove(i);
            false
        } else {
            users.push(nick.to_string());
            true
        }
    }

    pub fn contains(&self, nick: &str) -> bool {
        lock(&self.users).iter().any(|u| u == nick)
    }

    /// Empties the set, returning how many members it had.
    pub fn clear(&self) -> usize {
        let mut users = lock(&self.users);
        let n = users.len();
        users.clear();
        n
    }

    pub fn len(&self) -> usize {
        lock(&self.users).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<String> {
        lock(&self.users).clone()
    }
}

/* ------------ likes for the playing song ------------ */

/// Likers of one song. A like for a different song starts a fresh set, so
/// late end-of-song bookkeeping never sees likes made on its successor.
#[derive(Debug, Default)]
pub struct SongLikes {
    song:  Mutex<Option<Uuid>>,
    users: UserSet,
}

impl SongLikes {
    /// Returns `false` when `nick` already liked `song`.
    pub fn add(&self, song: Uuid, nick: &str) -> bool {
        let mut current = lock(&self.song);
        if *current != Some(song) {
            self.users.clear();
            *current = Some(song);
        }
        self.users.add(nick)
    }

    /// Number of likes `song` got; resets the set if it belonged to `song`.
    pub fn take(&self, song: Uuid) -> usize {
        let mut current = lock(&self.song);
        if *current != Some(song) {
            return 0;
        }
        *current = None;
        self.users.clear()
    }
}

/* ------------ playlist link cache ------------ */

#[derive(Debug, Default)]
struct LinkState {
    url:   Option<String>,
    epoch: u64,
}

/// Cached playlist url. Dirty whenever no url is held for the current epoch.
#[derive(Debug, Default)]
pub struct PlaylistLink {
    state: Mutex<LinkState>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Lookup {
    Fresh(String),
    /// Needs a new upload; carries the epoch the upload will be valid for.
    Stale(u64),
}

impl PlaylistLink {
    pub fn invalidate(&self) {
        let mut st = lock(&self.state);
        st.url = None;
        st.epoch += 1;
    }

    pub fn lookup(&self) -> Lookup {
        let st = lock(&self.state);
        match &st.url {
            Some(url) => Lookup::Fresh(url.clone()),
            None      => Lookup::Stale(st.epoch),
        }
    }

    /// Caches `url` unless the queue changed since `epoch` was handed out.
    pub fn store(&self, url: &str, epoch: u64) -> bool {
        let mut st = lock(&self.state);
        if st.epoch != epoch {
            return false;
        }
        st.url = Some(url.to_string());
        true
    }
}

/* ------------ chat hub: connected sockets per nick ------------ */

#[derive(Default)]
pub struct ChatHub {
    users: RwLock<HashMap<String, Vec<(Uuid, Tx)>>>,
}
pub type Hub = Arc<ChatHub>;

impl ChatHub {
    pub async fn join(&self, nick: &str, tx: Tx) -> Uuid {
        let id = Uuid::new_v4();
        self.users.write().await.entry(nick.to_string()).or_default().push((id, tx));
        id
    }

    pub async fn leave(&self, nick: &str, id: Uuid) {
        let mut users = self.users.write().await;
        if let Some(socks) = users.get_mut(nick) {
            socks.retain(|(sid, _)| *sid != id);
            if socks.is_empty() {
                users.remove(nick);
            }
        }
    }

    pub async fn is_online(&self, nick: &str) -> bool {
        self.users.read().await.contains_key(nick)
    }

    /// Pushes a frame to every socket of `nick`; false if none accepted it.
    pub async fn deliver(&self, nick: &str, frame: String) -> bool {
        let users = self.users.read().await;
        let Some(socks) = users.get(nick) else { return false };
        let mut sent = false;
        for (_, tx) in socks {
            sent |= tx.send(frame.clone()).is_ok();
        }
        sent
    }
}
