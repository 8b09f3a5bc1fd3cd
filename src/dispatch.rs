//! Outbound private messages: many producers, one rate-limited sender.

use std::{sync::Arc, time::Duration};
use tokio::{
    sync::mpsc,
    time::{self, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::error::AppResult;

pub const DEFAULT_CAPACITY: usize = 100;
pub const DEFAULT_SPACING: Duration = Duration::from_millis(450);

/// What the core needs from the chat side.
#[async_trait::async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_private(&self, nick: &str, text: &str) -> AppResult<()>;
    async fn is_present(&self, nick: &str) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub nick: String,
    pub text: String,
}

/// Producer handle. Cheap to clone.
#[derive(Clone)]
pub struct Notifier {
    tx:   mpsc::Sender<OutgoingMessage>,
    chat: Arc<dyn ChatTransport>,
}

impl Notifier {
    /// Queues a message for `nick`. Absent recipients are dropped here;
    /// a full queue makes the caller wait.
    pub async fn send(&self, nick: &str, text: impl Into<String>) {
        if !self.chat.is_present(nick).await {
            debug!("dropping message for {nick}: not in chat");
            return;
        }
        let msg = OutgoingMessage { nick: nick.to_string(), text: text.into() };
        if self.tx.send(msg).await.is_err() {
            warn!("dispatcher is gone, message for {nick} lost");
        }
    }
}

pub struct Dispatcher {
    rx:      mpsc::Receiver<OutgoingMessage>,
    chat:    Arc<dyn ChatTransport>,
    spacing: Duration,
}

pub fn channel(
    chat: Arc<dyn ChatTransport>,
    capacity: usize,
    spacing: Duration,
) -> (Notifier, Dispatcher) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        Notifier { tx, chat: chat.clone() },
        Dispatcher { rx, chat, spacing },
    )
}

impl Dispatcher {
    /// Delivers until every [`Notifier`] is dropped. Delivery is best effort.
    pub async fn run(mut self) {
        let mut tick = time::interval(self.spacing.max(Duration::from_millis(1)));
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        while let Some(msg) = self.rx.recv().await {
            tick.tick().await;
            match self.chat.send_private(&msg.nick, &msg.text).await {
                Ok(()) => debug!("message sent to {}: {}", msg.nick, msg.text),
                Err(e) => warn!("failed to send message to {}: {e}", msg.nick),
            }
        }
        info!("dispatcher stopped");
    }
}
