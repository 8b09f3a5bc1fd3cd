//! Chat message → controller operation.

use tracing::info;

use crate::{controller::Controller, metadata};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    Submit(&'a str),
    Playing,
    Next,
    Queue,
    Playlist,
    UpdateMe,
    Like,
    Remove(&'a str),
    Dedicate(&'a str),
}

/// `None` for messages the bot does not react to.
pub fn parse(text: &str) -> Option<Command<'_>> {
    let text = text.trim();
    if metadata::contains_link(text) {
        return Some(Command::Submit(text));
    }

    let (word, rest) = text
        .split_once(char::is_whitespace)
        .map(|(w, r)| (w, r.trim()))
        .unwrap_or((text, ""));
    match (word, rest.is_empty()) {
        ("-playing", true)  => Some(Command::Playing),
        ("-next", true)     => Some(Command::Next),
        ("-queue", true)    => Some(Command::Queue),
        ("-playlist", true) => Some(Command::Playlist),
        ("-updateme", true) => Some(Command::UpdateMe),
        ("-like", true)     => Some(Command::Like),
        ("-remove", _)      => Some(Command::Remove(rest)),
        ("-dedicate", _)    => Some(Command::Dedicate(rest)),
        _ => None,
    }
}

/// Handles one private message and queues the reply for its sender.
pub async fn route(ctl: &Controller, nick: &str, text: &str) {
    info!("new message from {nick}: {text}");
    let Some(cmd) = parse(text) else { return };

    let result = match cmd {
        Command::Submit(text)     => ctl.submit(text, nick).await,
        Command::Playing          => ctl.currently_playing(),
        Command::Next             => ctl.next_up(),
        Command::Queue            => ctl.queue_position(nick),
        Command::Playlist         => ctl.playlist_link().await,
        Command::UpdateMe         => ctl.toggle_updates(nick).await,
        Command::Like             => ctl.like(nick),
        Command::Remove(arg)      => ctl.remove_by_index(arg, nick).await,
        Command::Dedicate(target) => ctl.dedicate(target, nick).await,
    };
    let reply = result.unwrap_or_else(|e| e.to_string());
    ctl.notifier().send(nick, reply).await;
}
