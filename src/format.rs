use std::{fmt::Write, time::Duration};

use crate::engine::QueueEntry;

/// `H:MM:SS` from one hour up, `MM:SS` below.
pub fn fmt_duration(d: Duration) -> String {
    let s = d.as_secs();
    let (h, m, s) = (s / 3600, (s % 3600) / 60, s % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m:02}:{s:02}")
    }
}

pub fn duration_bar(width: usize, elapsed: Duration, total: Duration) -> String {
    let filled = if total.is_zero() {
        width
    } else {
        let ratio = elapsed.as_secs_f64() / total.as_secs_f64();
        ((ratio * width as f64).round() as usize).min(width)
    };
    let mut bar = "█".repeat(filled);
    bar.push_str(&"░".repeat(width - filled));
    bar
}

pub fn people(n: usize) -> &'static str {
    if n == 1 { "person" } else { "people" }
}

/// Plain-text rendering of the whole queue for the playlist link.
pub fn playlist(queue: &[QueueEntry], current: Option<&QueueEntry>) -> String {
    let mut out = String::new();
    if let Some(e) = current {
        let _ = writeln!(out, "Now playing: {} [{}] {}", e.media.title, fmt_duration(e.media.duration), e.media.url);
        let _ = writeln!(out, "    requested by {}", e.owner);
        let _ = writeln!(out);
    }
    if queue.is_empty() {
        out.push_str("The queue is empty.\n");
        return out;
    }
    for (i, e) in queue.iter().enumerate() {
        let _ = writeln!(out, "{}. {} [{}] {}", i, e.media.title, fmt_duration(e.media.duration), e.media.url);
        let dedication = e
            .dedication
            .as_ref()
            .map(|to| format!(", dedicated to {to}"))
            .unwrap_or_default();
        let _ = writeln!(out, "    requested by {}{dedication}", e.owner);
    }
    out
}
