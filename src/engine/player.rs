use tokio::process::Command;

use super::QueueEntry;
use crate::error::{upstream, AppErr, AppResult};

/// Something that plays one entry to completion.
#[async_trait::async_trait]
pub trait Player: Send + Sync {
    async fn play(&self, entry: &QueueEntry) -> AppResult<()>;
}

/// Waits out the media duration; used when no external player is configured.
pub struct ClockPlayer;

#[async_trait::async_trait]
impl Player for ClockPlayer {
    async fn play(&self, entry: &QueueEntry) -> AppResult<()> {
        tokio::time::sleep(entry.media.duration).await;
        Ok(())
    }
}

/// Runs an external command per entry, e.g. an ffmpeg pipeline to `rtmp`.
/// `{url}` and `{rtmp}` in the argv template are substituted.
pub struct CommandPlayer {
    argv: Vec<String>,
    rtmp: String,
}

impl CommandPlayer {
    pub fn new(argv: Vec<String>, rtmp: String) -> AppResult<Self> {
        if argv.is_empty() {
            return Err(AppErr::Bad("player command is empty".into()));
        }
        Ok(Self { argv, rtmp })
    }

    fn render(&self, entry: &QueueEntry) -> Vec<String> {
        self.argv
            .iter()
            .map(|a| a.replace("{url}", &entry.media.url).replace("{rtmp}", &self.rtmp))
            .collect()
    }
}

#[async_trait::async_trait]
impl Player for CommandPlayer {
    async fn play(&self, entry: &QueueEntry) -> AppResult<()> {
        let argv = self.render(entry);
        let status = Command::new(&argv[0])
            .args(&argv[1..])
            .kill_on_drop(true)
            .status()
            .await?;
        if !status.success() {
            return Err(upstream(format!("player exited with {status}")));
        }
        Ok(())
    }
}
