use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{path::Path, time::Duration};

/// Who may remove an entry from the queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalPolicy {
    /// Owners remove their own entries, moderators remove anything.
    #[default]
    OwnerOrModerator,
    /// Only a moderator removing their own entry.
    OwnerAndModerator,
}

impl RemovalPolicy {
    pub fn allows(self, is_owner: bool, is_moderator: bool) -> bool {
        match self {
            RemovalPolicy::OwnerOrModerator  => is_owner || is_moderator,
            RemovalPolicy::OwnerAndModerator => is_owner && is_moderator,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bind:                String,
    pub bot_nick:            String,
    pub jwt_secret:          String,
    pub api_key:             String,
    pub api_base:            String,
    pub moderators:          Vec<String>,
    pub rtmp:                String,
    pub player_command:      Option<Vec<String>>,
    pub data_dir:            String,
    pub database_url:        Option<String>,
    pub haste_url:           String,
    pub fallback_url:        String,
    pub publish_deadline_ms: u64,
    pub send_interval_ms:    u64,
    pub dispatch_capacity:   usize,
    pub removal_policy:      RemovalPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind:                "0.0.0.0:3000".into(),
            bot_nick:            "dj".into(),
            jwt_secret:          String::new(),
            api_key:             String::new(),
            api_base:            crate::metadata::DEFAULT_API_BASE.into(),
            moderators:          Vec::new(),
            rtmp:                String::new(),
            player_command:      None,
            data_dir:            "data".into(),
            database_url:        None,
            haste_url:           "https://hastebin.com".into(),
            fallback_url:        "https://uguu.se/api.php?d=upload-tool".into(),
            publish_deadline_ms: 1_000,
            send_interval_ms:    450,
            dispatch_capacity:   100,
            removal_policy:      RemovalPolicy::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let cfg = serde_json::from_str(&content).context("Failed to parse config JSON")?;
        Ok(cfg)
    }

    /// Secrets may come from the environment instead of the file.
    pub fn apply_env(mut self) -> Self {
        if let Ok(v) = std::env::var("JWT_SECRET") { self.jwt_secret = v; }
        if let Ok(v) = std::env::var("YOUTUBE_API_KEY") { self.api_key = v; }
        if let Ok(v) = std::env::var("DATABASE_URL") { self.database_url = Some(v); }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.jwt_secret.is_empty() {
            bail!("jwt_secret is not set (config file or JWT_SECRET)");
        }
        if matches!(&self.player_command, Some(argv) if argv.is_empty()) {
            bail!("player_command must not be empty");
        }
        Ok(())
    }

    pub fn publish_deadline(&self) -> Duration {
        Duration::from_millis(self.publish_deadline_ms)
    }

    pub fn send_interval(&self) -> Duration {
        Duration::from_millis(self.send_interval_ms)
    }
}
