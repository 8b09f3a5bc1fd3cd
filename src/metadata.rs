//! Link recognition and title/duration lookup.

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::{
    engine::Media,
    error::{upstream, AppResult},
};

pub const WATCH_URL: &str = "https://www.youtube.com/watch?v=";
pub const DEFAULT_API_BASE: &str = "https://www.googleapis.com/youtube/v3";

static LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:youtube\.com/watch\?v=|youtu\.be/)([A-Za-z0-9_-]+)").expect("valid link regex")
});

static ISO_DURATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^P(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)S)?)?$").expect("valid duration regex")
});

/// Video id from the first recognised link in `text`.
pub fn extract_id(text: &str) -> Option<&str> {
    LINK.captures(text).and_then(|c| c.get(1)).map(|m| m.as_str())
}

pub fn contains_link(text: &str) -> bool {
    LINK.is_match(text)
}

/// `PT1H2M3S` style durations as returned by the Data API.
pub fn parse_iso_duration(raw: &str) -> Option<Duration> {
    let caps = ISO_DURATION.captures(raw)?;
    let part = |i: usize| -> Option<u64> {
        caps.get(i).map_or(Some(0), |m| m.as_str().parse().ok())
    };
    // None on overflow
    let secs = [(1, 86_400), (2, 3_600), (3, 60), (4, 1)]
        .into_iter()
        .try_fold(0u64, |acc, (i, unit)| part(i)?.checked_mul(unit)?.checked_add(acc))?;
    Some(Duration::from_secs(secs))
}

#[async_trait::async_trait]
pub trait MetadataService: Send + Sync {
    /// `Ok(None)` when the id does not resolve to a playable video.
    async fn resolve(&self, id: &str) -> AppResult<Option<Media>>;
}

pub struct YouTubeApi {
    client:  Client,
    base:    String,
    api_key: String,
}

impl YouTubeApi {
    pub fn new(client: Client, base: &str, api_key: &str) -> Self {
        Self {
            client,
            base: base.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }
}

#[derive(Deserialize)]
struct VideoList {
    #[serde(default)]
    items: Vec<Video>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Video {
    id:              String,
    snippet:         Snippet,
    content_details: ContentDetails,
}

#[derive(Deserialize)]
struct Snippet {
    title: String,
}

#[derive(Deserialize)]
struct ContentDetails {
    duration: String,
}

#[async_trait::async_trait]
impl MetadataService for YouTubeApi {
    async fn resolve(&self, id: &str) -> AppResult<Option<Media>> {
        let list: VideoList = self
            .client
            .get(format!("{}/videos", self.base))
            .query(&[("part", "snippet,contentDetails"), ("id", id), ("key", self.api_key.as_str())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let Some(video) = list.items.into_iter().next() else { return Ok(None) };
        let duration = parse_iso_duration(&video.content_details.duration)
            .ok_or_else(|| upstream(format!("bad duration {:?}", video.content_details.duration)))?;
        // live streams report P0D and cannot be queued
        if duration.is_zero() {
            return Ok(None);
        }
        Ok(Some(Media {
            title: video.snippet.title,
            url: format!("{WATCH_URL}{}", video.id),
            duration,
        }))
    }
}
