//! Turns a text document into a shareable link.
//!
//! The primary paste host gets a fixed deadline. When it has not answered
//! by then the text is written to a scratch file and sent to the fallback
//! file host instead; a late primary answer is ignored.

use reqwest::{multipart, Client};
use serde::Deserialize;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tokio::{fs, time};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{upstream, AppResult};

pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(1);

#[async_trait::async_trait]
pub trait TextHost: Send + Sync {
    async fn upload(&self, text: &str) -> AppResult<String>;
}

#[async_trait::async_trait]
pub trait FileHost: Send + Sync {
    async fn upload_file(&self, path: &Path) -> AppResult<String>;
}

pub struct TextPublisher {
    primary:  Arc<dyn TextHost>,
    fallback: Arc<dyn FileHost>,
    deadline: Duration,
    scratch:  PathBuf,
}

impl TextPublisher {
    pub fn new(
        primary: Arc<dyn TextHost>,
        fallback: Arc<dyn FileHost>,
        deadline: Duration,
        scratch: PathBuf,
    ) -> Self {
        Self { primary, fallback, deadline, scratch }
    }

    pub async fn publish(&self, text: &str) -> AppResult<String> {
        let primary = self.primary.clone();
        let body = text.to_string();
        // detached: if the deadline wins, this keeps running and is ignored
        let call = tokio::spawn(async move { primary.upload(&body).await });

        match time::timeout(self.deadline, call).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(upstream(join)),
            Err(_) => {
                warn!("paste host took longer than {:?}, using fallback", self.deadline);
                self.publish_fallback(text).await
            }
        }
    }

    async fn publish_fallback(&self, text: &str) -> AppResult<String> {
        let path = self.scratch.join(format!("playlist-{}.txt", Uuid::new_v4()));
        fs::write(&path, text).await?;
        let url = self.fallback.upload_file(&path).await;
        if let Err(e) = fs::remove_file(&path).await {
            warn!("could not remove {}: {e}", path.display());
        }
        url
    }
}

/* ------------ hastebin-style primary ------------ */
pub struct HasteHost {
    client: Client,
    base:   String,
}

impl HasteHost {
    pub fn new(client: Client, base: &str) -> Self {
        Self { client, base: base.trim_end_matches('/').to_string() }
    }
}

#[derive(Deserialize)]
struct HasteResp {
    key: String,
}

#[async_trait::async_trait]
impl TextHost for HasteHost {
    async fn upload(&self, text: &str) -> AppResult<String> {
        let resp: HasteResp = self
            .client
            .post(format!("{}/documents", self.base))
            .body(text.to_string())
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(format!("{}/raw/{}", self.base, resp.key))
    }
}

/* ------------ multipart file upload fallback ------------ */
pub struct FileUploadHost {
    client: Client,
    url:    String,
}

impl FileUploadHost {
    pub fn new(client: Client, url: &str) -> Self {
        Self { client, url: url.to_string() }
    }
}

#[async_trait::async_trait]
impl FileHost for FileUploadHost {
    async fn upload_file(&self, path: &Path) -> AppResult<String> {
        let data = fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "playlist.txt".into());
        let mime = mime_guess::from_path(path).first_or_octet_stream();
        let part = multipart::Part::bytes(data).file_name(name).mime_str(mime.as_ref())?;

        let body = self
            .client
            .post(&self.url)
            .multipart(multipart::Form::new().part("file", part))
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let url = body.trim();
        if url.is_empty() {
            return Err(upstream("file host returned an empty body"));
        }
        info!("uploaded {} to fallback host", path.display());
        Ok(url.to_string())
    }
}
