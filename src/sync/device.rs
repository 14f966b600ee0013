use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::store::StoreError;

#[derive(Debug)]
pub enum SyncError {
    HttpError(String),
    /// The remote authority answered with a non-success status.
    Rejected(u16),
    Timeout(Duration),
    /// No collaborator is available to deliver this kind of fact.
    Unavailable(&'static str),
    Store(StoreError),
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::HttpError(msg) => write!(f, "HTTP error: {}", msg),
            SyncError::Rejected(code) => write!(f, "Rejected by server with status {}", code),
            SyncError::Timeout(after) => write!(f, "Timed out after {} ms", after.as_millis()),
            SyncError::Unavailable(what) => write!(f, "{} is not available", what),
            SyncError::Store(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for SyncError {}

impl From<StoreError> for SyncError {
    fn from(e: StoreError) -> Self {
        SyncError::Store(e)
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        SyncError::HttpError(e.to_string())
    }
}

pub type SyncResult<T> = Result<T, SyncError>;

/// Reading position another device reported for a comic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteProgress {
    pub comic_id: String,
    pub page: i64,
    pub device_id: Option<String>,
    pub updated_at: Option<i64>,
}

/// Per-device progress delivery. Everything except `update_progress` has a
/// do-nothing default so partial collaborators stay cheap to write.
#[async_trait]
pub trait DeviceSync: Send + Sync {
    fn device_id(&self) -> &str;

    async fn update_progress(&self, comic_id: &str, page: i64) -> SyncResult<()>;

    /// Returns the remote position when another device is ahead of `page`.
    async fn check_sync_status(
        &self,
        _comic_id: &str,
        _page: i64,
    ) -> SyncResult<Option<RemoteProgress>> {
        Ok(None)
    }

    async fn start_polling(&self, _comic_id: &str) {}

    async fn stop_polling(&self) {}

    /// Positions found while polling. `None` when the collaborator never polls.
    fn remote_updates(&self) -> Option<broadcast::Receiver<RemoteProgress>> {
        None
    }

    /// Registers the device with the remote authority.
    async fn initialize(&self) -> SyncResult<()> {
        Ok(())
    }
}

/// Stand-in for environments without a device sync manager. Deliveries
/// fail, so progress stays queued instead of being marked as acknowledged.
pub struct NoopDeviceSync;

#[async_trait]
impl DeviceSync for NoopDeviceSync {
    fn device_id(&self) -> &str {
        "local"
    }

    async fn update_progress(&self, _comic_id: &str, _page: i64) -> SyncResult<()> {
        Err(SyncError::Unavailable("device sync"))
    }
}

const POLL_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProgressBody<'a> {
    comic_id: &'a str,
    page: i64,
    device_id: &'a str,
}

pub struct HttpDeviceSync {
    client: Client,
    base: Url,
    device_id: String,
    poller: Mutex<Option<JoinHandle<()>>>,
    remote_updates: broadcast::Sender<RemoteProgress>,
}

impl HttpDeviceSync {
    pub fn new(client: Client, server_url: &str, device_id: String) -> SyncResult<Self> {
        let base = Url::parse(server_url).map_err(|e| SyncError::HttpError(e.to_string()))?;
        let (remote_updates, _) = broadcast::channel(16);
        Ok(Self {
            client,
            base,
            device_id,
            poller: Mutex::new(None),
            remote_updates,
        })
    }

    fn url(&self, segments: &[&str]) -> SyncResult<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| SyncError::HttpError(format!("{} cannot be a base URL", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn fetch_remote(
        client: &Client,
        url: Url,
        page: i64,
        device_id: &str,
    ) -> SyncResult<Option<RemoteProgress>> {
        let response = client
            .get(url)
            .query(&[("page", page.to_string()), ("deviceId", device_id.to_string())])
            .send()
            .await?;

        match response.status().as_u16() {
            204 | 404 => Ok(None),
            code if !(200..300).contains(&code) => Err(SyncError::Rejected(code)),
            _ => {
                let remote: Option<RemoteProgress> = response.json().await?;
                Ok(remote.filter(|r| r.page > page))
            }
        }
    }
}

#[async_trait]
impl DeviceSync for HttpDeviceSync {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    async fn update_progress(&self, comic_id: &str, page: i64) -> SyncResult<()> {
        let url = self.url(&["api", "v1", "sync", "progress"])?;
        let response = self
            .client
            .post(url)
            .json(&ProgressBody {
                comic_id,
                page,
                device_id: &self.device_id,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SyncError::Rejected(response.status().as_u16()));
        }
        Ok(())
    }

    async fn check_sync_status(
        &self,
        comic_id: &str,
        page: i64,
    ) -> SyncResult<Option<RemoteProgress>> {
        let url = self.url(&["api", "v1", "sync", "check", comic_id])?;
        Self::fetch_remote(&self.client, url, page, &self.device_id).await
    }

    async fn start_polling(&self, comic_id: &str) {
        self.stop_polling().await;

        let url = match self.url(&["api", "v1", "sync", "check", comic_id]) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!("Cannot poll progress for {}: {}", comic_id, e);
                return;
            }
        };
        let client = self.client.clone();
        let device_id = self.device_id.clone();
        let updates = self.remote_updates.clone();
        let comic_id = comic_id.to_string();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(POLL_INTERVAL);
            let mut seen_page = -1;
            loop {
                interval.tick().await;
                match Self::fetch_remote(&client, url.clone(), seen_page, &device_id).await {
                    Ok(Some(remote)) => {
                        seen_page = remote.page;
                        tracing::debug!("Remote progress for {} is at page {}", comic_id, remote.page);
                        let _ = updates.send(remote);
                    }
                    Ok(None) => {}
                    Err(e) => tracing::debug!("Progress poll for {} failed: {}", comic_id, e),
                }
            }
        });

        *self.poller.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
    }

    async fn stop_polling(&self) {
        if let Some(handle) = self.poller.lock().unwrap_or_else(|e| e.into_inner()).take() {
            handle.abort();
        }
    }

    fn remote_updates(&self) -> Option<broadcast::Receiver<RemoteProgress>> {
        Some(self.remote_updates.subscribe())
    }

    async fn initialize(&self) -> SyncResult<()> {
        let url = self.url(&["api", "v1", "sync", "devices"])?;
        let response = self
            .client
            .post(url)
            .json(&serde_json::json!({ "deviceId": self.device_id }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SyncError::Rejected(response.status().as_u16()));
        }
        Ok(())
    }
}
