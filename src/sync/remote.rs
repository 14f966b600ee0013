use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Serialize;

use crate::models::{ReadStatus, StatusEntry, StatusTarget};
use crate::sync::device::{SyncError, SyncResult};

/// Delivery of read/unread events to the remote authority.
#[async_trait]
pub trait StatusRemote: Send + Sync {
    async fn send_status(&self, entry: &StatusEntry) -> SyncResult<()>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ComicStatusBody<'a> {
    comic_id: &'a str,
    status: ReadStatus,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SeriesStatusBody<'a> {
    root_folder: &'a str,
    publisher: &'a str,
    series_name: &'a str,
    status: ReadStatus,
}

pub struct HttpStatusRemote {
    client: Client,
    comics_url: Url,
    series_url: Url,
}

impl HttpStatusRemote {
    pub fn new(client: Client, server_url: &str) -> SyncResult<Self> {
        let base = Url::parse(server_url).map_err(|e| SyncError::HttpError(e.to_string()))?;
        Ok(Self {
            comics_url: extend(&base, &["api", "v1", "comics", "status"])?,
            series_url: extend(&base, &["api", "v1", "series", "status"])?,
            client,
        })
    }
}

/// Appends to the base path instead of replacing it, so a server mounted
/// under a prefix keeps it.
fn extend(base: &Url, segments: &[&str]) -> SyncResult<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| SyncError::HttpError(format!("{} cannot be a base URL", base)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

#[async_trait]
impl StatusRemote for HttpStatusRemote {
    async fn send_status(&self, entry: &StatusEntry) -> SyncResult<()> {
        let request = match &entry.target {
            StatusTarget::Comic { comic_id } => self.client.post(self.comics_url.clone()).json(&ComicStatusBody {
                comic_id,
                status: entry.status,
            }),
            StatusTarget::Series(key) => self.client.post(self.series_url.clone()).json(&SeriesStatusBody {
                root_folder: &key.root_folder,
                publisher: &key.publisher,
                series_name: &key.series_name,
                status: entry.status,
            }),
        };

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(SyncError::Rejected(response.status().as_u16()));
        }
        Ok(())
    }
}
