use async_trait::async_trait;
use reqwest::{Client, Url};
use std::fmt;

use crate::models::{ComicEntry, Library, SeriesKey};
use crate::store::StoreError;

#[derive(Debug)]
pub enum LibraryError {
    HttpError(String),
    /// The endpoint answered with a non-success status.
    Status(u16),
    ParseError(String),
    NotFound(String),
    /// A single download larger than the whole storage quota.
    TooLarge { comic_id: String, bytes: usize },
    Store(StoreError),
}

impl fmt::Display for LibraryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LibraryError::HttpError(msg) => write!(f, "HTTP error: {}", msg),
            LibraryError::Status(code) => write!(f, "Server answered {}", code),
            LibraryError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            LibraryError::NotFound(what) => write!(f, "Not found: {}", what),
            LibraryError::TooLarge { comic_id, bytes } => {
                write!(f, "Comic {} ({} bytes) exceeds the storage quota", comic_id, bytes)
            }
            LibraryError::Store(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for LibraryError {}

impl From<StoreError> for LibraryError {
    fn from(e: StoreError) -> Self {
        LibraryError::Store(e)
    }
}

impl From<reqwest::Error> for LibraryError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            LibraryError::ParseError(e.to_string())
        } else {
            LibraryError::HttpError(e.to_string())
        }
    }
}

/// Read side of the remote library.
#[async_trait]
pub trait LibraryApi: Send + Sync {
    /// The whole tree, comic lists included.
    async fn fetch_full(&self) -> Result<Library, LibraryError>;

    /// Folder, publisher and series skeleton without comic lists.
    async fn fetch_structure(&self) -> Result<Library, LibraryError>;

    async fn fetch_series(&self, key: &SeriesKey) -> Result<Vec<ComicEntry>, LibraryError>;

    /// Archive bytes of one comic.
    async fn download(&self, comic_id: &str) -> Result<Vec<u8>, LibraryError>;
}

pub struct HttpLibraryApi {
    client: Client,
    base: Url,
}

impl HttpLibraryApi {
    pub fn new(client: Client, server_url: &str) -> Result<Self, LibraryError> {
        let base = Url::parse(server_url).map_err(|e| LibraryError::ParseError(e.to_string()))?;
        Ok(Self { client, base })
    }

    fn url(&self, segments: &[&str]) -> Result<Url, LibraryError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| LibraryError::ParseError(format!("{} cannot be a base URL", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get(&self, url: Url) -> Result<reqwest::Response, LibraryError> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(LibraryError::Status(response.status().as_u16()));
        }
        Ok(response)
    }
}

#[async_trait]
impl LibraryApi for HttpLibraryApi {
    async fn fetch_full(&self) -> Result<Library, LibraryError> {
        let url = self.url(&["api", "v1", "comics"])?;
        Ok(self.get(url).await?.json().await?)
    }

    async fn fetch_structure(&self) -> Result<Library, LibraryError> {
        let url = self.url(&["api", "v1", "comics", "structure"])?;
        Ok(self.get(url).await?.json().await?)
    }

    async fn fetch_series(&self, key: &SeriesKey) -> Result<Vec<ComicEntry>, LibraryError> {
        let url = self.url(&[
            "api",
            "v1",
            "comics",
            "series",
            &key.root_folder,
            &key.publisher,
            &key.series_name,
        ])?;
        Ok(self.get(url).await?.json().await?)
    }

    async fn download(&self, comic_id: &str) -> Result<Vec<u8>, LibraryError> {
        let url = self.url(&["api", "v1", "comics", "download", comic_id])?;
        let bytes = self.get(url).await?.bytes().await?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_series_url_encodes_segments() {
        let api = HttpLibraryApi::new(Client::new(), "http://nas.local:3000/").unwrap();
        let url = api
            .url(&["api", "v1", "comics", "series", "Comics", "DC Comics", "Batman/Superman"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://nas.local:3000/api/v1/comics/series/Comics/DC%20Comics/Batman%2FSuperman"
        );
    }
}
