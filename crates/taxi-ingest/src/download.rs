use std::path::Path;
use std::sync::Arc;

/// Errors that can occur while downloading a remote file.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for FetchError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

/// Transport that copies a remote file to a local path.
#[async_trait::async_trait]
pub trait Downloader: Send + Sync {
    /// Download `url` into `dest`. On error `dest` must not exist afterwards.
    async fn download(&self, url: &str, dest: &Path) -> Result<u64, FetchError>;
}

#[async_trait::async_trait]
impl<T: Downloader + ?Sized> Downloader for Arc<T> {
    async fn download(&self, url: &str, dest: &Path) -> Result<u64, FetchError> {
        (**self).download(url, dest).await
    }
}
