use std::path::{Path, PathBuf};

use taxi_ingest::{Downloader, FetchError};
use tokio::io::AsyncWriteExt;

use crate::USER_AGENT;

/// Streams remote files to disk over HTTP(S).
///
/// The body is written to `<dest>.part` and renamed into place once
/// complete, so `dest` only ever appears fully written.
#[derive(Clone, Default)]
pub struct HttpDownloader {
    client: reqwest::Client,
}

impl HttpDownloader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn stream_to(&self, url: &str, path: &Path) -> Result<u64, FetchError> {
        let mut response = self
            .client
            .get(url)
            .header("User-Agent", USER_AGENT)
            .send()
            .await
            .map_err(|e| FetchError::Network(format!("request to {url} failed: {e}")))?;

        if !response.status().is_success() {
            return Err(FetchError::Status {
                url: url.to_owned(),
                status: response.status().as_u16(),
            });
        }

        let mut file = tokio::fs::File::create(path).await?;
        let mut written = 0u64;

        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| FetchError::Network(format!("reading body of {url} failed: {e}")))?
        {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }

        file.flush().await?;
        Ok(written)
    }
}

#[async_trait::async_trait]
impl Downloader for HttpDownloader {
    async fn download(&self, url: &str, dest: &Path) -> Result<u64, FetchError> {
        let partial = partial_path(dest);

        match self.stream_to(url, &partial).await {
            Ok(bytes) => {
                tokio::fs::rename(&partial, dest).await?;
                Ok(bytes)
            }
            Err(e) => {
                if let Err(cleanup) = tokio::fs::remove_file(&partial).await
                    && cleanup.kind() != std::io::ErrorKind::NotFound
                {
                    log::warn!("could not remove {}: {cleanup}", partial.display());
                }
                Err(e)
            }
        }
    }
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_path_appends_suffix() {
        assert_eq!(
            partial_path(Path::new("/data/yellow_tripdata_2019-01.csv.gz")),
            PathBuf::from("/data/yellow_tripdata_2019-01.csv.gz.part")
        );
    }
}
