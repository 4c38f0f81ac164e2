use std::path::Path;

use serde::Deserialize;
use taxi_ingest::{ObjectStore, ObjectStoreError};

use crate::USER_AGENT;

/// Configuration for a Cloud Storage bucket.
#[derive(Debug, Clone)]
pub struct GcsConfig {
    pub bucket: String,
    /// Project that owns newly created buckets.
    pub project: Option<String>,
    pub location: String,
    /// OAuth bearer token.
    pub token: Option<String>,
    pub api_base_url: Option<String>,
}

impl GcsConfig {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            project: None,
            location: "US".to_owned(),
            token: None,
            api_base_url: None,
        }
    }
}

/// Object store backed by the Cloud Storage JSON API.
pub struct GcsObjectStore {
    config: GcsConfig,
    client: reqwest::Client,
}

impl GcsObjectStore {
    pub fn new(config: GcsConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn api_base(&self) -> &str {
        self.config
            .api_base_url
            .as_deref()
            .unwrap_or("https://storage.googleapis.com")
    }

    /// `{base}/{segments...}` with each segment percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<reqwest::Url, ObjectStoreError> {
        let mut url = reqwest::Url::parse(self.api_base())
            .map_err(|e| ObjectStoreError::Other(format!("invalid API base URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| ObjectStoreError::Other("API base URL cannot take a path".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let req = req.header("User-Agent", USER_AGENT);
        match &self.config.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn send(
        &self,
        req: reqwest::RequestBuilder,
        what: &str,
    ) -> Result<reqwest::Response, ObjectStoreError> {
        let response = self
            .authorize(req)
            .send()
            .await
            .map_err(|e| ObjectStoreError::Network(format!("{what} failed: {e}")))?;

        if response.status().as_u16() == 404 {
            return Err(ObjectStoreError::NotFound(what.to_owned()));
        }

        if !response.status().is_success() {
            return Err(ObjectStoreError::Network(format!(
                "{what} returned HTTP {}: {}",
                response.status(),
                response
                    .text()
                    .await
                    .unwrap_or_else(|_| "unknown".into())
            )));
        }

        Ok(response)
    }
}

#[async_trait::async_trait]
impl ObjectStore for GcsObjectStore {
    fn scheme(&self) -> &str {
        "gs"
    }

    fn bucket(&self) -> &str {
        &self.config.bucket
    }

    async fn bucket_exists(&self) -> Result<bool, ObjectStoreError> {
        let url = self.endpoint(&["storage", "v1", "b", &self.config.bucket])?;
        match self.send(self.client.get(url), "bucket lookup").await {
            Ok(_) => Ok(true),
            Err(ObjectStoreError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn create_bucket(&self) -> Result<(), ObjectStoreError> {
        let project = self.config.project.as_deref().ok_or_else(|| {
            ObjectStoreError::Other(format!(
                "cannot create bucket {} without a project",
                self.config.bucket
            ))
        })?;

        let mut url = self.endpoint(&["storage", "v1", "b"])?;
        url.query_pairs_mut().append_pair("project", project);

        let body = serde_json::json!({
            "name": self.config.bucket,
            "location": self.config.location,
        });

        self.send(self.client.post(url).json(&body), "bucket creation")
            .await?;
        log::info!("created bucket {}", self.config.bucket);
        Ok(())
    }

    async fn upload(&self, local: &Path, key: &str) -> Result<(), ObjectStoreError> {
        let body = tokio::fs::read(local).await?;

        let mut url = self.endpoint(&["upload", "storage", "v1", "b", &self.config.bucket, "o"])?;
        url.query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("name", key);

        let req = self
            .client
            .post(url)
            .header("Content-Type", "application/octet-stream")
            .body(body);

        self.send(req, &format!("upload of {key}")).await?;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, ObjectStoreError> {
        let mut keys = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = self.endpoint(&["storage", "v1", "b", &self.config.bucket, "o"])?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("prefix", prefix);
                if let Some(token) = &page_token {
                    query.append_pair("pageToken", token);
                }
            }

            let page: ListResponse = self
                .send(self.client.get(url), "object listing")
                .await?
                .json()
                .await
                .map_err(|e| ObjectStoreError::Other(format!("failed to parse listing: {e}")))?;

            keys.extend(page.items.into_iter().map(|item| item.name));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        keys.sort();
        Ok(keys)
    }

    async fn download(&self, key: &str) -> Result<Vec<u8>, ObjectStoreError> {
        let mut url = self.endpoint(&["storage", "v1", "b", &self.config.bucket, "o", key])?;
        url.query_pairs_mut().append_pair("alt", "media");

        let bytes = self
            .send(self.client.get(url), key)
            .await?
            .bytes()
            .await
            .map_err(|e| ObjectStoreError::Network(format!("reading {key} failed: {e}")))?;

        Ok(bytes.to_vec())
    }
}

/// Response from `GET /storage/v1/b/{bucket}/o`.
#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    items: Vec<ObjectEntry>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ObjectEntry {
    name: String,
}
