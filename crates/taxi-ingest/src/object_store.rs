use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

/// Errors that can occur when talking to an object store.
#[derive(Debug, thiserror::Error)]
pub enum ObjectStoreError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("{0}")]
    Other(String),
}

impl From<std::io::Error> for ObjectStoreError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

/// Whether a provisioning step found the resource or made it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provisioned {
    Existing,
    Created,
}

/// A single bucket in a remote object store.
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// URI scheme used when addressing objects, e.g. `gs`.
    fn scheme(&self) -> &str;

    /// The bucket this store reads and writes.
    fn bucket(&self) -> &str;

    async fn bucket_exists(&self) -> Result<bool, ObjectStoreError>;

    async fn create_bucket(&self) -> Result<(), ObjectStoreError>;

    /// Upload a local file under `key`, overwriting any existing object.
    async fn upload(&self, local: &Path, key: &str) -> Result<(), ObjectStoreError>;

    /// Keys of all objects starting with `prefix`, sorted.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, ObjectStoreError>;

    /// Full contents of one object.
    async fn download(&self, key: &str) -> Result<Vec<u8>, ObjectStoreError>;

    /// Create the bucket unless it already exists.
    async fn ensure_bucket(&self) -> Result<Provisioned, ObjectStoreError> {
        if self.bucket_exists().await? {
            return Ok(Provisioned::Existing);
        }
        self.create_bucket().await?;
        Ok(Provisioned::Created)
    }

    /// URI addressing every object that matches `pattern` in this bucket.
    fn uri(&self, pattern: &str) -> Result<SourceUri, UriError> {
        SourceUri::new(self.scheme(), self.bucket(), pattern)
    }
}

#[async_trait::async_trait]
impl<T: ObjectStore + ?Sized> ObjectStore for Arc<T> {
    fn scheme(&self) -> &str {
        (**self).scheme()
    }

    fn bucket(&self) -> &str {
        (**self).bucket()
    }

    async fn bucket_exists(&self) -> Result<bool, ObjectStoreError> {
        (**self).bucket_exists().await
    }

    async fn create_bucket(&self) -> Result<(), ObjectStoreError> {
        (**self).create_bucket().await
    }

    async fn upload(&self, local: &Path, key: &str) -> Result<(), ObjectStoreError> {
        (**self).upload(local, key).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, ObjectStoreError> {
        (**self).list(prefix).await
    }

    async fn download(&self, key: &str) -> Result<Vec<u8>, ObjectStoreError> {
        (**self).download(key).await
    }
}

/// Errors parsing a source URI.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UriError {
    #[error("missing scheme in {0:?}")]
    MissingScheme(String),

    #[error("missing bucket in {0:?}")]
    MissingBucket(String),

    #[error("at most one '*' wildcard is supported: {0:?}")]
    TooManyWildcards(String),
}

/// `{scheme}://{bucket}/{pattern}` where the pattern may contain one `*`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceUri {
    scheme: String,
    bucket: String,
    pattern: String,
}

impl SourceUri {
    pub fn new(
        scheme: impl Into<String>,
        bucket: impl Into<String>,
        pattern: impl Into<String>,
    ) -> Result<Self, UriError> {
        let uri = Self {
            scheme: scheme.into(),
            bucket: bucket.into(),
            pattern: pattern.into(),
        };
        if uri.pattern.matches('*').count() > 1 {
            return Err(UriError::TooManyWildcards(uri.to_string()));
        }
        Ok(uri)
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// The literal part before the wildcard; usable as a listing prefix.
    pub fn prefix(&self) -> &str {
        match self.pattern.find('*') {
            Some(idx) => &self.pattern[..idx],
            None => &self.pattern,
        }
    }

    /// Whether an object key is selected by this URI's pattern.
    pub fn matches(&self, key: &str) -> bool {
        match self.pattern.split_once('*') {
            Some((head, tail)) => {
                key.len() >= head.len() + tail.len()
                    && key.starts_with(head)
                    && key.ends_with(tail)
            }
            None => key == self.pattern,
        }
    }
}

impl fmt::Display for SourceUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}/{}", self.scheme, self.bucket, self.pattern)
    }
}

impl FromStr for SourceUri {
    type Err = UriError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (scheme, rest) = s
            .split_once("://")
            .ok_or_else(|| UriError::MissingScheme(s.to_owned()))?;
        let (bucket, pattern) = rest.split_once('/').unwrap_or((rest, ""));
        if bucket.is_empty() {
            return Err(UriError::MissingBucket(s.to_owned()));
        }
        Self::new(scheme, bucket, pattern)
    }
}
