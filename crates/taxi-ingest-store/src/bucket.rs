use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use taxi_ingest::{ObjectStore, ObjectStoreError};

/// A bucket kept as a directory: objects live at `{root}/{bucket}/{key}`.
pub struct DirectoryObjectStore {
    root: PathBuf,
    bucket: String,
}

impl DirectoryObjectStore {
    pub fn new(root: impl Into<PathBuf>, bucket: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            bucket: bucket.into(),
        }
    }

    /// Directory holding this bucket's objects.
    pub fn bucket_dir(&self) -> PathBuf {
        self.root.join(&self.bucket)
    }

    fn object_path(&self, key: &str) -> Result<PathBuf, ObjectStoreError> {
        if key.is_empty() || key.contains(['/', '\\']) || key == "." || key == ".." {
            return Err(ObjectStoreError::Other(format!("invalid object key: {key:?}")));
        }
        Ok(self.bucket_dir().join(key))
    }
}

#[async_trait::async_trait]
impl ObjectStore for DirectoryObjectStore {
    fn scheme(&self) -> &str {
        "file"
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn bucket_exists(&self) -> Result<bool, ObjectStoreError> {
        Ok(tokio::fs::try_exists(self.bucket_dir()).await?)
    }

    async fn create_bucket(&self) -> Result<(), ObjectStoreError> {
        tokio::fs::create_dir_all(self.bucket_dir()).await?;
        log::info!("created bucket directory {}", self.bucket_dir().display());
        Ok(())
    }

    async fn upload(&self, local: &Path, key: &str) -> Result<(), ObjectStoreError> {
        let dest = self.object_path(key)?;
        tokio::fs::copy(local, &dest).await?;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, ObjectStoreError> {
        let mut entries = match tokio::fs::read_dir(self.bucket_dir()).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ObjectStoreError::NotFound(format!("bucket {}", self.bucket)));
            }
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str()
                && name.starts_with(prefix)
            {
                keys.push(name.to_owned());
            }
        }

        keys.sort();
        Ok(keys)
    }

    async fn download(&self, key: &str) -> Result<Vec<u8>, ObjectStoreError> {
        let path = self.object_path(key)?;
        tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => ObjectStoreError::NotFound(key.to_owned()),
            _ => e.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_keys_that_escape_the_bucket() {
        let store = DirectoryObjectStore::new("/tmp/buckets", "trips");
        assert!(store.object_path("../secrets").is_err());
        assert!(store.object_path("a/b.csv").is_err());
        assert!(store.object_path("").is_err());
        assert_eq!(
            store.object_path("yellow_tripdata_2019-01.csv.gz").unwrap(),
            PathBuf::from("/tmp/buckets/trips/yellow_tripdata_2019-01.csv.gz")
        );
    }
}
