use std::sync::Arc;

use anyhow::{Context, Result};
use taxi_ingest::{Downloader, ObjectStore, Warehouse};
use taxi_ingest_http::{GcsConfig, GcsObjectStore, HttpDownloader};
use taxi_ingest_store::{DirectoryObjectStore, SqliteWarehouse};

use crate::config::{Backend, BucketConfig, WarehouseConfig};

pub fn downloader() -> Arc<dyn Downloader> {
    Arc::new(HttpDownloader::new())
}

/// Build the configured bucket backend. The gcs backend reads its
/// credentials from `GCS_ACCESS_TOKEN` and, optionally, its endpoint from
/// `GCS_API_BASE_URL`.
pub fn object_store(config: &BucketConfig) -> Result<Arc<dyn ObjectStore>> {
    let token = match config.backend {
        Backend::Gcs => Some(
            std::env::var("GCS_ACCESS_TOKEN")
                .context("GCS_ACCESS_TOKEN must be set for the gcs bucket backend")?,
        ),
        Backend::Directory => None,
    };
    Ok(build_store(config, token))
}

/// Bucket handle for commands that only read the warehouse catalog and
/// never touch the bucket, so a missing token is not an error.
pub fn catalog_store(config: &BucketConfig) -> Arc<dyn ObjectStore> {
    build_store(config, std::env::var("GCS_ACCESS_TOKEN").ok())
}

fn build_store(config: &BucketConfig, token: Option<String>) -> Arc<dyn ObjectStore> {
    match config.backend {
        Backend::Gcs => Arc::new(GcsObjectStore::new(GcsConfig {
            bucket: config.name.clone(),
            project: config.project.clone(),
            location: config.location.clone(),
            token,
            api_base_url: std::env::var("GCS_API_BASE_URL").ok(),
        })),
        Backend::Directory => Arc::new(DirectoryObjectStore::new(&config.root, &config.name)),
    }
}

pub fn warehouse(
    config: &WarehouseConfig,
    store: Arc<dyn ObjectStore>,
) -> Result<Arc<dyn Warehouse>> {
    if let Some(parent) = config.path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let warehouse = SqliteWarehouse::open(&config.path, store)
        .with_context(|| format!("failed to open warehouse at {}", config.path.display()))?
        .with_batch_size(config.batch_size);
    Ok(Arc::new(warehouse))
}
