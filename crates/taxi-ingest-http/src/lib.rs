pub mod download;
pub mod gcs;

pub use download::HttpDownloader;
pub use gcs::{GcsConfig, GcsObjectStore};

const USER_AGENT: &str = concat!("taxi-ingest/", env!("CARGO_PKG_VERSION"));
