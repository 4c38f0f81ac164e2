use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Deserialize;

use crate::object_store::{Provisioned, SourceUri};
use crate::task::FileFormat;

/// Errors that can occur when talking to an analytical warehouse.
#[derive(Debug, thiserror::Error)]
pub enum WarehouseError {
    #[error("dataset not found: {0}")]
    DatasetNotFound(String),

    #[error("table not found: {0}")]
    TableNotFound(TableRef),

    #[error("no objects match {0}")]
    NoSourceObjects(SourceUri),

    #[error("source {0} is not served by this warehouse")]
    ForeignSource(SourceUri),

    #[error("malformed source {object}: {reason}")]
    MalformedSource { object: String, reason: String },

    #[error("schema mismatch for {table}: {reason}")]
    SchemaMismatch { table: TableRef, reason: String },

    #[error("source read failed: {0}")]
    Source(String),

    #[error("database error: {0}")]
    Database(String),
}

/// How a load treats rows already in the destination table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// Accumulate new rows after the existing ones.
    #[default]
    Append,
    /// Truncate the table, then load.
    Replace,
}

impl WriteMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "append" | "write_append" => Some(Self::Append),
            "replace" | "truncate" | "write_truncate" => Some(Self::Replace),
            _ => None,
        }
    }
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Append => write!(f, "append"),
            Self::Replace => write!(f, "replace"),
        }
    }
}

/// A table inside a dataset.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    pub dataset: String,
    pub table: String,
}

impl TableRef {
    pub fn new(dataset: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            table: table.into(),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.dataset, self.table)
    }
}

/// Dataset to provision before loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetSpec {
    pub name: String,
    pub location: String,
}

/// One bulk-load request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadJob {
    /// Trip category for category loads, the file name for reference loads.
    pub category: String,
    pub source: SourceUri,
    pub format: FileFormat,
    pub table: TableRef,
    pub write_mode: WriteMode,
    /// Leading rows to skip in CSV input; the first skipped row names columns.
    pub skip_leading_rows: usize,
    pub autodetect: bool,
    /// Source column renames, keyed by the column name as read.
    pub renames: BTreeMap<String, String>,
    /// When set, a text column of this name holding `category` is added to
    /// every row.
    pub category_column: Option<String>,
}

/// What a completed load did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOutcome {
    pub table: TableRef,
    /// Objects read from the source URI.
    pub objects: Vec<String>,
    pub rows_loaded: u64,
    /// Table size after the load.
    pub total_rows: u64,
}

/// Catalog entry for a loaded table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    pub table: TableRef,
    pub rows: u64,
    pub last_loaded_at: Option<String>,
}

/// An analytical store that ingests staged objects in bulk.
#[async_trait::async_trait]
pub trait Warehouse: Send + Sync {
    /// Human-readable label identifying this warehouse.
    fn label(&self) -> &str;

    async fn dataset_exists(&self, name: &str) -> Result<bool, WarehouseError>;

    async fn create_dataset(&self, spec: &DatasetSpec) -> Result<(), WarehouseError>;

    /// Run a load job to completion.
    async fn load(&self, job: &LoadJob) -> Result<LoadOutcome, WarehouseError>;

    async fn row_count(&self, table: &TableRef) -> Result<u64, WarehouseError>;

    async fn list_tables(&self, dataset: &str) -> Result<Vec<TableInfo>, WarehouseError>;

    /// Create the dataset unless it already exists.
    async fn ensure_dataset(&self, spec: &DatasetSpec) -> Result<Provisioned, WarehouseError> {
        if self.dataset_exists(&spec.name).await? {
            return Ok(Provisioned::Existing);
        }
        self.create_dataset(spec).await?;
        Ok(Provisioned::Created)
    }
}

#[async_trait::async_trait]
impl<T: Warehouse + ?Sized> Warehouse for Arc<T> {
    fn label(&self) -> &str {
        (**self).label()
    }

    async fn dataset_exists(&self, name: &str) -> Result<bool, WarehouseError> {
        (**self).dataset_exists(name).await
    }

    async fn create_dataset(&self, spec: &DatasetSpec) -> Result<(), WarehouseError> {
        (**self).create_dataset(spec).await
    }

    async fn load(&self, job: &LoadJob) -> Result<LoadOutcome, WarehouseError> {
        (**self).load(job).await
    }

    async fn row_count(&self, table: &TableRef) -> Result<u64, WarehouseError> {
        (**self).row_count(table).await
    }

    async fn list_tables(&self, dataset: &str) -> Result<Vec<TableInfo>, WarehouseError> {
        (**self).list_tables(dataset).await
    }
}
