use std::collections::BTreeMap;
use std::sync::Arc;

use crate::object_store::{ObjectStore, UriError};
use crate::task::{FileFormat, ReferenceFile, TaskError, validate_category};
use crate::warehouse::{LoadJob, LoadOutcome, TableRef, Warehouse, WarehouseError, WriteMode};

/// Errors that can occur while building or running a load.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error(transparent)]
    Task(#[from] TaskError),

    #[error(transparent)]
    Uri(#[from] UriError),

    #[error(transparent)]
    Warehouse(#[from] WarehouseError),
}

/// Where and how staged files are loaded.
#[derive(Debug, Clone)]
pub struct LoadSettings {
    pub dataset: String,
    /// Tables are named `{category}_{table_suffix}`.
    pub table_suffix: String,
    pub format: FileFormat,
    /// Header rows to skip in CSV sources.
    pub skip_leading_rows: usize,
    /// Trip-data column renames, e.g. `tpep_pickup_datetime` to
    /// `pickup_datetime`. Reference loads keep their columns as read.
    pub renames: BTreeMap<String, String>,
    /// Column tagging each trip row with its category, e.g. `taxi_type`.
    pub category_column: Option<String>,
}

impl LoadSettings {
    pub fn new(dataset: impl Into<String>, format: FileFormat) -> Self {
        Self {
            dataset: dataset.into(),
            table_suffix: "tripdata".to_owned(),
            format,
            skip_leading_rows: 1,
            renames: BTreeMap::new(),
            category_column: None,
        }
    }

    fn skip_rows_for(&self, format: FileFormat) -> usize {
        match format {
            FileFormat::Parquet => 0,
            FileFormat::Csv | FileFormat::CsvGz => self.skip_leading_rows,
        }
    }
}

/// One requested load: a category, optionally narrowed to a single year.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    pub category: String,
    pub year: Option<u16>,
    pub write_mode: WriteMode,
    /// Overrides the `{category}_{suffix}` table name.
    pub table: Option<String>,
}

impl LoadRequest {
    pub fn category(category: impl Into<String>, write_mode: WriteMode) -> Self {
        Self {
            category: category.into(),
            year: None,
            write_mode,
            table: None,
        }
    }

    pub fn for_year(mut self, year: u16) -> Self {
        self.year = Some(year);
        self
    }
}

/// Issues bulk loads from the object store into the warehouse.
pub struct Loader {
    warehouse: Arc<dyn Warehouse>,
    store: Arc<dyn ObjectStore>,
    settings: LoadSettings,
}

impl Loader {
    pub fn new(
        warehouse: Arc<dyn Warehouse>,
        store: Arc<dyn ObjectStore>,
        settings: LoadSettings,
    ) -> Self {
        Self {
            warehouse,
            store,
            settings,
        }
    }

    pub fn settings(&self) -> &LoadSettings {
        &self.settings
    }

    pub fn table_for(&self, category: &str) -> TableRef {
        TableRef::new(
            &self.settings.dataset,
            format!("{category}_{}", self.settings.table_suffix),
        )
    }

    /// Build the load job for a request without running it.
    pub fn job(&self, request: &LoadRequest) -> Result<LoadJob, LoadError> {
        validate_category(&request.category)?;

        let ext = self.settings.format.extension();
        let pattern = match request.year {
            Some(year) => format!("{}_tripdata_{year:04}-*.{ext}", request.category),
            None => format!("{}_tripdata_*.{ext}", request.category),
        };

        let table = match &request.table {
            Some(name) => TableRef::new(&self.settings.dataset, name),
            None => self.table_for(&request.category),
        };

        Ok(LoadJob {
            category: request.category.clone(),
            source: self.store.uri(&pattern)?,
            format: self.settings.format,
            table,
            write_mode: request.write_mode,
            skip_leading_rows: self.settings.skip_rows_for(self.settings.format),
            autodetect: true,
            renames: self.settings.renames.clone(),
            category_column: self.settings.category_column.clone(),
        })
    }

    /// Build the job that replaces a reference file's table with the
    /// file's current contents.
    pub fn reference_job(&self, file: &ReferenceFile) -> Result<LoadJob, LoadError> {
        Ok(LoadJob {
            category: file.name().to_owned(),
            source: self.store.uri(file.name())?,
            format: file.format(),
            table: TableRef::new(&self.settings.dataset, file.table()),
            write_mode: WriteMode::Replace,
            skip_leading_rows: self.settings.skip_rows_for(file.format()),
            autodetect: true,
            renames: BTreeMap::new(),
            category_column: None,
        })
    }

    pub async fn load_reference(&self, file: &ReferenceFile) -> Result<LoadOutcome, LoadError> {
        let job = self.reference_job(file)?;
        log::info!("loading {} into {}", job.source, job.table);
        Ok(self.warehouse.load(&job).await?)
    }

    /// Load every staged object of `category` into its table.
    pub async fn load(&self, category: &str, write_mode: WriteMode) -> Result<LoadOutcome, LoadError> {
        self.run(&LoadRequest::category(category, write_mode)).await
    }

    /// Build and run one request, waiting for the warehouse to finish.
    pub async fn run(&self, request: &LoadRequest) -> Result<LoadOutcome, LoadError> {
        let job = self.job(request)?;
        log::info!(
            "loading {} into {} ({})",
            job.source,
            job.table,
            job.write_mode
        );
        Ok(self.warehouse.load(&job).await?)
    }
}
