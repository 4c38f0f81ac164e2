use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use taxi_ingest::{
    DEFAULT_URL_TEMPLATE, DEFAULT_WORKERS, FileFormat, FileLayout, FileTask, LoadRequest,
    LoadSettings, PipelineConfig, ReferenceFile, WriteMode, YearMonth,
};
use taxi_ingest_store::DEFAULT_BATCH_SIZE;

/// Top-level application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub bucket: BucketConfig,
    #[serde(default)]
    pub warehouse: WarehouseConfig,
    /// Explicit load jobs. When empty, each category gets one job using
    /// the warehouse's default write mode.
    #[serde(default)]
    pub loads: Vec<LoadEntry>,
    /// Fixed-name files fetched, staged and loaded next to the trip data.
    #[serde(default)]
    pub references: Vec<ReferenceEntry>,
}

/// Which remote files to fetch.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_url_template")]
    pub url_template: String,
    #[serde(default = "default_format")]
    pub format: FileFormat,
    #[serde(default = "default_categories")]
    pub categories: Vec<String>,
    #[serde(default = "default_years")]
    pub years: Vec<u16>,
    #[serde(default = "default_months")]
    pub months: Vec<u8>,
    /// Inclusive month range; replaces `years` × `months` when set.
    pub from: Option<YearMonth>,
    pub to: Option<YearMonth>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Gcs,
    Directory,
}

/// Where fetched files are staged.
#[derive(Debug, Clone, Deserialize)]
pub struct BucketConfig {
    #[serde(default)]
    pub backend: Backend,
    #[serde(default = "default_bucket_name")]
    pub name: String,
    /// Project that owns the bucket (gcs only).
    pub project: Option<String>,
    /// Parent directory of the bucket (directory only).
    #[serde(default = "default_bucket_root")]
    pub root: PathBuf,
    #[serde(default = "default_location")]
    pub location: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WarehouseConfig {
    #[serde(default = "default_warehouse_path")]
    pub path: PathBuf,
    #[serde(default = "default_dataset")]
    pub dataset: String,
    #[serde(default = "default_location")]
    pub location: String,
    #[serde(default = "default_table_suffix")]
    pub table_suffix: String,
    #[serde(default)]
    pub write_mode: WriteMode,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Trip-data column renames, old name to new name.
    #[serde(default)]
    pub renames: BTreeMap<String, String>,
    /// Column that tags every trip row with its category.
    pub category_column: Option<String>,
}

/// A single configured load job.
#[derive(Debug, Clone, Deserialize)]
pub struct LoadEntry {
    pub category: String,
    pub year: Option<u16>,
    pub write_mode: Option<WriteMode>,
    pub table: Option<String>,
}

/// A configured reference file, e.g. the taxi zone lookup.
#[derive(Debug, Clone, Deserialize)]
pub struct ReferenceEntry {
    pub name: String,
    pub url: String,
    pub table: String,
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

fn default_url_template() -> String {
    DEFAULT_URL_TEMPLATE.into()
}

fn default_format() -> FileFormat {
    FileFormat::CsvGz
}

fn default_categories() -> Vec<String> {
    vec!["yellow".into(), "green".into()]
}

fn default_years() -> Vec<u16> {
    vec![2019, 2020]
}

fn default_months() -> Vec<u8> {
    (1..=12).collect()
}

fn default_bucket_name() -> String {
    "zoomcamp_dbt_hw4".into()
}

fn default_bucket_root() -> PathBuf {
    PathBuf::from("./bucket")
}

fn default_location() -> String {
    "US".into()
}

fn default_warehouse_path() -> PathBuf {
    PathBuf::from("./warehouse.db")
}

fn default_dataset() -> String {
    "ny_taxi".into()
}

fn default_table_suffix() -> String {
    "tripdata".into()
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            workers: default_workers(),
            source: SourceConfig::default(),
            bucket: BucketConfig::default(),
            warehouse: WarehouseConfig::default(),
            loads: Vec::new(),
            references: Vec::new(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url_template: default_url_template(),
            format: default_format(),
            categories: default_categories(),
            years: default_years(),
            months: default_months(),
            from: None,
            to: None,
        }
    }
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            name: default_bucket_name(),
            project: None,
            root: default_bucket_root(),
            location: default_location(),
        }
    }
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            path: default_warehouse_path(),
            dataset: default_dataset(),
            location: default_location(),
            table_suffix: default_table_suffix(),
            write_mode: WriteMode::default(),
            batch_size: default_batch_size(),
            renames: BTreeMap::new(),
            category_column: None,
        }
    }
}

impl SourceConfig {
    /// Expand the configured file set into fetch tasks.
    pub fn tasks(&self) -> Result<Vec<FileTask>> {
        let tasks = match (self.from, self.to) {
            (Some(from), Some(to)) => FileTask::range(&self.categories, from, to)?,
            (None, None) => FileTask::product(&self.categories, &self.years, &self.months)?,
            _ => anyhow::bail!("`from` and `to` must be set together"),
        };
        Ok(tasks)
    }
}

impl AppConfig {
    pub fn layout(&self) -> FileLayout {
        FileLayout::new(
            &self.source.url_template,
            &self.download_dir,
            self.source.format,
        )
    }

    pub fn load_settings(&self) -> LoadSettings {
        let mut settings = LoadSettings::new(&self.warehouse.dataset, self.source.format);
        settings.table_suffix = self.warehouse.table_suffix.clone();
        settings.renames = self.warehouse.renames.clone();
        settings.category_column = self.warehouse.category_column.clone();
        settings
    }

    pub fn references(&self) -> Result<Vec<ReferenceFile>> {
        self.references
            .iter()
            .map(|entry| {
                ReferenceFile::new(&entry.name, &entry.url, &entry.table)
                    .with_context(|| format!("invalid reference file {:?}", entry.name))
            })
            .collect()
    }

    pub fn pipeline_config(&self) -> Result<PipelineConfig> {
        Ok(PipelineConfig {
            layout: self.layout(),
            load: self.load_settings(),
            dataset_location: self.warehouse.location.clone(),
            workers: self.workers,
            references: self.references()?,
        })
    }

    /// The load jobs a full run performs.
    pub fn load_requests(&self) -> Vec<LoadRequest> {
        if self.loads.is_empty() {
            return self
                .source
                .categories
                .iter()
                .map(|c| LoadRequest::category(c, self.warehouse.write_mode))
                .collect();
        }

        self.loads
            .iter()
            .map(|entry| LoadRequest {
                category: entry.category.clone(),
                year: entry.year,
                write_mode: entry.write_mode.unwrap_or(self.warehouse.write_mode),
                table: entry.table.clone(),
            })
            .collect()
    }
}

/// Config file path: `~/.config/taxi-ingest/ingest.toml`
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("taxi-ingest").join("ingest.toml"))
}

/// Load config from `explicit`, or from the default path.
///
/// A missing default file yields built-in defaults. A missing explicit file
/// and any file that fails to parse are errors.
pub fn load_config(explicit: Option<&Path>) -> Result<AppConfig> {
    let (path, required) = match explicit {
        Some(path) => (path.to_path_buf(), true),
        None => match config_path() {
            Some(path) => (path, false),
            None => return Ok(AppConfig::default()),
        },
    };

    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(e) if !required && e.kind() == ErrorKind::NotFound => {
            log::debug!("no config at {}, using defaults", path.display());
            return Ok(AppConfig::default());
        }
        Err(e) => {
            return Err(e).with_context(|| format!("failed to read config at {}", path.display()));
        }
    };

    toml::from_str(&contents)
        .with_context(|| format!("failed to parse config at {}", path.display()))
}
