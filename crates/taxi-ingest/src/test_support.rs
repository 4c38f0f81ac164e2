use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::{
    DatasetSpec, Downloader, FetchError, LoadJob, LoadOutcome, ObjectStore, ObjectStoreError,
    TableInfo, TableRef, Warehouse, WarehouseError, WriteMode,
};

/// Serves fixed bodies by URL. Unknown URLs answer 404.
#[derive(Default)]
pub struct InMemoryDownloader {
    bodies: HashMap<String, Vec<u8>>,
    requests: Mutex<Vec<String>>,
}

impl InMemoryDownloader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(&mut self, url: impl Into<String>, body: impl Into<Vec<u8>>) {
        self.bodies.insert(url.into(), body.into());
    }

    /// URLs requested so far, in call order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Downloader for InMemoryDownloader {
    async fn download(&self, url: &str, dest: &Path) -> Result<u64, FetchError> {
        self.requests.lock().unwrap().push(url.to_owned());
        let body = self.bodies.get(url).ok_or_else(|| FetchError::Status {
            url: url.to_owned(),
            status: 404,
        })?;
        std::fs::write(dest, body)?;
        Ok(body.len() as u64)
    }
}

/// A bucket held in memory. Uploads read the local file.
pub struct InMemoryObjectStore {
    bucket: String,
    exists: Mutex<bool>,
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    failing_keys: HashSet<String>,
}

impl InMemoryObjectStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            exists: Mutex::new(false),
            objects: Mutex::new(BTreeMap::new()),
            failing_keys: HashSet::new(),
        }
    }

    /// Make uploads of `key` fail with a network error.
    pub fn fail_uploads_of(&mut self, key: impl Into<String>) {
        self.failing_keys.insert(key.into());
    }

    pub fn put(&self, key: impl Into<String>, body: impl Into<Vec<u8>>) {
        self.objects.lock().unwrap().insert(key.into(), body.into());
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).cloned()
    }
}

#[async_trait::async_trait]
impl ObjectStore for InMemoryObjectStore {
    fn scheme(&self) -> &str {
        "mem"
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn bucket_exists(&self) -> Result<bool, ObjectStoreError> {
        Ok(*self.exists.lock().unwrap())
    }

    async fn create_bucket(&self) -> Result<(), ObjectStoreError> {
        *self.exists.lock().unwrap() = true;
        Ok(())
    }

    async fn upload(&self, local: &Path, key: &str) -> Result<(), ObjectStoreError> {
        if self.failing_keys.contains(key) {
            return Err(ObjectStoreError::Network(format!("simulated failure for {key}")));
        }
        let body = std::fs::read(local)?;
        self.put(key, body);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, ObjectStoreError> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn download(&self, key: &str) -> Result<Vec<u8>, ObjectStoreError> {
        self.get(key)
            .ok_or_else(|| ObjectStoreError::NotFound(key.to_owned()))
    }
}

/// Counts rows as text lines of each matched object, minus skipped rows.
pub struct InMemoryWarehouse {
    store: Arc<InMemoryObjectStore>,
    datasets: Mutex<HashSet<String>>,
    tables: Mutex<HashMap<TableRef, u64>>,
    jobs: Mutex<Vec<LoadJob>>,
}

impl InMemoryWarehouse {
    pub fn new(store: Arc<InMemoryObjectStore>) -> Self {
        Self {
            store,
            datasets: Mutex::new(HashSet::new()),
            tables: Mutex::new(HashMap::new()),
            jobs: Mutex::new(Vec::new()),
        }
    }

    /// Jobs received so far, including failed ones.
    pub fn jobs(&self) -> Vec<LoadJob> {
        self.jobs.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Warehouse for InMemoryWarehouse {
    fn label(&self) -> &str {
        "memory"
    }

    async fn dataset_exists(&self, name: &str) -> Result<bool, WarehouseError> {
        Ok(self.datasets.lock().unwrap().contains(name))
    }

    async fn create_dataset(&self, spec: &DatasetSpec) -> Result<(), WarehouseError> {
        self.datasets.lock().unwrap().insert(spec.name.clone());
        Ok(())
    }

    async fn load(&self, job: &LoadJob) -> Result<LoadOutcome, WarehouseError> {
        self.jobs.lock().unwrap().push(job.clone());

        if !self.datasets.lock().unwrap().contains(&job.table.dataset) {
            return Err(WarehouseError::DatasetNotFound(job.table.dataset.clone()));
        }

        let objects: Vec<String> = self
            .store
            .keys()
            .into_iter()
            .filter(|k| job.source.matches(k))
            .collect();
        if objects.is_empty() {
            return Err(WarehouseError::NoSourceObjects(job.source.clone()));
        }

        let mut rows_loaded = 0u64;
        for key in &objects {
            let body = self.store.get(key).unwrap_or_default();
            let lines = String::from_utf8_lossy(&body).lines().count();
            rows_loaded += lines.saturating_sub(job.skip_leading_rows) as u64;
        }

        let mut tables = self.tables.lock().unwrap();
        let rows = tables.entry(job.table.clone()).or_insert(0);
        match job.write_mode {
            WriteMode::Append => *rows += rows_loaded,
            WriteMode::Replace => *rows = rows_loaded,
        }

        Ok(LoadOutcome {
            table: job.table.clone(),
            objects,
            rows_loaded,
            total_rows: *rows,
        })
    }

    async fn row_count(&self, table: &TableRef) -> Result<u64, WarehouseError> {
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .copied()
            .ok_or_else(|| WarehouseError::TableNotFound(table.clone()))
    }

    async fn list_tables(&self, dataset: &str) -> Result<Vec<TableInfo>, WarehouseError> {
        let mut tables: Vec<TableInfo> = self
            .tables
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _)| t.dataset == dataset)
            .map(|(t, rows)| TableInfo {
                table: t.clone(),
                rows: *rows,
                last_loaded_at: None,
            })
            .collect();
        tables.sort_by(|a, b| a.table.table.cmp(&b.table.table));
        Ok(tables)
    }
}
