use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use rusqlite::OptionalExtension;
use rusqlite::types::Value;
use taxi_ingest::{
    DatasetSpec, LoadJob, LoadOutcome, ObjectStore, TableInfo, TableRef, Warehouse,
    WarehouseError, WriteMode,
};
use tokio::sync::mpsc;

use crate::decode::{self, Column, ColumnType, DecodeError, ObjectReader, Schema};
use crate::schema;

/// Rows buffered before they are inserted.
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

/// Errors opening the warehouse database.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),

    #[error("migration error: {0}")]
    Migration(String),
}

/// An analytical store in a single SQLite database.
///
/// Every table of every dataset is a physical table named
/// `"{dataset}.{table}"`. The `datasets`, `tables` and `load_jobs` catalog
/// tables describe what has been loaded. Source objects are read through
/// the object store the warehouse was opened with.
///
/// A load reads each source object twice: once to infer the schema, then
/// again to insert its rows. At most one object body is decoded at a time,
/// and rows reach SQLite in batches of `batch_size`. Decoding and writing
/// run on tokio's blocking pool.
pub struct SqliteWarehouse {
    conn: Arc<Mutex<rusqlite::Connection>>,
    store: Arc<dyn ObjectStore>,
    label: String,
    batch_size: usize,
}

/// Everything the blocking writer needs for one load.
struct WritePlan {
    job: LoadJob,
    incoming: Schema,
    objects: usize,
    batch_size: usize,
}

type ObjectBody = Result<(String, Bytes), WarehouseError>;

impl SqliteWarehouse {
    /// Open a warehouse backed by a file on disk.
    pub fn open(path: &Path, store: Arc<dyn ObjectStore>) -> Result<Self, StoreError> {
        let conn =
            rusqlite::Connection::open(path).map_err(|e| StoreError::Database(e.to_string()))?;
        Self::with_connection(conn, store, format!("sqlite:{}", path.display()))
    }

    /// Open an in-memory warehouse (for testing).
    pub fn open_in_memory(store: Arc<dyn ObjectStore>) -> Result<Self, StoreError> {
        let conn = rusqlite::Connection::open_in_memory()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Self::with_connection(conn, store, "sqlite::memory:".to_owned())
    }

    fn with_connection(
        mut conn: rusqlite::Connection,
        store: Arc<dyn ObjectStore>,
        label: String,
    ) -> Result<Self, StoreError> {
        schema::migrations()
            .to_latest(&mut conn)
            .map_err(|e| StoreError::Migration(e.to_string()))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            store,
            label,
            batch_size: DEFAULT_BATCH_SIZE,
        })
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    fn conn(&self) -> Result<MutexGuard<'_, rusqlite::Connection>, WarehouseError> {
        lock(&self.conn)
    }

    fn has_dataset(&self, name: &str) -> Result<bool, WarehouseError> {
        let conn = self.conn()?;
        let found = conn
            .query_row("SELECT 1 FROM datasets WHERE name = ?1", [name], |_| Ok(()))
            .optional()
            .map_err(db)?;
        Ok(found.is_some())
    }

    /// Keys of every object selected by the job's source URI.
    async fn resolve_sources(&self, job: &LoadJob) -> Result<Vec<String>, WarehouseError> {
        if job.source.scheme() != self.store.scheme() || job.source.bucket() != self.store.bucket()
        {
            return Err(WarehouseError::ForeignSource(job.source.clone()));
        }

        let keys: Vec<String> = self
            .store
            .list(job.source.prefix())
            .await
            .map_err(|e| WarehouseError::Source(e.to_string()))?
            .into_iter()
            .filter(|key| job.source.matches(key))
            .collect();

        if keys.is_empty() {
            return Err(WarehouseError::NoSourceObjects(job.source.clone()));
        }
        Ok(keys)
    }

    async fn download(&self, key: &str) -> Result<Bytes, WarehouseError> {
        self.store
            .download(key)
            .await
            .map(Bytes::from)
            .map_err(|e| WarehouseError::Source(e.to_string()))
    }

    /// First pass: infer each object's schema and merge them.
    async fn scan_sources(&self, job: &LoadJob, keys: &[String]) -> Result<Schema, WarehouseError> {
        let mut schemas = Vec::with_capacity(keys.len());
        for key in keys {
            let body = self.download(key).await?;
            let (format, skip) = (job.format, job.skip_leading_rows);
            let schema = tokio::task::spawn_blocking(move || decode::scan(body, format, skip))
                .await
                .map_err(join_error)?
                .map_err(|e| malformed(key, e))?;
            log::debug!("scanned {} rows from {key}", schema.rows);
            schemas.push((key.clone(), shape(job, key, schema)?));
        }
        merge_schemas(&job.table, &schemas)
    }

    /// Second pass: feed object bodies to a blocking writer one at a time.
    async fn write_sources(
        &self,
        job: &LoadJob,
        keys: &[String],
        incoming: Schema,
    ) -> Result<LoadOutcome, WarehouseError> {
        let plan = WritePlan {
            job: job.clone(),
            incoming,
            objects: keys.len(),
            batch_size: self.batch_size,
        };
        let conn = Arc::clone(&self.conn);
        let (sender, receiver) = mpsc::channel::<ObjectBody>(1);
        let writer = tokio::task::spawn_blocking(move || write(&conn, &plan, receiver));

        for key in keys {
            let body = self.download(key).await.map(|body| (key.clone(), body));
            let failed = body.is_err();
            if sender.send(body).await.is_err() || failed {
                break;
            }
        }
        drop(sender);

        writer.await.map_err(join_error)?
    }

    /// Number of completed load jobs recorded for `table`.
    pub fn job_count(&self, table: &TableRef) -> Result<u64, WarehouseError> {
        let conn = self.conn()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM load_jobs WHERE dataset = ?1 AND table_name = ?2",
                [&table.dataset, &table.table],
                |row| row.get(0),
            )
            .map_err(db)?;
        Ok(count as u64)
    }

    /// Column layout of a loaded table.
    pub fn columns(&self, table: &TableRef) -> Result<Vec<Column>, WarehouseError> {
        let conn = self.conn()?;
        catalog_columns(&conn, table)?.ok_or_else(|| WarehouseError::TableNotFound(table.clone()))
    }
}

#[async_trait::async_trait]
impl Warehouse for SqliteWarehouse {
    fn label(&self) -> &str {
        &self.label
    }

    async fn dataset_exists(&self, name: &str) -> Result<bool, WarehouseError> {
        self.has_dataset(name)
    }

    async fn create_dataset(&self, spec: &DatasetSpec) -> Result<(), WarehouseError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO datasets (name, location, created_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![spec.name, spec.location, now_epoch_secs()],
        )
        .map_err(db)?;
        log::info!("created dataset {} ({})", spec.name, spec.location);
        Ok(())
    }

    async fn load(&self, job: &LoadJob) -> Result<LoadOutcome, WarehouseError> {
        if !self.has_dataset(&job.table.dataset)? {
            return Err(WarehouseError::DatasetNotFound(job.table.dataset.clone()));
        }

        let keys = self.resolve_sources(job).await?;
        let incoming = self.scan_sources(job, &keys).await?;
        let outcome = self.write_sources(job, &keys, incoming).await?;

        log::info!(
            "loaded {} rows from {} objects into {} ({} total)",
            outcome.rows_loaded,
            outcome.objects.len(),
            outcome.table,
            outcome.total_rows
        );
        Ok(outcome)
    }

    async fn row_count(&self, table: &TableRef) -> Result<u64, WarehouseError> {
        let conn = self.conn()?;
        if catalog_columns(&conn, table)?.is_none() {
            return Err(WarehouseError::TableNotFound(table.clone()));
        }

        let count: i64 = conn
            .query_row(
                &format!("SELECT COUNT(*) FROM {}", physical_name(table)),
                [],
                |row| row.get(0),
            )
            .map_err(db)?;
        Ok(count as u64)
    }

    async fn list_tables(&self, dataset: &str) -> Result<Vec<TableInfo>, WarehouseError> {
        if !self.has_dataset(dataset)? {
            return Err(WarehouseError::DatasetNotFound(dataset.to_owned()));
        }

        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT name, rows, last_loaded_at
                 FROM tables
                 WHERE dataset = ?1
                 ORDER BY name",
            )
            .map_err(db)?;

        let tables = stmt
            .query_map([dataset], |row| {
                let name: String = row.get(0)?;
                let rows: i64 = row.get(1)?;
                Ok(TableInfo {
                    table: TableRef::new(dataset, name),
                    rows: rows as u64,
                    last_loaded_at: row.get(2)?,
                })
            })
            .map_err(db)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db)?;

        Ok(tables)
    }
}

fn db(e: rusqlite::Error) -> WarehouseError {
    WarehouseError::Database(e.to_string())
}

fn lock(
    conn: &Mutex<rusqlite::Connection>,
) -> Result<MutexGuard<'_, rusqlite::Connection>, WarehouseError> {
    conn.lock()
        .map_err(|_| WarehouseError::Database("connection lock poisoned".into()))
}

fn join_error(e: tokio::task::JoinError) -> WarehouseError {
    WarehouseError::Database(format!("load worker failed: {e}"))
}

fn malformed(key: &str, e: DecodeError) -> WarehouseError {
    WarehouseError::MalformedSource {
        object: key.to_owned(),
        reason: e.to_string(),
    }
}

/// Apply a load inside one transaction, decoding object bodies as they
/// arrive. Nothing is committed unless every planned object was written.
fn write(
    conn: &Mutex<rusqlite::Connection>,
    plan: &WritePlan,
    mut objects: mpsc::Receiver<ObjectBody>,
) -> Result<LoadOutcome, WarehouseError> {
    let job = &plan.job;
    let mut conn = lock(conn)?;
    let tx = conn.transaction().map_err(db)?;

    let exists = tx
        .query_row(
            "SELECT 1 FROM datasets WHERE name = ?1",
            [&job.table.dataset],
            |_| Ok(()),
        )
        .optional()
        .map_err(db)?;
    if exists.is_none() {
        return Err(WarehouseError::DatasetNotFound(job.table.dataset.clone()));
    }

    let physical = physical_name(&job.table);
    let existing = catalog_columns(&tx, &job.table)?;

    let columns = match (job.write_mode, existing) {
        (WriteMode::Append, Some(existing)) => reconcile(&job.table, &existing, &plan.incoming)?,
        (WriteMode::Replace, _) | (WriteMode::Append, None) => {
            let columns: Vec<Column> = plan
                .incoming
                .names
                .iter()
                .zip(&plan.incoming.kinds)
                .map(|(name, kind)| Column {
                    name: name.clone(),
                    kind: *kind,
                })
                .collect();
            tx.execute_batch(&format!(
                "DROP TABLE IF EXISTS {physical}; {}",
                create_sql(&physical, &columns)
            ))
            .map_err(db)?;
            columns
        }
    };
    let kinds: Vec<Option<ColumnType>> = columns.iter().map(|c| c.kind).collect();

    let mut loaded = Vec::with_capacity(plan.objects);
    let rows_loaded = {
        let stmt = tx.prepare(&insert_sql(&physical, &columns)).map_err(db)?;
        let mut batch = Batch::new(stmt, plan.batch_size);

        while let Some(body) = objects.blocking_recv() {
            let (key, body) = body?;
            let reader = ObjectReader::open(body, job.format, job.skip_leading_rows)
                .map_err(|e| malformed(&key, e))?;
            let names = shaped_names(job, &key, reader.names())?;
            if names.is_empty() {
                loaded.push(key);
                continue;
            }
            if names != plan.incoming.names {
                return Err(WarehouseError::SchemaMismatch {
                    table: job.table.clone(),
                    reason: format!("{key} changed while loading"),
                });
            }

            for row in reader {
                let mut row = row.map_err(|e| malformed(&key, e))?;
                if job.category_column.is_some() {
                    row.push(Value::Text(job.category.clone()));
                }
                let row = row
                    .into_iter()
                    .zip(&kinds)
                    .map(|(cell, kind)| decode::coerce(cell, *kind))
                    .collect();
                batch.push(row)?;
            }
            batch.flush()?;
            log::debug!("{key}: {} rows written to {}", batch.written(), job.table);
            loaded.push(key);
        }

        batch.written()
    };

    if loaded.len() != plan.objects {
        return Err(WarehouseError::Source(format!(
            "load of {} stopped after {} of {} objects",
            job.table,
            loaded.len(),
            plan.objects
        )));
    }

    let total_rows: i64 = tx
        .query_row(&format!("SELECT COUNT(*) FROM {physical}"), [], |row| {
            row.get(0)
        })
        .map_err(db)?;

    let columns_json =
        serde_json::to_string(&columns).map_err(|e| WarehouseError::Database(e.to_string()))?;
    let now = now_epoch_secs();

    tx.execute(
        "INSERT INTO tables (dataset, name, columns_json, rows, last_loaded_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT (dataset, name) DO UPDATE SET
            columns_json = excluded.columns_json,
            rows = excluded.rows,
            last_loaded_at = excluded.last_loaded_at",
        rusqlite::params![
            job.table.dataset,
            job.table.table,
            columns_json,
            total_rows,
            now
        ],
    )
    .map_err(db)?;

    tx.execute(
        "INSERT INTO load_jobs
            (dataset, table_name, source, write_mode, objects, rows_loaded, finished_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![
            job.table.dataset,
            job.table.table,
            job.source.to_string(),
            job.write_mode.to_string(),
            loaded.len() as i64,
            rows_loaded as i64,
            now
        ],
    )
    .map_err(db)?;

    tx.commit().map_err(db)?;

    Ok(LoadOutcome {
        table: job.table.clone(),
        objects: loaded,
        rows_loaded,
        total_rows: total_rows as u64,
    })
}

/// Rows waiting for one prepared insert statement.
struct Batch<'conn> {
    stmt: rusqlite::Statement<'conn>,
    rows: Vec<Vec<Value>>,
    capacity: usize,
    written: u64,
}

impl<'conn> Batch<'conn> {
    fn new(stmt: rusqlite::Statement<'conn>, capacity: usize) -> Self {
        Self {
            stmt,
            rows: Vec::with_capacity(capacity),
            capacity,
            written: 0,
        }
    }

    fn push(&mut self, row: Vec<Value>) -> Result<(), WarehouseError> {
        self.rows.push(row);
        if self.rows.len() >= self.capacity {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), WarehouseError> {
        let count = self.rows.len() as u64;
        for row in self.rows.drain(..) {
            self.stmt
                .execute(rusqlite::params_from_iter(row.iter()))
                .map_err(db)?;
        }
        self.written += count;
        Ok(())
    }

    #[cfg(test)]
    fn pending(&self) -> usize {
        self.rows.len()
    }

    fn written(&self) -> u64 {
        self.written
    }
}

fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn physical_name(table: &TableRef) -> String {
    quote(&format!("{}.{}", table.dataset, table.table))
}

/// Columns that have only ever held nulls are created without a declared
/// type, so the first real values keep their own storage class.
fn create_sql(physical: &str, columns: &[Column]) -> String {
    let defs = columns
        .iter()
        .map(|c| match c.kind {
            Some(kind) => format!("{} {}", quote(&c.name), kind.sql()),
            None => quote(&c.name),
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!("CREATE TABLE {physical} ({defs});")
}

fn insert_sql(physical: &str, columns: &[Column]) -> String {
    let names = columns
        .iter()
        .map(|c| quote(&c.name))
        .collect::<Vec<_>>()
        .join(", ");
    let params = (1..=columns.len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!("INSERT INTO {physical} ({names}) VALUES ({params})")
}

fn catalog_columns(
    conn: &rusqlite::Connection,
    table: &TableRef,
) -> Result<Option<Vec<Column>>, WarehouseError> {
    let json: Option<String> = conn
        .query_row(
            "SELECT columns_json FROM tables WHERE dataset = ?1 AND name = ?2",
            [&table.dataset, &table.table],
            |row| row.get(0),
        )
        .optional()
        .map_err(db)?;

    json.map(|json| {
        serde_json::from_str(&json).map_err(|e| WarehouseError::Database(e.to_string()))
    })
    .transpose()
}

/// Column names as loaded: renames applied, then the category column
/// appended. An object without columns stays without columns.
fn shaped_names(
    job: &LoadJob,
    key: &str,
    names: &[String],
) -> Result<Vec<String>, WarehouseError> {
    if names.is_empty() {
        return Ok(Vec::new());
    }

    let mut shaped: Vec<String> = names
        .iter()
        .map(|name| job.renames.get(name).unwrap_or(name).clone())
        .collect();
    if let Some(column) = &job.category_column {
        shaped.push(column.clone());
    }

    let mut seen = HashSet::new();
    for name in &shaped {
        if !seen.insert(name.to_ascii_lowercase()) {
            return Err(WarehouseError::MalformedSource {
                object: key.to_owned(),
                reason: format!("duplicate column {name} after renaming"),
            });
        }
    }
    Ok(shaped)
}

fn shape(job: &LoadJob, key: &str, schema: Schema) -> Result<Schema, WarehouseError> {
    let names = shaped_names(job, key, &schema.names)?;
    let mut kinds = schema.kinds;
    if names.len() > kinds.len() {
        kinds.push(Some(ColumnType::Text));
    }
    Ok(Schema {
        names,
        kinds,
        rows: schema.rows,
    })
}

/// Combine per-object schemas. All objects must agree on column names;
/// types widen across objects.
fn merge_schemas(
    table: &TableRef,
    objects: &[(String, Schema)],
) -> Result<Schema, WarehouseError> {
    let mut merged: Option<Schema> = None;

    for (key, schema) in objects {
        if schema.names.is_empty() {
            continue;
        }
        match &mut merged {
            None => merged = Some(schema.clone()),
            Some(merged) => {
                if merged.names != schema.names {
                    return Err(WarehouseError::SchemaMismatch {
                        table: table.clone(),
                        reason: format!(
                            "{key} has columns {:?}, expected {:?}",
                            schema.names, merged.names
                        ),
                    });
                }
                for (kind, incoming) in merged.kinds.iter_mut().zip(&schema.kinds) {
                    *kind = (*kind).max(*incoming);
                }
                merged.rows += schema.rows;
            }
        }
    }

    merged.ok_or_else(|| WarehouseError::MalformedSource {
        object: objects
            .first()
            .map(|(key, _)| key.clone())
            .unwrap_or_default(),
        reason: "no columns".into(),
    })
}

/// Check an append against the table's recorded columns and return the
/// layout to record afterwards. An untyped column takes the first type
/// that arrives; a null-only source column fits any column.
fn reconcile(
    table: &TableRef,
    existing: &[Column],
    incoming: &Schema,
) -> Result<Vec<Column>, WarehouseError> {
    let mismatch = |reason: String| WarehouseError::SchemaMismatch {
        table: table.clone(),
        reason,
    };

    let existing_names: Vec<&str> = existing.iter().map(|c| c.name.as_str()).collect();
    if existing_names != incoming.names {
        return Err(mismatch(format!(
            "source has columns {:?}, table has {existing_names:?}",
            incoming.names
        )));
    }

    existing
        .iter()
        .zip(&incoming.kinds)
        .map(|(column, kind)| match (column.kind, *kind) {
            (Some(current), Some(kind)) if !current.accepts(kind) => Err(mismatch(format!(
                "column {} is {current} but source has {kind}",
                column.name
            ))),
            (None, kind) => Ok(Column {
                name: column.name.clone(),
                kind,
            }),
            _ => Ok(column.clone()),
        })
        .collect()
}

fn now_epoch_secs() -> String {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
        .to_string()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn column(name: &str, kind: Option<ColumnType>) -> Column {
        Column {
            name: name.into(),
            kind,
        }
    }

    fn schema(columns: &[(&str, Option<ColumnType>)]) -> Schema {
        Schema {
            names: columns.iter().map(|(n, _)| (*n).to_owned()).collect(),
            kinds: columns.iter().map(|(_, k)| *k).collect(),
            rows: 1,
        }
    }

    fn job(renames: &[(&str, &str)], category_column: Option<&str>) -> LoadJob {
        LoadJob {
            category: "yellow".into(),
            source: "mem://trips/yellow_tripdata_*.parquet".parse().unwrap(),
            format: taxi_ingest::FileFormat::Parquet,
            table: TableRef::new("ny_taxi", "trips"),
            write_mode: WriteMode::Append,
            skip_leading_rows: 0,
            autodetect: true,
            renames: renames
                .iter()
                .map(|(from, to)| ((*from).to_owned(), (*to).to_owned()))
                .collect::<BTreeMap<_, _>>(),
            category_column: category_column.map(str::to_owned),
        }
    }

    #[test]
    fn physical_names_are_quoted() {
        assert_eq!(
            physical_name(&TableRef::new("ny_taxi", "yellow_tripdata")),
            "\"ny_taxi.yellow_tripdata\""
        );
        assert_eq!(quote("odd\"name"), "\"odd\"\"name\"");
    }

    #[test]
    fn insert_sql_numbers_parameters() {
        let columns = vec![
            column("a", Some(ColumnType::Integer)),
            column("b", Some(ColumnType::Text)),
        ];
        assert_eq!(
            insert_sql("\"d.t\"", &columns),
            "INSERT INTO \"d.t\" (\"a\", \"b\") VALUES (?1, ?2)"
        );
    }

    #[test]
    fn untyped_columns_are_created_without_a_type() {
        let columns = vec![column("id", Some(ColumnType::Integer)), column("flag", None)];
        assert_eq!(
            create_sql("\"d.t\"", &columns),
            "CREATE TABLE \"d.t\" (\"id\" INTEGER, \"flag\");"
        );
    }

    #[test]
    fn null_source_columns_fit_any_column() {
        let table = TableRef::new("d", "t");
        let existing = vec![column("fee", Some(ColumnType::Real))];

        let kept = reconcile(&table, &existing, &schema(&[("fee", None)])).unwrap();
        assert_eq!(kept, existing);
        assert!(reconcile(&table, &existing, &schema(&[("fee", Some(ColumnType::Integer))])).is_ok());
        assert!(reconcile(&table, &existing, &schema(&[("fee", Some(ColumnType::Text))])).is_err());
    }

    #[test]
    fn untyped_table_column_takes_the_first_real_type() {
        let table = TableRef::new("d", "t");
        let existing = vec![column("base", Some(ColumnType::Text)), column("SR_Flag", None)];

        let layout = reconcile(
            &table,
            &existing,
            &schema(&[("base", Some(ColumnType::Text)), ("SR_Flag", Some(ColumnType::Integer))]),
        )
        .unwrap();

        assert_eq!(layout[1], column("SR_Flag", Some(ColumnType::Integer)));
    }

    #[test]
    fn renames_apply_before_the_category_column() {
        let job = job(
            &[
                ("tpep_pickup_datetime", "pickup_datetime"),
                ("tpep_dropoff_datetime", "dropoff_datetime"),
            ],
            Some("taxi_type"),
        );
        let shaped = shape(
            &job,
            "yellow_tripdata_2024-01.parquet",
            schema(&[
                ("VendorID", Some(ColumnType::Integer)),
                ("tpep_pickup_datetime", Some(ColumnType::Text)),
                ("tpep_dropoff_datetime", Some(ColumnType::Text)),
            ]),
        )
        .unwrap();

        assert_eq!(
            shaped.names,
            vec!["VendorID", "pickup_datetime", "dropoff_datetime", "taxi_type"]
        );
        assert_eq!(shaped.kinds[3], Some(ColumnType::Text));
    }

    #[test]
    fn rename_onto_an_existing_column_is_malformed() {
        let job = job(&[("tpep_pickup_datetime", "pickup_datetime")], None);
        let result = shaped_names(
            &job,
            "yellow_tripdata_2024-01.parquet",
            &["tpep_pickup_datetime".to_owned(), "PICKUP_DATETIME".to_owned()],
        );
        assert!(matches!(
            result,
            Err(WarehouseError::MalformedSource { .. })
        ));
    }

    #[test]
    fn batch_holds_at_most_capacity_rows() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (n INTEGER)").unwrap();
        let stmt = conn.prepare("INSERT INTO t (n) VALUES (?1)").unwrap();
        let mut batch = Batch::new(stmt, 2);

        for n in 0..5 {
            batch.push(vec![Value::Integer(n)]).unwrap();
            assert!(batch.pending() < 2);
        }
        assert_eq!(batch.written(), 4);
        assert_eq!(batch.pending(), 1);

        batch.flush().unwrap();
        assert_eq!(batch.written(), 5);
        drop(batch);
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 5);
    }
}
