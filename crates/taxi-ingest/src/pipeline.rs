use std::fmt;
use std::sync::Arc;

use crate::download::{Downloader, FetchError};
use crate::feedback::{Feedback, FeedbackLog};
use crate::fetch::{FetchReport, Fetcher, FileLayout};
use crate::load::{LoadError, LoadRequest, LoadSettings, Loader};
use crate::object_store::{ObjectStore, ObjectStoreError, Provisioned};
use crate::stage::{StageReport, Stager};
use crate::task::{FileTask, ReferenceFile};
use crate::warehouse::{DatasetSpec, LoadOutcome, Warehouse, WarehouseError};

/// Errors that stop a pipeline run before it reaches `Done`.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("bucket provisioning failed: {0}")]
    Bucket(#[from] ObjectStoreError),

    #[error("dataset provisioning failed: {0}")]
    Dataset(#[from] WarehouseError),

    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
}

/// Where a run is. Runs only move forward through these in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PipelineState {
    Init,
    Fetching,
    Staging,
    Loading,
    Done,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::Fetching => "fetching",
            Self::Staging => "staging",
            Self::Loading => "loading",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// Static settings for a pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub layout: FileLayout,
    pub load: LoadSettings,
    pub dataset_location: String,
    pub workers: usize,
    /// Fixed-name files fetched and staged next to the trip data, each
    /// loaded into its own table after the trip loads.
    pub references: Vec<ReferenceFile>,
}

/// Outcome of one requested load.
#[derive(Debug)]
pub struct LoadResult {
    pub request: LoadRequest,
    pub outcome: Result<LoadOutcome, LoadError>,
}

/// Outcome of one reference-file load.
#[derive(Debug)]
pub struct ReferenceResult {
    pub file: ReferenceFile,
    pub outcome: Result<LoadOutcome, LoadError>,
}

/// Everything a completed run did.
#[derive(Debug)]
pub struct RunReport {
    pub bucket: Provisioned,
    pub dataset: Provisioned,
    pub fetch: FetchReport,
    pub stage: StageReport,
    pub loads: Vec<LoadResult>,
    pub references: Vec<ReferenceResult>,
    /// Leading entries of `fetch.files` that belong to trip tasks; any
    /// reference files follow them.
    pub trip_files: usize,
    /// States entered, in order.
    pub states: Vec<PipelineState>,
    pub feedback: FeedbackLog,
}

impl RunReport {
    pub fn failed_loads(&self) -> impl Iterator<Item = &LoadResult> {
        self.loads.iter().filter(|l| l.outcome.is_err())
    }

    pub fn failed_references(&self) -> impl Iterator<Item = &ReferenceResult> {
        self.references.iter().filter(|r| r.outcome.is_err())
    }

    /// True when trip files were requested and not one of them arrived.
    pub fn nothing_fetched(&self) -> bool {
        let trips = &self.fetch.files[..self.trip_files.min(self.fetch.files.len())];
        !trips.is_empty() && trips.iter().all(Option::is_none)
    }

    /// True when every upload and every load succeeded and at least one
    /// requested trip file was fetched. Individual failed fetches do not
    /// count against a run.
    pub fn is_success(&self) -> bool {
        self.stage.is_complete()
            && !self.nothing_fetched()
            && self.failed_loads().next().is_none()
            && self.failed_references().next().is_none()
    }
}

/// Fetch → stage → load over explicitly supplied clients.
pub struct Pipeline {
    store: Arc<dyn ObjectStore>,
    warehouse: Arc<dyn Warehouse>,
    fetcher: Fetcher,
    stager: Stager,
    loader: Loader,
    config: PipelineConfig,
    state: PipelineState,
    states: Vec<PipelineState>,
}

impl Pipeline {
    pub fn new(
        downloader: Arc<dyn Downloader>,
        store: Arc<dyn ObjectStore>,
        warehouse: Arc<dyn Warehouse>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            fetcher: Fetcher::new(downloader, config.layout.clone()),
            stager: Stager::new(Arc::clone(&store)),
            loader: Loader::new(
                Arc::clone(&warehouse),
                Arc::clone(&store),
                config.load.clone(),
            ),
            store,
            warehouse,
            config,
            state: PipelineState::Init,
            states: vec![PipelineState::Init],
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn loader(&self) -> &Loader {
        &self.loader
    }

    fn advance(&mut self, next: PipelineState) {
        debug_assert!(next > self.state, "pipeline cannot move from {} to {next}", self.state);
        log::debug!("pipeline {} -> {next}", self.state);
        self.state = next;
        self.states.push(next);
    }

    /// Run the whole pipeline once.
    ///
    /// Per-file fetch and upload failures are recorded and the run carries
    /// on. A failed load is recorded and the next load still runs. Only
    /// provisioning, or being unable to create the download directory,
    /// ends the run early.
    pub async fn run(
        &mut self,
        tasks: &[FileTask],
        loads: &[LoadRequest],
    ) -> Result<RunReport, PipelineError> {
        self.state = PipelineState::Init;
        self.states = vec![PipelineState::Init];

        let mut feedback = FeedbackLog::new();
        let workers = self.config.workers;

        let bucket = self.store.ensure_bucket().await?;
        feedback.push(Feedback::info(match bucket {
            Provisioned::Existing => format!("bucket {} exists", self.store.bucket()),
            Provisioned::Created => format!("bucket {} created", self.store.bucket()),
        }));

        let spec = DatasetSpec {
            name: self.config.load.dataset.clone(),
            location: self.config.dataset_location.clone(),
        };
        let dataset = self.warehouse.ensure_dataset(&spec).await?;
        feedback.push(Feedback::info(match dataset {
            Provisioned::Existing => format!("dataset {} exists", spec.name),
            Provisioned::Created => format!("dataset {} created", spec.name),
        }));

        self.advance(PipelineState::Fetching);
        let mut fetch = self.fetcher.fetch(tasks, workers).await?;
        if !tasks.is_empty() && fetch.successful().next().is_none() {
            feedback.push(Feedback::error("none of the requested trip files could be fetched"));
        }
        if !self.config.references.is_empty() {
            let references = self
                .fetcher
                .fetch_references(&self.config.references, workers)
                .await?;
            fetch.merge(references);
        }
        feedback.push(Feedback::info(format!(
            "fetched {} files ({} downloaded, {} already present, {} failed)",
            fetch.downloaded + fetch.reused,
            fetch.downloaded,
            fetch.reused,
            fetch.failed
        )));

        self.advance(PipelineState::Staging);
        let stage = self.stager.stage(&fetch.files, workers).await;
        feedback.push(Feedback::info(format!(
            "uploaded {} files ({} failed)",
            stage.uploaded.len(),
            stage.failures.len()
        )));

        self.advance(PipelineState::Loading);
        let mut results = Vec::with_capacity(loads.len());
        for request in loads {
            let outcome = self.loader.run(request).await;
            match &outcome {
                Ok(done) => feedback.push(Feedback::info(format!(
                    "loaded {} rows into {} ({} total)",
                    done.rows_loaded, done.table, done.total_rows
                ))),
                Err(e) => feedback.push(Feedback::error(format!(
                    "load of {} failed: {e}",
                    request.category
                ))),
            }
            results.push(LoadResult {
                request: request.clone(),
                outcome,
            });
        }

        let mut references = Vec::with_capacity(self.config.references.len());
        for file in &self.config.references {
            let outcome = self.loader.load_reference(file).await;
            match &outcome {
                Ok(done) => feedback.push(Feedback::info(format!(
                    "loaded {} rows into {}",
                    done.rows_loaded, done.table
                ))),
                Err(e) => feedback.push(Feedback::error(format!("load of {file} failed: {e}"))),
            }
            references.push(ReferenceResult {
                file: file.clone(),
                outcome,
            });
        }

        self.advance(PipelineState::Done);

        Ok(RunReport {
            bucket,
            dataset,
            fetch,
            stage,
            loads: results,
            references,
            trip_files: tasks.len(),
            states: self.states.clone(),
            feedback,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use crate::test_support::{InMemoryDownloader, InMemoryObjectStore, InMemoryWarehouse};
    use crate::{FileFormat, TableRef, WriteMode};

    use super::*;

    const TEMPLATE: &str = "https://trips.test/{category}/{file}";

    struct Harness {
        downloader: Arc<InMemoryDownloader>,
        store: Arc<InMemoryObjectStore>,
        warehouse: Arc<InMemoryWarehouse>,
        pipeline: Pipeline,
    }

    fn harness(dir: &Path, downloader: InMemoryDownloader, store: InMemoryObjectStore) -> Harness {
        let downloader = Arc::new(downloader);
        let store = Arc::new(store);
        let warehouse = Arc::new(InMemoryWarehouse::new(Arc::clone(&store)));
        let config = PipelineConfig {
            layout: FileLayout::new(TEMPLATE, dir, FileFormat::CsvGz),
            load: LoadSettings::new("ny_taxi", FileFormat::CsvGz),
            dataset_location: "US".into(),
            workers: 2,
            references: Vec::new(),
        };
        let pipeline = Pipeline::new(
            downloader.clone(),
            store.clone(),
            warehouse.clone(),
            config,
        );
        Harness {
            downloader,
            store,
            warehouse,
            pipeline,
        }
    }

    fn yellow_2019(months: &[u8]) -> Vec<FileTask> {
        months
            .iter()
            .map(|m| FileTask::new("yellow", 2019, *m).unwrap())
            .collect()
    }

    fn serve_month(downloader: &mut InMemoryDownloader, month: u8, rows: usize) {
        let mut body = String::from("vendor_id,passenger_count\n");
        for i in 0..rows {
            body.push_str(&format!("{},{}\n", i % 2 + 1, i));
        }
        downloader.serve(
            format!("https://trips.test/yellow/yellow_tripdata_2019-{month:02}.csv.gz"),
            body,
        );
    }

    #[tokio::test]
    async fn two_good_downloads_flow_through_to_one_table() {
        let dir = tempfile::tempdir().unwrap();
        let mut downloader = InMemoryDownloader::new();
        serve_month(&mut downloader, 1, 3);
        serve_month(&mut downloader, 2, 4);
        let mut h = harness(dir.path(), downloader, InMemoryObjectStore::new("trips"));

        let report = h
            .pipeline
            .run(
                &yellow_2019(&[1, 2]),
                &[LoadRequest::category("yellow", WriteMode::Append)],
            )
            .await
            .unwrap();

        assert_eq!(report.fetch.successful().count(), 2);
        assert_eq!(
            h.store.keys(),
            vec![
                "yellow_tripdata_2019-01.csv.gz",
                "yellow_tripdata_2019-02.csv.gz"
            ]
        );
        let outcome = report.loads[0].outcome.as_ref().unwrap();
        assert_eq!(outcome.table, TableRef::new("ny_taxi", "yellow_tripdata"));
        assert_eq!(outcome.objects.len(), 2);
        assert_eq!(outcome.rows_loaded, 7);
        assert!(report.is_success());
        assert_eq!(h.pipeline.state(), PipelineState::Done);
        assert_eq!(
            report.states,
            vec![
                PipelineState::Init,
                PipelineState::Fetching,
                PipelineState::Staging,
                PipelineState::Loading,
                PipelineState::Done,
            ]
        );
    }

    #[tokio::test]
    async fn failed_download_still_reaches_done() {
        let dir = tempfile::tempdir().unwrap();
        let mut downloader = InMemoryDownloader::new();
        serve_month(&mut downloader, 1, 2);
        let mut h = harness(dir.path(), downloader, InMemoryObjectStore::new("trips"));

        let report = h
            .pipeline
            .run(
                &yellow_2019(&[1, 2]),
                &[LoadRequest::category("yellow", WriteMode::Append)],
            )
            .await
            .unwrap();

        assert!(report.fetch.files[0].is_some());
        assert!(report.fetch.files[1].is_none());
        assert_eq!(report.stage.uploaded, vec!["yellow_tripdata_2019-01.csv.gz"]);
        assert_eq!(h.store.keys().len(), 1);
        assert_eq!(h.pipeline.state(), PipelineState::Done);
        assert!(report.is_success());
    }

    #[tokio::test]
    async fn provisions_bucket_and_dataset_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut downloader = InMemoryDownloader::new();
        serve_month(&mut downloader, 1, 1);
        let mut h = harness(dir.path(), downloader, InMemoryObjectStore::new("trips"));
        let loads = [LoadRequest::category("yellow", WriteMode::Replace)];

        let first = h.pipeline.run(&yellow_2019(&[1]), &loads).await.unwrap();
        let second = h.pipeline.run(&yellow_2019(&[1]), &loads).await.unwrap();

        assert_eq!(first.bucket, Provisioned::Created);
        assert_eq!(first.dataset, Provisioned::Created);
        assert_eq!(second.bucket, Provisioned::Existing);
        assert_eq!(second.dataset, Provisioned::Existing);
        assert_eq!(second.fetch.reused, 1);
        assert_eq!(h.downloader.requests().len(), 1);
    }

    #[tokio::test]
    async fn failed_load_does_not_stop_later_loads() {
        let dir = tempfile::tempdir().unwrap();
        let mut downloader = InMemoryDownloader::new();
        serve_month(&mut downloader, 1, 2);
        let mut h = harness(dir.path(), downloader, InMemoryObjectStore::new("trips"));

        let report = h
            .pipeline
            .run(
                &yellow_2019(&[1]),
                &[
                    LoadRequest::category("green", WriteMode::Append),
                    LoadRequest::category("yellow", WriteMode::Append),
                ],
            )
            .await
            .unwrap();

        assert_eq!(report.failed_loads().count(), 1);
        assert!(report.loads[1].outcome.is_ok());
        assert!(!report.is_success());
        assert_eq!(h.warehouse.jobs().len(), 2);
        assert_eq!(h.pipeline.state(), PipelineState::Done);
    }

    #[tokio::test]
    async fn upload_failure_marks_run_unsuccessful() {
        let dir = tempfile::tempdir().unwrap();
        let mut downloader = InMemoryDownloader::new();
        serve_month(&mut downloader, 1, 2);
        serve_month(&mut downloader, 2, 2);
        let mut store = InMemoryObjectStore::new("trips");
        store.fail_uploads_of("yellow_tripdata_2019-02.csv.gz");
        let mut h = harness(dir.path(), downloader, store);

        let report = h
            .pipeline
            .run(
                &yellow_2019(&[1, 2]),
                &[LoadRequest::category("yellow", WriteMode::Append)],
            )
            .await
            .unwrap();

        assert_eq!(report.stage.failures.len(), 1);
        assert_eq!(report.loads[0].outcome.as_ref().unwrap().rows_loaded, 2);
        assert!(!report.is_success());
    }

    #[tokio::test]
    async fn reference_files_load_into_their_own_tables() {
        let dir = tempfile::tempdir().unwrap();
        let mut downloader = InMemoryDownloader::new();
        serve_month(&mut downloader, 1, 2);
        downloader.serve(
            "https://trips.test/misc/taxi_zone_lookup.csv",
            "LocationID,Borough\n1,EWR\n2,Queens\n3,Bronx\n",
        );
        let mut h = harness(dir.path(), downloader, InMemoryObjectStore::new("trips"));
        h.pipeline.config.references = vec![
            ReferenceFile::new(
                "taxi_zone_lookup.csv",
                "https://trips.test/misc/taxi_zone_lookup.csv",
                "taxi_zone_lookup",
            )
            .unwrap(),
        ];

        let report = h
            .pipeline
            .run(
                &yellow_2019(&[1]),
                &[LoadRequest::category("yellow", WriteMode::Append)],
            )
            .await
            .unwrap();

        assert_eq!(report.fetch.successful().count(), 2);
        assert!(h.store.get("taxi_zone_lookup.csv").is_some());
        let zones = report.references[0].outcome.as_ref().unwrap();
        assert_eq!(zones.table, TableRef::new("ny_taxi", "taxi_zone_lookup"));
        assert_eq!(zones.rows_loaded, 3);
        let job = h.warehouse.jobs().pop().unwrap();
        assert_eq!(job.write_mode, WriteMode::Replace);
        assert!(report.is_success());
    }

    #[tokio::test]
    async fn run_with_no_fetched_trip_files_is_unsuccessful() {
        let dir = tempfile::tempdir().unwrap();
        let mut downloader = InMemoryDownloader::new();
        downloader.serve("https://trips.test/zones.csv", "id\n1\n");
        let mut h = harness(dir.path(), downloader, InMemoryObjectStore::new("trips"));
        h.pipeline.config.references =
            vec![ReferenceFile::new("zones.csv", "https://trips.test/zones.csv", "zones").unwrap()];

        let report = h.pipeline.run(&yellow_2019(&[1, 2]), &[]).await.unwrap();

        assert_eq!(h.pipeline.state(), PipelineState::Done);
        assert!(report.fetch.files[2].is_some());
        assert!(report.nothing_fetched());
        assert!(!report.is_success());
        assert!(report.feedback.errors() >= 1);
    }
}
