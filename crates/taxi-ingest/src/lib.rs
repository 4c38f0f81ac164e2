pub mod dispatch;
pub mod download;
pub mod feedback;
pub mod fetch;
pub mod load;
pub mod object_store;
pub mod pipeline;
pub mod stage;
pub mod task;
pub mod warehouse;

pub use dispatch::{DEFAULT_WORKERS, dispatch};
pub use download::{Downloader, FetchError};
pub use feedback::{Feedback, FeedbackLog};
pub use fetch::{DEFAULT_URL_TEMPLATE, FetchReport, Fetcher, FileLayout, LocalFile};
pub use load::{LoadError, LoadRequest, LoadSettings, Loader};
pub use object_store::{ObjectStore, ObjectStoreError, Provisioned, SourceUri, UriError};
pub use pipeline::{
    LoadResult, Pipeline, PipelineConfig, PipelineError, PipelineState, ReferenceResult, RunReport,
};
pub use stage::{StageFailure, StageReport, Stager};
pub use task::{FileFormat, FileTask, ReferenceFile, TaskError, YearMonth};
pub use warehouse::{
    DatasetSpec, LoadJob, LoadOutcome, TableInfo, TableRef, Warehouse, WarehouseError, WriteMode,
};

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
