use std::path::PathBuf;
use std::sync::Arc;

use crate::dispatch::dispatch;
use crate::feedback::{Feedback, FeedbackLog};
use crate::fetch::LocalFile;
use crate::object_store::{ObjectStore, ObjectStoreError};

/// A file that could not be uploaded.
#[derive(Debug)]
pub struct StageFailure {
    pub path: PathBuf,
    pub key: String,
    pub error: ObjectStoreError,
}

/// Result of a staging batch.
#[derive(Debug, Default)]
pub struct StageReport {
    /// Keys uploaded, in input order.
    pub uploaded: Vec<String>,
    pub failures: Vec<StageFailure>,
    pub feedback: FeedbackLog,
}

impl StageReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Uploads fetched files to the object store, keyed by basename.
pub struct Stager {
    store: Arc<dyn ObjectStore>,
}

impl Stager {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Upload every present file with at most `workers` uploads in flight.
    ///
    /// Absent entries (failed fetches) are skipped. A failed upload is
    /// recorded against its file; the rest of the batch still runs.
    pub async fn stage(&self, files: &[Option<LocalFile>], workers: usize) -> StageReport {
        let present: Vec<LocalFile> = files.iter().flatten().cloned().collect();

        let results = dispatch(present, workers, |file| async move {
            let key = file.key();
            log::info!("uploading {key}");
            let result = self.store.upload(&file.path, &key).await;
            (file, key, result)
        })
        .await;

        let mut report = StageReport::default();
        for (file, key, result) in results {
            match result {
                Ok(()) => {
                    report.feedback.push(Feedback::info(format!(
                        "uploaded {}://{}/{key}",
                        self.store.scheme(),
                        self.store.bucket()
                    )));
                    report.uploaded.push(key);
                }
                Err(error) => {
                    report
                        .feedback
                        .push(Feedback::error(format!("upload of {key} failed: {error}")));
                    report.failures.push(StageFailure {
                        path: file.path,
                        key,
                        error,
                    });
                }
            }
        }

        report
    }
}
