use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::dispatch::dispatch;
use crate::download::{Downloader, FetchError};
use crate::feedback::{Feedback, FeedbackLog};
use crate::task::{FileFormat, FileTask, ReferenceFile};

/// Default remote location of the trip-data releases.
pub const DEFAULT_URL_TEMPLATE: &str =
    "https://github.com/DataTalksClub/nyc-tlc-data/releases/download/{category}/{file}";

/// Maps a task to its remote URL and local path.
///
/// The URL template understands `{category}`, `{year}`, `{month}` (two
/// digits) and `{file}` (the full file name).
#[derive(Debug, Clone)]
pub struct FileLayout {
    pub url_template: String,
    pub download_dir: PathBuf,
    pub format: FileFormat,
}

impl FileLayout {
    pub fn new(
        url_template: impl Into<String>,
        download_dir: impl Into<PathBuf>,
        format: FileFormat,
    ) -> Self {
        Self {
            url_template: url_template.into(),
            download_dir: download_dir.into(),
            format,
        }
    }

    pub fn file_name(&self, task: &FileTask) -> String {
        task.file_name(self.format)
    }

    pub fn url(&self, task: &FileTask) -> String {
        self.url_template
            .replace("{category}", task.category())
            .replace("{year}", &format!("{:04}", task.year()))
            .replace("{month}", &format!("{:02}", task.month()))
            .replace("{file}", &self.file_name(task))
    }

    pub fn local_path(&self, task: &FileTask) -> PathBuf {
        self.download_dir.join(self.file_name(task))
    }
}

/// A fetched file on local disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    /// The trip-data task this file was fetched for; `None` for reference files.
    pub task: Option<FileTask>,
    pub name: String,
    pub format: FileFormat,
    pub path: PathBuf,
}

impl LocalFile {
    /// Object key for this file: its basename.
    pub fn key(&self) -> String {
        self.name.clone()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Result of a fetch batch, in task order.
#[derive(Debug, Default)]
pub struct FetchReport {
    pub files: Vec<Option<LocalFile>>,
    pub downloaded: u64,
    pub reused: u64,
    pub failed: u64,
    pub feedback: FeedbackLog,
}

impl FetchReport {
    /// Fetched files with failures dropped.
    pub fn successful(&self) -> impl Iterator<Item = &LocalFile> {
        self.files.iter().flatten()
    }

    /// Append another batch's results after this one's.
    pub fn merge(&mut self, other: FetchReport) {
        self.files.extend(other.files);
        self.downloaded += other.downloaded;
        self.reused += other.reused;
        self.failed += other.failed;
        self.feedback.extend(other.feedback);
    }
}

/// One file to fetch: where it comes from and what it is called locally.
struct Remote {
    task: Option<FileTask>,
    name: String,
    format: FileFormat,
    url: String,
}

enum Outcome {
    Reused(LocalFile),
    Downloaded(LocalFile, u64),
    Failed(String, String, FetchError),
}

/// Downloads trip-data files into a local directory, skipping ones already there.
pub struct Fetcher {
    downloader: Arc<dyn Downloader>,
    layout: FileLayout,
}

impl Fetcher {
    pub fn new(downloader: Arc<dyn Downloader>, layout: FileLayout) -> Self {
        Self { downloader, layout }
    }

    pub fn layout(&self) -> &FileLayout {
        &self.layout
    }

    /// Fetch every task with at most `workers` downloads in flight.
    ///
    /// Only failing to create the download directory aborts the batch; a
    /// failed download leaves `None` in that task's slot.
    pub async fn fetch(&self, tasks: &[FileTask], workers: usize) -> Result<FetchReport, FetchError> {
        let remotes = tasks
            .iter()
            .map(|task| Remote {
                task: Some(task.clone()),
                name: self.layout.file_name(task),
                format: self.layout.format,
                url: self.layout.url(task),
            })
            .collect();
        self.fetch_remotes(remotes, workers).await
    }

    /// Fetch reference files from their own URLs into the download directory.
    pub async fn fetch_references(
        &self,
        files: &[ReferenceFile],
        workers: usize,
    ) -> Result<FetchReport, FetchError> {
        let remotes = files
            .iter()
            .map(|file| Remote {
                task: None,
                name: file.name().to_owned(),
                format: file.format(),
                url: file.url().to_owned(),
            })
            .collect();
        self.fetch_remotes(remotes, workers).await
    }

    async fn fetch_remotes(
        &self,
        remotes: Vec<Remote>,
        workers: usize,
    ) -> Result<FetchReport, FetchError> {
        std::fs::create_dir_all(&self.layout.download_dir)?;

        let outcomes = dispatch(remotes, workers, |remote| self.fetch_one(remote)).await;

        let mut report = FetchReport::default();
        for outcome in outcomes {
            match outcome {
                Outcome::Reused(file) => {
                    report.reused += 1;
                    report.files.push(Some(file));
                }
                Outcome::Downloaded(file, bytes) => {
                    report.downloaded += 1;
                    report
                        .feedback
                        .push(Feedback::info(format!("downloaded {} ({bytes} bytes)", file.key())));
                    report.files.push(Some(file));
                }
                Outcome::Failed(name, url, e) => {
                    report.failed += 1;
                    report
                        .feedback
                        .push(Feedback::warning(format!("failed {name} from {url}: {e}")));
                    report.files.push(None);
                }
            }
        }

        Ok(report)
    }

    async fn fetch_one(&self, remote: Remote) -> Outcome {
        let file = LocalFile {
            path: self.layout.download_dir.join(&remote.name),
            task: remote.task,
            name: remote.name,
            format: remote.format,
        };

        if file.path.exists() {
            log::debug!("reusing {}", file.path.display());
            return Outcome::Reused(file);
        }

        log::info!("downloading {}", file.name);
        match self.downloader.download(&remote.url, &file.path).await {
            Ok(bytes) => Outcome::Downloaded(file, bytes),
            Err(e) => Outcome::Failed(file.name, remote.url, e),
        }
    }
}
