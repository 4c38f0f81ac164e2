use anyhow::Result;
use taxi_ingest::{Fetcher, ObjectStore, StageReport, Stager};

use super::fetch;
use crate::clients;
use crate::config::AppConfig;

pub fn print_summary(report: &StageReport) {
    println!(
        "Uploaded {} files ({} failed).",
        report.uploaded.len(),
        report.failures.len()
    );
    for failure in &report.failures {
        eprintln!("  {}: {}", failure.key, failure.error);
    }
}

/// Fetch the configured files and upload them to the bucket.
pub async fn run(config: &AppConfig) -> Result<()> {
    let tasks = config.source.tasks()?;
    let store = clients::object_store(&config.bucket)?;

    let provisioned = store.ensure_bucket().await?;
    println!(
        "Bucket {}://{} ({provisioned:?}).",
        store.scheme(),
        store.bucket()
    );

    let fetcher = Fetcher::new(clients::downloader(), config.layout());
    let mut fetched = fetcher.fetch(&tasks, config.workers).await?;
    fetched.merge(
        fetcher
            .fetch_references(&config.references()?, config.workers)
            .await?,
    );
    fetch::print_summary(&fetched);

    let report = Stager::new(store).stage(&fetched.files, config.workers).await;
    print_summary(&report);

    if !report.is_complete() {
        anyhow::bail!("{} uploads failed", report.failures.len());
    }

    Ok(())
}
