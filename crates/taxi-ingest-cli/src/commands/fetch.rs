use anyhow::Result;
use taxi_ingest::{FetchReport, Fetcher};

use crate::clients;
use crate::config::AppConfig;

pub fn print_summary(report: &FetchReport) {
    println!(
        "Fetched {} files ({} downloaded, {} already present, {} failed).",
        report.downloaded + report.reused,
        report.downloaded,
        report.reused,
        report.failed
    );
}

/// Download the configured files without staging them.
pub async fn run(config: &AppConfig) -> Result<()> {
    let tasks = config.source.tasks()?;
    let fetcher = Fetcher::new(clients::downloader(), config.layout());

    println!(
        "Fetching {} files into {}...",
        tasks.len(),
        config.download_dir.display()
    );

    let mut report = fetcher.fetch(&tasks, config.workers).await?;
    let trips_fetched = report.files.iter().any(Option::is_some);
    report.merge(
        fetcher
            .fetch_references(&config.references()?, config.workers)
            .await?,
    );
    print_summary(&report);

    if !tasks.is_empty() && !trips_fetched {
        anyhow::bail!("none of the {} trip files could be fetched", tasks.len());
    }

    Ok(())
}
