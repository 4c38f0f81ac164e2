use std::sync::Arc;

use anyhow::Result;
use taxi_ingest::{Pipeline, RunReport};

use super::{fetch, stage};
use crate::clients;
use crate::config::AppConfig;

fn print_report(report: &RunReport) {
    println!("Bucket: {:?}. Dataset: {:?}.", report.bucket, report.dataset);
    fetch::print_summary(&report.fetch);
    stage::print_summary(&report.stage);

    for result in &report.loads {
        match &result.outcome {
            Ok(outcome) => println!(
                "  {}: {} rows loaded ({} total)",
                outcome.table, outcome.rows_loaded, outcome.total_rows
            ),
            Err(e) => eprintln!("  {}: load failed: {e}", result.request.category),
        }
    }

    for result in &report.references {
        match &result.outcome {
            Ok(outcome) => println!(
                "  {} -> {}: {} rows loaded",
                result.file, outcome.table, outcome.rows_loaded
            ),
            Err(e) => eprintln!("  {}: reference load failed: {e}", result.file),
        }
    }
}

/// Provision, fetch, stage and load everything the config describes.
pub async fn run(config: &AppConfig) -> Result<()> {
    let tasks = config.source.tasks()?;
    let loads = config.load_requests();

    let store = clients::object_store(&config.bucket)?;
    let warehouse = clients::warehouse(&config.warehouse, Arc::clone(&store))?;
    let mut pipeline = Pipeline::new(
        clients::downloader(),
        store,
        warehouse,
        config.pipeline_config()?,
    );

    println!(
        "Running {} file tasks and {} loads...",
        tasks.len(),
        loads.len()
    );

    let report = pipeline.run(&tasks, &loads).await?;
    print_report(&report);

    if report.nothing_fetched() {
        anyhow::bail!("none of the {} trip files could be fetched", tasks.len());
    }
    if !report.is_success() {
        anyhow::bail!(
            "{} uploads, {} loads and {} reference loads failed",
            report.stage.failures.len(),
            report.failed_loads().count(),
            report.failed_references().count()
        );
    }

    println!("Done.");
    Ok(())
}
