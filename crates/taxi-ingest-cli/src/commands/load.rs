use std::sync::Arc;

use anyhow::Result;
use taxi_ingest::{DatasetSpec, LoadRequest, Loader, Warehouse};

use crate::clients;
use crate::config::AppConfig;

/// Run one load job against whatever is already staged.
pub async fn run(config: &AppConfig, request: LoadRequest) -> Result<()> {
    let store = clients::object_store(&config.bucket)?;
    let warehouse = clients::warehouse(&config.warehouse, Arc::clone(&store))?;

    warehouse
        .ensure_dataset(&DatasetSpec {
            name: config.warehouse.dataset.clone(),
            location: config.warehouse.location.clone(),
        })
        .await?;

    let loader = Loader::new(warehouse, store, config.load_settings());
    let job = loader.job(&request)?;
    println!("Loading {} into {} ({})...", job.source, job.table, job.write_mode);

    let outcome = loader.run(&request).await?;
    println!(
        "Loaded {} rows from {} objects into {} ({} total).",
        outcome.rows_loaded,
        outcome.objects.len(),
        outcome.table,
        outcome.total_rows
    );

    Ok(())
}
