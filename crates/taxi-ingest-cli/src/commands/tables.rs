use anyhow::Result;
use taxi_ingest::Warehouse;

use crate::clients;
use crate::config::AppConfig;

/// Print the loaded tables of the configured dataset.
pub async fn run(config: &AppConfig) -> Result<()> {
    let warehouse = clients::warehouse(&config.warehouse, clients::catalog_store(&config.bucket))?;

    let tables = warehouse.list_tables(&config.warehouse.dataset).await?;
    if tables.is_empty() {
        println!("No tables in {}.", config.warehouse.dataset);
        return Ok(());
    }

    let width = tables
        .iter()
        .map(|t| t.table.table.chars().count())
        .max()
        .unwrap_or(0);

    for info in &tables {
        println!(
            "  {:<width$}  {:>12}  {}",
            info.table.table,
            info.rows,
            info.last_loaded_at.as_deref().unwrap_or("-"),
            width = width
        );
    }
    println!("\n{} tables in {}", tables.len(), config.warehouse.dataset);

    Ok(())
}
