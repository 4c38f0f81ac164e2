mod clients;
mod commands;
mod config;
mod logging;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use taxi_ingest::{LoadRequest, WriteMode};

#[derive(Parser)]
#[command(name = "taxi-ingest")]
#[command(about = "Fetch, stage and load NYC taxi trip data")]
struct Cli {
    /// Configuration file (defaults to ~/.config/taxi-ingest/ingest.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Provision, fetch, stage and load everything configured
    Run,
    /// Download the configured files only
    Fetch,
    /// Download the configured files and upload them to the bucket
    Stage,
    /// Load staged files of one category into the warehouse
    Load {
        /// Category to load (yellow, green, fhv, ...)
        #[arg(long)]
        category: String,
        /// Only load files from this year
        #[arg(long)]
        year: Option<u16>,
        /// append or replace (defaults to the configured mode)
        #[arg(long, value_parser = parse_write_mode)]
        write_mode: Option<WriteMode>,
        /// Override the destination table name
        #[arg(long)]
        table: Option<String>,
    },
    /// List warehouse tables with row counts
    Tables,
}

fn parse_write_mode(s: &str) -> Result<WriteMode, String> {
    WriteMode::parse(s).ok_or_else(|| format!("unknown write mode: {s} (expected append or replace)"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::initialize_logging(cli.verbose);

    let config = config::load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Run => commands::run::run(&config).await,
        Command::Fetch => commands::fetch::run(&config).await,
        Command::Stage => commands::stage::run(&config).await,
        Command::Load {
            category,
            year,
            write_mode,
            table,
        } => {
            let request = LoadRequest {
                category,
                year,
                write_mode: write_mode.unwrap_or(config.warehouse.write_mode),
                table,
            };
            commands::load::run(&config, request).await
        }
        Command::Tables => commands::tables::run(&config).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn load_flags_parse() {
        let cli = Cli::try_parse_from([
            "taxi-ingest",
            "load",
            "--category",
            "fhv",
            "--year",
            "2019",
            "--write-mode",
            "WRITE_TRUNCATE",
        ])
        .unwrap();

        match cli.command {
            Command::Load {
                category,
                year,
                write_mode,
                table,
            } => {
                assert_eq!(category, "fhv");
                assert_eq!(year, Some(2019));
                assert_eq!(write_mode, Some(WriteMode::Replace));
                assert!(table.is_none());
            }
            _ => panic!("expected load"),
        }
    }

    #[test]
    fn unknown_write_mode_is_rejected() {
        let result = Cli::try_parse_from([
            "taxi-ingest",
            "load",
            "--category",
            "fhv",
            "--write-mode",
            "upsert",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn global_flags_follow_subcommand() {
        let cli = Cli::try_parse_from(["taxi-ingest", "tables", "--verbose", "--config", "x.toml"])
            .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));
    }
}
