mod blob;
mod cli;
mod cog;
mod config;
mod ecmwf;
mod grib;
mod grid;
mod parquet;
mod zonal;

use anyhow::{Error, Result};
use clap::Parser;
use cli::{command, Cli, Commands};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Error> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Download {
            start_year,
            end_year,
        } => match command::download(*start_year, *end_year).await {
            Ok(count) => println!("Uploaded {} raw forecast files", count),
            Err(e) => eprintln!("Error: {}", e),
        },
        Commands::Process {} => match command::process().await {
            Ok(count) => println!("Published {} COGs", count),
            Err(e) => eprintln!("Error: {}", e),
        },
        Commands::History {
            boundaries,
            start_year,
            end_year,
        } => match command::history(boundaries, *start_year, *end_year).await {
            Ok(blob_path) => println!("History table uploaded to `{}`", blob_path),
            Err(e) => eprintln!("Error: {}", e),
        },
    }

    Ok(())
}
