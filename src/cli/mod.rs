//! Command line interface.

pub mod command;

use std::path::PathBuf;
use std::time::Duration;

use clap::{command, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

#[derive(Parser)]
#[command(version, about, long_about = None)]
/// Contains the commands
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Download SEAS5 monthly-mean forecast GRIBs from MARS into blob storage
    Download {
        /// First publication year to retrieve
        #[arg(long, default_value_t = 1981)]
        start_year: i32,
        /// Year to stop before
        #[arg(long, default_value_t = 2024)]
        end_year: i32,
    },
    /// Convert raw forecast GRIBs into per-lead-time COGs
    Process {},
    /// Extract ERA5-Land zonal statistics for the monitored provinces
    History {
        /// GeoJSON file with level-1 administrative boundaries (GAUL schema)
        #[arg(long)]
        boundaries: PathBuf,
        /// First year of the historical window
        #[arg(long, default_value_t = 1981)]
        start_year: i32,
        /// Last year of the historical window (inclusive)
        #[arg(long, default_value_t = 2025)]
        end_year: i32,
    },
}

/// Creates a spinner.
pub fn create_spinner(message: String) -> ProgressBar {
    let bar = ProgressBar::new_spinner().with_message(message);
    bar.enable_steady_tick(Duration::from_millis(100));

    bar
}

/// Creates a progress bar.
pub fn create_progress_bar(size: u64, message: String) -> ProgressBar {
    ProgressBar::new(size).with_message(message).with_style(
        ProgressStyle::with_template("[{eta_precise}] {bar:40.cyan/blue} {msg}")
            .unwrap()
            .progress_chars("##-"),
    )
}
