//! Handles serialising and saving data to disk in the _parquet_ file format.

pub mod history;

pub use history::{save_history, HistoryRecord};
