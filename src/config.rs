//! Environment-backed configuration.
//!
//! Each command loads only the sections it needs. A `.env` file is honoured
//! when present (loaded in `main`).

use std::env;

use anyhow::{Context, Result};

/// Azure blob storage credentials.
#[derive(Debug, Clone)]
pub struct BlobConfig {
    pub storage_account: String,
    pub container: String,
    pub sas_token: String,
}

impl BlobConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            storage_account: required("STORAGE_ACCOUNT")?,
            container: required("CONTAINER_NAME")?,
            sas_token: required("SAS_TOKEN")?,
        })
    }
}

/// ECMWF web API credentials for MARS retrievals.
#[derive(Debug, Clone)]
pub struct MarsConfig {
    pub url: String,
    pub key: String,
    pub email: String,
}

impl MarsConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            url: optional("ECMWF_API_URL", "https://api.ecmwf.int/v1"),
            key: required("ECMWF_API_KEY")?,
            email: required("ECMWF_API_EMAIL")?,
        })
    }
}

/// Copernicus Climate Data Store credentials.
#[derive(Debug, Clone)]
pub struct CdsConfig {
    pub url: String,
    /// `UID:KEY` pair as issued by the CDS.
    pub key: String,
}

impl CdsConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            url: optional("CDS_API_URL", "https://cds.climate.copernicus.eu/api/v2"),
            key: required("CDS_API_KEY")?,
        })
    }
}

fn required(name: &str) -> Result<String> {
    env::var(name).with_context(|| format!("missing environment variable `{name}`"))
}

fn optional(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

// -- Tests -------------------------------------------------------------------
