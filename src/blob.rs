//! Azure blob storage client and the project container layout.

use std::path::Path;

use anyhow::{Context, Result};
use bytes::Bytes;
use futures::TryStreamExt;
use object_store::azure::{AzureConfigKey, MicrosoftAzureBuilder};
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use tracing::debug;

use crate::config::BlobConfig;

/// All pipeline outputs live under this prefix in the container.
pub const PROJECT_PREFIX: &str = "ds-aa-afg-drought";

pub struct BlobStorage {
    store: Box<dyn ObjectStore>,
    container: String,
}

impl BlobStorage {
    /// Creates a client for the project container using SAS authentication.
    pub fn new(config: &BlobConfig) -> Result<Self> {
        let store = MicrosoftAzureBuilder::new()
            .with_account(&config.storage_account)
            .with_container_name(&config.container)
            .with_config(AzureConfigKey::SasKey, &config.sas_token)
            .build()
            .context("failed to create blob storage client")?;

        Ok(Self {
            store: Box::new(store),
            container: config.container.clone(),
        })
    }

    pub async fn put(&self, path: &str, data: Bytes) -> Result<()> {
        let location = ObjectPath::from(path);
        debug!(container = %self.container, path, size = data.len(), "writing blob");

        self.store
            .put(&location, data)
            .await
            .with_context(|| format!("failed to write blob {path}"))?;

        Ok(())
    }

    pub async fn get(&self, path: &str) -> Result<Bytes> {
        let location = ObjectPath::from(path);

        let result = self
            .store
            .get(&location)
            .await
            .with_context(|| format!("failed to read blob {path}"))?;

        let bytes = result
            .bytes()
            .await
            .with_context(|| format!("failed to read blob bytes of {path}"))?;

        debug!(container = %self.container, path, size = bytes.len(), "read blob");
        Ok(bytes)
    }

    /// Lists blob names under a prefix.
    pub async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let prefix_path = ObjectPath::from(prefix);
        let mut names = Vec::new();

        let mut stream = self.store.list(Some(&prefix_path));
        while let Some(meta) = stream
            .try_next()
            .await
            .with_context(|| format!("failed to list blobs under {prefix}"))?
        {
            names.push(meta.location.to_string());
        }

        Ok(names)
    }

    /// Uploads a local file, returning its size in bytes.
    pub async fn upload_file(&self, local_path: &Path, blob_path: &str) -> Result<u64> {
        let data = tokio::fs::read(local_path)
            .await
            .with_context(|| format!("failed to read {}", local_path.display()))?;
        let size = data.len() as u64;

        self.put(blob_path, Bytes::from(data)).await?;
        Ok(size)
    }

    /// Downloads a blob to a local file, returning its size in bytes.
    pub async fn download_file(&self, blob_path: &str, local_path: &Path) -> Result<u64> {
        let data = self.get(blob_path).await?;
        let size = data.len() as u64;

        tokio::fs::write(local_path, &data)
            .await
            .with_context(|| format!("failed to write {}", local_path.display()))?;
        Ok(size)
    }
}

/// Path builder for the project container layout.
pub struct BlobPath;

impl BlobPath {
    /// Raw downloaded archives: `{prefix}/raw/{filename}`.
    pub fn raw(filename: &str) -> String {
        format!("{PROJECT_PREFIX}/raw/{filename}")
    }

    pub fn raw_prefix() -> String {
        format!("{PROJECT_PREFIX}/raw")
    }

    /// Processed forecast rasters: `{prefix}/cogs/{filename}`.
    pub fn cog(filename: &str) -> String {
        format!("{PROJECT_PREFIX}/cogs/{filename}")
    }

    /// Tabular extracts: `{prefix}/raw/vector/{filename}`.
    pub fn vector(filename: &str) -> String {
        format!("{PROJECT_PREFIX}/raw/vector/{filename}")
    }
}

// -- Tests -------------------------------------------------------------------
