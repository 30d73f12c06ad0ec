//! Firmware downloads
//!
//! The updater fetches manifests and images through the [`Downloader`]
//! trait; [`HttpDownloader`] is the reqwest-backed implementation.

use super::manifest::FirmwareManifest;
use crate::constants::HTTP_TIMEOUT_SECS;
use crate::error::{Error, Result, UpdateStage};
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Source of manifests and firmware images
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Fails with `UpdateCheckFailed`
    async fn fetch_manifest(&self, url: &str) -> Result<FirmwareManifest>;

    /// Fails with `UpdateTransferFailed` at the download stage
    async fn fetch_image(&self, url: &str) -> Result<Bytes>;
}

/// HTTP(S) downloader
pub struct HttpDownloader {
    client: reqwest::Client,
}

impl HttpDownloader {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::UpdateCheckFailed {
                reason: format!("failed to create HTTP client: {}", e),
            })?;
        Ok(Self { client })
    }
}

fn check_failed(reason: String) -> Error {
    Error::UpdateCheckFailed { reason }
}

fn download_failed(reason: String) -> Error {
    Error::UpdateTransferFailed {
        stage: UpdateStage::Download,
        reason,
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn fetch_manifest(&self, url: &str) -> Result<FirmwareManifest> {
        debug!(url = %url, "Fetching firmware manifest");

        let response = self.client.get(url).send().await.map_err(|e| {
            warn!(url = %url, error = %e, "Failed to fetch firmware manifest");
            check_failed(e.to_string())
        })?;

        if !response.status().is_success() {
            return Err(check_failed(format!(
                "manifest request failed with status {}",
                response.status()
            )));
        }

        let manifest: FirmwareManifest = response
            .json()
            .await
            .map_err(|e| check_failed(format!("invalid manifest: {}", e)))?;

        info!(version = %manifest.version, "Fetched firmware manifest");
        Ok(manifest)
    }

    async fn fetch_image(&self, url: &str) -> Result<Bytes> {
        info!(url = %url, "Downloading firmware image");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| download_failed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(download_failed(format!(
                "image download failed with status {}",
                response.status()
            )));
        }

        let data = response
            .bytes()
            .await
            .map_err(|e| download_failed(format!("failed to read image body: {}", e)))?;

        debug!(size = data.len(), "Firmware image downloaded");
        Ok(data)
    }
}
