//! Firmware manifest and version comparison
//!
//! Version comparison uses semver after stripping a leading `v`.

use crate::constants::HW_REV_PLACEHOLDER;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Firmware manifest fetched from the update server
///
/// ```json
/// {"version": "1.4.0", "firmware_url": "https://example.com/fw-{hw_rev}.bin"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareManifest {
    /// Latest available version
    pub version: String,
    /// Image URL template, `{hw_rev}` is replaced by the hardware revision
    pub firmware_url: String,
    #[serde(default)]
    pub release_notes: Option<String>,
}

impl FirmwareManifest {
    /// Image URL for a device with hardware revision `hw_rev`
    pub fn firmware_url_for(&self, hw_rev: u32) -> String {
        self.firmware_url
            .replace(HW_REV_PLACEHOLDER, &hw_rev.to_string())
    }
}

/// Result of comparing the device version against the manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionCheck {
    UpToDate,
    UpdateAvailable { latest: String },
}

/// Compare the device's firmware version with the manifest
///
/// Fails with `UpdateCheckFailed` if either version is not semver.
pub fn compare_versions(device_version: &str, manifest: &FirmwareManifest) -> Result<VersionCheck> {
    let device = parse_version(device_version)?;
    let latest = parse_version(&manifest.version)?;

    if device < latest {
        Ok(VersionCheck::UpdateAvailable {
            latest: manifest.version.clone(),
        })
    } else {
        Ok(VersionCheck::UpToDate)
    }
}

fn parse_version(version: &str) -> Result<semver::Version> {
    semver::Version::parse(clean_version_string(version)).map_err(|e| Error::UpdateCheckFailed {
        reason: format!("invalid version '{}': {}", version, e),
    })
}

/// Strip whitespace and a `v`/`V` prefix
fn clean_version_string(version: &str) -> &str {
    let v = version.trim();
    v.strip_prefix('v')
        .or_else(|| v.strip_prefix('V'))
        .unwrap_or(v)
}
