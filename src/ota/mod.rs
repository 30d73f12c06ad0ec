//! Firmware update sequencer
//!
//! Runs check, download, transfer and apply as a supervised sequence over the
//! telemetry connection:
//!
//! ```text
//! Idle ─► Checking ─► Idle (update recorded) ─► Downloading ─► Transferring ─► Applying ─► Complete
//!                                                     └────────────┴─► Idle (cancelled)
//! Failed is reachable from every busy state
//! ```
//!
//! The transfer is cooperative: each chunk is a scheduled step, and the owner
//! calls [`FirmwareUpdater::run_due_steps`] when the next deadline passes.
//! Cancellation sets a flag that the next step honours. `Complete` is only
//! entered after the device confirms the new image.

pub mod downloader;
pub mod manifest;

pub use downloader::{Downloader, HttpDownloader};
pub use manifest::{compare_versions, FirmwareManifest, VersionCheck};

use crate::codec;
use crate::config::OtaConfig;
use crate::connection::{ConnectionManager, ConnectionState};
use crate::device::{DeviceInfo, DeviceResponse};
use crate::error::{Error, Result, UpdateStage};
use crate::events::{EventListener, UpdateEvent};
use crate::scheduler::{Clock, Scheduler, TimerId};
use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Device commands used by the update sequence
pub mod command {
    pub const APPLY: &str = "ota/apply";
    pub const ABORT: &str = "ota/abort";
    pub const BEGIN_PREFIX: &str = "ota/begin";

    pub fn begin(size: usize, version: &str) -> String {
        format!("{}?size={}&version={}", BEGIN_PREFIX, size, version)
    }
}

/// What the updater needs from the connection
#[async_trait]
pub trait DeviceLink: Send {
    fn is_connected(&self) -> bool;

    /// System info reported with the inventory
    fn device_info(&self) -> Option<DeviceInfo>;

    async fn send_command(&mut self, command: &str) -> Result<()>;

    async fn send_frame(&mut self, frame: Bytes) -> Result<()>;
}

#[async_trait]
impl DeviceLink for ConnectionManager {
    fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    fn device_info(&self) -> Option<DeviceInfo> {
        ConnectionManager::device_info(self)
    }

    async fn send_command(&mut self, command: &str) -> Result<()> {
        ConnectionManager::send_command(self, command).await
    }

    async fn send_frame(&mut self, frame: Bytes) -> Result<()> {
        ConnectionManager::send_frame(self, frame).await
    }
}

/// Update sequencer state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateState {
    #[default]
    Idle,
    Checking,
    Downloading,
    Transferring,
    Applying,
    Failed,
    Complete,
}

impl std::fmt::Display for UpdateState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Checking => "checking",
            Self::Downloading => "downloading",
            Self::Transferring => "transferring",
            Self::Applying => "applying",
            Self::Failed => "failed",
            Self::Complete => "complete",
        };
        f.write_str(name)
    }
}

/// Outcome of an update check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UpdateCheck {
    NoUpdateNeeded {
        current: String,
    },
    UpdateAvailable {
        current: String,
        version: String,
        release_notes: Option<String>,
    },
}

/// Update found by the last check, awaiting the operator's decision
#[derive(Debug, Clone)]
struct AvailableUpdate {
    manifest: FirmwareManifest,
    hw_revision: u32,
}

/// Image being streamed to the device
struct Transfer {
    image: Bytes,
    offset: usize,
    version: String,
}

/// Timed update work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UpdateStep {
    SendChunk,
    ApplyTimeout,
}

/// Firmware update sequencer
pub struct FirmwareUpdater {
    config: OtaConfig,
    downloader: Arc<dyn Downloader>,
    events: Arc<dyn EventListener>,
    clock: Arc<dyn Clock>,

    state: UpdateState,
    available: Option<AvailableUpdate>,
    transfer: Option<Transfer>,
    steps: Scheduler<UpdateStep>,
    apply_timer: Option<TimerId>,
    cancel: Arc<AtomicBool>,
    /// The last sequence ended through cancellation
    last_cancelled: bool,
}

impl FirmwareUpdater {
    pub fn new(
        config: OtaConfig,
        downloader: Arc<dyn Downloader>,
        events: Arc<dyn EventListener>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            downloader,
            events,
            clock,
            state: UpdateState::Idle,
            available: None,
            transfer: None,
            steps: Scheduler::new(),
            apply_timer: None,
            cancel: Arc::new(AtomicBool::new(false)),
            last_cancelled: false,
        }
    }

    pub fn state(&self) -> UpdateState {
        self.state
    }

    /// True in the post-check "update available" decision point
    pub fn update_available(&self) -> bool {
        self.state == UpdateState::Idle && self.available.is_some()
    }

    /// Flag checked by the next step of an in-flight update
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.steps.next_deadline()
    }

    fn is_busy(&self) -> bool {
        matches!(
            self.state,
            UpdateState::Checking
                | UpdateState::Downloading
                | UpdateState::Transferring
                | UpdateState::Applying
        )
    }

    // =========================================================================
    // Check
    // =========================================================================

    /// Compare the device firmware against the manifest
    pub async fn check(&mut self, link: &mut dyn DeviceLink) -> Result<UpdateCheck> {
        if self.is_busy() {
            return Err(self.invalid_state("check for updates"));
        }

        self.available = None;
        self.set_state(UpdateState::Checking);
        self.emit(UpdateEvent::Checking);

        match self.fetch_and_compare(link).await {
            Ok(outcome) => {
                self.set_state(UpdateState::Idle);
                match &outcome {
                    UpdateCheck::NoUpdateNeeded { current } => {
                        info!(current = %current, "Firmware up to date");
                        self.emit(UpdateEvent::NoUpdateNeeded {
                            current: current.clone(),
                        });
                    }
                    UpdateCheck::UpdateAvailable {
                        current, version, ..
                    } => {
                        info!(current = %current, latest = %version, "Firmware update available");
                        self.emit(UpdateEvent::UpdateAvailable {
                            current: current.clone(),
                            version: version.clone(),
                        });
                    }
                }
                Ok(outcome)
            }
            Err(e) => {
                self.available = None;
                let reason = reason_of(&e);
                warn!("Update check failed: {}", reason);
                self.set_state(UpdateState::Failed);
                self.emit(UpdateEvent::Failed {
                    stage: UpdateStage::Check,
                    reason: reason.clone(),
                });
                Err(Error::UpdateCheckFailed { reason })
            }
        }
    }

    async fn fetch_and_compare(&mut self, link: &mut dyn DeviceLink) -> Result<UpdateCheck> {
        if !link.is_connected() {
            return Err(Error::NotConnected);
        }
        let info = link.device_info().ok_or_else(|| Error::UpdateCheckFailed {
            reason: "device did not report its firmware version".into(),
        })?;
        let url = self
            .config
            .manifest_url
            .clone()
            .ok_or_else(|| Error::UpdateCheckFailed {
                reason: "no manifest URL configured".into(),
            })?;

        let manifest = self.downloader.fetch_manifest(&url).await?;
        let current = info.firmware_version.clone();

        match compare_versions(&current, &manifest)? {
            VersionCheck::UpToDate => Ok(UpdateCheck::NoUpdateNeeded { current }),
            VersionCheck::UpdateAvailable { latest } => {
                let release_notes = manifest.release_notes.clone();
                self.available = Some(AvailableUpdate {
                    manifest,
                    hw_revision: info.hw_revision,
                });
                Ok(UpdateCheck::UpdateAvailable {
                    current,
                    version: latest,
                    release_notes,
                })
            }
        }
    }

    // =========================================================================
    // Start / cancel
    // =========================================================================

    /// Download the recorded update and start streaming it
    ///
    /// Only valid right after a check that found an update. Returns once the
    /// transfer has begun; progress continues through `run_due_steps`.
    pub async fn start(&mut self, link: &mut dyn DeviceLink) -> Result<()> {
        if !self.update_available() {
            return Err(self.invalid_state("start update"));
        }
        if !link.is_connected() {
            return Err(Error::NotConnected);
        }
        let Some(update) = self.available.take() else {
            return Err(self.invalid_state("start update"));
        };

        self.cancel.store(false, Ordering::SeqCst);
        self.last_cancelled = false;
        let version = update.manifest.version.clone();
        self.set_state(UpdateState::Downloading);
        self.emit(UpdateEvent::Downloading {
            version: version.clone(),
        });

        let url = update.manifest.firmware_url_for(update.hw_revision);
        let image = match self.downloader.fetch_image(&url).await {
            Ok(image) if image.is_empty() => {
                return Err(self.fail(UpdateStage::Download, "empty firmware image".into()))
            }
            Ok(image) => image,
            Err(e) => return Err(self.fail(UpdateStage::Download, reason_of(&e))),
        };

        if self.cancel.swap(false, Ordering::SeqCst) {
            self.finish_cancelled();
            return Err(Error::UpdateAborted);
        }

        let total = image.len();
        if let Err(e) = link.send_command(&command::begin(total, &version)).await {
            return Err(self.fail(UpdateStage::Transfer, reason_of(&e)));
        }

        info!(version = %version, size = total, "Firmware transfer started");
        self.transfer = Some(Transfer {
            image,
            offset: 0,
            version,
        });
        self.set_state(UpdateState::Transferring);
        self.emit(UpdateEvent::Transferring { total });
        self.steps.schedule_at(self.clock.now(), UpdateStep::SendChunk);
        Ok(())
    }

    /// Request cancellation of the download or transfer in flight
    ///
    /// Takes effect at the next step.
    pub fn cancel(&mut self) -> Result<()> {
        match self.state {
            UpdateState::Downloading | UpdateState::Transferring => {
                self.cancel.store(true, Ordering::SeqCst);
                Ok(())
            }
            // Already honoured (flag raised while the download was running)
            UpdateState::Idle if self.last_cancelled => Ok(()),
            _ => {
                self.cancel.store(false, Ordering::SeqCst);
                Err(self.invalid_state("cancel update"))
            }
        }
    }

    // =========================================================================
    // Steps and device feedback
    // =========================================================================

    /// Run steps whose time has come
    pub async fn run_due_steps(&mut self, link: &mut dyn DeviceLink) {
        for step in self.steps.take_due(self.clock.now()) {
            match step {
                UpdateStep::SendChunk => self.send_next_chunk(link).await,
                UpdateStep::ApplyTimeout => {
                    if self.state == UpdateState::Applying {
                        let reason = format!(
                            "no confirmation within {} s",
                            self.config.apply_timeout_secs
                        );
                        self.fail(UpdateStage::Apply, reason);
                    }
                }
            }
        }
    }

    async fn send_next_chunk(&mut self, link: &mut dyn DeviceLink) {
        if self.state != UpdateState::Transferring {
            return;
        }
        if self.cancel.swap(false, Ordering::SeqCst) {
            if let Err(e) = link.send_command(command::ABORT).await {
                debug!("Abort command not delivered: {}", e);
            }
            self.finish_cancelled();
            return;
        }

        let Some(transfer) = self.transfer.as_mut() else {
            return;
        };
        let total = transfer.image.len();
        let end = (transfer.offset + self.config.chunk_size.max(1)).min(total);
        let chunk = transfer.image.slice(transfer.offset..end);
        let frame = codec::encode_firmware_chunk(transfer.offset as u32, &chunk);

        if let Err(e) = link.send_frame(frame).await {
            self.fail(UpdateStage::Transfer, reason_of(&e));
            return;
        }
        transfer.offset = end;
        self.emit(UpdateEvent::Progress { sent: end, total });

        if end < total {
            let due = self.clock.now() + Duration::from_millis(self.config.chunk_interval_ms);
            self.steps.schedule_at(due, UpdateStep::SendChunk);
            return;
        }

        if let Err(e) = link.send_command(command::APPLY).await {
            self.fail(UpdateStage::Apply, reason_of(&e));
            return;
        }
        info!("Firmware transferred, waiting for device to apply");
        self.set_state(UpdateState::Applying);
        self.emit(UpdateEvent::Applying);
        let due = self.clock.now() + Duration::from_secs(self.config.apply_timeout_secs);
        self.apply_timer = Some(self.steps.schedule_at(due, UpdateStep::ApplyTimeout));
    }

    /// Feed a device response
    pub fn on_device_response(&mut self, response: &DeviceResponse) {
        match self.state {
            UpdateState::Applying if response.req.starts_with(command::APPLY) => {
                if response.is_ok() {
                    let version = self
                        .transfer
                        .take()
                        .map(|t| t.version)
                        .unwrap_or_default();
                    info!(version = %version, "Firmware update complete");
                    if let Some(timer) = self.apply_timer.take() {
                        self.steps.cancel(timer);
                    }
                    self.set_state(UpdateState::Complete);
                    self.emit(UpdateEvent::Complete { version });
                } else {
                    self.fail(UpdateStage::Apply, response_reason(response));
                }
            }
            UpdateState::Transferring
                if response.req.starts_with(command::BEGIN_PREFIX) && !response.is_ok() =>
            {
                self.fail(UpdateStage::Transfer, response_reason(response));
            }
            _ => {}
        }
    }

    /// The connection went away
    pub fn on_connection_lost(&mut self) {
        match self.state {
            UpdateState::Transferring => {
                self.fail(UpdateStage::Transfer, "connection lost".into());
            }
            UpdateState::Applying => {
                self.fail(UpdateStage::Apply, "connection lost".into());
            }
            _ => {}
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn finish_cancelled(&mut self) {
        info!("Firmware update cancelled");
        self.steps.cancel_all();
        self.apply_timer = None;
        self.transfer = None;
        self.last_cancelled = true;
        self.set_state(UpdateState::Idle);
        self.emit(UpdateEvent::Cancelled);
    }

    /// Move to `Failed` and build the matching error
    fn fail(&mut self, stage: UpdateStage, reason: String) -> Error {
        warn!(stage = %stage, "Firmware update failed: {}", reason);
        self.steps.cancel_all();
        self.apply_timer = None;
        self.transfer = None;
        self.cancel.store(false, Ordering::SeqCst);
        self.set_state(UpdateState::Failed);
        self.emit(UpdateEvent::Failed {
            stage,
            reason: reason.clone(),
        });
        Error::UpdateTransferFailed { stage, reason }
    }

    fn invalid_state(&self, operation: &'static str) -> Error {
        Error::InvalidState {
            operation,
            state: self.state.to_string(),
        }
    }

    fn set_state(&mut self, state: UpdateState) {
        if self.state != state {
            debug!(from = %self.state, to = %state, "Update state");
        }
        self.state = state;
    }

    fn emit(&self, event: UpdateEvent) {
        self.events.on_event(&event.into());
    }
}

/// Underlying reason without the outer error wording
fn reason_of(error: &Error) -> String {
    match error {
        Error::UpdateCheckFailed { reason } | Error::UpdateTransferFailed { reason, .. } => {
            reason.clone()
        }
        other => other.to_string(),
    }
}

fn response_reason(response: &DeviceResponse) -> String {
    response
        .msg
        .clone()
        .unwrap_or_else(|| format!("device answered '{}'", response.rslt))
}
