//! Connection manager
//!
//! Owns the transport link and runs the connection state machine:
//!
//! ```text
//! Disconnected ─► Connecting ─► (VerifyingIdentity ─►) Connected
//!      ▲                                                   │ transport lost
//!      │                          policy disabled          ▼
//!      └──────────────────────────────────────────── Reconnecting ─► Connected
//!                  retries exhausted
//! ```
//!
//! Every inbound frame goes through the codec; add-on statuses land in the
//! shared snapshot, init reports go to the add-on registry and device
//! responses are queued for the firmware updater.
//!
//! Reconnection is cooperative: a loss schedules a retry on the manager's
//! [`Scheduler`] and the owner calls [`ConnectionManager::run_due_timers`]
//! when the deadline passes.

pub mod identity;
pub mod reconnect;
pub mod stats;

pub use identity::IndicatorColour;
pub use reconnect::ReconnectPolicy;
pub use stats::{LinkStats, LinkStatsSnapshot};

use crate::addon::AddOnRegistry;
use crate::codec::{self, Frame};
use crate::config::ConnectionConfig;
use crate::constants::INVENTORY_QUERY;
use crate::device::{DeviceInfo, DeviceResponse, DeviceState, Inventory, SnapshotReader};
use crate::error::{Error, Result};
use crate::events::{ConnectionEvent, EventListener};
use crate::scheduler::{Clock, Scheduler};
use crate::transport::{TransportKind, TransportOpener};
use bytes::Bytes;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

/// Connection state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    VerifyingIdentity,
    Connected,
    Reconnecting,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::VerifyingIdentity => "verifying identity",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        };
        f.write_str(name)
    }
}

/// Something that arrived on the link
#[derive(Debug)]
pub enum Inbound {
    Frame(Bytes),
    /// The transport stopped
    Lost(String),
}

/// Timed connection work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionTask {
    Reconnect,
}

/// An open transport
struct Link {
    rx: mpsc::Receiver<Bytes>,
    tx: mpsc::Sender<Bytes>,
    shutdown: Arc<AtomicBool>,
}

impl Link {
    fn close(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        self.close();
    }
}

/// Connection manager
pub struct ConnectionManager {
    config: ConnectionConfig,
    opener: Arc<dyn TransportOpener>,
    events: Arc<dyn EventListener>,
    clock: Arc<dyn Clock>,

    state: ConnectionState,
    link: Option<Link>,
    /// Last target passed to `connect`, reused by reconnection
    target: Option<(TransportKind, String)>,
    policy: ReconnectPolicy,
    /// Failed reconnection attempts since the loss
    attempts: u32,
    timers: Scheduler<ConnectionTask>,

    registry: AddOnRegistry,
    snapshot: Arc<RwLock<DeviceState>>,
    /// Start of the current initialization pass
    session_start: Option<Instant>,
    identity_colours: Vec<IndicatorColour>,
    /// Identity check started by `connect` rather than by the operator
    identity_on_connect: bool,
    responses: VecDeque<DeviceResponse>,
    /// Set whenever an established link goes away
    link_dropped: bool,
    stats: Arc<LinkStats>,
}

impl ConnectionManager {
    pub fn new(
        config: ConnectionConfig,
        opener: Arc<dyn TransportOpener>,
        events: Arc<dyn EventListener>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let policy = config.reconnect.policy_for(config.transport);
        Self {
            config,
            opener,
            events,
            clock,
            state: ConnectionState::Disconnected,
            link: None,
            target: None,
            policy,
            attempts: 0,
            timers: Scheduler::new(),
            registry: AddOnRegistry::new(),
            snapshot: Arc::new(RwLock::new(DeviceState::default())),
            session_start: None,
            identity_colours: Vec::new(),
            identity_on_connect: false,
            responses: VecDeque::new(),
            link_dropped: false,
            stats: Arc::new(LinkStats::new()),
        }
    }

    /// Replace the add-on registry (custom decoder tables)
    pub fn with_registry(mut self, registry: AddOnRegistry) -> Self {
        self.registry = registry;
        self
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn registry(&self) -> &AddOnRegistry {
        &self.registry
    }

    pub fn snapshot_reader(&self) -> SnapshotReader {
        SnapshotReader::new(self.snapshot.clone())
    }

    pub fn stats(&self) -> Arc<LinkStats> {
        self.stats.clone()
    }

    pub fn policy(&self) -> ReconnectPolicy {
        self.policy
    }

    pub fn device_info(&self) -> Option<DeviceInfo> {
        self.snapshot.read().info.clone()
    }

    /// Colours of the identity check in progress
    pub fn identity_colours(&self) -> &[IndicatorColour] {
        &self.identity_colours
    }

    pub fn session_start(&self) -> Option<Instant> {
        self.session_start
    }

    /// Due time of the next scheduled reconnection attempt
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    pub fn has_pending_retry(&self) -> bool {
        !self.timers.is_empty()
    }

    /// Drain queued device responses
    pub fn take_device_responses(&mut self) -> Vec<DeviceResponse> {
        self.responses.drain(..).collect()
    }

    /// True once after an established link went away
    pub fn take_link_dropped(&mut self) -> bool {
        std::mem::take(&mut self.link_dropped)
    }

    // =========================================================================
    // Connect / disconnect
    // =========================================================================

    /// Open `target` over `kind` and bring the connection up
    ///
    /// Returns the state reached: `Connected`, or `VerifyingIdentity` when
    /// identity confirmation is configured.
    pub async fn connect(&mut self, kind: TransportKind, target: &str) -> Result<ConnectionState> {
        if self.state != ConnectionState::Disconnected {
            self.disconnect();
        }

        self.target = Some((kind, target.to_string()));
        self.policy = self.config.reconnect.policy_for(kind);
        self.attempts = 0;
        self.set_state(ConnectionState::Connecting);
        self.emit(ConnectionEvent::Connecting);

        if let Err(e) = self.establish(kind, target).await {
            warn!(transport = %kind, device = %target, "Connection failed: {}", e);
            self.teardown();
            self.link_dropped = false;
            self.set_state(ConnectionState::Disconnected);
            self.emit(ConnectionEvent::ConnectionFailed {
                reason: e.to_string(),
            });
            return Err(e);
        }

        if self.config.verify_identity {
            self.identity_on_connect = true;
            if let Err(e) = self.begin_identity_check().await {
                self.teardown();
                self.set_state(ConnectionState::Disconnected);
                self.emit(ConnectionEvent::ConnectionFailed {
                    reason: e.to_string(),
                });
                return Err(e);
            }
        } else {
            self.set_state(ConnectionState::Connected);
            self.emit(ConnectionEvent::Connected);
        }
        Ok(self.state)
    }

    /// Close the link and forget the device. Safe from any state.
    pub fn disconnect(&mut self) {
        self.disconnect_with_reason("disconnected by user");
    }

    fn disconnect_with_reason(&mut self, reason: &str) {
        self.teardown();
        if self.state != ConnectionState::Disconnected {
            info!("Disconnected: {}", reason);
            self.set_state(ConnectionState::Disconnected);
            self.emit(ConnectionEvent::Disconnected {
                reason: reason.to_string(),
            });
        }
    }

    /// Open the transport, fetch the inventory and prime the add-ons
    async fn establish(&mut self, kind: TransportKind, target: &str) -> Result<()> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let channels = self.opener.open(kind, target, shutdown.clone()).await?;
        let mut link = Link {
            rx: channels.rx,
            tx: channels.tx,
            shutdown,
        };

        let query = codec::encode_command(INVENTORY_QUERY);
        let query_len = query.len();
        link.tx
            .send(query)
            .await
            .map_err(|_| Error::transport("link closed before inventory query"))?;
        self.stats.add_tx(query_len);

        let timeout_ms = self.config.inventory_timeout_ms;
        let inventory = tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            wait_for_inventory(&mut link.rx, &self.stats),
        )
        .await
        .map_err(|_| Error::DeviceTimeout { timeout_ms })??;

        info!(
            transport = %kind,
            device = %target,
            elements = inventory.elements.len(),
            "Inventory received"
        );

        self.session_start = Some(self.clock.now());
        self.registry.rebuild_from(&inventory.elements);
        {
            let mut snapshot = self.snapshot.write();
            snapshot.info = inventory.info;
            snapshot.elements = inventory.elements;
            snapshot.addons.clear();
        }
        self.link = Some(link);

        for command in self.registry.collect_pending_init_commands() {
            debug!("Add-on init: {}", command);
            self.send_frame(codec::encode_command(&command)).await?;
        }
        Ok(())
    }

    /// Drop the link and every piece of per-session state
    fn teardown(&mut self) {
        self.timers.cancel_all();
        self.attempts = 0;
        if let Some(link) = self.link.take() {
            link.close();
            self.link_dropped = true;
        }
        self.registry.clear();
        self.session_start = None;
        self.identity_colours.clear();
        self.identity_on_connect = false;
        self.responses.clear();

        let mut snapshot = self.snapshot.write();
        snapshot.info = None;
        snapshot.elements.clear();
        snapshot.addons.clear();
    }

    // =========================================================================
    // Reconnection
    // =========================================================================

    /// Enable or disable automatic reconnection
    ///
    /// Disabling while a retry is pending cancels it and disconnects.
    pub fn set_reconnect_policy(&mut self, enabled: bool, interval_secs: u64) {
        self.config.reconnect.enabled = enabled;
        self.config.reconnect.interval_secs = interval_secs;
        let kind = self
            .target
            .as_ref()
            .map_or(self.config.transport, |(kind, _)| *kind);
        self.policy = self.config.reconnect.policy_for(kind);
        debug!(enabled, interval_secs, "Reconnect policy updated");

        if !enabled && self.state == ConnectionState::Reconnecting {
            self.disconnect_with_reason("reconnection disabled");
        }
    }

    /// React to the transport stopping underneath us
    pub fn handle_transport_lost(&mut self, reason: &str) {
        if self.link.is_none() {
            return;
        }
        warn!("Connection lost: {}", reason);

        self.timers.cancel_all();
        if let Some(link) = self.link.take() {
            link.close();
            self.link_dropped = true;
        }
        self.registry.clear();
        self.session_start = None;
        self.identity_colours.clear();
        self.identity_on_connect = false;
        self.responses.clear();
        self.snapshot.write().addons.clear();
        self.attempts = 0;

        self.emit(ConnectionEvent::ConnectionLost {
            reason: reason.to_string(),
        });

        if self.target.is_some() && self.policy.allows(0) {
            self.set_state(ConnectionState::Reconnecting);
            self.schedule_retry();
        } else {
            self.disconnect_with_reason(reason);
        }
    }

    fn schedule_retry(&mut self) {
        let due = self.clock.now() + self.policy.interval;
        self.timers.schedule_at(due, ConnectionTask::Reconnect);
        self.emit(ConnectionEvent::Reconnecting {
            attempt: self.attempts + 1,
        });
    }

    /// Run reconnection attempts whose time has come
    pub async fn run_due_timers(&mut self) {
        for task in self.timers.take_due(self.clock.now()) {
            match task {
                ConnectionTask::Reconnect => self.attempt_reconnect().await,
            }
        }
    }

    async fn attempt_reconnect(&mut self) {
        // Cancelled since it was scheduled
        if self.state != ConnectionState::Reconnecting {
            return;
        }
        let Some((kind, target)) = self.target.clone() else {
            self.disconnect_with_reason("no target to reconnect to");
            return;
        };

        self.attempts += 1;
        info!(attempt = self.attempts, transport = %kind, device = %target, "Reconnecting");

        match self.establish(kind, &target).await {
            Ok(()) => {
                info!("Reconnected after {} attempt(s)", self.attempts);
                self.attempts = 0;
                self.set_state(ConnectionState::Connected);
                self.emit(ConnectionEvent::Connected);
            }
            Err(e) => {
                warn!(attempt = self.attempts, "Reconnection failed: {}", e);
                if let Some(link) = self.link.take() {
                    link.close();
                }
                self.registry.clear();
                if self.policy.allows(self.attempts) {
                    self.schedule_retry();
                } else {
                    let reason = format!("gave up after {} attempt(s): {}", self.attempts, e);
                    self.disconnect_with_reason(&reason);
                }
            }
        }
    }

    // =========================================================================
    // Identity check
    // =========================================================================

    /// Ask the device to flash a colour sequence for the operator to confirm
    pub async fn start_identity_check(&mut self) -> Result<Vec<IndicatorColour>> {
        match self.state {
            ConnectionState::Connected | ConnectionState::VerifyingIdentity => {}
            other => {
                return Err(Error::InvalidState {
                    operation: "start identity check",
                    state: other.to_string(),
                })
            }
        }
        self.begin_identity_check().await
    }

    async fn begin_identity_check(&mut self) -> Result<Vec<IndicatorColour>> {
        let colours = {
            let mut rng = rand::thread_rng();
            identity::random_sequence(&mut rng, self.config.identity_colour_count)
        };
        self.send_command(&identity::flash_command(&colours)).await?;

        self.identity_colours = colours.clone();
        self.set_state(ConnectionState::VerifyingIdentity);
        self.emit(ConnectionEvent::VerifyingCorrectDevice {
            colours: colours.clone(),
        });
        Ok(colours)
    }

    /// Operator confirmed the device
    pub async fn accept_identity(&mut self) -> Result<()> {
        self.require_verifying("accept identity")?;
        self.send_command(identity::RESUME_COMMAND).await?;

        self.identity_colours.clear();
        self.set_state(ConnectionState::Connected);
        self.emit(ConnectionEvent::VerifiedCorrectDevice);
        if std::mem::take(&mut self.identity_on_connect) {
            self.emit(ConnectionEvent::Connected);
        }
        Ok(())
    }

    /// Operator rejected the device: always fully disconnects
    pub fn reject_identity(&mut self) -> Result<()> {
        self.require_verifying("reject identity")?;
        self.emit(ConnectionEvent::RejectedDevice);
        self.disconnect_with_reason(&Error::IdentityRejected.to_string());
        Ok(())
    }

    fn require_verifying(&self, operation: &'static str) -> Result<()> {
        if self.state == ConnectionState::VerifyingIdentity {
            Ok(())
        } else {
            Err(Error::InvalidState {
                operation,
                state: self.state.to_string(),
            })
        }
    }

    // =========================================================================
    // Traffic
    // =========================================================================

    /// Wait for the next inbound frame or the loss of the link
    ///
    /// Pends forever while no link is open. Cancel safe.
    pub async fn recv(&mut self) -> Inbound {
        match self.link.as_mut() {
            Some(link) => match link.rx.recv().await {
                Some(data) => Inbound::Frame(data),
                None => Inbound::Lost("transport closed".to_string()),
            },
            None => std::future::pending().await,
        }
    }

    /// Route one inbound event
    pub fn handle_inbound(&mut self, inbound: Inbound) {
        match inbound {
            Inbound::Frame(data) => self.handle_bytes(&data),
            Inbound::Lost(reason) => self.handle_transport_lost(&reason),
        }
    }

    /// Decode one inbound frame and route its content
    ///
    /// Malformed frames are counted and dropped whole.
    pub fn handle_bytes(&mut self, data: &[u8]) {
        self.stats.add_rx(data.len());

        let frame = match codec::decode_frame(data) {
            Ok(frame) => frame,
            Err(e) => {
                self.stats.add_dropped();
                warn!(len = data.len(), "Dropped frame: {}", e);
                return;
            }
        };
        trace!(kind = frame.name(), "Frame received");

        match frame {
            Frame::StatusBatch(records) => {
                let mut snapshot = self.snapshot.write();
                for record in records {
                    let id = u32::from(record.id);
                    match self.registry.decode_status(id, record.status, &record.payload) {
                        Some(status) => {
                            snapshot.addons.insert(id, status);
                        }
                        None => trace!(id, "Status for unregistered add-on"),
                    }
                }
            }
            Frame::Reports(mut reports) => {
                let Some(session_start) = self.session_start else {
                    debug!("Reports outside a session, ignored");
                    return;
                };
                let now = self.clock.now();
                for report in &mut reports {
                    report.time_received.get_or_insert(now);
                }
                let delivered = self.registry.apply_reports(&reports, session_start);
                debug!(total = reports.len(), delivered, "Init reports applied");
            }
            Frame::Response(response) => {
                debug!(req = %response.req, rslt = %response.rslt, "Device response");
                self.responses.push_back(response);
            }
            Frame::Inventory(_) => debug!("Unsolicited inventory ignored"),
        }
    }

    /// Send a text command to the device
    pub async fn send_command(&mut self, command: &str) -> Result<()> {
        trace!("Command: {}", command);
        self.send_frame(codec::encode_command(command)).await
    }

    /// Send an encoded frame
    ///
    /// A send failure on an established connection counts as connection loss.
    pub async fn send_frame(&mut self, frame: Bytes) -> Result<()> {
        let Some(link) = self.link.as_ref() else {
            return Err(Error::NotConnected);
        };
        let len = frame.len();
        if link.tx.send(frame).await.is_err() {
            if matches!(
                self.state,
                ConnectionState::Connected | ConnectionState::VerifyingIdentity
            ) {
                self.handle_transport_lost("send failed");
            }
            return Err(Error::transport("send failed: link closed"));
        }
        self.stats.add_tx(len);
        Ok(())
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            debug!(from = %self.state, to = %state, "Connection state");
        }
        self.state = state;
        self.snapshot.write().connection = state;
    }

    fn emit(&self, event: ConnectionEvent) {
        self.events.on_event(&event.into());
    }
}

/// Read frames until an inventory arrives, skipping anything else
async fn wait_for_inventory(rx: &mut mpsc::Receiver<Bytes>, stats: &LinkStats) -> Result<Inventory> {
    loop {
        let Some(data) = rx.recv().await else {
            return Err(Error::transport("link closed while waiting for inventory"));
        };
        stats.add_rx(data.len());
        match codec::decode_frame(&data) {
            Ok(Frame::Inventory(inventory)) => return Ok(inventory),
            Ok(other) => trace!(kind = other.name(), "Frame before inventory skipped"),
            Err(e) => {
                stats.add_dropped();
                warn!("Dropped frame while waiting for inventory: {}", e);
            }
        }
    }
}
