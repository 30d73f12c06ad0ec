//! Client runtime
//!
//! [`Client`] owns the connection manager and the firmware updater and runs
//! them on one logical timeline: a single loop handles operator commands,
//! inbound frames, transport loss and scheduled timers one at a time, so no
//! two state transitions ever interleave. Frames and losses that arrive while
//! a long step is suspended stay queued in the transport channel until the
//! step completes.
//!
//! [`ClientHandle`] is the cloneable operator surface. Each call is a command
//! sent to the loop with a oneshot reply.

use crate::addon::AddOnRegistry;
use crate::config::Config;
use crate::connection::identity::IndicatorColour;
use crate::connection::stats::LinkStats;
use crate::connection::{ConnectionManager, ConnectionState};
use crate::constants::{COMMAND_CAPACITY, SHUTDOWN_POLL_MS};
use crate::device::{DeviceState, SnapshotReader};
use crate::error::{Error, Result};
use crate::events::EventListener;
use crate::ota::{Downloader, FirmwareUpdater, UpdateCheck, UpdateState};
use crate::scheduler::{earliest, Clock};
use crate::transport::{TransportKind, TransportOpener};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

type Reply<T> = oneshot::Sender<T>;

/// Operator commands handled by the client loop
enum Command {
    Connect {
        kind: TransportKind,
        target: String,
        reply: Reply<Result<ConnectionState>>,
    },
    Disconnect {
        reply: Reply<()>,
    },
    SetReconnectPolicy {
        enabled: bool,
        interval_secs: u64,
        reply: Reply<()>,
    },
    StartIdentityCheck {
        reply: Reply<Result<Vec<IndicatorColour>>>,
    },
    IdentityColours {
        reply: Reply<Vec<IndicatorColour>>,
    },
    AcceptIdentity {
        reply: Reply<Result<()>>,
    },
    RejectIdentity {
        reply: Reply<Result<()>>,
    },
    OtaCheck {
        reply: Reply<Result<UpdateCheck>>,
    },
    OtaStart {
        reply: Reply<Result<()>>,
    },
    OtaCancel {
        reply: Reply<Result<()>>,
    },
    UpdateState {
        reply: Reply<UpdateState>,
    },
}

/// Owner of the connection and update state machines
pub struct Client {
    manager: ConnectionManager,
    updater: FirmwareUpdater,
    commands: mpsc::Receiver<Command>,
}

/// Cloneable handle used to drive a running [`Client`]
#[derive(Clone)]
pub struct ClientHandle {
    commands: mpsc::Sender<Command>,
    snapshot: SnapshotReader,
    stats: Arc<LinkStats>,
    ota_cancel: Arc<AtomicBool>,
    default_kind: TransportKind,
    default_target: String,
}

impl Client {
    pub fn new(
        config: Config,
        opener: Arc<dyn TransportOpener>,
        downloader: Arc<dyn Downloader>,
        listener: Arc<dyn EventListener>,
        clock: Arc<dyn Clock>,
    ) -> (Self, ClientHandle) {
        let (tx, rx) = mpsc::channel(COMMAND_CAPACITY);
        let default_kind = config.connection.transport;
        let default_target = config.connection.target.clone();

        let manager =
            ConnectionManager::new(config.connection, opener, listener.clone(), clock.clone());
        let updater = FirmwareUpdater::new(config.ota, downloader, listener, clock);

        let handle = ClientHandle {
            commands: tx,
            snapshot: manager.snapshot_reader(),
            stats: manager.stats(),
            ota_cancel: updater.cancel_flag(),
            default_kind,
            default_target,
        };
        let client = Self {
            manager,
            updater,
            commands: rx,
        };
        (client, handle)
    }

    /// Use a custom add-on registry (extra decoders)
    pub fn with_registry(mut self, registry: AddOnRegistry) -> Self {
        self.manager = self.manager.with_registry(registry);
        self
    }

    /// Run the loop on a new task
    pub fn spawn(self, shutdown: Arc<AtomicBool>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    /// Run until `shutdown` is raised
    ///
    /// Dropping every handle does not stop the loop; telemetry and reconnection
    /// keep running until shutdown.
    pub async fn run(mut self, shutdown: Arc<AtomicBool>) {
        let mut commands_open = true;
        let mut shutdown_poll = tokio::time::interval(Duration::from_millis(SHUTDOWN_POLL_MS));
        shutdown_poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Client started");

        // Busy telemetry keeps other branches ready, so the flag is also
        // checked on every pass
        while !shutdown.load(Ordering::Relaxed) {
            let deadline = earliest(self.manager.next_deadline(), self.updater.next_deadline());

            tokio::select! {
                biased;

                _ = shutdown_poll.tick() => {}

                command = self.commands.recv(), if commands_open => {
                    match command {
                        Some(command) => self.handle_command(command).await,
                        None => {
                            debug!("All client handles dropped");
                            commands_open = false;
                        }
                    }
                }

                inbound = self.manager.recv() => {
                    self.manager.handle_inbound(inbound);
                }

                _ = sleep_until(deadline) => {
                    self.run_due().await;
                }
            }

            self.sync_updater();
        }

        self.manager.disconnect();
        info!("Client stopped");
    }

    async fn run_due(&mut self) {
        self.manager.run_due_timers().await;
        self.sync_updater();
        self.updater.run_due_steps(&mut self.manager).await;
    }

    /// Forward device feedback gathered by the manager to the updater
    fn sync_updater(&mut self) {
        if self.manager.take_link_dropped() {
            self.updater.on_connection_lost();
        }
        for response in self.manager.take_device_responses() {
            self.updater.on_device_response(&response);
        }
    }

    async fn handle_command(&mut self, command: Command) {
        // A dropped receiver means the caller gave up waiting
        match command {
            Command::Connect {
                kind,
                target,
                reply,
            } => {
                let result = self.manager.connect(kind, &target).await;
                let _ = reply.send(result);
            }
            Command::Disconnect { reply } => {
                self.manager.disconnect();
                let _ = reply.send(());
            }
            Command::SetReconnectPolicy {
                enabled,
                interval_secs,
                reply,
            } => {
                self.manager.set_reconnect_policy(enabled, interval_secs);
                let _ = reply.send(());
            }
            Command::StartIdentityCheck { reply } => {
                let result = self.manager.start_identity_check().await;
                let _ = reply.send(result);
            }
            Command::IdentityColours { reply } => {
                let _ = reply.send(self.manager.identity_colours().to_vec());
            }
            Command::AcceptIdentity { reply } => {
                let result = self.manager.accept_identity().await;
                let _ = reply.send(result);
            }
            Command::RejectIdentity { reply } => {
                let result = self.manager.reject_identity();
                let _ = reply.send(result);
            }
            Command::OtaCheck { reply } => {
                let result = self.updater.check(&mut self.manager).await;
                let _ = reply.send(result);
            }
            Command::OtaStart { reply } => {
                let result = self.updater.start(&mut self.manager).await;
                let _ = reply.send(result);
            }
            Command::OtaCancel { reply } => {
                let result = self.updater.cancel();
                let _ = reply.send(result);
            }
            Command::UpdateState { reply } => {
                let _ = reply.send(self.updater.state());
            }
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await,
        None => std::future::pending().await,
    }
}

impl ClientHandle {
    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| Error::ClientClosed)?;
        rx.await.map_err(|_| Error::ClientClosed)
    }

    /// Connect to `target` over `kind`
    pub async fn connect(&self, kind: TransportKind, target: &str) -> Result<ConnectionState> {
        let target = target.to_string();
        self.request(|reply| Command::Connect {
            kind,
            target,
            reply,
        })
        .await?
    }

    /// Connect using the configured transport and target
    pub async fn connect_default(&self) -> Result<ConnectionState> {
        self.connect(self.default_kind, &self.default_target).await
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.request(|reply| Command::Disconnect { reply }).await
    }

    pub async fn set_reconnect_policy(&self, enabled: bool, interval_secs: u64) -> Result<()> {
        self.request(|reply| Command::SetReconnectPolicy {
            enabled,
            interval_secs,
            reply,
        })
        .await
    }

    /// Flash the device's identity colours
    pub async fn start_identity_check(&self) -> Result<Vec<IndicatorColour>> {
        self.request(|reply| Command::StartIdentityCheck { reply })
            .await?
    }

    /// Colours of the identity check in progress, empty when none is
    pub async fn identity_colours(&self) -> Result<Vec<IndicatorColour>> {
        self.request(|reply| Command::IdentityColours { reply }).await
    }

    pub async fn accept_identity(&self) -> Result<()> {
        self.request(|reply| Command::AcceptIdentity { reply }).await?
    }

    pub async fn reject_identity(&self) -> Result<()> {
        self.request(|reply| Command::RejectIdentity { reply }).await?
    }

    pub async fn ota_update_check(&self) -> Result<UpdateCheck> {
        self.request(|reply| Command::OtaCheck { reply }).await?
    }

    /// Download and start streaming the available update
    ///
    /// Resolves once the transfer has begun; follow progress through events.
    pub async fn ota_update_start(&self) -> Result<()> {
        self.request(|reply| Command::OtaStart { reply }).await?
    }

    /// Cancel the download or transfer in flight
    ///
    /// The flag is raised immediately so a download the loop is waiting on is
    /// abandoned as soon as it completes.
    pub async fn ota_update_cancel(&self) -> Result<()> {
        self.ota_cancel.store(true, Ordering::SeqCst);
        self.request(|reply| Command::OtaCancel { reply }).await?
    }

    pub async fn update_state(&self) -> Result<UpdateState> {
        self.request(|reply| Command::UpdateState { reply }).await
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.snapshot.connection_state()
    }

    /// Copy of the cached device state
    pub fn snapshot(&self) -> DeviceState {
        self.snapshot.snapshot()
    }

    pub fn snapshot_reader(&self) -> SnapshotReader {
        self.snapshot.clone()
    }

    pub fn stats(&self) -> Arc<LinkStats> {
        self.stats.clone()
    }
}
