//! Integration tests for the client runtime
//!
//! Drives the full client (connection manager, add-on registry, firmware
//! updater) through a mock transport whose far end is a scripted fake device.
//! Time is paused, so reconnection intervals and chunk pacing run instantly.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use robolink::addon::{AddOnKind, AddOnReading};
use robolink::client::{Client, ClientHandle};
use robolink::codec::{self, frame_type, StatusRecord};
use robolink::config::Config;
use robolink::connection::ConnectionState;
use robolink::device::{DeviceInfo, DeviceResponse, HardwareElement, Inventory};
use robolink::error::{Error, Result, UpdateStage};
use robolink::events::{ConnectionEvent, Event, EventListener, UpdateEvent};
use robolink::ota::{Downloader, FirmwareManifest, UpdateCheck, UpdateState};
use robolink::scheduler::TokioClock;
use robolink::transport::{TransportChannels, TransportKind, TransportOpener};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

// =============================================================================
// Fake device behind a mock transport
// =============================================================================

/// Live connection to the fake device
struct DeviceLinkEnd {
    to_client: mpsc::Sender<Bytes>,
    /// Dropping this stops the device task and closes the link
    _kill: oneshot::Sender<()>,
}

/// Opens links to a scripted fake device
///
/// The device answers `hwstatus` with its inventory and `ota/apply` with
/// `apply_result`, and records every frame it receives.
struct MockOpener {
    inventory: Inventory,
    answer_inventory: AtomicBool,
    reachable: AtomicBool,
    apply_result: &'static str,
    opens: AtomicUsize,
    received: Arc<Mutex<Vec<Bytes>>>,
    current: Mutex<Option<DeviceLinkEnd>>,
}

impl MockOpener {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            inventory: inventory(),
            answer_inventory: AtomicBool::new(true),
            reachable: AtomicBool::new(true),
            apply_result: "ok",
            opens: AtomicUsize::new(0),
            received: Arc::new(Mutex::new(Vec::new())),
            current: Mutex::new(None),
        })
    }

    /// Push a frame from the device to the client
    async fn push(&self, frame: Bytes) {
        let tx = self.current.lock().as_ref().map(|end| end.to_client.clone());
        tx.expect("no open link").send(frame).await.expect("link closed");
    }

    /// Simulate the device going out of range
    fn drop_link(&self) {
        self.current.lock().take();
    }

    fn commands(&self) -> Vec<String> {
        self.received
            .lock()
            .iter()
            .filter_map(|f| codec::parse_command(f).map(str::to_string))
            .collect()
    }

    fn chunk_count(&self) -> usize {
        self.received
            .lock()
            .iter()
            .filter(|f| f.first() == Some(&frame_type::FIRMWARE_CHUNK))
            .count()
    }
}

#[async_trait]
impl TransportOpener for MockOpener {
    async fn open(
        &self,
        _kind: TransportKind,
        target: &str,
        _shutdown: Arc<AtomicBool>,
    ) -> Result<TransportChannels> {
        if target.is_empty() {
            return Err(Error::UserCancelled);
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        if !self.reachable.load(Ordering::SeqCst) {
            return Err(Error::transport("device out of range"));
        }

        let (to_client, client_rx) = mpsc::channel::<Bytes>(64);
        let (client_tx, mut from_client) = mpsc::channel::<Bytes>(64);
        let (kill_tx, mut kill_rx) = oneshot::channel::<()>();

        let reply = to_client.clone();
        let received = self.received.clone();
        let inventory = codec::encode_json_frame(frame_type::INVENTORY, &self.inventory);
        let answer_inventory = self.answer_inventory.load(Ordering::SeqCst);
        let apply_result = self.apply_result;

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut kill_rx => break,
                    frame = from_client.recv() => {
                        let Some(frame) = frame else { break };
                        received.lock().push(frame.clone());
                        match codec::parse_command(&frame) {
                            Some("hwstatus") if answer_inventory => {
                                let _ = reply.send(inventory.clone()).await;
                            }
                            Some("ota/apply") => {
                                let response = DeviceResponse {
                                    req: "ota/apply".into(),
                                    rslt: apply_result.into(),
                                    msg: None,
                                };
                                let frame = codec::encode_json_frame(frame_type::DEVICE_RESPONSE, &response);
                                let _ = reply.send(frame).await;
                            }
                            _ => {}
                        }
                    }
                }
            }
        });

        *self.current.lock() = Some(DeviceLinkEnd {
            to_client,
            _kill: kill_tx,
        });
        Ok(TransportChannels {
            rx: client_rx,
            tx: client_tx,
        })
    }
}

fn element(id: u32, name: &str, code: &str) -> HardwareElement {
    HardwareElement {
        id_no: id,
        name: name.into(),
        elem_type: "RSAddOn".into(),
        who_am_i_type_code: code.into(),
        who_am_i: String::new(),
    }
}

fn inventory() -> Inventory {
    Inventory {
        elements: vec![
            element(1, "LeftGrip", "81"),
            element(2, "Colour", "85"),
            element(3, "RightFoot", "8C"),
            // Not an add-on
            element(9, "IMU", "00"),
        ],
        info: Some(DeviceInfo {
            system_name: "RoboOne".into(),
            firmware_version: "1.2.0".into(),
            hw_revision: 2,
            serial_no: Some("A1B2".into()),
        }),
    }
}

// =============================================================================
// Fake downloader and recording listener
// =============================================================================

struct FakeDownloader {
    latest: &'static str,
    image_len: usize,
    image_urls: Mutex<Vec<String>>,
}

#[async_trait]
impl Downloader for FakeDownloader {
    async fn fetch_manifest(&self, _url: &str) -> Result<FirmwareManifest> {
        Ok(FirmwareManifest {
            version: self.latest.into(),
            firmware_url: "https://fw.example.com/robot-{hw_rev}.bin".into(),
            release_notes: Some("Smoother gait".into()),
        })
    }

    async fn fetch_image(&self, url: &str) -> Result<Bytes> {
        self.image_urls.lock().push(url.to_string());
        Ok(Bytes::from(vec![0x5A; self.image_len]))
    }
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<Event>>,
}

impl EventListener for Recorder {
    fn on_event(&self, event: &Event) {
        self.events.lock().push(event.clone());
    }
}

impl Recorder {
    fn names(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(|e| e.name()).collect()
    }

    fn has(&self, name: &str) -> bool {
        self.names().contains(&name)
    }
}

// =============================================================================
// Harness
// =============================================================================

struct Harness {
    handle: ClientHandle,
    device: Arc<MockOpener>,
    downloader: Arc<FakeDownloader>,
    events: Arc<Recorder>,
    shutdown: Arc<AtomicBool>,
    task: tokio::task::JoinHandle<()>,
}

impl Harness {
    fn start(device: Arc<MockOpener>, configure: impl FnOnce(&mut Config)) -> Self {
        Self::with_image(device, 1000, configure)
    }

    fn with_image(
        device: Arc<MockOpener>,
        image_len: usize,
        configure: impl FnOnce(&mut Config),
    ) -> Self {
        let mut config = Config::default();
        config.connection.target = "192.168.1.50".into();
        config.ota.manifest_url = Some("https://fw.example.com/manifest.json".into());
        config.ota.chunk_size = 100;
        configure(&mut config);

        let downloader = Arc::new(FakeDownloader {
            latest: "1.3.0",
            image_len,
            image_urls: Mutex::new(Vec::new()),
        });
        let events = Arc::new(Recorder::default());
        let (client, handle) = Client::new(
            config,
            device.clone(),
            downloader.clone(),
            events.clone(),
            Arc::new(TokioClock),
        );
        let shutdown = Arc::new(AtomicBool::new(false));
        let task = client.spawn(shutdown.clone());

        Self {
            handle,
            device,
            downloader,
            events,
            shutdown,
            task,
        }
    }

    async fn stop(self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.task.await.unwrap();
    }
}

/// Poll `condition` while virtual time advances
async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    for _ in 0..3000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {}", what);
}

async fn wait_for_update_state(handle: &ClientHandle, wanted: UpdateState) {
    for _ in 0..3000 {
        if handle.update_state().await.unwrap() == wanted {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("update never reached {}", wanted);
}

fn grip_frame(angle_tenths: i16, status: u8) -> Bytes {
    let [hi, lo] = angle_tenths.to_be_bytes();
    codec::encode_status_batch(&[StatusRecord::new(1, status, vec![hi, lo, 7, 0x01])])
}

// =============================================================================
// Connection
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_connect_and_stream_status() {
    let device = MockOpener::new();
    let h = Harness::start(device.clone(), |_| {});

    let state = h.handle.connect_default().await.unwrap();
    assert_eq!(state, ConnectionState::Connected);
    assert_eq!(h.events.names(), vec!["connecting", "connected"]);

    // Inventory query first, then the pending init commands
    wait_until("init commands", || device.commands().len() >= 3).await;
    let commands = device.commands();
    assert_eq!(commands[0], "hwstatus");
    assert!(commands
        .iter()
        .any(|c| c.starts_with("elem/Colour/json?cmd=raw&hexWr=104020")));
    assert!(commands
        .iter()
        .any(|c| c.starts_with("elem/RightFoot/json?cmd=raw&hexWr=f5")));

    let snapshot = h.handle.snapshot();
    assert_eq!(snapshot.elements.len(), 4);
    assert_eq!(
        snapshot.info.as_ref().map(|i| i.firmware_version.as_str()),
        Some("1.2.0")
    );

    device.push(grip_frame(450, 0x01)).await;
    let reader = h.handle.snapshot_reader();
    wait_until("grip status", || reader.addon(1).is_some()).await;

    let status = reader.addon(1).unwrap();
    assert_eq!(status.kind, AddOnKind::GripServo);
    assert!(status.valid);
    assert_eq!(
        status.reading,
        Some(AddOnReading::GripServo {
            angle_deg: 45.0,
            current: 7,
            moving: true
        })
    );

    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_while_streaming() {
    let device = MockOpener::new();
    let h = Harness::start(device.clone(), |_| {});
    h.handle.connect_default().await.unwrap();

    let to_client = device
        .current
        .lock()
        .as_ref()
        .map(|end| end.to_client.clone())
        .unwrap();
    let streamer = tokio::spawn(async move {
        let mut angle = 0;
        loop {
            angle += 1;
            if to_client.send(grip_frame(angle, 0x01)).await.is_err() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    });

    let reader = h.handle.snapshot_reader();
    wait_until("grip status", || reader.addon(1).is_some()).await;

    h.shutdown.store(true, Ordering::SeqCst);
    tokio::time::timeout(Duration::from_secs(5), h.task)
        .await
        .expect("client did not stop while telemetry was streaming")
        .unwrap();
    streamer.abort();
}

#[tokio::test(start_paused = true)]
async fn test_truncated_batch_leaves_snapshot_unchanged() {
    let device = MockOpener::new();
    let h = Harness::start(device.clone(), |_| {});
    h.handle.connect_default().await.unwrap();

    device.push(grip_frame(100, 0x01)).await;
    let reader = h.handle.snapshot_reader();
    wait_until("first status", || reader.addon(1).is_some()).await;
    let before = h.handle.snapshot().addons;

    // Valid grip record followed by a record claiming more bytes than remain
    let mut frame = grip_frame(-300, 0x01).to_vec();
    frame.extend_from_slice(&[2, 0x01, 9, 0xAA]);
    device.push(Bytes::from(frame)).await;

    let stats = h.handle.stats();
    wait_until("dropped frame counted", || stats.frames_dropped() == 1).await;
    assert_eq!(h.handle.snapshot().addons, before);

    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_inventory_timeout() {
    let device = MockOpener::new();
    device.answer_inventory.store(false, Ordering::SeqCst);
    let h = Harness::start(device.clone(), |_| {});

    let result = h.handle.connect_default().await;
    assert!(matches!(
        result,
        Err(Error::DeviceTimeout { timeout_ms: 5000 })
    ));
    assert_eq!(h.handle.connection_state(), ConnectionState::Disconnected);
    assert_eq!(h.events.names(), vec!["connecting", "connection_failed"]);

    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_device() {
    let device = MockOpener::new();
    device.reachable.store(false, Ordering::SeqCst);
    let h = Harness::start(device.clone(), |_| {});

    let result = h.handle.connect(TransportKind::Wireless, "RoboOne").await;
    assert!(matches!(result, Err(Error::TransportUnavailable { .. })));
    assert!(matches!(
        h.handle.connect(TransportKind::Network, "").await,
        Err(Error::UserCancelled)
    ));

    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_clears_addons() {
    let device = MockOpener::new();
    let h = Harness::start(device.clone(), |_| {});
    h.handle.connect_default().await.unwrap();

    device.push(grip_frame(450, 0x01)).await;
    let reader = h.handle.snapshot_reader();
    wait_until("grip status", || reader.addon(1).is_some()).await;

    h.handle.disconnect().await.unwrap();
    let snapshot = h.handle.snapshot();
    assert_eq!(snapshot.connection, ConnectionState::Disconnected);
    assert!(snapshot.addons.is_empty());
    assert!(snapshot.elements.is_empty());
    assert!(snapshot.info.is_none());
    assert_eq!(h.events.names().last(), Some(&"disconnected"));

    // Disconnecting again emits nothing
    let count = h.events.names().len();
    h.handle.disconnect().await.unwrap();
    assert_eq!(h.events.names().len(), count);

    h.stop().await;
}

// =============================================================================
// Reconnection
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_reconnects_after_loss() {
    let device = MockOpener::new();
    let h = Harness::start(device.clone(), |_| {});
    h.handle.connect_default().await.unwrap();

    let started = tokio::time::Instant::now();
    device.drop_link();

    wait_until("reconnecting", || {
        h.handle.connection_state() == ConnectionState::Reconnecting
    })
    .await;
    assert!(h.events.has("connection_lost"));

    wait_until("reconnected", || {
        h.handle.connection_state() == ConnectionState::Connected
    })
    .await;
    assert!(started.elapsed() >= Duration::from_secs(10));
    assert_eq!(device.opens.load(Ordering::SeqCst), 2);

    let names = h.events.names();
    assert_eq!(
        &names[2..],
        &["connection_lost", "reconnecting", "connected"]
    );

    // Inventory is queried again on the new link
    let queries = device.commands().iter().filter(|c| *c == "hwstatus").count();
    assert_eq!(queries, 2);

    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_disabled() {
    let device = MockOpener::new();
    let h = Harness::start(device.clone(), |_| {});
    h.handle.connect_default().await.unwrap();
    h.handle.set_reconnect_policy(false, 10).await.unwrap();

    device.drop_link();
    wait_until("disconnected", || {
        h.handle.connection_state() == ConnectionState::Disconnected
    })
    .await;

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(device.opens.load(Ordering::SeqCst), 1);
    assert!(!h.events.has("reconnecting"));
    assert_eq!(h.events.names().last(), Some(&"disconnected"));

    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_network_gives_up_after_max_attempts() {
    let device = MockOpener::new();
    let h = Harness::start(device.clone(), |config| {
        config.connection.reconnect.max_attempts = Some(2);
    });
    h.handle.connect_default().await.unwrap();

    device.reachable.store(false, Ordering::SeqCst);
    device.drop_link();

    wait_until("gave up", || {
        h.events.names().last() == Some(&"disconnected")
    })
    .await;
    // One initial connection plus two failed attempts
    assert_eq!(device.opens.load(Ordering::SeqCst), 3);
    assert_eq!(h.handle.connection_state(), ConnectionState::Disconnected);

    h.stop().await;
}

// =============================================================================
// Identity check
// =============================================================================

fn verifying() -> impl FnOnce(&mut Config) {
    |config: &mut Config| config.connection.verify_identity = true
}

#[tokio::test(start_paused = true)]
async fn test_identity_accepted() {
    let device = MockOpener::new();
    let h = Harness::start(device.clone(), verifying());

    let state = h.handle.connect_default().await.unwrap();
    assert_eq!(state, ConnectionState::VerifyingIdentity);

    let colours = h.events.events.lock().iter().find_map(|e| match e {
        Event::Connection(ConnectionEvent::VerifyingCorrectDevice { colours }) => {
            Some(colours.clone())
        }
        _ => None,
    });
    let colours = colours.expect("no identity event");
    assert!(!colours.is_empty());
    assert_eq!(h.handle.identity_colours().await.unwrap(), colours);
    wait_until("flash command", || {
        device
            .commands()
            .iter()
            .any(|c| c.starts_with("indicator/set?pattern=identify"))
    })
    .await;

    h.handle.accept_identity().await.unwrap();
    assert_eq!(h.handle.connection_state(), ConnectionState::Connected);
    assert_eq!(
        &h.events.names()[1..],
        &["verifying_correct_device", "verified_correct_device", "connected"]
    );
    wait_until("resume command", || {
        device.commands().last().map(String::as_str) == Some("indicator/resume")
    })
    .await;

    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_identity_rejected() {
    let device = MockOpener::new();
    let h = Harness::start(device.clone(), verifying());
    h.handle.connect_default().await.unwrap();

    h.handle.reject_identity().await.unwrap();
    assert_eq!(h.handle.connection_state(), ConnectionState::Disconnected);
    let names = h.events.names();
    assert!(names.ends_with(&["rejected_device", "disconnected"]));

    // No reconnection after a rejection
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(device.opens.load(Ordering::SeqCst), 1);

    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_identity_check_on_request() {
    let device = MockOpener::new();
    let h = Harness::start(device.clone(), |_| {});
    h.handle.connect_default().await.unwrap();

    let colours = h.handle.start_identity_check().await.unwrap();
    assert_eq!(colours.len(), 3);
    assert_eq!(
        h.handle.connection_state(),
        ConnectionState::VerifyingIdentity
    );

    h.handle.accept_identity().await.unwrap();
    // Operator-initiated check does not repeat the connected event
    assert_eq!(h.events.names().last(), Some(&"verified_correct_device"));

    h.stop().await;
}

// =============================================================================
// Firmware update
// =============================================================================

fn ota_frames(device: &MockOpener) -> usize {
    device
        .commands()
        .iter()
        .filter(|c| c.starts_with("ota/"))
        .count()
        + device.chunk_count()
}

#[tokio::test(start_paused = true)]
async fn test_update_start_requires_check() {
    let device = MockOpener::new();
    let h = Harness::start(device.clone(), |_| {});
    h.handle.connect_default().await.unwrap();

    let result = h.handle.ota_update_start().await;
    assert!(matches!(result, Err(Error::InvalidState { .. })));
    assert_eq!(ota_frames(&device), 0);
    assert!(h.downloader.image_urls.lock().is_empty());

    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_full_update() {
    let device = MockOpener::new();
    let h = Harness::start(device.clone(), |_| {});
    h.handle.connect_default().await.unwrap();

    let outcome = h.handle.ota_update_check().await.unwrap();
    assert_eq!(
        outcome,
        UpdateCheck::UpdateAvailable {
            current: "1.2.0".into(),
            version: "1.3.0".into(),
            release_notes: Some("Smoother gait".into()),
        }
    );

    h.handle.ota_update_start().await.unwrap();
    wait_for_update_state(&h.handle, UpdateState::Complete).await;

    assert_eq!(
        h.downloader.image_urls.lock().as_slice(),
        &["https://fw.example.com/robot-2.bin".to_string()]
    );
    assert_eq!(device.chunk_count(), 10);
    let ota: Vec<String> = device
        .commands()
        .into_iter()
        .filter(|c| c.starts_with("ota/"))
        .collect();
    assert_eq!(ota, vec!["ota/begin?size=1000&version=1.3.0", "ota/apply"]);

    let events = h.events.events.lock().clone();
    let progress = events
        .iter()
        .filter(|e| matches!(e, Event::Update(UpdateEvent::Progress { .. })))
        .count();
    assert_eq!(progress, 10);
    assert!(matches!(
        events.last(),
        Some(Event::Update(UpdateEvent::Complete { version })) if version == "1.3.0"
    ));

    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_update_fails_when_link_lost() {
    let device = MockOpener::new();
    let h = Harness::with_image(device.clone(), 100_000, |_| {});
    h.handle.connect_default().await.unwrap();
    h.handle.ota_update_check().await.unwrap();
    h.handle.ota_update_start().await.unwrap();

    wait_until("some chunks", || device.chunk_count() >= 3).await;
    device.drop_link();
    wait_for_update_state(&h.handle, UpdateState::Failed).await;

    let failed_stage = h.events.events.lock().iter().find_map(|e| match e {
        Event::Update(UpdateEvent::Failed { stage, .. }) => Some(*stage),
        _ => None,
    });
    assert_eq!(failed_stage, Some(UpdateStage::Transfer));
    assert!(!h.events.has("complete"));

    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_update_cancel() {
    let device = MockOpener::new();
    let h = Harness::with_image(device.clone(), 100_000, |_| {});
    h.handle.connect_default().await.unwrap();
    h.handle.ota_update_check().await.unwrap();
    h.handle.ota_update_start().await.unwrap();

    wait_until("some chunks", || device.chunk_count() >= 2).await;
    h.handle.ota_update_cancel().await.unwrap();
    wait_for_update_state(&h.handle, UpdateState::Idle).await;

    let sent = device.chunk_count();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(device.chunk_count(), sent);
    assert!(sent < 1000);

    // The device is told to discard the partial image
    wait_until("abort command", || {
        device.commands().iter().any(|c| c == "ota/abort")
    })
    .await;
    assert!(h.events.has("cancelled"));

    // Cancelling again outside a transfer
    assert!(h.handle.ota_update_cancel().await.is_ok());

    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_up_to_date_device() {
    let device = Arc::new(MockOpener {
        inventory: Inventory {
            info: Some(DeviceInfo {
                system_name: "RoboOne".into(),
                firmware_version: "v1.3.0".into(),
                hw_revision: 2,
                serial_no: None,
            }),
            ..inventory()
        },
        answer_inventory: AtomicBool::new(true),
        reachable: AtomicBool::new(true),
        apply_result: "ok",
        opens: AtomicUsize::new(0),
        received: Arc::new(Mutex::new(Vec::new())),
        current: Mutex::new(None),
    });
    let h = Harness::start(device.clone(), |_| {});
    h.handle.connect_default().await.unwrap();

    let outcome = h.handle.ota_update_check().await.unwrap();
    assert_eq!(
        outcome,
        UpdateCheck::NoUpdateNeeded {
            current: "v1.3.0".into()
        }
    );
    assert!(matches!(
        h.handle.ota_update_start().await,
        Err(Error::InvalidState { .. })
    ));

    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_check_requires_connection() {
    let device = MockOpener::new();
    let h = Harness::start(device, |_| {});

    let result = h.handle.ota_update_check().await;
    assert!(matches!(result, Err(Error::UpdateCheckFailed { .. })));
    assert_eq!(h.handle.update_state().await.unwrap(), UpdateState::Failed);

    h.stop().await;
}
