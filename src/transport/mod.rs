//! Transport abstraction for byte-level I/O
//!
//! Separates I/O concerns from protocol logic:
//! - **Transport**: How frames flow (WebSocket, short-range wireless...)
//! - **Codec**: How frames are encoded/decoded (handled separately)
//!
//! A transport delivers whole frames: one received message is one frame.
//!
//! # Adding a new transport
//!
//! 1. Create `transport/my_transport.rs`
//! 2. Implement the `Transport` trait
//! 3. Route a `TransportKind` to it in a `TransportOpener`

pub mod websocket;

pub use websocket::WebSocketTransport;

use crate::error::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Which link to use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Local network, target is an IP address or host name
    #[default]
    Network,
    /// Short-range wireless, target is a device name or address
    Wireless,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Network => write!(f, "network"),
            Self::Wireless => write!(f, "wireless"),
        }
    }
}

impl std::str::FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "network" | "wifi" | "ws" => Ok(Self::Network),
            "wireless" | "ble" => Ok(Self::Wireless),
            other => Err(format!("unknown transport '{}'", other)),
        }
    }
}

/// Channels for bidirectional communication with a transport
///
/// The transport owns the underlying I/O (socket, radio link, etc.)
/// and communicates via these channels. When the transport stops
/// (shutdown or error), it closes the channels.
pub struct TransportChannels {
    /// Receive frames from the transport
    ///
    /// Returns `None` when the transport has stopped.
    pub rx: mpsc::Receiver<Bytes>,

    /// Send frames to the transport
    pub tx: mpsc::Sender<Bytes>,
}

/// An openable transport
///
/// A transport does NOT handle:
/// - Message decoding (that's the codec's job)
/// - Reconnection logic (that's the connection manager's job)
///
/// # Lifecycle
///
/// 1. Create transport with its target
/// 2. Call `open()` to connect and start I/O in background
/// 3. Use returned channels for communication
/// 4. Transport runs until:
///    - `shutdown` flag is set, OR
///    - A fatal error occurs (disconnect, etc.)
/// 5. Transport closes channels when stopping
#[async_trait]
pub trait Transport: Send + 'static {
    /// Connect and start background I/O
    ///
    /// # Errors
    ///
    /// Returns `TransportUnavailable` if the link cannot be established.
    async fn open(self, shutdown: Arc<AtomicBool>) -> Result<TransportChannels>;
}

/// Opens a transport by kind and target
#[async_trait]
pub trait TransportOpener: Send + Sync {
    async fn open(
        &self,
        kind: TransportKind,
        target: &str,
        shutdown: Arc<AtomicBool>,
    ) -> Result<TransportChannels>;
}

/// Opener for the built-in transports
///
/// The network link is a WebSocket client. The short-range wireless link is
/// platform specific and must be installed with [`DefaultOpener::with_wireless`].
#[derive(Default)]
pub struct DefaultOpener {
    wireless: Option<Arc<dyn TransportOpener>>,
}

impl DefaultOpener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a wireless backend
    pub fn with_wireless(mut self, opener: impl TransportOpener + 'static) -> Self {
        self.wireless = Some(Arc::new(opener));
        self
    }
}

#[async_trait]
impl TransportOpener for DefaultOpener {
    async fn open(
        &self,
        kind: TransportKind,
        target: &str,
        shutdown: Arc<AtomicBool>,
    ) -> Result<TransportChannels> {
        if target.trim().is_empty() {
            return Err(Error::UserCancelled);
        }
        match kind {
            TransportKind::Network => WebSocketTransport::new(target).open(shutdown).await,
            TransportKind::Wireless => match &self.wireless {
                Some(opener) => opener.open(kind, target, shutdown).await,
                None => Err(Error::transport("no wireless backend available")),
            },
        }
    }
}
