//! Event reporting
//!
//! The connection manager and the firmware updater report every state
//! transition to a single listener passed at construction. Events form a
//! closed set per category; payload-carrying variants hold their data inline.

use crate::connection::identity::IndicatorColour;
use crate::error::UpdateStage;
use serde::Serialize;
use tokio::sync::mpsc;

/// Connection lifecycle events
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ConnectionEvent {
    Connecting,
    Connected,
    ConnectionFailed { reason: String },
    ConnectionLost { reason: String },
    Reconnecting { attempt: u32 },
    Disconnected { reason: String },
    /// The device is flashing these colours, in order
    VerifyingCorrectDevice { colours: Vec<IndicatorColour> },
    VerifiedCorrectDevice,
    RejectedDevice,
}

impl ConnectionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::ConnectionFailed { .. } => "connection_failed",
            Self::ConnectionLost { .. } => "connection_lost",
            Self::Reconnecting { .. } => "reconnecting",
            Self::Disconnected { .. } => "disconnected",
            Self::VerifyingCorrectDevice { .. } => "verifying_correct_device",
            Self::VerifiedCorrectDevice => "verified_correct_device",
            Self::RejectedDevice => "rejected_device",
        }
    }
}

/// Firmware update events
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum UpdateEvent {
    Checking,
    NoUpdateNeeded { current: String },
    UpdateAvailable { current: String, version: String },
    Downloading { version: String },
    Transferring { total: usize },
    Progress { sent: usize, total: usize },
    Applying,
    Complete { version: String },
    Cancelled,
    Failed { stage: UpdateStage, reason: String },
}

impl UpdateEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Checking => "checking",
            Self::NoUpdateNeeded { .. } => "no_update_needed",
            Self::UpdateAvailable { .. } => "update_available",
            Self::Downloading { .. } => "downloading",
            Self::Transferring { .. } => "transferring",
            Self::Progress { .. } => "progress",
            Self::Applying => "applying",
            Self::Complete { .. } => "complete",
            Self::Cancelled => "cancelled",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Any reported event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "category", content = "data", rename_all = "snake_case")]
pub enum Event {
    Connection(ConnectionEvent),
    Update(UpdateEvent),
}

impl Event {
    /// `"connection"` or `"update"`
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection",
            Self::Update(_) => "update",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Connection(e) => e.name(),
            Self::Update(e) => e.name(),
        }
    }
}

impl From<ConnectionEvent> for Event {
    fn from(event: ConnectionEvent) -> Self {
        Self::Connection(event)
    }
}

impl From<UpdateEvent> for Event {
    fn from(event: UpdateEvent) -> Self {
        Self::Update(event)
    }
}

/// Receiver of state-transition events
///
/// Called synchronously on the client task; implementations must not block.
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &Event);
}

/// Listener that discards everything
pub struct NullListener;

impl EventListener for NullListener {
    fn on_event(&self, _event: &Event) {}
}

/// Forwards events into a channel
///
/// Events are dropped if the channel is full or closed.
pub struct ChannelListener {
    tx: mpsc::Sender<Event>,
}

impl ChannelListener {
    pub fn new(tx: mpsc::Sender<Event>) -> Self {
        Self { tx }
    }

    /// Create a listener and the receiving end of its channel
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }
}

impl EventListener for ChannelListener {
    fn on_event(&self, event: &Event) {
        let _ = self.tx.try_send(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_and_name() {
        let event: Event = ConnectionEvent::Reconnecting { attempt: 2 }.into();
        assert_eq!(event.category(), "connection");
        assert_eq!(event.name(), "reconnecting");

        let event: Event = UpdateEvent::Progress {
            sent: 10,
            total: 20,
        }
        .into();
        assert_eq!(event.category(), "update");
        assert_eq!(event.name(), "progress");
    }

    #[test]
    fn test_serialize_payload() {
        let event: Event = ConnectionEvent::VerifyingCorrectDevice {
            colours: vec![IndicatorColour::Red, IndicatorColour::Blue],
        }
        .into();
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["category"], "connection");
        assert_eq!(json["data"]["event"], "verifying_correct_device");
        assert_eq!(json["data"]["colours"][1], "blue");
    }

    #[tokio::test]
    async fn test_channel_listener_drops_when_full() {
        let (listener, mut rx) = ChannelListener::channel(1);
        listener.on_event(&ConnectionEvent::Connecting.into());
        listener.on_event(&ConnectionEvent::Connected.into());

        assert_eq!(rx.recv().await, Some(ConnectionEvent::Connecting.into()));
        assert!(rx.try_recv().is_err());
    }
}
