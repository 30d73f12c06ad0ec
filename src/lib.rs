//! robolink - client library for robot controllers
//!
//! Connects to a robot controller over a pluggable transport, discovers its
//! add-on peripherals, decodes their binary status reports into a cached
//! snapshot and runs firmware updates over the same link.
//!
//! # Architecture
//!
//! ```text
//! ClientHandle ──commands──► Client loop ─┬─► ConnectionManager ─► Transport (WebSocket / wireless)
//!                                          │        │
//!                                          │        ├─► codec ─► AddOnRegistry ─► DeviceState snapshot
//!                                          │        └─► Scheduler (reconnect retries)
//!                                          └─► FirmwareUpdater ─► Downloader (HTTP)
//!                                                   └─► Scheduler (chunk pacing)
//! ```
//!
//! State transitions are reported to an [`events::EventListener`].

pub mod addon;
pub mod cli;
pub mod client;
pub mod codec;
pub mod config;
pub mod connection;
pub mod constants;
pub mod device;
pub mod error;
pub mod events;
pub mod logging;
pub mod ota;
pub mod scheduler;
pub mod transport;

pub use client::{Client, ClientHandle};
pub use error::{Error, Result};
