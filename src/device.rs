//! Device-side data model
//!
//! Records the device advertises (hardware elements, system info, init
//! reports, command responses) and the cached snapshot the connection manager
//! keeps up to date for readers.

use crate::addon::AddOnStatus;
use crate::connection::ConnectionState;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

/// A peripheral discovered on the device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareElement {
    #[serde(rename = "IDNo")]
    pub id_no: u32,
    pub name: String,
    #[serde(rename = "type")]
    pub elem_type: String,
    #[serde(rename = "whoAmITypeCode", default)]
    pub who_am_i_type_code: String,
    #[serde(rename = "whoAmI", default)]
    pub who_am_i: String,
}

/// System information reported alongside the inventory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    #[serde(rename = "SystemName", default)]
    pub system_name: String,
    /// Firmware version string (semver, optionally `v`-prefixed)
    #[serde(rename = "SystemVersion")]
    pub firmware_version: String,
    #[serde(rename = "RicHwRevNo", default)]
    pub hw_revision: u32,
    #[serde(rename = "SerialNo", default)]
    pub serial_no: Option<String>,
}

/// Inventory response: hardware elements plus optional system info
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    #[serde(rename = "hwElems", default)]
    pub elements: Vec<HardwareElement>,
    #[serde(rename = "sysInfo", default)]
    pub info: Option<DeviceInfo>,
}

/// Report emitted by the device while peripherals initialize
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportMessage {
    #[serde(rename = "msgType", default)]
    pub msg_type: Option<String>,
    #[serde(rename = "elemName", default)]
    pub elem_name: Option<String>,
    #[serde(rename = "IDNo", default)]
    pub id_no: Option<u32>,
    #[serde(rename = "msgKey", default)]
    pub msg_key: Option<String>,
    /// Raw bytes read from the peripheral, hex encoded
    #[serde(rename = "hexRd", default)]
    pub hex_rd: Option<String>,
    /// Stamped locally when the report batch arrives
    #[serde(skip)]
    pub time_received: Option<Instant>,
}

impl ReportMessage {
    /// Decode `hexRd` into bytes. Invalid hex yields `None`.
    pub fn read_bytes(&self) -> Option<Vec<u8>> {
        hex::decode(self.hex_rd.as_deref()?).ok()
    }
}

/// Response to a command sent to the device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceResponse {
    /// Command the response refers to
    pub req: String,
    /// `ok` or `fail`
    pub rslt: String,
    #[serde(default)]
    pub msg: Option<String>,
}

impl DeviceResponse {
    pub fn is_ok(&self) -> bool {
        self.rslt.eq_ignore_ascii_case("ok")
    }
}

/// Cached device state, written only by the connection manager
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeviceState {
    pub connection: ConnectionState,
    pub info: Option<DeviceInfo>,
    pub elements: Vec<HardwareElement>,
    /// Latest decoded status per add-on id
    pub addons: BTreeMap<u32, AddOnStatus>,
}

/// Read-only view of the cached device state
#[derive(Clone)]
pub struct SnapshotReader {
    inner: Arc<RwLock<DeviceState>>,
}

impl SnapshotReader {
    pub(crate) fn new(inner: Arc<RwLock<DeviceState>>) -> Self {
        Self { inner }
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> DeviceState {
        self.inner.read().clone()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.read().connection
    }

    pub fn addon(&self, id: u32) -> Option<AddOnStatus> {
        self.inner.read().addons.get(&id).cloned()
    }
}
