//! Add-on registry
//!
//! Maps hardware-element ids to decoder instances. The mapping is rebuilt
//! from every inventory and cleared on disconnect. Decoders are created
//! through a [`DecoderTable`] keyed by WhoAmI type code, so new peripheral
//! kinds can be added without touching the connection manager.

use super::actuators::{GripServo, LedArm, LedIndicator};
use super::sensors::{ColourSensor, DistanceSensor, IrFoot, LightSensor, NoiseSensor};
use super::{parse_type_code, type_code, AddOnDecoder, AddOnKind, AddOnStatus, STATUS_VALID};
use crate::device::{HardwareElement, ReportMessage};
use std::collections::{BTreeMap, HashMap};
use std::time::Instant;
use tracing::{debug, trace};

/// Element type tag the device uses for add-ons
pub const ADDON_ELEMENT_TYPE: &str = "RSAddOn";

/// Alternative tag accepted for add-ons
pub const ADDON_ELEMENT_TYPE_ALIAS: &str = "peripheral";

/// Decoder constructor: `(element name, type code) -> decoder`
pub type DecoderCtor = Box<dyn Fn(&str, u32) -> Box<dyn AddOnDecoder> + Send + Sync>;

/// Type code to decoder constructor mapping
pub struct DecoderTable {
    ctors: HashMap<u32, DecoderCtor>,
}

impl DecoderTable {
    pub fn empty() -> Self {
        Self {
            ctors: HashMap::new(),
        }
    }

    /// Table with every built-in peripheral kind
    pub fn builtin() -> Self {
        let mut table = Self::empty();
        table.register(type_code::GRIP_SERVO, |name, _| Box::new(GripServo::new(name)));
        table.register(type_code::LED_FOOT, |name, _| Box::new(LedIndicator::foot(name)));
        table.register(type_code::LED_EYE, |name, _| Box::new(LedIndicator::eye(name)));
        for code in [type_code::LED_ARM_V1, type_code::LED_ARM_V2] {
            table.register(code, |name, code| Box::new(LedArm::new(name, code)));
        }
        for code in [type_code::IR_FOOT_V1, type_code::IR_FOOT_V2] {
            table.register(code, |name, code| Box::new(IrFoot::new(name, code)));
        }
        table.register(type_code::COLOUR, |name, _| Box::new(ColourSensor::new(name)));
        table.register(type_code::DISTANCE, |name, _| {
            Box::new(DistanceSensor::new(name))
        });
        table.register(type_code::LIGHT, |name, _| Box::new(LightSensor::new(name)));
        table.register(type_code::NOISE, |name, _| Box::new(NoiseSensor::new(name)));
        table
    }

    /// Register (or replace) the constructor for `code`
    pub fn register<F>(&mut self, code: u32, ctor: F)
    where
        F: Fn(&str, u32) -> Box<dyn AddOnDecoder> + Send + Sync + 'static,
    {
        self.ctors.insert(code, Box::new(ctor));
    }

    fn build(&self, name: &str, code: u32) -> Option<Box<dyn AddOnDecoder>> {
        self.ctors.get(&code).map(|ctor| ctor(name, code))
    }
}

impl Default for DecoderTable {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Live mapping from element id to decoder
pub struct AddOnRegistry {
    table: DecoderTable,
    decoders: BTreeMap<u32, Box<dyn AddOnDecoder>>,
}

impl AddOnRegistry {
    pub fn new() -> Self {
        Self::with_table(DecoderTable::builtin())
    }

    pub fn with_table(table: DecoderTable) -> Self {
        Self {
            table,
            decoders: BTreeMap::new(),
        }
    }

    /// Replace the whole mapping from an inventory
    ///
    /// Elements that are not add-ons, or whose type code is unparseable or
    /// unknown, are skipped.
    pub fn rebuild_from(&mut self, elements: &[HardwareElement]) {
        self.decoders.clear();

        for elem in elements {
            if !is_addon_element(&elem.elem_type) {
                continue;
            }
            let Some(code) = parse_type_code(&elem.who_am_i_type_code) else {
                debug!(
                    id = elem.id_no,
                    code = %elem.who_am_i_type_code,
                    "Unparseable add-on type code, skipped"
                );
                continue;
            };
            match self.table.build(&elem.name, code) {
                Some(decoder) => {
                    trace!(id = elem.id_no, name = %elem.name, kind = %decoder.kind(), "Add-on registered");
                    self.decoders.insert(elem.id_no, decoder);
                }
                None => debug!(id = elem.id_no, "Unknown add-on kind 0x{:02x}, skipped", code),
            }
        }
    }

    pub fn clear(&mut self) {
        self.decoders.clear();
    }

    /// Decode a status sub-record for add-on `id`
    ///
    /// `None` if no decoder is registered for the id.
    pub fn decode_status(&self, id: u32, status: u8, payload: &[u8]) -> Option<AddOnStatus> {
        let decoder = self.decoders.get(&id)?;
        Some(AddOnStatus {
            id,
            name: decoder.name().to_string(),
            kind: decoder.kind(),
            type_code: decoder.type_code(),
            status,
            valid: status & STATUS_VALID != 0,
            reading: decoder.decode(status, payload),
        })
    }

    pub fn lookup_id_by_name(&self, name: &str) -> Option<u32> {
        self.decoders
            .iter()
            .find(|(_, decoder)| decoder.name() == name)
            .map(|(id, _)| *id)
    }

    /// Outstanding init commands, in id order
    pub fn collect_pending_init_commands(&self) -> Vec<String> {
        self.decoders
            .values()
            .filter_map(|decoder| decoder.init_command().map(str::to_string))
            .collect()
    }

    /// Forward init reports to their decoders
    ///
    /// Reports received before `session_start` are ignored. An explicit id
    /// takes precedence over the element name. Returns the number of reports
    /// delivered.
    pub fn apply_reports(&mut self, reports: &[ReportMessage], session_start: Instant) -> usize {
        let mut delivered = 0;

        for report in reports {
            if report.time_received.is_some_and(|t| t < session_start) {
                trace!(elem = ?report.elem_name, "Stale report from previous session, ignored");
                continue;
            }

            let id = report.id_no.or_else(|| {
                report
                    .elem_name
                    .as_deref()
                    .and_then(|name| self.lookup_id_by_name(name))
            });

            match id.and_then(|id| self.decoders.get_mut(&id)) {
                Some(decoder) => {
                    decoder.process_init(report);
                    delivered += 1;
                }
                None => debug!(
                    id = ?report.id_no,
                    elem = ?report.elem_name,
                    "Report subject not resolved, dropped"
                ),
            }
        }

        delivered
    }

    /// Registered ids, ascending
    pub fn ids(&self) -> Vec<u32> {
        self.decoders.keys().copied().collect()
    }

    /// `(id, kind, type code)` for every registered decoder, in id order
    pub fn kinds(&self) -> Vec<(u32, AddOnKind, u32)> {
        self.decoders
            .iter()
            .map(|(id, decoder)| (*id, decoder.kind(), decoder.type_code()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }
}

impl Default for AddOnRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn is_addon_element(elem_type: &str) -> bool {
    elem_type == ADDON_ELEMENT_TYPE || elem_type.eq_ignore_ascii_case(ADDON_ELEMENT_TYPE_ALIAS)
}
