//! Add-on (peripheral) decoding
//!
//! Each peripheral advertised in the device inventory gets a decoder chosen
//! by its WhoAmI type code. Decoders turn the opaque status payloads handed
//! on by the codec into typed readings, and some of them need a one-shot
//! initialization command before the peripheral starts reporting.

pub mod actuators;
pub mod registry;
pub mod sensors;

pub use registry::{AddOnRegistry, DecoderCtor, DecoderTable};

use crate::device::ReportMessage;
use serde::Serialize;

/// WhoAmI type codes of the built-in peripherals
pub mod type_code {
    pub const GRIP_SERVO: u32 = 0x81;
    pub const LED_FOOT: u32 = 0x82;
    pub const DISTANCE: u32 = 0x83;
    pub const LIGHT: u32 = 0x84;
    pub const COLOUR: u32 = 0x85;
    pub const IR_FOOT_V1: u32 = 0x86;
    pub const LED_ARM_V1: u32 = 0x87;
    pub const LED_EYE: u32 = 0x88;
    pub const NOISE: u32 = 0x8A;
    pub const LED_ARM_V2: u32 = 0x8B;
    pub const IR_FOOT_V2: u32 = 0x8C;
}

/// Status byte bit marking the payload as valid
pub const STATUS_VALID: u8 = 0x01;

/// Peripheral kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AddOnKind {
    GripServo,
    LedFoot,
    LedArm,
    LedEye,
    IrFoot,
    ColourSensor,
    DistanceSensor,
    LightSensor,
    NoiseSensor,
}

impl AddOnKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::GripServo => "grip_servo",
            Self::LedFoot => "led_foot",
            Self::LedArm => "led_arm",
            Self::LedEye => "led_eye",
            Self::IrFoot => "ir_foot",
            Self::ColourSensor => "colour_sensor",
            Self::DistanceSensor => "distance_sensor",
            Self::LightSensor => "light_sensor",
            Self::NoiseSensor => "noise_sensor",
        }
    }
}

impl std::fmt::Display for AddOnKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Kind-specific decoded fields
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AddOnReading {
    GripServo {
        angle_deg: f32,
        current: u8,
        moving: bool,
    },
    /// LED foot and eye carry no payload fields
    Indicator,
    LedArm {
        revision: u8,
    },
    IrFoot {
        touch: bool,
        air: bool,
        ir_value: u16,
        /// Only reported by the second hardware revision
        ambient: Option<u16>,
        /// Detection threshold read during initialization
        threshold: Option<u16>,
    },
    Colour {
        clear: u16,
        red: u16,
        green: u16,
        blue: u16,
        touch: bool,
        air: bool,
    },
    Distance {
        distance_mm: u16,
    },
    Light {
        channels: [u16; 3],
    },
    Noise {
        smoothed: u16,
        highest: u16,
        raw: u16,
    },
}

/// Normalized output of one status decode
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AddOnStatus {
    pub id: u32,
    pub name: String,
    pub kind: AddOnKind,
    pub type_code: u32,
    pub status: u8,
    /// Status bit 0
    pub valid: bool,
    /// `None` when the payload is too short for the kind
    pub reading: Option<AddOnReading>,
}

/// Per-peripheral decode logic
pub trait AddOnDecoder: Send {
    /// Element name from the inventory
    fn name(&self) -> &str;

    fn kind(&self) -> AddOnKind;

    /// Type code the decoder was constructed with
    fn type_code(&self) -> u32;

    /// Decode a published status payload
    ///
    /// Returns `None` if the payload is shorter than the kind requires.
    fn decode(&self, status: u8, payload: &[u8]) -> Option<AddOnReading>;

    /// Handle an initialization report addressed to this peripheral
    fn process_init(&mut self, _report: &ReportMessage) {}

    /// Outstanding initialization command, if any
    fn init_command(&self) -> Option<&str> {
        None
    }
}

/// Parse a WhoAmI type code (hex, optional `0x` prefix)
pub fn parse_type_code(code: &str) -> Option<u32> {
    let code = code.trim();
    let digits = code
        .strip_prefix("0x")
        .or_else(|| code.strip_prefix("0X"))
        .unwrap_or(code);
    if digits.is_empty() {
        return None;
    }
    u32::from_str_radix(digits, 16).ok()
}

pub(crate) fn be_u16(payload: &[u8], at: usize) -> Option<u16> {
    let bytes = payload.get(at..at + 2)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

pub(crate) fn be_i16(payload: &[u8], at: usize) -> Option<i16> {
    be_u16(payload, at).map(|v| v as i16)
}
