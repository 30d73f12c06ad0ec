//! Actuator add-ons: grip servo and the LED indicators
//!
//! Grip servo payload: `[angle: i16 (tenths of a degree), current: u8, flags: u8]`,
//! flags bit 0 set while the servo is moving. LED add-ons publish a status
//! byte only.

use super::{be_i16, type_code, AddOnDecoder, AddOnKind, AddOnReading};

const GRIP_PAYLOAD_LEN: usize = 4;

pub struct GripServo {
    name: String,
}

impl GripServo {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

impl AddOnDecoder for GripServo {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> AddOnKind {
        AddOnKind::GripServo
    }

    fn type_code(&self) -> u32 {
        type_code::GRIP_SERVO
    }

    fn decode(&self, _status: u8, payload: &[u8]) -> Option<AddOnReading> {
        if payload.len() < GRIP_PAYLOAD_LEN {
            return None;
        }
        let angle = be_i16(payload, 0)?;
        Some(AddOnReading::GripServo {
            angle_deg: f32::from(angle) / 10.0,
            current: payload[2],
            moving: payload[3] & 0x01 != 0,
        })
    }
}

/// LED foot and LED eye
pub struct LedIndicator {
    name: String,
    kind: AddOnKind,
    code: u32,
}

impl LedIndicator {
    pub fn foot(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: AddOnKind::LedFoot,
            code: type_code::LED_FOOT,
        }
    }

    pub fn eye(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: AddOnKind::LedEye,
            code: type_code::LED_EYE,
        }
    }
}

impl AddOnDecoder for LedIndicator {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> AddOnKind {
        self.kind
    }

    fn type_code(&self) -> u32 {
        self.code
    }

    fn decode(&self, _status: u8, _payload: &[u8]) -> Option<AddOnReading> {
        Some(AddOnReading::Indicator)
    }
}

/// LED arm, shared by both hardware revisions
pub struct LedArm {
    name: String,
    code: u32,
}

impl LedArm {
    pub fn new(name: &str, code: u32) -> Self {
        Self {
            name: name.to_string(),
            code,
        }
    }

    pub fn revision(&self) -> u8 {
        if self.code == type_code::LED_ARM_V2 {
            2
        } else {
            1
        }
    }
}

impl AddOnDecoder for LedArm {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> AddOnKind {
        AddOnKind::LedArm
    }

    fn type_code(&self) -> u32 {
        self.code
    }

    fn decode(&self, _status: u8, _payload: &[u8]) -> Option<AddOnReading> {
        Some(AddOnReading::LedArm {
            revision: self.revision(),
        })
    }
}
