//! Sensor add-ons
//!
//! Payload layouts (big-endian):
//!
//! | kind     | layout                                                    |
//! |----------|-----------------------------------------------------------|
//! | IR foot  | `flags u8, ir u16` (+ `ambient u16` on v2)                |
//! | colour   | `clear u16, red u16, green u16, blue u16, flags u8`       |
//! | distance | `distance_mm u16`                                         |
//! | light    | `ch0 u16, ch1 u16, ch2 u16`                               |
//! | noise    | `smoothed u16, highest u16, raw u16`                      |
//!
//! Flags: bit 0 touch, bit 1 in air.

use super::{be_u16, type_code, AddOnDecoder, AddOnKind, AddOnReading};
use crate::device::ReportMessage;
use tracing::debug;

const FLAG_TOUCH: u8 = 0x01;
const FLAG_AIR: u8 = 0x02;

/// Build a raw-access init command for element `name`
fn raw_init_command(name: &str, hex_wr: &str, num_to_read: usize, msg_key: &str) -> String {
    format!("elem/{name}/json?cmd=raw&hexWr={hex_wr}&numToRd={num_to_read}&msgKey={msg_key}")
}

fn init_key(name: &str) -> String {
    format!("{name}-init")
}

fn matches_key(report: &ReportMessage, key: &str) -> bool {
    report.msg_key.as_deref() == Some(key)
}

// ============================================================================
// IR foot
// ============================================================================

/// IR foot sensor, shared by both hardware revisions
///
/// The second revision needs its detection threshold read back before use.
pub struct IrFoot {
    name: String,
    code: u32,
    init_key: String,
    init_cmd: Option<String>,
    threshold: Option<u16>,
}

impl IrFoot {
    pub fn new(name: &str, code: u32) -> Self {
        let init_key = init_key(name);
        let init_cmd = (code == type_code::IR_FOOT_V2)
            .then(|| raw_init_command(name, "f5", 2, &init_key));
        Self {
            name: name.to_string(),
            code,
            init_key,
            init_cmd,
            threshold: None,
        }
    }

    fn is_v2(&self) -> bool {
        self.code == type_code::IR_FOOT_V2
    }

    pub fn threshold(&self) -> Option<u16> {
        self.threshold
    }
}

impl AddOnDecoder for IrFoot {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> AddOnKind {
        AddOnKind::IrFoot
    }

    fn type_code(&self) -> u32 {
        self.code
    }

    fn decode(&self, _status: u8, payload: &[u8]) -> Option<AddOnReading> {
        let flags = *payload.first()?;
        let ir_value = be_u16(payload, 1)?;
        let ambient = if self.is_v2() {
            Some(be_u16(payload, 3)?)
        } else {
            None
        };
        Some(AddOnReading::IrFoot {
            touch: flags & FLAG_TOUCH != 0,
            air: flags & FLAG_AIR != 0,
            ir_value,
            ambient,
            threshold: self.threshold,
        })
    }

    fn process_init(&mut self, report: &ReportMessage) {
        if !matches_key(report, &self.init_key) {
            return;
        }
        match report.read_bytes() {
            Some(bytes) if bytes.len() >= 2 => {
                self.threshold = be_u16(&bytes, 0);
                debug!(name = %self.name, threshold = ?self.threshold, "IR foot initialized");
            }
            _ => debug!(name = %self.name, "IR foot init report without threshold"),
        }
        self.init_cmd = None;
    }

    fn init_command(&self) -> Option<&str> {
        self.init_cmd.as_deref()
    }
}

// ============================================================================
// Colour sensor
// ============================================================================

pub struct ColourSensor {
    name: String,
    init_key: String,
    init_cmd: Option<String>,
}

impl ColourSensor {
    pub fn new(name: &str) -> Self {
        let init_key = init_key(name);
        let init_cmd = Some(raw_init_command(name, "104020", 0, &init_key));
        Self {
            name: name.to_string(),
            init_key,
            init_cmd,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.init_cmd.is_none()
    }
}

impl AddOnDecoder for ColourSensor {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> AddOnKind {
        AddOnKind::ColourSensor
    }

    fn type_code(&self) -> u32 {
        type_code::COLOUR
    }

    fn decode(&self, _status: u8, payload: &[u8]) -> Option<AddOnReading> {
        let flags = *payload.get(8)?;
        Some(AddOnReading::Colour {
            clear: be_u16(payload, 0)?,
            red: be_u16(payload, 2)?,
            green: be_u16(payload, 4)?,
            blue: be_u16(payload, 6)?,
            touch: flags & FLAG_TOUCH != 0,
            air: flags & FLAG_AIR != 0,
        })
    }

    fn process_init(&mut self, report: &ReportMessage) {
        if matches_key(report, &self.init_key) {
            debug!(name = %self.name, "Colour sensor initialized");
            self.init_cmd = None;
        }
    }

    fn init_command(&self) -> Option<&str> {
        self.init_cmd.as_deref()
    }
}

// ============================================================================
// Simple sensors
// ============================================================================

pub struct DistanceSensor {
    name: String,
}

impl DistanceSensor {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

impl AddOnDecoder for DistanceSensor {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> AddOnKind {
        AddOnKind::DistanceSensor
    }

    fn type_code(&self) -> u32 {
        type_code::DISTANCE
    }

    fn decode(&self, _status: u8, payload: &[u8]) -> Option<AddOnReading> {
        Some(AddOnReading::Distance {
            distance_mm: be_u16(payload, 0)?,
        })
    }
}

pub struct LightSensor {
    name: String,
}

impl LightSensor {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

impl AddOnDecoder for LightSensor {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> AddOnKind {
        AddOnKind::LightSensor
    }

    fn type_code(&self) -> u32 {
        type_code::LIGHT
    }

    fn decode(&self, _status: u8, payload: &[u8]) -> Option<AddOnReading> {
        Some(AddOnReading::Light {
            channels: [
                be_u16(payload, 0)?,
                be_u16(payload, 2)?,
                be_u16(payload, 4)?,
            ],
        })
    }
}

pub struct NoiseSensor {
    name: String,
}

impl NoiseSensor {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

impl AddOnDecoder for NoiseSensor {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> AddOnKind {
        AddOnKind::NoiseSensor
    }

    fn type_code(&self) -> u32 {
        type_code::NOISE
    }

    fn decode(&self, _status: u8, payload: &[u8]) -> Option<AddOnReading> {
        Some(AddOnReading::Noise {
            smoothed: be_u16(payload, 0)?,
            highest: be_u16(payload, 2)?,
            raw: be_u16(payload, 4)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report_with_key(key: &str, hex: Option<&str>) -> ReportMessage {
        ReportMessage {
            msg_key: Some(key.to_string()),
            hex_rd: hex.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_ir_foot_v1_decode() {
        let foot = IrFoot::new("LeftIRFoot", type_code::IR_FOOT_V1);
        assert!(foot.init_command().is_none());
        assert_eq!(
            foot.decode(0x01, &[FLAG_TOUCH, 0x01, 0x00]),
            Some(AddOnReading::IrFoot {
                touch: true,
                air: false,
                ir_value: 256,
                ambient: None,
                threshold: None,
            })
        );
    }

    #[test]
    fn test_ir_foot_v2_needs_ambient() {
        let foot = IrFoot::new("RightIRFoot", type_code::IR_FOOT_V2);
        assert_eq!(foot.decode(0x01, &[0, 0, 5]), None);
        match foot.decode(0x01, &[FLAG_AIR, 0, 5, 0, 9]) {
            Some(AddOnReading::IrFoot { air, ambient, .. }) => {
                assert!(air);
                assert_eq!(ambient, Some(9));
            }
            other => panic!("Expected IrFoot reading, got {:?}", other),
        }
    }

    #[test]
    fn test_ir_foot_v2_init_reads_threshold() {
        let mut foot = IrFoot::new("RightIRFoot", type_code::IR_FOOT_V2);
        let cmd = foot.init_command().unwrap().to_string();
        assert!(cmd.starts_with("elem/RightIRFoot/json?cmd=raw"));
        assert!(cmd.ends_with("msgKey=RightIRFoot-init"));

        // Unrelated key is ignored
        foot.process_init(&report_with_key("other", Some("0100")));
        assert!(foot.init_command().is_some());

        foot.process_init(&report_with_key("RightIRFoot-init", Some("0120")));
        assert!(foot.init_command().is_none());
        assert_eq!(foot.threshold(), Some(0x0120));
    }

    #[test]
    fn test_colour_sensor() {
        let mut colour = ColourSensor::new("Colour");
        assert!(!colour.is_initialized());

        let payload = [0, 100, 0, 50, 0, 25, 0, 10, FLAG_TOUCH | FLAG_AIR];
        assert_eq!(
            colour.decode(0x01, &payload),
            Some(AddOnReading::Colour {
                clear: 100,
                red: 50,
                green: 25,
                blue: 10,
                touch: true,
                air: true,
            })
        );
        assert_eq!(colour.decode(0x01, &payload[..8]), None);

        colour.process_init(&report_with_key("Colour-init", None));
        assert!(colour.is_initialized());
    }

    #[test]
    fn test_simple_sensors() {
        let distance = DistanceSensor::new("Dist");
        assert_eq!(
            distance.decode(0x01, &[0x01, 0xF4]),
            Some(AddOnReading::Distance { distance_mm: 500 })
        );

        let light = LightSensor::new("Light");
        assert_eq!(
            light.decode(0x01, &[0, 1, 0, 2, 0, 3]),
            Some(AddOnReading::Light {
                channels: [1, 2, 3]
            })
        );
        assert_eq!(light.decode(0x01, &[0, 1, 0, 2]), None);

        let noise = NoiseSensor::new("Mic");
        assert_eq!(
            noise.decode(0x01, &[0, 10, 0, 90, 0, 12]),
            Some(AddOnReading::Noise {
                smoothed: 10,
                highest: 90,
                raw: 12
            })
        );
    }
}
