//! Identity check colours
//!
//! The device flashes a short random colour sequence so the operator can
//! tell which physical unit is connected.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;

/// Colours the device indicator can show
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IndicatorColour {
    Red,
    Green,
    Blue,
    Yellow,
    Purple,
    Cyan,
    White,
    Orange,
}

impl IndicatorColour {
    pub const PALETTE: [IndicatorColour; 8] = [
        Self::Red,
        Self::Green,
        Self::Blue,
        Self::Yellow,
        Self::Purple,
        Self::Cyan,
        Self::White,
        Self::Orange,
    ];

    /// Hex code sent to the device (no `#`)
    pub fn hex(&self) -> &'static str {
        match self {
            Self::Red => "ff0000",
            Self::Green => "00ff00",
            Self::Blue => "0000ff",
            Self::Yellow => "ffff00",
            Self::Purple => "8000ff",
            Self::Cyan => "00ffff",
            Self::White => "ffffff",
            Self::Orange => "ff8000",
        }
    }
}

impl std::fmt::Display for IndicatorColour {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Red => "red",
            Self::Green => "green",
            Self::Blue => "blue",
            Self::Yellow => "yellow",
            Self::Purple => "purple",
            Self::Cyan => "cyan",
            Self::White => "white",
            Self::Orange => "orange",
        };
        f.write_str(name)
    }
}

/// Pick `count` colours (at least one), no two neighbours equal
pub fn random_sequence<R: Rng + ?Sized>(rng: &mut R, count: usize) -> Vec<IndicatorColour> {
    let mut colours: Vec<IndicatorColour> = Vec::with_capacity(count.max(1));
    while colours.len() < count.max(1) {
        let Some(&next) = IndicatorColour::PALETTE.choose(rng) else {
            break;
        };
        if colours.last() != Some(&next) {
            colours.push(next);
        }
    }
    colours
}

/// Command that starts flashing `colours`
pub fn flash_command(colours: &[IndicatorColour]) -> String {
    let params: Vec<String> = colours
        .iter()
        .enumerate()
        .map(|(i, c)| format!("c{}={}", i + 1, c.hex()))
        .collect();
    format!("indicator/set?pattern=identify&{}", params.join("&"))
}

/// Command that returns the indicator to normal operation
pub const RESUME_COMMAND: &str = "indicator/resume";
