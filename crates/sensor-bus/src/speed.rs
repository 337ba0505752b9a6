//! Bus Speed Definitions

use serde::{Deserialize, Serialize};

/// Supported control bus speeds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusSpeed {
    /// Standard mode (100 kHz)
    #[default]
    Standard,
    /// Fast mode (400 kHz)
    Fast,
    /// Fast mode plus (1 MHz)
    FastPlus,
}

impl BusSpeed {
    /// Get the bus clock in Hz
    pub fn hz(&self) -> u32 {
        match self {
            BusSpeed::Standard => 100_000,
            BusSpeed::Fast => 400_000,
            BusSpeed::FastPlus => 1_000_000,
        }
    }

    /// Pick the fastest speed not exceeding `hz`
    pub fn from_hz(hz: u32) -> Self {
        if hz >= 1_000_000 {
            BusSpeed::FastPlus
        } else if hz >= 400_000 {
            BusSpeed::Fast
        } else {
            BusSpeed::Standard
        }
    }
}
