//! Shared helpers for session-level tests

#![allow(dead_code)]

use sensor_hal::sim::{simulated_session, SimChip, SimHarness};
use sensor_hal::{FrameSize, PixFormat, SensorSession, SessionConfig};

/// Simulated session with delays disabled
pub fn session(chip: SimChip) -> (SensorSession, SimHarness) {
    session_with(chip, SessionConfig::simulation())
}

pub fn session_with(chip: SimChip, config: SessionConfig) -> (SensorSession, SimHarness) {
    simulated_session(chip, config).expect("session")
}

/// Detected sensor configured for `pixformat` at `framesize`
pub fn ready(chip: SimChip, pixformat: PixFormat, framesize: FrameSize) -> (SensorSession, SimHarness) {
    ready_with(chip, SessionConfig::simulation(), pixformat, framesize)
}

pub fn ready_with(
    chip: SimChip,
    config: SessionConfig,
    pixformat: PixFormat,
    framesize: FrameSize,
) -> (SensorSession, SimHarness) {
    let (mut session, harness) = session_with(chip, config);
    session.init().expect("init");
    session.set_pixformat(pixformat).expect("pixformat");
    session.set_framesize(framesize).expect("framesize");
    (session, harness)
}
