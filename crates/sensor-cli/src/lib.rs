//! Sensor Probe
//!
//! Binds a sensor on a simulated board, applies the configured format and
//! size, captures a handful of frames and reports what happened.

pub mod settings;

use anyhow::Context;
use sensor_hal::sim::simulated_session;
use sensor_hal::{CapabilityRecord, CaptureStats, Frame, FrameSize, PixFormat};
use serde::Serialize;
use settings::{LogSettings, Settings};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Summary of one captured frame
#[derive(Debug, Clone, Serialize)]
pub struct FrameSummary {
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    pub pixformat: PixFormat,
    pub bytes: usize,
    pub timestamp_ms: u64,
    /// Mean byte value, a cheap content fingerprint
    pub mean: f64,
}

impl FrameSummary {
    fn of(frame: &Frame) -> Self {
        let sum: u64 = frame.data.iter().map(|&b| u64::from(b)).sum();
        Self {
            sequence: frame.sequence,
            width: frame.width,
            height: frame.height,
            pixformat: frame.pixformat,
            bytes: frame.data.len(),
            timestamp_ms: frame.timestamp_ms,
            mean: sum as f64 / frame.data.len().max(1) as f64,
        }
    }
}

/// Everything a probe run learned
#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub driver: Option<&'static str>,
    pub chip_id: u32,
    pub slv_addr: u8,
    pub xclk_hz: u32,
    /// Frame size the fitter settled on
    pub framesize: Option<FrameSize>,
    pub stats: CaptureStats,
    pub record: CapabilityRecord,
    pub frames: Vec<FrameSummary>,
}

/// Initialize logging
pub fn init_logging(log: &LogSettings) -> anyhow::Result<()> {
    let level: Level = log
        .level
        .parse()
        .with_context(|| format!("invalid log level {:?}", log.level))?;

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr);

    let installed = if log.json {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    };
    installed.context("failed to set tracing subscriber")
}

/// Run one probe against the simulated board
pub async fn run(settings: &Settings) -> anyhow::Result<ProbeReport> {
    let (mut session, harness) = simulated_session(settings.chip.sim_chip(), settings.session.clone())?;
    harness.control.set_fps(settings.sensor_fps);

    session.init().context("sensor detection")?;
    info!(
        chip_id = session.chip_id(),
        slv_addr = session.slv_addr(),
        driver = session.driver_name().unwrap_or("?"),
        "Sensor bound"
    );

    session.set_pixformat(settings.pixformat)?;
    session.set_framesize(settings.framesize)?;
    if session.framesize() != Some(settings.framesize) {
        warn!(
            requested = ?settings.framesize,
            chosen = ?session.framesize(),
            "Frame size reduced to fit frame memory"
        );
    }
    if settings.framerate > 0 {
        session.set_framerate(settings.framerate)?;
    }

    if let Some(dir) = &settings.save_dir {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }

    let mut frames = Vec::with_capacity(settings.frames as usize);
    for _ in 0..settings.frames {
        let frame = session.snapshot().await.context("snapshot")?;
        info!(
            sequence = frame.sequence,
            width = frame.width,
            height = frame.height,
            bytes = frame.data.len(),
            "Frame captured"
        );

        if let Some(dir) = &settings.save_dir {
            let path = dir.join(format!("frame-{:04}.png", frame.sequence));
            match frame.to_rgb_image() {
                Some(image) => image
                    .save(&path)
                    .with_context(|| format!("writing {}", path.display()))?,
                None => warn!(sequence = frame.sequence, "Frame not renderable"),
            }
        }

        frames.push(FrameSummary::of(&frame));
    }

    Ok(ProbeReport {
        driver: session.driver_name(),
        chip_id: session.chip_id(),
        slv_addr: session.slv_addr(),
        xclk_hz: session.xclk_frequency(),
        framesize: session.framesize(),
        stats: session.stats(),
        record: session.record().clone(),
        frames,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use settings::BoardChip;

    #[tokio::test(start_paused = true)]
    async fn test_probe_captures_requested_frames() {
        let settings = Settings {
            frames: 2,
            ..Settings::default()
        };
        let report = run(&settings).await.unwrap();

        assert_eq!(report.driver, Some("ov2640"));
        assert_eq!(report.frames.len(), 2);
        assert_eq!(report.stats.captured, 2);
        assert_eq!(report.frames[1].sequence, 2);
        assert_eq!(report.frames[0].bytes, 320 * 240 * 2);
        assert_eq!(report.framesize, Some(FrameSize::Qvga));
    }

    #[tokio::test(start_paused = true)]
    async fn test_thermal_probe() {
        let settings = Settings {
            chip: BoardChip::Lepton,
            pixformat: PixFormat::Grayscale,
            framesize: FrameSize::Qqvga,
            frames: 1,
            ..Settings::default()
        };
        let report = run(&settings).await.unwrap();
        assert_eq!(report.driver, Some("lepton"));
        assert_eq!(report.frames[0].bytes, 160 * 120);
    }

    #[tokio::test(start_paused = true)]
    async fn test_report_serializes() {
        let settings = Settings {
            frames: 1,
            framesize: FrameSize::Qqvga,
            ..Settings::default()
        };
        let report = run(&settings).await.unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["frames"][0]["width"], 160);
        assert_eq!(json["record"]["state"]["framesize"], "QQVGA");
    }

    #[tokio::test(start_paused = true)]
    async fn test_saves_png_frames() {
        let dir = std::env::temp_dir().join(format!("sensor-probe-frames-{}", std::process::id()));
        let settings = Settings {
            frames: 1,
            framesize: FrameSize::Qqvga,
            save_dir: Some(dir.clone()),
            ..Settings::default()
        };
        run(&settings).await.unwrap();
        assert!(dir.join("frame-0001.png").exists());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_rejects_unknown_log_level() {
        let log = LogSettings {
            level: "loud".to_string(),
            json: false,
        };
        assert!(init_logging(&log).is_err());
    }
}
