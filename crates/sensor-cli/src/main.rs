//! Sensor Probe - Main Entry Point
//!
//! Usage: `sensor-probe [settings.toml]`

use sensor_cli::settings::Settings;
use sensor_cli::{init_logging, run};
use std::path::PathBuf;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let path = std::env::args_os().nth(1).map(PathBuf::from);
    let settings = Settings::load(path.as_deref())?;
    init_logging(&settings.log)?;

    info!("=== Sensor Probe v{} ===", env!("CARGO_PKG_VERSION"));
    info!(chip = ?settings.chip, pixformat = ?settings.pixformat, framesize = ?settings.framesize, "Probing simulated board");

    let report = run(&settings).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
