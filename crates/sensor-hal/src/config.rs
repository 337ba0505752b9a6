//! Session Configuration

use frame_pool::PoolConfig;
use sensor_bus::BusSpeed;
use serde::{Deserialize, Serialize};

/// How aggressively the frame-buffer fitting may degrade a configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitPolicy {
    /// A shrunk window never gets smaller than `window / max_crop_divisor`
    /// in either dimension before the next frame size is tried
    pub max_crop_divisor: u32,
    /// Allow falling back to a raw 1-byte format as the last resort
    pub allow_format_fallback: bool,
    /// Smallest compression ratio a JPEG stream is assumed to reach against
    /// 2-byte pixels; sets the worst-case compressed frame size
    pub jpeg_compression: u32,
}

impl Default for FitPolicy {
    fn default() -> Self {
        Self {
            max_crop_divisor: 2,
            allow_format_fallback: true,
            jpeg_compression: 4,
        }
    }
}

/// Sensor session configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Register bus the sensor hangs off
    pub bus_id: u32,
    /// Register bus speed
    pub bus_speed: BusSpeed,
    /// Longest wait for the next line before a capture times out
    pub capture_timeout_ms: u64,
    /// Skip sensor settling delays after reconfiguration
    pub disable_delays: bool,
    /// Settling delay after a register-level reconfiguration
    pub settle_delay_ms: u32,
    /// Frame memory
    pub framebuffer: PoolConfig,
    /// Frame-buffer fitting policy
    pub fit: FitPolicy,
    /// Line events buffered between the capture backend and the orchestrator
    pub line_queue_depth: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            bus_id: 0,
            bus_speed: BusSpeed::Fast,
            capture_timeout_ms: 3000,
            disable_delays: false,
            settle_delay_ms: 100,
            framebuffer: PoolConfig::default(),
            fit: FitPolicy::default(),
            line_queue_depth: 64,
        }
    }
}

impl SessionConfig {
    /// Small frame memory, strict cropping (microcontroller-class boards)
    pub fn low_memory() -> Self {
        Self {
            framebuffer: PoolConfig {
                capacity_bytes: 320 * 1024,
                buffers: 1,
            },
            fit: FitPolicy {
                max_crop_divisor: 2,
                allow_format_fallback: true,
                jpeg_compression: 8,
            },
            line_queue_depth: 16,
            ..Default::default()
        }
    }

    /// Large frame memory for multi-megapixel sensors
    pub fn high_resolution() -> Self {
        Self {
            bus_speed: BusSpeed::FastPlus,
            capture_timeout_ms: 5000,
            framebuffer: PoolConfig {
                capacity_bytes: 32 * 1024 * 1024,
                buffers: 3,
            },
            fit: FitPolicy {
                max_crop_divisor: 4,
                allow_format_fallback: false,
                ..FitPolicy::default()
            },
            line_queue_depth: 256,
            ..Default::default()
        }
    }

    /// Configuration for tests and simulation: no settling delays
    pub fn simulation() -> Self {
        Self {
            disable_delays: true,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_differ_in_memory() {
        let low = SessionConfig::low_memory();
        let high = SessionConfig::high_resolution();
        assert!(low.framebuffer.capacity_bytes < high.framebuffer.capacity_bytes);
        assert!(!high.fit.allow_format_fallback);
        assert!(SessionConfig::simulation().disable_delays);
    }

    #[test]
    fn test_partial_config_falls_back_to_defaults() {
        let config: SessionConfig =
            serde_json::from_str(r#"{"bus_id": 2, "framebuffer": {"buffers": 2}}"#).unwrap();
        assert_eq!(config.bus_id, 2);
        assert_eq!(config.framebuffer.buffers, 2);
        assert_eq!(config.framebuffer.capacity_bytes, 1024 * 1024);
        assert_eq!(config.capture_timeout_ms, 3000);
        assert_eq!(config.fit.jpeg_compression, 4);
    }
}
