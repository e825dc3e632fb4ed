// Pins, serial, HTTP and probe defaults, plus the command-line overrides
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::camera::{CameraMode, CameraSettings};

// Motor driver pins on the Firmata board (TB6612-style dual H-bridge)
pub const PIN_STANDBY: u8 = 3;
pub const PIN_PWM_A: u8 = 5; // left channel
pub const PIN_DIR_A: u8 = 7;
pub const PIN_PWM_B: u8 = 6; // right channel
pub const PIN_DIR_B: u8 = 8;

// Firmata serial link
pub const FIRMATA_BAUDRATE: u32 = 57_600;
pub const SERIAL_TIMEOUT: Duration = Duration::from_millis(100);

// The board resets when the port opens; give the bootloader time to hand over
pub const BOARD_BOOT_DELAY: Duration = Duration::from_secs(2);

// Log level when RUST_LOG is unset or unparsable
pub const DEFAULT_LOG_DIRECTIVE: &str = "info";

// HTTP surface
pub const HTTP_PORT: u16 = 5001;

// Health probes
pub const THERMAL_ZONE_PATH: &str = "/sys/class/thermal/thermal_zone0/temp";
pub const PROC_STAT_PATH: &str = "/proc/stat";
pub const WIFI_TOOL: &str = "iwconfig";
pub const CPU_SAMPLE_MS: u64 = 500;

// Camera
pub const CAMERA_COMMAND: &str = "rpicam-vid";
pub const FRAME_WIDTH: u32 = 640;
pub const FRAME_HEIGHT: u32 = 480;
pub const FRAMERATE: u32 = 30;

/// Command-line settings, every field defaulting to the constants above
#[derive(Debug, Clone, Parser)]
#[command(version, about = "Web teleoperation runtime for a two-wheeled rover")]
pub struct Settings {
    /// Serial port of the Firmata board (autodetected when omitted)
    #[arg(long)]
    pub serial_port: Option<String>,

    #[arg(long, default_value_t = FIRMATA_BAUDRATE)]
    pub baud_rate: u32,

    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub host: IpAddr,

    #[arg(short, long, default_value_t = HTTP_PORT)]
    pub port: u16,

    /// Use simulated pins instead of a real board
    #[arg(long)]
    pub no_motors: bool,

    /// Serve without a camera; /video_feed answers 503
    #[arg(long)]
    pub no_camera: bool,

    #[arg(long, value_enum, default_value_t = CameraMode::Auto)]
    pub camera_mode: CameraMode,

    #[arg(long, default_value = CAMERA_COMMAND)]
    pub camera_command: String,

    #[arg(long, default_value_t = FRAME_WIDTH)]
    pub width: u32,

    #[arg(long, default_value_t = FRAME_HEIGHT)]
    pub height: u32,

    #[arg(long, default_value_t = FRAMERATE)]
    pub framerate: u32,

    #[arg(long, default_value = THERMAL_ZONE_PATH)]
    pub thermal_zone: PathBuf,

    #[arg(long, default_value = WIFI_TOOL)]
    pub wifi_tool: String,

    /// Window over which CPU load is sampled
    #[arg(long, default_value_t = CPU_SAMPLE_MS)]
    pub cpu_sample_ms: u64,
}

impl Settings {
    pub fn camera(&self) -> CameraSettings {
        CameraSettings {
            command: self.camera_command.clone(),
            width: self.width,
            height: self.height,
            framerate: self.framerate,
            mode: self.camera_mode,
        }
    }

    pub fn cpu_sample_window(&self) -> Duration {
        Duration::from_millis(self.cpu_sample_ms)
    }
}

/// Log filter from `RUST_LOG`-style directives, `info` when absent
///
/// A bare `RUST_LOG=debug` must stay `debug`, so the default is only a fallback.
pub fn log_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_DIRECTIVE))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::parse_from(["rover-teleop"]);
        assert_eq!(settings.port, HTTP_PORT);
        assert_eq!(settings.baud_rate, FIRMATA_BAUDRATE);
        assert!(settings.serial_port.is_none());
        assert!(!settings.no_motors);
        assert_eq!(settings.camera_mode, CameraMode::Auto);
        assert_eq!(settings.thermal_zone, PathBuf::from(THERMAL_ZONE_PATH));
        assert_eq!(settings.cpu_sample_window(), Duration::from_millis(500));
    }

    #[test]
    fn test_log_filter() {
        assert_eq!(log_filter(None).to_string(), "info");
        assert_eq!(log_filter(Some("debug")).to_string(), "debug");
        assert_eq!(
            log_filter(Some("rover_teleop=debug")).to_string(),
            "rover_teleop=debug"
        );
    }

    #[test]
    fn test_overrides() {
        let settings = Settings::parse_from([
            "rover-teleop",
            "--serial-port",
            "/dev/ttyACM1",
            "-p",
            "8080",
            "--no-camera",
            "--camera-mode",
            "night",
        ]);
        assert_eq!(settings.serial_port.as_deref(), Some("/dev/ttyACM1"));
        assert_eq!(settings.port, 8080);
        assert!(settings.no_camera);
        assert_eq!(settings.camera().mode, CameraMode::Night);
    }
}
