// System health: CPU temperature, CPU load and wireless link quality

mod linux;

use std::fmt;

use async_trait::async_trait;
use tracing::debug;

use crate::messages::HealthReport;

pub use linux::{CpuTimes, LinuxHealth};

#[derive(Debug, thiserror::Error)]
pub enum HealthError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not parse {what} from {input:?}")]
    Parse { what: &'static str, input: String },

    #[error("`{tool}` exited with {status}")]
    ToolFailed {
        tool: String,
        status: std::process::ExitStatus,
    },
}

/// Where health readings come from
#[async_trait]
pub trait HealthSource: Send + Sync {
    /// CPU temperature in °C
    async fn cpu_temp(&self) -> Result<f32, HealthError>;

    /// CPU utilisation in percent over the source's sample window
    async fn cpu_load(&self) -> Result<f32, HealthError>;

    /// Raw output of the wireless status tool
    async fn wifi_status(&self) -> Result<String, HealthError>;
}

/// Coarse rating of a wireless signal level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkQuality {
    Excellent,
    Good,
    Fair,
    Weak,
    VeryPoor,
}

impl LinkQuality {
    pub fn from_dbm(dbm: i32) -> Self {
        match dbm {
            d if d >= -50 => LinkQuality::Excellent,
            d if d >= -60 => LinkQuality::Good,
            d if d >= -70 => LinkQuality::Fair,
            d if d >= -80 => LinkQuality::Weak,
            _ => LinkQuality::VeryPoor,
        }
    }
}

impl fmt::Display for LinkQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LinkQuality::Excellent => "Excellent",
            LinkQuality::Good => "Good",
            LinkQuality::Fair => "Fair",
            LinkQuality::Weak => "Weak",
            LinkQuality::VeryPoor => "Very Poor",
        })
    }
}

/// Map dBm linearly onto 0..=100 (-100 dBm = 0%, -50 dBm = 100%)
pub fn signal_percent(dbm: i32) -> i32 {
    (2 * (dbm + 100)).clamp(0, 100)
}

/// Pull the signal level out of `iwconfig`-style output
///
/// Looks for `Signal level=-NN dBm` on the first line that mentions it.
pub fn parse_signal_dbm(output: &str) -> Option<i32> {
    let line = output.lines().find(|l| l.contains("Signal level"))?;
    let value = line.split("Signal level").nth(1)?;
    let number = value
        .trim_start_matches(['=', ':', ' '])
        .split_whitespace()
        .next()?;

    match number.parse() {
        Ok(dbm) => Some(dbm),
        Err(_) => {
            debug!("Unrecognised signal level in {:?}", line.trim());
            None
        }
    }
}

/// Format a signal level as `"<dBm>, <pct>%, <quality>"`
pub fn describe_signal(dbm: i32) -> String {
    format!(
        "{}, {}%, {}",
        dbm,
        signal_percent(dbm),
        LinkQuality::from_dbm(dbm)
    )
}

/// Take one snapshot from a source
pub async fn collect(source: &dyn HealthSource) -> Result<HealthReport, HealthError> {
    let temp = source.cpu_temp().await?;
    let load = source.cpu_load().await?;
    let wifi = source.wifi_status().await?;

    Ok(HealthReport {
        cpu_temp: format!("{:.1}°C", temp),
        cpu_load: format!("{:.0}%", load),
        wifi_strength: parse_signal_dbm(&wifi).map(describe_signal),
    })
}
