// Health readings from procfs, sysfs and the wireless tools

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::{HealthError, HealthSource};
use crate::config::PROC_STAT_PATH;

/// Aggregate CPU jiffies from the first line of `/proc/stat`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuTimes {
    pub busy: u64,
    pub total: u64,
}

impl CpuTimes {
    pub fn parse(stat: &str) -> Result<Self, HealthError> {
        let parse_error = || HealthError::Parse {
            what: "cpu times",
            input: stat.lines().next().unwrap_or_default().to_string(),
        };

        let line = stat
            .lines()
            .find(|l| l.starts_with("cpu "))
            .ok_or_else(parse_error)?;

        let fields = line
            .split_whitespace()
            .skip(1)
            .map(str::parse::<u64>)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| parse_error())?;

        // user nice system idle iowait irq softirq steal [guest guest_nice]
        // guest time is already counted in user/nice
        if fields.len() < 4 {
            return Err(parse_error());
        }
        let total: u64 = fields.iter().take(8).sum();
        let idle = fields[3] + fields.get(4).copied().unwrap_or(0);

        Ok(Self {
            busy: total - idle,
            total,
        })
    }

    /// Busy percentage between an earlier sample and this one
    pub fn load_since(&self, earlier: &CpuTimes) -> f32 {
        let total = self.total.saturating_sub(earlier.total);
        if total == 0 {
            return 0.0;
        }
        let busy = self.busy.saturating_sub(earlier.busy);
        (busy as f32 / total as f32 * 100.0).clamp(0.0, 100.0)
    }
}

/// Parse the thermal zone file (millidegrees Celsius)
pub fn parse_millidegrees(raw: &str) -> Result<f32, HealthError> {
    let trimmed = raw.trim();
    trimmed
        .parse::<i64>()
        .map(|milli| milli as f32 / 1000.0)
        .map_err(|_| HealthError::Parse {
            what: "temperature",
            input: trimmed.to_string(),
        })
}

pub struct LinuxHealth {
    thermal_zone: PathBuf,
    proc_stat: PathBuf,
    wifi_tool: String,
    sample_window: Duration,
}

impl LinuxHealth {
    pub fn new(thermal_zone: impl Into<PathBuf>, wifi_tool: &str, sample_window: Duration) -> Self {
        Self {
            thermal_zone: thermal_zone.into(),
            proc_stat: PathBuf::from(PROC_STAT_PATH),
            wifi_tool: wifi_tool.to_string(),
            sample_window,
        }
    }

    async fn cpu_times(&self) -> Result<CpuTimes, HealthError> {
        let stat = tokio::fs::read_to_string(&self.proc_stat).await?;
        CpuTimes::parse(&stat)
    }
}

#[async_trait]
impl HealthSource for LinuxHealth {
    async fn cpu_temp(&self) -> Result<f32, HealthError> {
        let raw = tokio::fs::read_to_string(&self.thermal_zone).await?;
        parse_millidegrees(&raw)
    }

    async fn cpu_load(&self) -> Result<f32, HealthError> {
        let before = self.cpu_times().await?;
        tokio::time::sleep(self.sample_window).await;
        let after = self.cpu_times().await?;
        Ok(after.load_since(&before))
    }

    async fn wifi_status(&self) -> Result<String, HealthError> {
        let output = Command::new(&self.wifi_tool).output().await?;
        // iwconfig exits non-zero when some interfaces lack wireless extensions
        // but still prints the ones that have them
        if !output.status.success() && output.stdout.is_empty() {
            return Err(HealthError::ToolFailed {
                tool: self.wifi_tool.clone(),
                status: output.status,
            });
        }
        debug!("{} printed {} bytes", self.wifi_tool, output.stdout.len());
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
