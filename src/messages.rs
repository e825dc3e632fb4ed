// Request and response bodies of the HTTP surface

use serde::{Deserialize, Serialize};

use crate::camera::CameraMode;

// Browser/teleop -> runtime: the keys currently held down
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlRequest {
    pub command: Vec<String>,
}

// Runtime -> browser: last commanded speed (signed, 0 when stopped)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpeedReport {
    pub speed: i32,
}

/// Health snapshot, already formatted for display
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthReport {
    pub cpu_temp: String,
    pub cpu_load: String,
    /// `None` when the wireless tool reports no signal level
    pub wifi_strength: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CameraModeRequest {
    pub mode: CameraMode,
}
