// Process start-up and the drive state shared by the control endpoints
//
// Start-up order: board (autodetect unless given) -> motor driver -> camera
// -> health probes -> HTTP listener. Board and camera failures are fatal.

use std::future::IntoFuture;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::camera::{FrameSource, RpiCamera};
use crate::config::{Settings, BOARD_BOOT_DELAY};
use crate::health::LinuxHealth;
use crate::motor::{
    interpret, CommandSet, FirmataBoard, FirmataError, MotorDriver, Motion, PinLayout, PinWriter,
    SimPins, SpeedMode,
};
use crate::server::create_router;

pub type BoxedPins = Box<dyn PinWriter + Send>;

/// What the last control request asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriveState {
    pub speed: SpeedMode,
    pub actual_speed: i32,
}

impl Default for DriveState {
    fn default() -> Self {
        Self {
            speed: SpeedMode::Normal,
            actual_speed: 0,
        }
    }
}

/// Motor driver plus the drive state it last applied
pub struct Runtime {
    driver: MotorDriver<BoxedPins>,
    state: DriveState,
}

impl Runtime {
    pub fn new(driver: MotorDriver<BoxedPins>) -> Self {
        Self {
            driver,
            state: DriveState::default(),
        }
    }

    /// Interpret one command set and drive the motors; last command wins
    pub fn on_command(&mut self, commands: &CommandSet) -> Result<Motion, FirmataError> {
        let motion = interpret(commands);
        info!(
            "{:?} -> {:?} at {}",
            commands.iter().map(|t| t.as_str()).collect::<Vec<_>>(),
            motion.maneuver,
            motion.speed.value()
        );

        motion.apply(&mut self.driver)?;
        self.state = DriveState {
            speed: motion.speed,
            actual_speed: motion.actual_speed(),
        };
        Ok(motion)
    }

    /// Stop the motors and zero the reported speed
    pub fn halt(&mut self) -> Result<(), FirmataError> {
        self.driver.stop()?;
        self.state.actual_speed = 0;
        Ok(())
    }

    pub fn state(&self) -> DriveState {
        self.state
    }

    pub fn driver(&self) -> &MotorDriver<BoxedPins> {
        &self.driver
    }
}

async fn open_pins(settings: &Settings) -> Result<BoxedPins, FirmataError> {
    if settings.no_motors {
        info!("Motor output disabled, using simulated pins");
        return Ok(Box::new(SimPins::new()));
    }

    let port = match &settings.serial_port {
        Some(port) => port.clone(),
        None => {
            info!("Autodetecting Firmata board...");
            FirmataBoard::autodetect()?
        }
    };

    let mut board = FirmataBoard::open_with_baudrate(&port, settings.baud_rate)?;
    tokio::time::sleep(BOARD_BOOT_DELAY).await;

    match board.protocol_version() {
        Ok(Some((major, minor))) => info!("Firmata protocol {}.{} on {}", major, minor, port),
        Ok(None) => warn!("No version reply from {}, continuing anyway", port),
        Err(e) => warn!("Version query on {} failed: {}", port, e),
    }

    Ok(Box::new(board))
}

pub async fn run(settings: Settings) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let pins = open_pins(&settings).await?;
    let runtime = Runtime::new(MotorDriver::new(pins, PinLayout::default()));

    let camera: Option<Box<dyn FrameSource>> = if settings.no_camera {
        info!("Camera disabled");
        None
    } else {
        let mut camera = RpiCamera::new(settings.camera());
        camera.start()?;
        Some(Box::new(camera))
    };

    let health = LinuxHealth::new(
        &settings.thermal_zone,
        &settings.wifi_tool,
        settings.cpu_sample_window(),
    );

    let (app, state) = create_router(runtime, camera, Arc::new(health));

    let listener = TcpListener::bind((settings.host, settings.port)).await?;
    info!("Listening on http://{}:{}", settings.host, settings.port);

    // Video clients never hang up on their own, so no graceful drain
    tokio::select! {
        served = axum::serve(listener, app).into_future() => served?,
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
    }

    state.runtime.lock().await.halt()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motor::{Maneuver, PinWrite};

    fn runtime() -> (Runtime, SimPins) {
        let pins = SimPins::new();
        let driver = MotorDriver::new(Box::new(pins.clone()) as BoxedPins, PinLayout::default());
        pins.clear();
        (Runtime::new(driver), pins)
    }

    #[test]
    fn test_initial_state() {
        let (runtime, _pins) = runtime();
        assert_eq!(runtime.state().speed.value(), 150);
        assert_eq!(runtime.state().actual_speed, 0);
    }

    #[test]
    fn test_on_command_updates_state_and_motors() {
        let (mut runtime, pins) = runtime();

        let motion = runtime
            .on_command(&CommandSet::parse(["s", "shift"]))
            .unwrap();
        assert!(matches!(motion.maneuver, Maneuver::Straight(_)));
        assert_eq!(runtime.state().speed, SpeedMode::Boost);
        assert_eq!(runtime.state().actual_speed, -200);
        assert_eq!(pins.writes().len(), 5);
        assert!(runtime.driver().outputs().standby);

        // Last command wins
        runtime.on_command(&CommandSet::parse(["stop"])).unwrap();
        assert_eq!(runtime.state().actual_speed, 0);
        assert_eq!(runtime.state().speed, SpeedMode::Normal);
        assert!(runtime.driver().outputs().is_zero());
    }

    #[test]
    fn test_halt() {
        let (mut runtime, pins) = runtime();
        runtime.on_command(&CommandSet::parse(["a"])).unwrap();
        pins.clear();

        runtime.halt().unwrap();
        assert_eq!(runtime.state().actual_speed, 0);
        assert_eq!(pins.writes()[0], PinWrite::Digital { pin: 3, high: false });
    }
}
