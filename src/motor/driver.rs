// Two-channel DC motor driver behind a standby line
//
// Each channel has a PWM input for speed and one direction input.
// Both channels share a standby (enable) line.

use tracing::{debug, info, warn};

use super::firmata::{PinMode, Result};
use super::pins::PinWriter;
use crate::config::{PIN_DIR_A, PIN_DIR_B, PIN_PWM_A, PIN_PWM_B, PIN_STANDBY};

/// Full-scale wheel speed
pub const MAX_SPEED: i32 = 255;

/// Driving direction, as the signed integer `drive` and `rotate` accept
#[repr(i8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward = 1,
    Backward = -1,
}

impl Direction {
    pub fn sign(self) -> i32 {
        self as i8 as i32
    }
}

impl TryFrom<i8> for Direction {
    type Error = i8;

    fn try_from(value: i8) -> std::result::Result<Self, i8> {
        match value {
            1 => Ok(Direction::Forward),
            -1 => Ok(Direction::Backward),
            other => Err(other),
        }
    }
}

/// Where the driver inputs are wired on the board
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinLayout {
    pub standby: u8,
    pub pwm_a: u8,
    pub dir_a: u8,
    pub pwm_b: u8,
    pub dir_b: u8,
}

impl Default for PinLayout {
    fn default() -> Self {
        Self {
            standby: PIN_STANDBY,
            pwm_a: PIN_PWM_A,
            dir_a: PIN_DIR_A,
            pwm_b: PIN_PWM_B,
            dir_b: PIN_DIR_B,
        }
    }
}

/// Last values written to the five driver inputs
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MotorOutputs {
    pub standby: bool,
    pub duty_a: f32,
    pub dir_a: bool,
    pub duty_b: f32,
    pub dir_b: bool,
}

impl MotorOutputs {
    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

/// Scale a 0..=255 wheel speed to a [0,1] duty value
pub fn duty(speed: i32) -> f32 {
    (speed as f32 / MAX_SPEED as f32).clamp(0.0, 1.0)
}

pub struct MotorDriver<P: PinWriter> {
    pins: P,
    layout: PinLayout,
    outputs: MotorOutputs,
}

impl<P: PinWriter> MotorDriver<P> {
    /// Configure the driver pins
    ///
    /// Pin-mode failures are logged and the driver is still returned; the
    /// first real write will surface a dead link.
    pub fn new(mut pins: P, layout: PinLayout) -> Self {
        info!("Configuring motor driver pins {:?}", layout);

        let modes = [
            (layout.standby, PinMode::Output),
            (layout.pwm_a, PinMode::Pwm),
            (layout.dir_a, PinMode::Output),
            (layout.pwm_b, PinMode::Pwm),
            (layout.dir_b, PinMode::Output),
        ];
        for (pin, mode) in modes {
            if let Err(e) = pins.set_pin_mode(pin, mode) {
                warn!("Failed to set pin {} to {:?}: {}", pin, mode, e);
            }
        }

        Self {
            pins,
            layout,
            outputs: MotorOutputs::default(),
        }
    }

    /// Drive both wheels in the same direction (1 = forward, -1 = backward)
    pub fn drive(&mut self, direction: i8, left_speed: i32, right_speed: i32) -> Result<()> {
        let direction = match Direction::try_from(direction) {
            Ok(d) => d,
            Err(invalid) => {
                warn!(
                    "Invalid drive direction {}: must be 1 (forward) or -1 (backward)",
                    invalid
                );
                return Ok(());
            }
        };
        let forward = direction == Direction::Forward;

        self.apply(MotorOutputs {
            standby: true,
            duty_a: duty(left_speed),
            dir_a: forward,
            duty_b: duty(right_speed),
            dir_b: forward,
        })
    }

    /// Spin the wheels against each other (1 = channel A forward, -1 = channel B forward)
    pub fn rotate(&mut self, direction: i8, left_speed: i32, right_speed: i32) -> Result<()> {
        let direction = match Direction::try_from(direction) {
            Ok(d) => d,
            Err(invalid) => {
                warn!("Invalid rotate direction {}: must be 1 or -1", invalid);
                return Ok(());
            }
        };
        let a_forward = direction == Direction::Forward;

        self.apply(MotorOutputs {
            standby: true,
            duty_a: duty(left_speed),
            dir_a: a_forward,
            duty_b: duty(right_speed),
            dir_b: !a_forward,
        })
    }

    /// Zero every output, standby included
    pub fn stop(&mut self) -> Result<()> {
        debug!("Stopping motors");
        self.apply(MotorOutputs::default())
    }

    pub fn outputs(&self) -> MotorOutputs {
        self.outputs
    }

    // Order matters on real hardware: enable first, then A, then B
    fn apply(&mut self, target: MotorOutputs) -> Result<()> {
        let layout = self.layout;

        self.pins.write_digital(layout.standby, target.standby)?;
        self.outputs.standby = target.standby;

        self.pins.write_pwm(layout.pwm_a, target.duty_a)?;
        self.outputs.duty_a = target.duty_a;
        self.pins.write_digital(layout.dir_a, target.dir_a)?;
        self.outputs.dir_a = target.dir_a;

        self.pins.write_pwm(layout.pwm_b, target.duty_b)?;
        self.outputs.duty_b = target.duty_b;
        self.pins.write_digital(layout.dir_b, target.dir_b)?;
        self.outputs.dir_b = target.dir_b;

        Ok(())
    }
}

impl<P: PinWriter> Drop for MotorDriver<P> {
    fn drop(&mut self) {
        if self.outputs.is_zero() {
            return;
        }
        if let Err(e) = self.stop() {
            warn!("Failed to stop motors on drop: {}", e);
        }
    }
}
