// Pin output capability: the motor driver only ever needs these three writes

use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

use super::firmata::{duty_to_pwm, FirmataBoard, PinMode, Result};

/// Something that can set pin modes and write digital/PWM outputs
pub trait PinWriter {
    fn set_pin_mode(&mut self, pin: u8, mode: PinMode) -> Result<()>;

    fn write_digital(&mut self, pin: u8, high: bool) -> Result<()>;

    /// `duty` is a [0,1] fraction
    fn write_pwm(&mut self, pin: u8, duty: f32) -> Result<()>;
}

impl<P: PinWriter + ?Sized> PinWriter for Box<P> {
    fn set_pin_mode(&mut self, pin: u8, mode: PinMode) -> Result<()> {
        (**self).set_pin_mode(pin, mode)
    }

    fn write_digital(&mut self, pin: u8, high: bool) -> Result<()> {
        (**self).write_digital(pin, high)
    }

    fn write_pwm(&mut self, pin: u8, duty: f32) -> Result<()> {
        (**self).write_pwm(pin, duty)
    }
}

impl PinWriter for FirmataBoard {
    fn set_pin_mode(&mut self, pin: u8, mode: PinMode) -> Result<()> {
        FirmataBoard::set_pin_mode(self, pin, mode)
    }

    fn write_digital(&mut self, pin: u8, high: bool) -> Result<()> {
        self.digital_write(pin, high)
    }

    fn write_pwm(&mut self, pin: u8, duty: f32) -> Result<()> {
        self.analog_write(pin, duty_to_pwm(duty))
    }
}

/// One recorded write
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PinWrite {
    Mode { pin: u8, mode: PinMode },
    Digital { pin: u8, high: bool },
    Pwm { pin: u8, duty: f32 },
}

/// Simulated pins: logs and records every write, never fails
///
/// Clones share the same record, so a handle kept outside the driver sees
/// what the driver wrote.
#[derive(Debug, Clone, Default)]
pub struct SimPins {
    writes: Arc<Mutex<Vec<PinWrite>>>,
}

impl SimPins {
    pub fn new() -> Self {
        Self::default()
    }

    /// All writes so far, oldest first
    pub fn writes(&self) -> Vec<PinWrite> {
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear(&self) {
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn record(&self, write: PinWrite) {
        debug!("sim {:?}", write);
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(write);
    }
}

impl PinWriter for SimPins {
    fn set_pin_mode(&mut self, pin: u8, mode: PinMode) -> Result<()> {
        self.record(PinWrite::Mode { pin, mode });
        Ok(())
    }

    fn write_digital(&mut self, pin: u8, high: bool) -> Result<()> {
        self.record(PinWrite::Digital { pin, high });
        Ok(())
    }

    fn write_pwm(&mut self, pin: u8, duty: f32) -> Result<()> {
        self.record(PinWrite::Pwm { pin, duty });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sim_pins_share_record_between_clones() {
        let handle = SimPins::new();
        let mut boxed: Box<dyn PinWriter + Send> = Box::new(handle.clone());

        boxed.write_digital(3, true).unwrap();
        boxed.write_pwm(5, 0.5).unwrap();

        assert_eq!(
            handle.writes(),
            vec![
                PinWrite::Digital { pin: 3, high: true },
                PinWrite::Pwm { pin: 5, duty: 0.5 },
            ]
        );

        handle.clear();
        assert!(handle.writes().is_empty());
    }
}
