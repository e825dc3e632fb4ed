// Motor control for the two-wheeled base
//
// Provides:
// - Key command interpreter (held keys -> maneuver and wheel speeds)
// - Firmata serial protocol for the microcontroller bridge
// - Pin capability with real and simulated implementations
// - Motor driver API (drive / rotate / stop)

pub mod command;
mod driver;
pub mod firmata;
pub mod pins;

pub use command::{interpret, CommandSet, Maneuver, Motion, SpeedMode, Token};
pub use driver::{duty, Direction, MotorDriver, MotorOutputs, PinLayout, MAX_SPEED};
pub use firmata::{FirmataBoard, FirmataError, PinMode};
pub use pins::{PinWrite, PinWriter, SimPins};
