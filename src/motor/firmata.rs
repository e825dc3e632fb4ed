// Firmata host-side protocol over a serial port
//
// Only the subset needed to drive output pins:
//   SET_PIN_MODE   [0xF4, pin, mode]
//   DIGITAL_PORT   [0x90 | port, mask_lo7, mask_hi1]
//   ANALOG (PWM)   [0xE0 | pin, value_lo7, value_hi7]
//   REPORT_VERSION [0xF9] -> [0xF9, major, minor]

use serialport::{self, SerialPort, SerialPortInfo, SerialPortType};
use std::io::{Read, Write};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::{FIRMATA_BAUDRATE, SERIAL_TIMEOUT};

const SET_PIN_MODE: u8 = 0xF4;
const DIGITAL_MESSAGE: u8 = 0x90;
const ANALOG_MESSAGE: u8 = 0xE0;
const REPORT_VERSION: u8 = 0xF9;

/// Highest pin reachable with a plain analog message
const MAX_ANALOG_PIN: u8 = 15;
/// Digital pins are grouped into 8-pin ports
const NUM_PORTS: usize = 16;

/// How long to wait for the board to answer a version query
const VERSION_REPLY_TIMEOUT: Duration = Duration::from_millis(500);

/// USB vendor IDs of common Arduino boards and their USB-serial bridges
const KNOWN_VIDS: [u16; 5] = [
    0x2341, // Arduino
    0x2A03, // Arduino (.org)
    0x1A86, // QinHeng CH340
    0x0403, // FTDI
    0x10C4, // Silicon Labs CP210x
];

/// Pin modes understood by StandardFirmata
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinMode {
    Input = 0x00,
    Output = 0x01,
    Analog = 0x02,
    Pwm = 0x03,
}

#[derive(Debug, thiserror::Error)]
pub enum FirmataError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No Firmata board found among {candidates} serial ports")]
    BoardNotFound { candidates: usize },

    #[error("Pin {pin} cannot be used for {operation}")]
    InvalidPin { pin: u8, operation: &'static str },
}

pub type Result<T> = std::result::Result<T, FirmataError>;

/// Build a SET_PIN_MODE message
pub(crate) fn pin_mode_message(pin: u8, mode: PinMode) -> [u8; 3] {
    [SET_PIN_MODE, pin, mode as u8]
}

/// Build a DIGITAL_MESSAGE carrying the full state of one port
pub(crate) fn digital_port_message(port: u8, mask: u8) -> [u8; 3] {
    [DIGITAL_MESSAGE | (port & 0x0F), mask & 0x7F, mask >> 7]
}

/// Build an ANALOG_MESSAGE (PWM write) for pins 0..=15
pub(crate) fn analog_message(pin: u8, value: u16) -> Result<[u8; 3]> {
    if pin > MAX_ANALOG_PIN {
        return Err(FirmataError::InvalidPin {
            pin,
            operation: "analog write",
        });
    }
    Ok([
        ANALOG_MESSAGE | pin,
        (value & 0x7F) as u8,
        ((value >> 7) & 0x7F) as u8,
    ])
}

/// Scale a [0,1] duty value to the 8-bit PWM range
pub(crate) fn duty_to_pwm(duty: f32) -> u16 {
    (duty.clamp(0.0, 1.0) * 255.0).round() as u16
}

/// Find a REPORT_VERSION reply in a byte stream
fn parse_version_reply(bytes: &[u8]) -> Option<(u8, u8)> {
    bytes
        .windows(3)
        .find(|w| w[0] == REPORT_VERSION && w[1] < 0x80 && w[2] < 0x80)
        .map(|w| (w[1], w[2]))
}

/// Output state of the digital ports; Firmata writes whole ports at a time
#[derive(Debug, Clone, Default)]
pub(crate) struct PortStates([u8; NUM_PORTS]);

impl PortStates {
    /// Update one pin, returning the port number and its new mask
    pub(crate) fn set(&mut self, pin: u8, high: bool) -> Result<(u8, u8)> {
        let port = (pin / 8) as usize;
        if port >= NUM_PORTS {
            return Err(FirmataError::InvalidPin {
                pin,
                operation: "digital write",
            });
        }
        let bit = 1u8 << (pin % 8);
        if high {
            self.0[port] |= bit;
        } else {
            self.0[port] &= !bit;
        }
        Ok((port as u8, self.0[port]))
    }
}

/// Pick the serial port a Firmata board most likely sits on
///
/// Prefers USB ports with a known vendor ID or an "Arduino" product string,
/// then falls back to the first USB-serial-looking device name.
pub fn select_port(ports: &[SerialPortInfo]) -> Option<String> {
    let by_usb_info = ports.iter().find(|p| match &p.port_type {
        SerialPortType::UsbPort(usb) => {
            KNOWN_VIDS.contains(&usb.vid)
                || [&usb.manufacturer, &usb.product]
                    .into_iter()
                    .flatten()
                    .any(|s| s.to_ascii_lowercase().contains("arduino"))
        }
        _ => false,
    });

    by_usb_info
        .or_else(|| {
            ports.iter().find(|p| {
                ["ttyACM", "ttyUSB", "usbmodem", "usbserial"]
                    .iter()
                    .any(|hint| p.port_name.contains(hint))
            })
        })
        .map(|p| p.port_name.clone())
}

/// Firmata board on a serial port
pub struct FirmataBoard {
    port: Box<dyn SerialPort>,
    ports: PortStates,
}

impl FirmataBoard {
    /// Look through the available serial ports for a board
    pub fn autodetect() -> Result<String> {
        let ports = serialport::available_ports()?;
        debug!(
            "Serial ports: {:?}",
            ports.iter().map(|p| &p.port_name).collect::<Vec<_>>()
        );
        select_port(&ports).ok_or(FirmataError::BoardNotFound {
            candidates: ports.len(),
        })
    }

    /// Open a connection at the StandardFirmata baudrate
    pub fn open(port_name: &str) -> Result<Self> {
        Self::open_with_baudrate(port_name, FIRMATA_BAUDRATE)
    }

    /// Open with custom baudrate
    pub fn open_with_baudrate(port_name: &str, baudrate: u32) -> Result<Self> {
        info!("Opening Firmata board on {} at {} baud", port_name, baudrate);
        let port = serialport::new(port_name, baudrate)
            .timeout(SERIAL_TIMEOUT)
            .open()?;

        Ok(Self {
            port,
            ports: PortStates::default(),
        })
    }

    fn send(&mut self, message: &[u8]) -> Result<()> {
        self.port.write_all(message)?;
        self.port.flush()?;
        Ok(())
    }

    pub fn set_pin_mode(&mut self, pin: u8, mode: PinMode) -> Result<()> {
        debug!("Pin {} mode {:?}", pin, mode);
        self.send(&pin_mode_message(pin, mode))
    }

    pub fn digital_write(&mut self, pin: u8, high: bool) -> Result<()> {
        let (port, mask) = self.ports.set(pin, high)?;
        debug!("Pin {} -> {} (port {} = {:08b})", pin, high as u8, port, mask);
        self.send(&digital_port_message(port, mask))
    }

    /// Write a raw 0..=255 PWM value
    pub fn analog_write(&mut self, pin: u8, value: u16) -> Result<()> {
        let message = analog_message(pin, value)?;
        debug!("Pin {} pwm {}", pin, value);
        self.send(&message)
    }

    /// Ask the board for its Firmata protocol version
    ///
    /// Returns `Ok(None)` if nothing recognisable arrives in time; boards
    /// announce themselves after reset so stray bytes are expected.
    pub fn protocol_version(&mut self) -> Result<Option<(u8, u8)>> {
        self.send(&[REPORT_VERSION])?;

        let deadline = Instant::now() + VERSION_REPLY_TIMEOUT;
        let mut received = Vec::new();
        let mut chunk = [0u8; 64];

        while Instant::now() < deadline {
            match self.port.read(&mut chunk) {
                Ok(n) => {
                    received.extend_from_slice(&chunk[..n]);
                    if let Some(version) = parse_version_reply(&received) {
                        return Ok(Some(version));
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
                Err(e) => return Err(FirmataError::Io(e)),
            }
        }

        Ok(None)
    }
}
