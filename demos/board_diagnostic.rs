// Board diagnostic: READ-ONLY check of the Firmata link
//
// Lists serial ports, shows which one autodetect would pick and asks the
// board for its protocol version. No pin is configured or written.
//
// Usage: cargo run --example board_diagnostic -- [port]

use rover_teleop::config::BOARD_BOOT_DELAY;
use rover_teleop::motor::firmata::{select_port, FirmataBoard};
use serialport::SerialPortType;
use std::thread::sleep;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Setup logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("debug".parse().unwrap()),
        )
        .init();

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║             Rover Board Diagnostic (READ-ONLY)               ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║  This tool never writes to pins - the wheels will not move   ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();

    // ========== STEP 1: Enumerate ports ==========
    println!("Step 1: Serial ports");
    let ports = serialport::available_ports()?;
    if ports.is_empty() {
        println!("  ✗ No serial ports found");
    }
    for port in &ports {
        match &port.port_type {
            SerialPortType::UsbPort(usb) => println!(
                "  {}  USB {:04x}:{:04x} {} {}",
                port.port_name,
                usb.vid,
                usb.pid,
                usb.manufacturer.as_deref().unwrap_or("-"),
                usb.product.as_deref().unwrap_or("-"),
            ),
            other => println!("  {}  {:?}", port.port_name, other),
        }
    }
    println!();

    // ========== STEP 2: Pick a port ==========
    let detected = select_port(&ports);
    println!(
        "Step 2: Autodetect would use: {}",
        detected.as_deref().unwrap_or("(nothing)")
    );

    let port = match std::env::args().nth(1).or(detected) {
        Some(port) => port,
        None => {
            println!();
            println!("Troubleshooting:");
            println!("  - Verify the USB cable is connected");
            println!("  - Check the board shows up under /dev (ttyACM*, ttyUSB*)");
            println!("  - Pass the port explicitly: cargo run --example board_diagnostic -- /dev/ttyACM0");
            return Ok(());
        }
    };
    println!();

    // ========== STEP 3: Version query ==========
    println!("Step 3: Opening {} and querying Firmata version...", port);
    let mut board = match FirmataBoard::open(&port) {
        Ok(board) => board,
        Err(e) => {
            println!("  ✗ Failed to open serial port: {}", e);
            println!("  - Check you are in the 'dialout' group");
            return Err(e.into());
        }
    };

    // Opening the port resets most boards
    sleep(BOARD_BOOT_DELAY);

    match board.protocol_version()? {
        Some((major, minor)) => println!("  ✓ Firmata protocol {}.{}", major, minor),
        None => {
            println!("  ✗ No version reply");
            println!("  - Is StandardFirmata uploaded to the board?");
            println!("  - Is the baud rate 57600?");
        }
    }

    println!();
    println!("Next step: Run 'cargo run --example motor_test' with wheels OFF THE GROUND");

    Ok(())
}
