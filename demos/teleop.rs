// Keyboard teleop over HTTP: WASD move, R/F speed, Q quit
//
// Usage: cargo run --example teleop -- [http://rover:5001]
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use rover_teleop::messages::ControlRequest;
use std::collections::BTreeSet;
use std::time::{Duration, Instant};
use tracing::{info, warn};

// Speed modifier tokens, slowest first
const MODIFIERS: [Option<&str>; 3] = [Some("space"), None, Some("shift")];
const INPUT_TIMEOUT_MS: u64 = 150; // Release held keys after this much time with no repeat

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let server = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "http://127.0.0.1:5001".to_string());
    let client = reqwest::Client::new();

    info!("Driving {}", server);
    info!("Controls: WASD=move, R/F=speed, Q=quit");
    print_speed(1);

    enable_raw_mode()?;
    let result = run_teleop(&client, &server).await;
    disable_raw_mode()?;

    // Always leave the rover halted
    send(&client, &server, vec!["stop".to_string()]).await?;

    result
}

async fn run_teleop(
    client: &reqwest::Client,
    server: &str,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut speed_idx: usize = 1;
    let mut held: BTreeSet<char> = BTreeSet::new();
    let mut last_movement_input = Instant::now();
    let mut last_sent: Option<Vec<String>> = None;

    loop {
        // Poll for key with 20ms timeout (50Hz effective rate)
        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;

                match code {
                    KeyCode::Char(c @ ('w' | 'a' | 's' | 'd')) => {
                        if pressed {
                            held.insert(c);
                            last_movement_input = Instant::now();
                        } else {
                            held.remove(&c);
                        }
                    }

                    // Speed control
                    KeyCode::Char('r') if pressed => {
                        speed_idx = (speed_idx + 1).min(2);
                        print_speed(speed_idx);
                    }
                    KeyCode::Char('f') if pressed => {
                        speed_idx = speed_idx.saturating_sub(1);
                        print_speed(speed_idx);
                    }

                    // Quit
                    KeyCode::Char('q') | KeyCode::Esc if pressed => break,

                    _ => {}
                }
            }
        }

        // Most terminals never report key release, so fall back to a timeout
        if last_movement_input.elapsed() > Duration::from_millis(INPUT_TIMEOUT_MS) {
            held.clear();
        }

        let command = command_for(&held, speed_idx);
        if last_sent.as_ref() != Some(&command) {
            if let Err(e) = send(client, server, command.clone()).await {
                warn!("Control request failed: {}", e);
            }
            last_sent = Some(command);
        }
    }

    Ok(())
}

fn command_for(held: &BTreeSet<char>, speed_idx: usize) -> Vec<String> {
    if held.is_empty() {
        return vec!["stop".to_string()];
    }
    let mut command: Vec<String> = held.iter().map(|c| c.to_string()).collect();
    if let Some(modifier) = MODIFIERS[speed_idx] {
        command.push(modifier.to_string());
    }
    command
}

async fn send(
    client: &reqwest::Client,
    server: &str,
    command: Vec<String>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let body = serde_json::to_string(&ControlRequest { command })?;
    client
        .post(format!("{}/control", server))
        .header("content-type", "application/json")
        .body(body)
        .send()
        .await?
        .error_for_status()?;
    Ok(())
}

fn print_speed(idx: usize) {
    let label = ["SLOW", "NORMAL", "FAST"][idx];
    info!("Speed: {}", label);
}
