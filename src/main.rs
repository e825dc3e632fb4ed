use clap::Parser;

use rover_teleop::config::{log_filter, Settings};

#[tokio::main]
async fn main() {
    let settings = Settings::parse();

    // Setup logging (RUST_LOG=debug for pin-level traces)
    let directives = std::env::var("RUST_LOG").ok();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(directives.as_deref()))
        .init();

    if let Err(e) = rover_teleop::runtime::run(settings).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
