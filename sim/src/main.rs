// Simulated exfoliator relay for local development.
// Run with: cargo run -p sim -- --port 8765

use std::time::Duration;

use clap::Parser;
use sim::SimConfig;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "sim", about = "Simulated relay for the exfoliator instrument")]
struct Args {
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    #[arg(short, long, default_value_t = 8765)]
    port: u16,

    /// How long each program run takes, in milliseconds.
    #[arg(long, default_value_t = 2000)]
    program_ms: u64,

    /// How long a stopped program takes to report, in milliseconds.
    #[arg(long, default_value_t = 100)]
    stop_ms: u64,

    /// Never report actuator changes, so client toggles roll back.
    #[arg(long)]
    silent_toggles: bool,

    /// Pretend the relay cannot reach the controller.
    #[arg(long)]
    controller_offline: bool,

    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = SimConfig {
        program_duration: Duration::from_millis(args.program_ms),
        stop_latency: Duration::from_millis(args.stop_ms),
        respond_to_toggles: !args.silent_toggles,
        controller_connected: !args.controller_offline,
    };

    let listener = TcpListener::bind((args.host.as_str(), args.port)).await?;
    sim::serve(listener, config).await?;
    Ok(())
}
