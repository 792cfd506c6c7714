//! CLI entry point for the simulated GCS controller, for bench tests without hardware.

use clap::{Parser, ValueEnum};
use pigcs_rs::simulator::{SimClock, SimServer, SimulatedController};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Kind {
    Generic,
    Hexapod,
}

/// Simulated PI GCS2 controller
#[derive(Parser, Debug)]
#[command(name = "gcs-sim", about = "Simulated PI GCS2 controller speaking the ASCII protocol over TCP.")]
struct Cli {
    /// Address to listen on
    #[arg(short, long, default_value = "127.0.0.1:50000")]
    bind: String,

    /// Controller type to simulate
    #[arg(short, long, value_enum, default_value_t = Kind::Hexapod)]
    kind: Kind,

    /// Axis names of a generic controller (comma separated)
    #[arg(long, value_delimiter = ',', default_value = "1,2,3")]
    axes: Vec<String>,

    /// Start with all axes referenced
    #[arg(long)]
    referenced: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: tracing::Level,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let cli = Cli::parse();
    tracing_subscriber::fmt().with_max_level(cli.log_level).init();

    let mut controller = match cli.kind {
        Kind::Hexapod => SimulatedController::hexapod(),
        Kind::Generic => SimulatedController::generic(cli.axes.as_slice()),
    };
    controller.set_referenced(cli.referenced);

    let server = SimServer::start(&cli.bind, controller, SimClock::default()).await?;
    tracing::info!("Simulating a {:?} controller on {}", cli.kind, server.local_addr());

    tokio::signal::ctrl_c().await?;
    server.shutdown();
    Ok(())
}
