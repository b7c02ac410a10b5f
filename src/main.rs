//! menuline: a multiplexed TCP command server and its line client
//!
//! The server role accepts a small fixed number of clients, multiplexes
//! them on one thread with a readiness poller, frames their input into
//! newline-terminated commands and answers each from a fixed menu.
//!
//! The client role is a blocking read/print/prompt/send loop against a
//! single server connection.
//!
//! Configuration via CLI arguments or TOML file.

mod client;
mod config;
mod error;
mod protocols;
mod runtime;

use config::{Config, Role};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging; stdout belongs to the interactive client
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    info!(
        role = ?config.role,
        host = %config.host,
        port = config.port,
        "Starting menuline"
    );

    match config.role {
        Role::Server => run_server(config),
        Role::Client => run_client(config),
    }
}

/// Run the command server (epoll on Linux, kqueue on macOS)
fn run_server(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        backlog = config.backlog,
        poll_timeout_ms = config.poll_timeout_ms,
        read_chunk_size = config.read_chunk_size,
        "Using mio runtime"
    );
    runtime::run(&config)?;
    Ok(())
}

/// Run the interactive client on stdin/stdout
fn run_client(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    client::run(&config)?;
    Ok(())
}
