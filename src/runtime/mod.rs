//! Readiness-based runtime for the command server.
//!
//! Built from three pieces:
//! - `SlotTable`: fixed pool of client slots, lowest free index first
//! - `CommandBuffer`: per-slot newline framing of partial reads
//! - `Server`: the mio event loop tying accept, read, dispatch and teardown together

mod event_loop;
mod framer;
mod slots;

pub use event_loop::Server;

use crate::config::Config;
use crate::error::ServerError;

/// Bind the listener and serve until the process exits.
pub fn run(config: &Config) -> Result<(), ServerError> {
    let mut server = Server::bind(config)?;
    server.run()
}
