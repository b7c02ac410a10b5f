//! Protocol implementations.
//!
//! - `menu`: line-based command menu served by the runtime event loop
//!   and spoken by the interactive client

pub mod menu;
