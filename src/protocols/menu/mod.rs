//! Menu protocol implementation.
//!
//! A line-based command menu:
//! - Client sends one command per line, terminated by `\n`
//! - Server replies with text followed by a fresh `COMMAND:` prompt
//!
//! ## Protocol Format
//!
//! ```text
//! On connect:  Hello Client!\n\nMENU\n<menu lines>\nCOMMAND:
//!
//! Request:  hello\n
//! Response: (>n_n)> Hello Client\n\nCOMMAND:
//!
//! Request:  2\n
//! Response: <client port>\n\nCOMMAND:
//!
//! Request:  exit\n
//! Response: (connection closed, no bytes)
//! ```
//!
//! Recognized commands: `hello`, `exit`, `menu`, `passwd` and the integers
//! `1` through `5`. Anything else is answered with `Unknown Command: <text>`.

pub mod handler;
pub mod parser;

pub use handler::{handle, server_full, welcome, Action, PROMPT};
pub use parser::parse;
