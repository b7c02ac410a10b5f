//! Menu protocol command dispatch.
//!
//! Maps a parsed [`Command`] to the bytes written back to the client.
//! Socket I/O stays in the event loop; this module only decides what to say.

use super::parser::Command;
use bytes::BytesMut;
use std::net::SocketAddr;

/// Prompt sent after the welcome banner and after every reply.
pub const PROMPT: &str = "\nCOMMAND:";

const MENU_BODY: &str = "1: Current IP Address\n\
2: Current Port\n\
3: displays graphic\n\
4: displays graphic\n\
5: displays graphic\n\
passwd: Change Password\n\
exit: Disconnect From Server\n\
menu: Displays Menu\n";

const HELLO_REPLY: &str = "(>n_n)> Hello Client\n";
const PASSWD_REPLY: &str = "TODO: Implement in HW2\n";
const SERVER_FULL: &str = "Server full, try again later\n";

/// What the event loop should do after a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Write these bytes (reply plus prompt) to the client.
    Reply(BytesMut),
    /// Tear the connection down; nothing more is written.
    Close,
}

/// Banner, menu and first prompt for a freshly installed client.
pub fn welcome() -> BytesMut {
    let mut out = BytesMut::with_capacity(256);
    out.extend_from_slice(b"Hello Client!\n\nMENU\n");
    out.extend_from_slice(MENU_BODY.as_bytes());
    out.extend_from_slice(PROMPT.as_bytes());
    out
}

/// Notice sent to a connection that found no free slot before it is closed.
pub fn server_full() -> &'static [u8] {
    SERVER_FULL.as_bytes()
}

/// Dispatch one command from a client whose address is `peer`.
pub fn handle(command: &Command, peer: Option<SocketAddr>) -> Action {
    let mut out = BytesMut::with_capacity(64);
    match command {
        Command::Exit => return Action::Close,
        Command::Hello => out.extend_from_slice(HELLO_REPLY.as_bytes()),
        Command::Menu => {
            out.extend_from_slice(b"MENU\n");
            out.extend_from_slice(MENU_BODY.as_bytes());
        }
        Command::Passwd => out.extend_from_slice(PASSWD_REPLY.as_bytes()),
        Command::ClientIp => match peer {
            Some(addr) => out.extend_from_slice(format!("{}\n", addr.ip()).as_bytes()),
            None => out.extend_from_slice(b"unknown\n"),
        },
        Command::ClientPort => match peer {
            Some(addr) => out.extend_from_slice(format!("{}\n", addr.port()).as_bytes()),
            None => out.extend_from_slice(b"unknown\n"),
        },
        Command::Graphic(n) => out.extend_from_slice(graphic(*n).as_bytes()),
        // Echoed byte for byte, even when not valid UTF-8
        Command::Unknown(raw) => {
            out.extend_from_slice(b"Unknown Command: ");
            out.extend_from_slice(raw);
            out.extend_from_slice(b"\n");
        }
    }

    out.extend_from_slice(PROMPT.as_bytes());
    Action::Reply(out)
}

fn graphic(n: u8) -> &'static str {
    match n {
        3 => "__m_OO_m__\n",
        4 => "m_(-___-)_m\n",
        _ => "d[ o_O ]b\n",
    }
}
