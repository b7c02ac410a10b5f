//! Interactive line client for the menu protocol.
//!
//! Blocking read/print/prompt/send loop over a single connection:
//! print whatever the server sends up to its `COMMAND:` prompt, read one
//! line from the user, send it with a `\n` terminator, repeat.

use crate::config::Config;
use crate::error::ClientError;
use crate::protocols::menu::PROMPT;
use std::io::{self, BufRead, Read, Write};
use std::net::{SocketAddr, TcpStream};
use tracing::{debug, info};

const READ_BUFFER_SIZE: usize = 1024;

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The server closed the connection.
    ServerClosed,
    /// The user's input ran out.
    InputClosed,
}

/// Connect to the configured server and run a session on stdin/stdout.
pub fn run(config: &Config) -> Result<SessionEnd, ClientError> {
    let address = config.address();
    let addr: SocketAddr = address
        .parse()
        .map_err(|source| ClientError::InvalidAddress {
            addr: address.clone(),
            source,
        })?;

    let mut stream = TcpStream::connect(addr).map_err(|source| ClientError::Connect {
        addr: address.clone(),
        source,
    })?;
    info!(addr = %addr, "Connected to server");

    let stdin = io::stdin();
    let end = session(&mut stream, stdin.lock(), io::stdout())?;
    info!(?end, "Session finished");
    Ok(end)
}

/// Drive one session over `stream`, reading commands from `input` and
/// echoing server output to `output`.
pub fn session<S, I, O>(stream: &mut S, mut input: I, mut output: O) -> io::Result<SessionEnd>
where
    S: Read + Write,
    I: BufRead,
    O: Write,
{
    let mut line = String::new();

    loop {
        let closed = read_until_prompt(stream, &mut output)?;
        output.flush()?;
        if closed {
            return Ok(SessionEnd::ServerClosed);
        }

        let command = loop {
            line.clear();
            if input.read_line(&mut line)? == 0 {
                return Ok(SessionEnd::InputClosed);
            }
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                break trimmed;
            }
        };

        stream.write_all(command.as_bytes())?;
        stream.write_all(b"\n")?;
        stream.flush()?;
        debug!(command, "Command sent");
    }
}

/// Copy server output to `output` until it ends with the prompt.
///
/// Returns `true` if the server closed the connection instead.
fn read_until_prompt<S: Read, O: Write>(stream: &mut S, output: &mut O) -> io::Result<bool> {
    let prompt = PROMPT.as_bytes();
    let mut buf = [0u8; READ_BUFFER_SIZE];
    let mut tail: Vec<u8> = Vec::with_capacity(prompt.len());

    loop {
        let n = match stream.read(&mut buf) {
            Ok(n) => n,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        if n == 0 {
            return Ok(true);
        }
        output.write_all(&buf[..n])?;

        // Keep just enough trailing bytes to spot a prompt split across reads
        tail.extend_from_slice(&buf[..n]);
        if tail.len() > prompt.len() {
            tail.drain(..tail.len() - prompt.len());
        }
        if tail.ends_with(prompt) {
            return Ok(false);
        }
    }
}
