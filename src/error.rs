//! Error types for the server and client roles.
//!
//! Only startup problems surface as `ServerError`; once the loop is running,
//! per-client failures are logged and handled in place.

use std::io;
use std::net::AddrParseError;
use thiserror::Error;

/// Errors that prevent the server from starting.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid bind address '{addr}': {source}")]
    InvalidAddress {
        addr: String,
        #[source]
        source: AddrParseError,
    },

    #[error("server socket failed: {0}")]
    Socket(#[source] io::Error),

    #[error("server socket option failed: {0}")]
    SocketOption(#[source] io::Error),

    #[error("server bind to {addr} failed: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("server listen failed: {0}")]
    Listen(#[source] io::Error),

    #[error("failed to create poller: {0}")]
    Poll(#[source] io::Error),

    #[error("failed to register listener: {0}")]
    Register(#[source] io::Error),
}

/// Errors raised by the interactive client.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid server address '{addr}': {source}")]
    InvalidAddress {
        addr: String,
        #[source]
        source: AddrParseError,
    },

    #[error("connection to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_error_messages() {
        let err = ServerError::Bind {
            addr: "127.0.0.1:80".to_string(),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(err.to_string(), "server bind to 127.0.0.1:80 failed: denied");

        let source = "nope".parse::<std::net::SocketAddr>().unwrap_err();
        let err = ServerError::InvalidAddress {
            addr: "nope".to_string(),
            source,
        };
        assert!(err.to_string().starts_with("invalid bind address 'nope'"));
    }

    #[test]
    fn test_client_io_error_is_transparent() {
        let err: ClientError = io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed").into();
        assert_eq!(err.to_string(), "pipe closed");
    }
}
