//! Configuration module for menuline.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "menuline")]
#[command(author = "menuline authors")]
#[command(version = "0.1.0")]
#[command(about = "A multiplexed TCP command server and its line client", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub role: RoleArgs,
}

/// Which side of the connection to run.
#[derive(Subcommand, Debug)]
pub enum RoleArgs {
    /// Run the command server
    Server {
        /// IP address to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(short, long)]
        port: Option<u16>,

        /// Pending-connection queue length passed to listen()
        #[arg(long)]
        backlog: Option<i32>,

        /// Upper bound on a single readiness wait, in milliseconds
        #[arg(long)]
        poll_timeout_ms: Option<u64>,
    },
    /// Connect to a command server interactively
    Client {
        /// Server IP address
        #[arg(long)]
        host: Option<String>,

        /// Server port
        #[arg(short, long)]
        port: Option<u16>,
    },
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_backlog")]
    pub backlog: i32,
    /// Readiness wait bound in milliseconds
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,
    /// Bytes requested per read from a client
    #[serde(default = "default_read_chunk_size")]
    pub read_chunk_size: usize,
    /// Longest unterminated command accepted before the client is closed
    #[serde(default = "default_max_command_len")]
    pub max_command_len: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            backlog: default_backlog(),
            poll_timeout_ms: default_poll_timeout_ms(),
            read_chunk_size: default_read_chunk_size(),
            max_command_len: default_max_command_len(),
        }
    }
}

/// Client-related configuration
#[derive(Debug, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    9999
}

fn default_backlog() -> i32 {
    3
}

fn default_poll_timeout_ms() -> u64 {
    500
}

fn default_read_chunk_size() -> usize {
    1024
}

fn default_max_command_len() -> usize {
    1024
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Role selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Server,
    Client,
}

/// Final resolved configuration
///
/// `host`/`port` are the bind address for the server role and the remote
/// address for the client role.
#[derive(Debug, Clone)]
pub struct Config {
    pub role: Role,
    pub host: String,
    pub port: u16,
    pub backlog: i32,
    pub poll_timeout_ms: u64,
    pub read_chunk_size: usize,
    pub max_command_len: usize,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Ok(Self::resolve(cli, toml_config))
    }

    /// Merge CLI args with TOML config (CLI takes precedence).
    pub fn resolve(cli: CliArgs, toml_config: TomlConfig) -> Self {
        let log_level = if cli.log_level != "info" {
            cli.log_level
        } else {
            toml_config.logging.level
        };
        let server = toml_config.server;

        match cli.role {
            RoleArgs::Server {
                host,
                port,
                backlog,
                poll_timeout_ms,
            } => Config {
                role: Role::Server,
                host: host.unwrap_or(server.host),
                port: port.unwrap_or(server.port),
                backlog: backlog.unwrap_or(server.backlog),
                poll_timeout_ms: poll_timeout_ms.unwrap_or(server.poll_timeout_ms),
                read_chunk_size: server.read_chunk_size,
                max_command_len: server.max_command_len,
                log_level,
            },
            RoleArgs::Client { host, port } => Config {
                role: Role::Client,
                host: host.unwrap_or(toml_config.client.host),
                port: port.unwrap_or(toml_config.client.port),
                backlog: server.backlog,
                poll_timeout_ms: server.poll_timeout_ms,
                read_chunk_size: server.read_chunk_size,
                max_command_len: server.max_command_len,
                log_level,
            },
        }
    }

    /// `host:port` in a form `SocketAddr` can parse (IPv6 hosts are bracketed).
    pub fn address(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {1}", path = .0.display())]
    FileRead(PathBuf, #[source] std::io::Error),
    #[error("Failed to parse config file '{path}': {1}", path = .0.display())]
    TomlParse(PathBuf, #[source] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TomlConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9999);
        assert_eq!(config.server.backlog, 3);
        assert_eq!(config.server.poll_timeout_ms, 500);
        assert_eq!(config.server.read_chunk_size, 1024);
        assert_eq!(config.server.max_command_len, 1024);
        assert_eq!(config.client.port, 9999);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [server]
            host = "0.0.0.0"
            port = 4000
            backlog = 16
            poll_timeout_ms = 250
            max_command_len = 64

            [client]
            host = "10.0.0.5"
            port = 4001

            [logging]
            level = "debug"
        "#;

        let config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.server.backlog, 16);
        assert_eq!(config.server.poll_timeout_ms, 250);
        assert_eq!(config.server.read_chunk_size, 1024);
        assert_eq!(config.server.max_command_len, 64);
        assert_eq!(config.client.host, "10.0.0.5");
        assert_eq!(config.client.port, 4001);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_cli_overrides_toml() {
        let cli = CliArgs::parse_from(["menuline", "server", "--port", "7000"]);
        let toml_config: TomlConfig = toml::from_str(
            r#"
            [server]
            host = "0.0.0.0"
            port = 4000
            [logging]
            level = "warn"
            "#,
        )
        .unwrap();

        let config = Config::resolve(cli, toml_config);
        assert_eq!(config.role, Role::Server);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 7000);
        assert_eq!(config.log_level, "warn");
        assert_eq!(config.address(), "0.0.0.0:7000");
    }

    #[test]
    fn test_client_role_uses_client_table() {
        let cli = CliArgs::parse_from(["menuline", "--log-level", "debug", "client"]);
        let toml_config: TomlConfig = toml::from_str(
            r#"
            [server]
            port = 4000
            [client]
            host = "::1"
            port = 4001
            "#,
        )
        .unwrap();

        let config = Config::resolve(cli, toml_config);
        assert_eq!(config.role, Role::Client);
        assert_eq!(config.port, 4001);
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.address(), "[::1]:4001");
    }
}
