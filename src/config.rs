//! Configuration module for tcplp-bench.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use clap::Parser;
use serde::Deserialize;
use thiserror::Error;

use crate::role::Role;
use crate::session::{Endpoints, APP_PORT};

/// Command-line arguments for the benchmark console
#[derive(Parser, Debug, Default)]
#[command(name = "tcplp-bench")]
#[command(version = "0.1.0")]
#[command(about = "Point-to-point TCP goodput benchmark", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Session role
    #[arg(short, long, value_enum)]
    pub role: Option<Role>,

    /// Application port the listener binds to
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Listener bind address (e.g., :: or 0.0.0.0)
    #[arg(long)]
    pub bind: Option<String>,

    /// Address the connector dials (e.g., [::1]:2424)
    #[arg(long)]
    pub peer: Option<String>,

    /// Buffer size used by `init` without an argument
    #[arg(short, long)]
    pub buffer_size: Option<i64>,

    /// Transfer size used by `--auto`
    #[arg(short = 'n', long)]
    pub total_bytes: Option<i64>,

    /// Listen backlog
    #[arg(long)]
    pub backlog: Option<i32>,

    /// Run init, connect, benchmark and quit, then exit
    #[arg(long)]
    pub auto: bool,

    /// Log level (trace, debug, info, warn, error) [default: info]
    #[arg(long)]
    pub log_level: Option<String>,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub benchmark: BenchmarkConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Session-related configuration
#[derive(Debug, Deserialize)]
pub struct SessionConfig {
    /// Listener or connector
    #[serde(default = "default_role")]
    pub role: Role,
    /// Default buffer size for `init`
    pub buffer_size: Option<i64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            role: default_role(),
            buffer_size: None,
        }
    }
}

/// Addressing configuration
#[derive(Debug, Deserialize)]
pub struct NetworkConfig {
    /// Listener bind address
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Listener port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Connector target
    #[serde(default = "default_peer")]
    pub peer: String,
    /// Listen backlog
    #[serde(default = "default_backlog")]
    pub backlog: i32,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            peer: default_peer(),
            backlog: default_backlog(),
        }
    }
}

/// Benchmark run configuration
#[derive(Debug, Deserialize, Default)]
pub struct BenchmarkConfig {
    /// Transfer size for unattended runs
    pub total_bytes: Option<i64>,
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

fn default_role() -> Role {
    Role::Listener
}

fn default_bind() -> String {
    "::".to_string()
}

fn default_port() -> u16 {
    APP_PORT
}

fn default_peer() -> String {
    format!("[::1]:{APP_PORT}")
}

fn default_backlog() -> i32 {
    1
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub role: Role,
    pub bind: SocketAddr,
    pub peer: SocketAddr,
    pub backlog: i32,
    pub buffer_size: Option<i64>,
    pub total_bytes: Option<i64>,
    pub auto: bool,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        Self::resolve(CliArgs::parse())
    }

    /// Merge parsed CLI args with the TOML file they point at, if any.
    pub fn resolve(cli: CliArgs) -> Result<Self, ConfigError> {
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Self::merge(cli, toml_config)
    }

    fn merge(cli: CliArgs, toml_config: TomlConfig) -> Result<Self, ConfigError> {
        let bind_ip = cli.bind.unwrap_or(toml_config.network.bind);
        let bind_ip: IpAddr = bind_ip
            .parse()
            .map_err(|_| ConfigError::InvalidAddress(bind_ip.clone()))?;
        let port = cli.port.unwrap_or(toml_config.network.port);

        let peer = cli.peer.unwrap_or(toml_config.network.peer);
        let peer: SocketAddr = peer
            .parse()
            .map_err(|_| ConfigError::InvalidAddress(peer.clone()))?;

        Ok(Config {
            role: cli.role.unwrap_or(toml_config.session.role),
            bind: SocketAddr::new(bind_ip, port),
            peer,
            backlog: cli.backlog.unwrap_or(toml_config.network.backlog),
            buffer_size: cli.buffer_size.or(toml_config.session.buffer_size),
            total_bytes: cli.total_bytes.or(toml_config.benchmark.total_bytes),
            auto: cli.auto,
            log_level: cli.log_level.unwrap_or(toml_config.logging.level),
        })
    }

    /// Socket addresses for the session.
    pub fn endpoints(&self) -> Endpoints {
        Endpoints {
            bind: self.bind,
            peer: self.peer,
            backlog: self.backlog,
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {1}", path = .0.display())]
    FileRead(PathBuf, std::io::Error),
    #[error("Failed to parse config file '{path}': {1}", path = .0.display())]
    TomlParse(PathBuf, toml::de::Error),
    #[error("Invalid address '{0}'")]
    InvalidAddress(String),
}
