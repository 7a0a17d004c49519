//! Listener/connector role selection.
//!
//! The role is read from configuration once at startup and fixed for the
//! lifetime of the session. It decides the socket setup, which half of the
//! benchmark protocol runs, which console commands exist, and the payload
//! fill byte.

use std::fmt;

use serde::Deserialize;

use crate::error::Result;
use crate::protocol::{ProtocolRole, Receiver, Sender};

/// Fill byte for the sending side's payload.
pub const SENDER_SENTINEL: u8 = b'x';

/// Fill byte for the receiving side's buffer.
pub const RECEIVER_SENTINEL: u8 = b'o';

/// Which side of the benchmark this process plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Bind, listen, accept, then receive the payload.
    Listener,
    /// Connect to the peer, then send the payload.
    Connector,
}

impl Role {
    /// Sentinel byte the session buffer is filled with.
    pub fn sentinel(self) -> u8 {
        match self {
            Role::Listener => RECEIVER_SENTINEL,
            Role::Connector => SENDER_SENTINEL,
        }
    }

    /// Name of the console command that establishes the connection.
    pub fn connect_command(self) -> &'static str {
        match self {
            Role::Listener => "listen",
            Role::Connector => "connect",
        }
    }

    /// Name of the console command that runs the benchmark.
    pub fn benchmark_command(self) -> &'static str {
        match self {
            Role::Listener => "benchmark_recv",
            Role::Connector => "benchmark_send",
        }
    }

    /// Build the protocol half for this role.
    ///
    /// `total_bytes` only applies to the sender; the receiver learns the
    /// size from the handshake.
    pub fn protocol(self, total_bytes: Option<i64>) -> Result<Box<dyn ProtocolRole>> {
        Ok(match self {
            Role::Listener => Box::new(Receiver::new()),
            Role::Connector => Box::new(Sender::new(total_bytes)?),
        })
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Listener => write!(f, "listener"),
            Role::Connector => write!(f, "connector"),
        }
    }
}
