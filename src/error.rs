//! Error types for session and benchmark operations.
//!
//! Every error is terminal to the operation that raised it and never to the
//! process: the session stays in the last stable state and the console
//! keeps accepting commands.

use std::io;

use thiserror::Error;

use crate::role::Role;

/// Result type alias for session and benchmark operations.
pub type Result<T> = std::result::Result<T, BenchError>;

/// Errors raised by the session, transport and protocol layers.
#[derive(Error, Debug)]
pub enum BenchError {
    /// `init` called while a listening handle exists.
    #[error("session already initialized")]
    AlreadyInitialized,

    /// Operation requires `init` first.
    #[error("session not initialized")]
    NotInitialized,

    /// A peer connection already exists.
    #[error("session already connected to a peer")]
    AlreadyConnected,

    /// Benchmark requested without a peer connection.
    #[error("no peer connection")]
    NotConnected,

    /// The operation belongs to the other role.
    #[error("'{operation}' is not available in {role} role")]
    UnsupportedForRole {
        operation: &'static str,
        role: Role,
    },

    /// Requested buffer size was zero or negative.
    #[error("invalid buffer size: {0}")]
    InvalidBufferSize(i64),

    /// Requested transfer size was zero or negative.
    #[error("invalid request size: {0}")]
    InvalidRequestSize(i64),

    /// The socket could not be allocated.
    #[error("failed to allocate socket: {source}")]
    ResourceExhausted {
        #[source]
        source: io::Error,
    },

    /// The underlying socket call failed.
    #[error("transport error (errno {code}): {source}")]
    Transport {
        code: i32,
        #[source]
        source: io::Error,
    },

    /// The peer closed the stream with bytes still outstanding.
    #[error("peer closed connection after {transferred} of {expected} bytes")]
    PeerClosed { transferred: i64, expected: i64 },

    /// Size negotiation failed.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// The peer acknowledged a different byte count than was requested.
    #[error("integrity mismatch: requested {expected} bytes, peer acknowledged {acknowledged}")]
    IntegrityMismatch { expected: i64, acknowledged: i64 },

    /// Elapsed time was zero, goodput cannot be computed.
    #[error("elapsed time too short to compute goodput")]
    DegenerateTiming,
}

impl BenchError {
    /// Classify an I/O error from a socket call.
    pub fn transport(source: io::Error) -> Self {
        let code = source.raw_os_error().unwrap_or(libc::EIO);
        BenchError::Transport { code, source }
    }

    /// Create a handshake error.
    pub fn handshake(msg: impl Into<String>) -> Self {
        BenchError::HandshakeFailed(msg.into())
    }
}
