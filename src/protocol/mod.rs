//! Benchmark transfer protocol.
//!
//! A run is a size handshake followed by one timed bulk transfer:
//!
//! ```text
//! sender                               receiver
//!   | -- total_bytes (8 bytes, BE) ------> |
//!   | <------------ echo (same 8 bytes) -- |
//!   | -- payload, total_bytes bytes -----> |   timed
//!   | <------- received count (8 bytes) -- |
//! ```
//!
//! Payload goes out in chunks of at most the session's buffer size, and no
//! chunk reaches past `total_bytes`. There is no per-chunk framing.
//!
//! Both halves are driven as small state machines through the same
//! `Phase` sequence and sit behind the `ProtocolRole` trait, so the session
//! never needs to know which half it is running.

mod receiver;
mod report;
mod sender;
pub mod wire;

pub use receiver::Receiver;
pub use report::{Goodput, TransferReport};
pub use sender::Sender;

use crate::buffer::ByteBuffer;
use crate::error::Result;
use crate::role::Role;
use crate::transport::Stream;

/// Transfer size used when the caller does not give one.
pub const DEFAULT_TOTAL_BYTES: i64 = 100_000;

/// Progress of a protocol run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Nothing exchanged yet.
    Idle,
    /// Size sent and echoed.
    SizeNegotiated,
    /// Bulk transfer in progress.
    Transferring,
    /// Run finished and verified.
    Completed,
    /// Run aborted by an error.
    Failed,
}

/// One half of the benchmark protocol.
///
/// Each value drives a single run.
pub trait ProtocolRole {
    /// Which side this half implements.
    fn role(&self) -> Role;

    /// Current phase.
    fn phase(&self) -> Phase;

    /// Run the protocol over `stream`, using the first `buffer_size` bytes
    /// of `buffer` as the chunk window.
    fn run(
        &mut self,
        stream: &mut dyn Stream,
        buffer: &mut ByteBuffer,
        buffer_size: usize,
    ) -> Result<TransferReport>;
}

/// Chunk size for a run: the buffer size, narrowed to the transfer size.
pub(crate) fn chunk_size(buffer_size: usize, capacity: usize, total_bytes: i64) -> usize {
    let window = buffer_size.min(capacity) as i64;
    window.min(total_bytes).max(1) as usize
}
