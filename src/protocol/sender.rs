//! Sending half of the benchmark, run by the connector.

use std::time::Instant;

use tracing::{debug, info};

use super::report::{Goodput, TransferReport};
use super::wire::{self, WORD_LEN};
use super::{chunk_size, Phase, ProtocolRole, DEFAULT_TOTAL_BYTES};
use crate::buffer::ByteBuffer;
use crate::error::{BenchError, Result};
use crate::role::Role;
use crate::transport::{self, Stream};

/// Streams `total_bytes` of payload and checks the peer's count.
#[derive(Debug)]
pub struct Sender {
    total_bytes: i64,
    phase: Phase,
}

impl Sender {
    /// Prepare a run of `requested` bytes, or `DEFAULT_TOTAL_BYTES` if
    /// `None`.
    pub fn new(requested: Option<i64>) -> Result<Self> {
        let total_bytes = match requested {
            None => DEFAULT_TOTAL_BYTES,
            Some(n) if n > 0 => n,
            Some(n) => return Err(BenchError::InvalidRequestSize(n)),
        };
        Ok(Self {
            total_bytes,
            phase: Phase::Idle,
        })
    }

    /// Announce the size and wait for the echo.
    fn negotiate(&mut self, stream: &mut dyn Stream) -> Result<()> {
        let word = wire::encode(self.total_bytes);
        let written = wire::write_word(stream, &word)
            .map_err(|e| BenchError::handshake(format!("size send failed: {e}")))?;
        if written != WORD_LEN {
            return Err(BenchError::handshake(format!(
                "size send stopped after {written} of {WORD_LEN} bytes"
            )));
        }

        let (_, read) = wire::read_word(stream)
            .map_err(|e| BenchError::handshake(format!("size echo failed: {e}")))?;
        if read != WORD_LEN {
            return Err(BenchError::handshake(format!(
                "peer closed during size echo ({read} of {WORD_LEN} bytes)"
            )));
        }

        self.phase = Phase::SizeNegotiated;
        debug!(total_bytes = self.total_bytes, "Size negotiated");
        Ok(())
    }

    /// Push the payload. Returns bytes sent and chunk count.
    fn transfer(&mut self, stream: &mut dyn Stream, payload: &[u8]) -> Result<(i64, u64)> {
        self.phase = Phase::Transferring;

        let mut sent: i64 = 0;
        let mut chunks: u64 = 0;
        while sent < self.total_bytes {
            let len = (self.total_bytes - sent).min(payload.len() as i64) as usize;
            let n = transport::accumulate_send(stream, &payload[..len])?;
            if n == 0 {
                return Err(BenchError::PeerClosed {
                    transferred: sent,
                    expected: self.total_bytes,
                });
            }
            sent += n as i64;
            chunks += 1;
        }
        Ok((sent, chunks))
    }

    fn execute(
        &mut self,
        stream: &mut dyn Stream,
        buffer: &mut ByteBuffer,
        buffer_size: usize,
    ) -> Result<TransferReport> {
        let chunk = chunk_size(buffer_size, buffer.capacity(), self.total_bytes);
        debug!(
            total_bytes = self.total_bytes,
            buffer_size,
            chunk_size = chunk,
            "Starting send"
        );

        self.negotiate(stream)?;

        let start = Instant::now();
        let (sent, chunks) = self.transfer(stream, buffer.window(chunk))?;

        let (word, read) = wire::read_word(stream)?;
        if read != WORD_LEN {
            return Err(BenchError::PeerClosed {
                transferred: sent,
                expected: self.total_bytes,
            });
        }
        let elapsed = start.elapsed();

        let acknowledged = wire::decode(&word);
        if acknowledged != self.total_bytes {
            return Err(BenchError::IntegrityMismatch {
                expected: self.total_bytes,
                acknowledged,
            });
        }

        let goodput = Goodput::compute(sent, elapsed)?;
        self.phase = Phase::Completed;
        info!(
            bytes = sent,
            chunks,
            elapsed_us = elapsed.as_micros() as u64,
            goodput = %goodput,
            "Send complete"
        );

        Ok(TransferReport {
            role: Role::Connector,
            total_bytes: self.total_bytes,
            bytes_transferred: sent,
            chunk_size: chunk,
            chunks,
            elapsed,
            goodput: Some(goodput),
        })
    }
}

impl ProtocolRole for Sender {
    fn role(&self) -> Role {
        Role::Connector
    }

    fn phase(&self) -> Phase {
        self.phase
    }

    fn run(
        &mut self,
        stream: &mut dyn Stream,
        buffer: &mut ByteBuffer,
        buffer_size: usize,
    ) -> Result<TransferReport> {
        let result = self.execute(stream, buffer, buffer_size);
        if result.is_err() {
            self.phase = Phase::Failed;
        }
        result
    }
}
