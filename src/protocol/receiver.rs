//! Receiving half of the benchmark, run by the listener.

use std::time::Instant;

use tracing::{debug, info};

use super::report::{Goodput, TransferReport};
use super::wire::{self, Word, WORD_LEN};
use super::{chunk_size, Phase, ProtocolRole};
use crate::buffer::ByteBuffer;
use crate::error::{BenchError, Result};
use crate::role::Role;
use crate::transport::{self, Stream};

/// Consumes the announced payload and reports what it counted.
#[derive(Debug)]
pub struct Receiver {
    phase: Phase,
}

impl Receiver {
    pub fn new() -> Self {
        Self { phase: Phase::Idle }
    }

    /// Read the announced size in a single receive and echo it back.
    fn negotiate(&mut self, stream: &mut dyn Stream) -> Result<i64> {
        let mut word: Word = [0u8; WORD_LEN];
        let read = transport::accumulate_recv(stream, &mut word)
            .map_err(|e| BenchError::handshake(format!("size receive failed: {e}")))?;
        if read != WORD_LEN {
            return Err(BenchError::handshake(format!(
                "short size read ({read} of {WORD_LEN} bytes)"
            )));
        }

        let total_bytes = wire::decode(&word);
        if total_bytes <= 0 {
            return Err(BenchError::handshake(format!(
                "peer announced invalid size {total_bytes}"
            )));
        }

        let written = wire::write_word(stream, &word)
            .map_err(|e| BenchError::handshake(format!("size echo failed: {e}")))?;
        if written != WORD_LEN {
            return Err(BenchError::handshake(format!(
                "size echo stopped after {written} of {WORD_LEN} bytes"
            )));
        }

        self.phase = Phase::SizeNegotiated;
        debug!(total_bytes, "Size negotiated");
        Ok(total_bytes)
    }

    /// Drain `total_bytes` of payload. Returns bytes received and chunk count.
    fn transfer(
        &mut self,
        stream: &mut dyn Stream,
        window: &mut [u8],
        total_bytes: i64,
    ) -> Result<(i64, u64)> {
        self.phase = Phase::Transferring;

        let mut received: i64 = 0;
        let mut chunks: u64 = 0;
        while received < total_bytes {
            let len = (total_bytes - received).min(window.len() as i64) as usize;
            let n = transport::accumulate_recv(stream, &mut window[..len])?;
            if n == 0 {
                return Err(BenchError::PeerClosed {
                    transferred: received,
                    expected: total_bytes,
                });
            }
            received += n as i64;
            chunks += 1;
        }
        Ok((received, chunks))
    }

    fn execute(
        &mut self,
        stream: &mut dyn Stream,
        buffer: &mut ByteBuffer,
        buffer_size: usize,
    ) -> Result<TransferReport> {
        let total_bytes = self.negotiate(stream)?;
        let chunk = chunk_size(buffer_size, buffer.capacity(), total_bytes);
        debug!(total_bytes, buffer_size, chunk_size = chunk, "Starting receive");

        let start = Instant::now();
        let (received, chunks) = self.transfer(stream, buffer.window_mut(chunk), total_bytes)?;
        let elapsed = start.elapsed();

        let written = wire::write_word(stream, &wire::encode(received))?;
        if written != WORD_LEN {
            return Err(BenchError::PeerClosed {
                transferred: received,
                expected: total_bytes,
            });
        }

        let goodput = Goodput::compute(received, elapsed).ok();
        self.phase = Phase::Completed;
        info!(
            bytes = received,
            chunks,
            elapsed_us = elapsed.as_micros() as u64,
            goodput = ?goodput.map(|g| g.to_string()),
            "Receive complete"
        );

        Ok(TransferReport {
            role: Role::Listener,
            total_bytes,
            bytes_transferred: received,
            chunk_size: chunk,
            chunks,
            elapsed,
            goodput,
        })
    }
}

impl Default for Receiver {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtocolRole for Receiver {
    fn role(&self) -> Role {
        Role::Listener
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
