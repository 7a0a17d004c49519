//! Transfer results and goodput arithmetic.

use std::fmt;
use std::time::Duration;

use crate::error::{BenchError, Result};
use crate::role::Role;

/// Goodput in thousandths of a Mbit/s.
///
/// Computed as bits per microsecond in fixed point, with half the divisor
/// added before the truncating division so the result rounds to nearest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Goodput {
    milli_mbps: u128,
}

impl Goodput {
    /// Goodput of `bytes` moved in `elapsed`.
    ///
    /// Fails with `DegenerateTiming` if `elapsed` is under one microsecond.
    pub fn compute(bytes: i64, elapsed: Duration) -> Result<Self> {
        let micros = elapsed.as_micros();
        if micros == 0 {
            return Err(BenchError::DegenerateTiming);
        }
        let bits = u128::from(bytes.max(0).unsigned_abs()) * 8;
        Ok(Self {
            milli_mbps: (1000 * bits + micros / 2) / micros,
        })
    }

    /// Integer Mbit/s.
    pub fn whole(&self) -> u128 {
        self.milli_mbps / 1000
    }

    /// Fractional part in thousandths of a Mbit/s.
    pub fn thousandths(&self) -> u128 {
        self.milli_mbps % 1000
    }
}

impl fmt::Display for Goodput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:03} Mbit/s", self.whole(), self.thousandths())
    }
}

/// Outcome of one completed benchmark run.
#[derive(Debug, Clone)]
pub struct TransferReport {
    /// Side that produced the report.
    pub role: Role,
    /// Size agreed in the handshake.
    pub total_bytes: i64,
    /// Payload bytes actually moved.
    pub bytes_transferred: i64,
    /// Chunk size used for this run.
    pub chunk_size: usize,
    /// Number of successful chunk calls.
    pub chunks: u64,
    /// Wall-clock time of the timed section.
    pub elapsed: Duration,
    /// `None` when the receiver's timed section was too short to measure.
    pub goodput: Option<Goodput>,
}

impl fmt::Display for TransferReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self.role {
            Role::Connector => "sent",
            Role::Listener => "received",
        };
        write!(
            f,
            "{} {} bytes in {:.3} ms",
            verb,
            self.bytes_transferred,
            self.elapsed.as_secs_f64() * 1000.0
        )?;
        match self.goodput {
            Some(goodput) => write!(f, " ({goodput})"),
            None => write!(f, " (goodput n/a)"),
        }
    }
}
