//! Fixed-capacity payload buffer.
//!
//! One buffer is allocated per session at the hardware maximum and reused
//! for every chunk. The active window is the first `buffer_size` bytes;
//! nothing past it is ever handed to a socket call.

/// Payload buffer reused across sends and receives.
pub struct ByteBuffer {
    /// Backing storage, always `capacity` bytes long.
    data: Vec<u8>,
    /// Byte the buffer is filled with before a run.
    sentinel: u8,
}

impl ByteBuffer {
    /// Create a buffer of `capacity` bytes filled with `sentinel`.
    pub fn new(capacity: usize, sentinel: u8) -> Self {
        Self {
            data: vec![sentinel; capacity],
            sentinel,
        }
    }

    /// Total capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// The fill byte.
    pub fn sentinel(&self) -> u8 {
        self.sentinel
    }

    /// Overwrite the whole buffer with the sentinel.
    ///
    /// A receiver's buffer holds peer data after a run; this restores it.
    pub fn reset(&mut self) {
        self.data.fill(self.sentinel);
    }

    /// Immutable view of the first `len` bytes.
    ///
    /// # Panics
    /// Panics if `len` exceeds the capacity.
    pub fn window(&self, len: usize) -> &[u8] {
        &self.data[..len]
    }

    /// Mutable view of the first `len` bytes.
    ///
    /// # Panics
    /// Panics if `len` exceeds the capacity.
    pub fn window_mut(&mut self, len: usize) -> &mut [u8] {
        &mut self.data[..len]
    }

    /// Printable preview of the first `len` bytes, for debug logging.
    pub fn preview(&self, len: usize) -> String {
        let len = len.min(self.data.len());
        String::from_utf8_lossy(&self.data[..len]).into_owned()
    }
}
