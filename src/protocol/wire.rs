//! Fixed-width integer encoding for the handshake and acknowledgement.
//!
//! Both words on the wire are 8-byte big-endian signed integers.

use bytes::{Buf, BufMut};

use crate::error::Result;
use crate::transport::{self, Stream};

/// Length of an encoded word.
pub const WORD_LEN: usize = 8;

/// An encoded word.
pub type Word = [u8; WORD_LEN];

/// Encode `value` for the wire.
pub fn encode(value: i64) -> Word {
    let mut word = [0u8; WORD_LEN];
    let mut dst = &mut word[..];
    dst.put_i64(value);
    word
}

/// Decode a word read from the wire.
pub fn decode(word: &Word) -> i64 {
    let mut src = &word[..];
    src.get_i64()
}

/// Write all of `word`, accumulating partial sends.
///
/// Returns the number of bytes written; fewer than `WORD_LEN` means a send
/// returned zero.
pub fn write_word(stream: &mut dyn Stream, word: &Word) -> Result<usize> {
    let mut written = 0;
    while written < WORD_LEN {
        let n = transport::accumulate_send(stream, &word[written..])?;
        if n == 0 {
            break;
        }
        written += n;
    }
    Ok(written)
}

/// Read a full word, accumulating partial receives.
///
/// Returns the word and the number of bytes actually read; fewer than
/// `WORD_LEN` means the peer closed first.
pub fn read_word(stream: &mut dyn Stream) -> Result<(Word, usize)> {
    let mut word = [0u8; WORD_LEN];
    let mut read = 0;
    while read < WORD_LEN {
        let n = transport::accumulate_recv(stream, &mut word[read..])?;
        if n == 0 {
            break;
        }
        read += n;
    }
    Ok((word, read))
}
