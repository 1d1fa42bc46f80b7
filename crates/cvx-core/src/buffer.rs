//! Byte-addressable buffer over 32-bit words.
//!
//! Compute devices address storage in 32-bit words while pixel samples are
//! bytes. Treating a word array as if it were a byte array reads a neighbour
//! channel instead of the requested one (an RGBA image comes out "all red").
//! [`WordBuffer`] fixes the mapping once:
//!
//! ```text
//! byte index i  ->  word i / 4, byte (i % 4) of that word, little-endian
//!
//! word:   0xAABBGGRR
//! byte:     3 2 1 0
//! ```
//!
//! Kernels never see the words. They read input through
//! [`WordBuffer::read_byte`] and write output through a [`WordSlot`], which
//! owns exactly one output word. Handing out one slot per invocation means
//! two invocations can never read-modify-write the same word, so no atomics
//! are needed.
//!
//! # Usage
//!
//! ```rust
//! use cvx_core::WordBuffer;
//!
//! let mut buf = WordBuffer::from_bytes(&[1, 2, 3, 4, 5]);
//! assert_eq!(buf.word_len(), 2);
//! assert_eq!(buf.read_byte(4), 5);
//!
//! buf.write_byte(1, 200);
//! assert_eq!(buf.to_bytes(), vec![1, 200, 3, 4, 5]);
//! ```

use std::ops::Range;

use rayon::prelude::*;

use crate::{Error, Result};

/// Bytes per storage word.
pub const WORD_BYTES: usize = 4;

/// Extracts byte `offset` (0..4) of `word`, little-endian.
#[inline(always)]
pub const fn byte_in_word(word: u32, offset: usize) -> u8 {
    (word >> (8 * offset)) as u8
}

/// Returns `word` with byte `offset` (0..4) replaced by `value`.
///
/// Clears the target byte, then ORs the new value into place. Other bytes
/// are untouched.
#[inline(always)]
pub const fn word_with_byte(word: u32, offset: usize, value: u8) -> u32 {
    let shift = 8 * offset;
    (word & !(0xFF << shift)) | ((value as u32) << shift)
}

/// Image bytes stored as little-endian packed `u32` words.
///
/// The last word is zero-padded when `byte_len` is not a multiple of 4.
/// Padding bytes are never visible through [`read_byte`](Self::read_byte).
#[derive(Clone, PartialEq, Eq)]
pub struct WordBuffer {
    words: Vec<u32>,
    byte_len: usize,
}

impl WordBuffer {
    /// Packs `bytes` into words (copying).
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let words = bytes
            .chunks(WORD_BYTES)
            .map(|chunk| {
                let mut b = [0u8; WORD_BYTES];
                b[..chunk.len()].copy_from_slice(chunk);
                u32::from_le_bytes(b)
            })
            .collect();
        Self {
            words,
            byte_len: bytes.len(),
        }
    }

    /// Zero-filled buffer holding `byte_len` bytes.
    pub fn zeroed(byte_len: usize) -> Self {
        Self {
            words: vec![0; byte_len.div_ceil(WORD_BYTES)],
            byte_len,
        }
    }

    /// Rebuilds a buffer from bytes downloaded off a device.
    ///
    /// `transfer` holds whole words in little-endian order (the layout
    /// produced by [`transfer_bytes`](Self::transfer_bytes)); `byte_len` is
    /// the logical length.
    pub fn from_transfer(transfer: &[u8], byte_len: usize) -> Result<Self> {
        let expected = byte_len.div_ceil(WORD_BYTES) * WORD_BYTES;
        if transfer.len() != expected {
            return Err(Error::BufferSizeMismatch {
                expected,
                actual: transfer.len(),
            });
        }
        let words = transfer
            .chunks_exact(WORD_BYTES)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Ok(Self { words, byte_len })
    }

    /// Logical length in bytes.
    #[inline]
    pub fn byte_len(&self) -> usize {
        self.byte_len
    }

    /// Number of storage words.
    #[inline]
    pub fn word_len(&self) -> usize {
        self.words.len()
    }

    /// True when the buffer holds no bytes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.byte_len == 0
    }

    /// Reads byte `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= byte_len`. Use [`get_byte`](Self::get_byte) for a
    /// checked read.
    #[inline]
    pub fn read_byte(&self, index: usize) -> u8 {
        assert!(
            index < self.byte_len,
            "byte index {index} out of range (len {})",
            self.byte_len
        );
        byte_in_word(self.words[index / WORD_BYTES], index % WORD_BYTES)
    }

    /// Checked [`read_byte`](Self::read_byte).
    #[inline]
    pub fn get_byte(&self, index: usize) -> Result<u8> {
        if index >= self.byte_len {
            return Err(Error::ByteIndexOutOfRange {
                index,
                len: self.byte_len,
            });
        }
        Ok(self.read_byte(index))
    }

    /// Writes byte `index` with a read-modify-write of its word.
    ///
    /// # Panics
    ///
    /// Panics if `index >= byte_len`. Use [`set_byte`](Self::set_byte) for a
    /// checked write.
    #[inline]
    pub fn write_byte(&mut self, index: usize, value: u8) {
        assert!(
            index < self.byte_len,
            "byte index {index} out of range (len {})",
            self.byte_len
        );
        let w = &mut self.words[index / WORD_BYTES];
        *w = word_with_byte(*w, index % WORD_BYTES, value);
    }

    /// Checked [`write_byte`](Self::write_byte).
    #[inline]
    pub fn set_byte(&mut self, index: usize, value: u8) -> Result<()> {
        if index >= self.byte_len {
            return Err(Error::ByteIndexOutOfRange {
                index,
                len: self.byte_len,
            });
        }
        self.write_byte(index, value);
        Ok(())
    }

    /// Unpacks the logical bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out: Vec<u8> = self.words.iter().flat_map(|w| w.to_le_bytes()).collect();
        out.truncate(self.byte_len);
        out
    }

    /// Whole-word little-endian bytes for uploading to a device.
    pub fn transfer_bytes(&self) -> Vec<u8> {
        self.words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    /// Sequential per-word output slots.
    pub fn slots_mut(&mut self) -> impl Iterator<Item = WordSlot<'_>> {
        let byte_len = self.byte_len;
        self.words
            .iter_mut()
            .enumerate()
            .map(move |(index, word)| WordSlot {
                word,
                index,
                byte_len,
            })
    }

    /// Parallel per-word output slots, one per invocation.
    pub fn par_slots_mut(&mut self) -> impl IndexedParallelIterator<Item = WordSlot<'_>> {
        let byte_len = self.byte_len;
        self.words
            .par_iter_mut()
            .enumerate()
            .map(move |(index, word)| WordSlot {
                word,
                index,
                byte_len,
            })
    }
}

impl std::fmt::Debug for WordBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WordBuffer")
            .field("byte_len", &self.byte_len)
            .field("word_len", &self.words.len())
            .finish()
    }
}

/// Exclusive write access to one word of a [`WordBuffer`].
///
/// A slot accepts writes only for the (up to) four byte indices that fall in
/// its word, see [`byte_range`](Self::byte_range).
pub struct WordSlot<'a> {
    word: &'a mut u32,
    index: usize,
    byte_len: usize,
}

impl WordSlot<'_> {
    /// Index of the owned word.
    #[inline]
    pub fn word_index(&self) -> usize {
        self.index
    }

    /// Byte indices owned by this slot, clipped to the logical length.
    #[inline]
    pub fn byte_range(&self) -> Range<usize> {
        let start = self.index * WORD_BYTES;
        start..(start + WORD_BYTES).min(self.byte_len)
    }

    /// True if `index` belongs to this slot.
    #[inline]
    pub fn owns(&self, index: usize) -> bool {
        self.byte_range().contains(&index)
    }

    /// Reads an owned byte.
    #[inline]
    pub fn read_byte(&self, index: usize) -> Result<u8> {
        if !self.owns(index) {
            return Err(self.out_of_range(index));
        }
        Ok(byte_in_word(*self.word, index % WORD_BYTES))
    }

    /// Writes an owned byte; the other bytes of the word are preserved.
    #[inline]
    pub fn write_byte(&mut self, index: usize, value: u8) -> Result<()> {
        if !self.owns(index) {
            return Err(self.out_of_range(index));
        }
        *self.word = word_with_byte(*self.word, index % WORD_BYTES, value);
        Ok(())
    }

    fn out_of_range(&self, index: usize) -> Error {
        Error::ByteIndexOutOfRange {
            index,
            len: self.byte_len,
        }
    }
}
