//! Byte-range planning for chunked downloads.

use core::fmt::Write as _;

/// `bytes=<u32>-<u32>` fits comfortably.
pub const RANGE_HEADER_LEN: usize = 32;

/// An inclusive byte range, as written in an HTTP `Range` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u32,
    /// Inclusive.
    pub end: u32,
}

#[allow(clippy::len_without_is_empty)]
impl ByteRange {
    /// The single-byte range used by the size probe.
    pub const FIRST_BYTE: Self = Self { start: 0, end: 0 };

    pub fn len(&self) -> u32 {
        self.end - self.start + 1
    }

    /// `bytes=<start>-<end>`
    pub fn header_value(&self) -> heapless::String<RANGE_HEADER_LEN> {
        let mut s = heapless::String::new();
        // Two u32s plus the fixed text never exceed the capacity.
        let _ = write!(s, "bytes={}-{}", self.start, self.end);
        s
    }
}

/// Iterator over the ranges that exactly tile `[0, total)`.
#[derive(Debug, Clone)]
pub struct ChunkPlan {
    total: u32,
    chunk_size: u32,
    next: u32,
}

impl ChunkPlan {
    /// `chunk_size` must be non-zero; config validation guarantees this.
    pub fn new(total: u32, chunk_size: u32) -> Self {
        Self {
            total,
            chunk_size: chunk_size.max(1),
            next: 0,
        }
    }

    /// Number of ranges the plan yields: `ceil(total / chunk_size)`.
    pub fn chunk_count(&self) -> u32 {
        self.total.div_ceil(self.chunk_size)
    }
}

impl Iterator for ChunkPlan {
    type Item = ByteRange;

    fn next(&mut self) -> Option<ByteRange> {
        if self.next >= self.total {
            return None;
        }
        let start = self.next;
        let remaining = self.total - start;
        let len = remaining.min(self.chunk_size);
        self.next = start + len;
        Some(ByteRange {
            start,
            end: start + len - 1,
        })
    }
}
