//! Bump allocator over the archive file (§4.1).
//!
//! Grounded on `examples/original_source/include/allocator.hpp` /
//! `src/allocator.cpp`: a high-water-mark allocator with no free list, where
//! `free()` optionally zero-fills the reclaimed range to keep the
//! file sparse-friendly. This module owns only the arithmetic; the header's
//! `file_size` field is the allocator's persisted high-water mark, so the
//! archive is responsible for writing it back after every allocation.

use std::fs::File;
use std::io::{self, Seek, SeekFrom, Write};

/// Bump allocator: hands out ever-increasing, non-overlapping byte ranges.
/// Never reuses freed space within a session (§4.1 — "no free list").
pub struct Allocator {
    file_size: u64,
    fill_holes_with_zeros: bool,
}

impl Allocator {
    pub fn new(file_size: u64, fill_holes_with_zeros: bool) -> Self {
        Self { file_size, fill_holes_with_zeros }
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Reserve `size` bytes at the current high-water mark and advance it.
    /// Returns the absolute offset of the new region.
    pub fn allocate(&mut self, size: u64) -> u64 {
        let addr = self.file_size;
        self.file_size += size;
        addr
    }

    /// Release a previously allocated range. The allocator does not track
    /// freed ranges for reuse (§4.1 Non-goals); when configured to do so,
    /// it overwrites the range with zeros so the underlying filesystem can
    /// reclaim the blocks as a sparse hole.
    pub fn free(&self, file: &mut File, addr: u64, size: u64) -> io::Result<()> {
        if !self.fill_holes_with_zeros || size == 0 {
            return Ok(());
        }
        file.seek(SeekFrom::Start(addr))?;
        const ZERO_CHUNK: usize = 64 * 1024;
        let zeros = vec![0u8; ZERO_CHUNK.min(size as usize).max(1)];
        let mut remaining = size;
        while remaining > 0 {
            let n = remaining.min(zeros.len() as u64) as usize;
            file.write_all(&zeros[..n])?;
            remaining -= n as u64;
        }
        Ok(())
    }
}
