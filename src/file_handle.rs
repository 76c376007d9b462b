//! Logical file handles (§6 `open_file`/`close_file`/`seek`/`tell`) and the
//! `Read`/`Write`/`Seek`-implementing convenience wrapper supplemented from
//! `examples/original_source/include/compio_file.hpp` (S.1 of the expanded
//! spec): the original keeps a small stateful "current file" object with
//! its own cursor around a `compio_t*`, rather than threading an offset
//! through every call.
//!
//! A handle is intentionally lightweight: it remembers the file's *name*
//! and its own cursor, and looks the entry up in the archive's files table
//! on every access. Caching a table index would be invalidated by
//! [`crate::files_table::FilesTable::remove`]'s compaction of a *different*
//! file, so a fresh lookup per call is the correct, if slightly
//! unusual-looking, choice here — not an oversight (§4.2 already allows
//! linear scan as acceptable).

use std::io::{self, Read, Seek, SeekFrom, Write};

/// Seek origin, mirroring §6's `{SET, CUR, END}` whence vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Set = 0,
    Cur = 1,
    End = 2,
}

/// A handle onto one named logical file within an archive. Carries only
/// the name and the cursor — everything else is looked up from the
/// archive's files table and index on demand.
#[derive(Debug, Clone)]
pub struct FileHandle {
    pub(crate) name: String,
    pub(crate) cursor: u64,
}

impl FileHandle {
    pub fn new(name: String) -> Self {
        Self { name, cursor: 0 }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tell(&self) -> u64 {
        self.cursor
    }
}

/// A [`FileHandle`] borrowed together with its owning archive for the
/// duration of one `Read`/`Write`/`Seek` call chain — the convenience
/// veneer from S.1, letting callers use ordinary `std::io` combinators
/// (`io::copy`, `BufReader`, ...) against an archived file.
pub struct CompioFile<'a> {
    pub(crate) archive: &'a mut crate::archive::Archive,
    pub(crate) handle: FileHandle,
}

impl<'a> CompioFile<'a> {
    pub fn name(&self) -> &str {
        self.handle.name()
    }

    pub fn into_handle(self) -> FileHandle {
        self.handle
    }
}

impl<'a> Read for CompioFile<'a> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self
            .archive
            .read(&mut self.handle, buf.len() as u64)
            .map_err(io::Error::other)?;
        buf[..n.len()].copy_from_slice(&n);
        Ok(n.len())
    }
}

impl<'a> Write for CompioFile<'a> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.archive
            .write(&mut self.handle, buf)
            .map_err(io::Error::other)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.archive.flush_header().map_err(io::Error::other)
    }
}

impl<'a> Seek for CompioFile<'a> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let (whence, offset) = match pos {
            SeekFrom::Start(n) => (Whence::Set, n as i64),
            SeekFrom::Current(n) => (Whence::Cur, n),
            SeekFrom::End(n) => (Whence::End, n),
        };
        self.archive
            .seek(&mut self.handle, offset, whence)
            .map_err(io::Error::other)
    }
}
