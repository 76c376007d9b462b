//! Error kinds for the storage engine (§7).
//!
//! Internally every operation returns `Result<T, CompioError>`. The C-style
//! veneer described in §6 is responsible for collapsing this into the
//! nullable-handle / `-1` / short-count convention and a thread-local
//! `errno`-style channel — that mapping lives at the FFI boundary, not here.

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompioError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Name too long: {0:?} exceeds the {max}-byte name field", max = crate::NAME_MAX)]
    NameTooLong(String),

    #[error("Too many files: archive is at its {max}-file capacity", max = crate::MAX_FILES)]
    TooManyFiles,

    #[error("Archive is read-only")]
    ReadOnly,

    #[error("No such file: {0:?}")]
    NoSuchFile(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Corrupt archive: {0}")]
    CorruptArchive(String),

    #[error("Compression failed: {0}")]
    Compression(String),

    #[error("Out of memory")]
    OutOfMemory,
}

impl From<crate::codec::CodecError> for CompioError {
    fn from(e: crate::codec::CodecError) -> Self {
        match e {
            // Decompression failure is elevated to corrupt-archive per §7:
            // the engine's contract is that anything in the tree was
            // produced by this codec.
            crate::codec::CodecError::Decompression(msg) =>
                CompioError::CorruptArchive(format!("codec decompression failed: {msg}")),
            // A compress() failure says nothing about existing archive
            // contents; the write pipeline treats it the same as
            // BufferTooSmall and falls back to storing the chunk verbatim
            // rather than propagating this through `?`.
            crate::codec::CodecError::Compression(msg) =>
                CompioError::Compression(msg),
            // buffer-too-small is handled by the pipeline's fallback path and
            // should never reach here as a propagated error.
            crate::codec::CodecError::BufferTooSmall =>
                CompioError::CorruptArchive("codec reported buffer-too-small outside the fallback path".into()),
        }
    }
}
