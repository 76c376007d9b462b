//! Archive lifecycle (§4.8) and the public per-call operations of §6.
//!
//! Grounded on `sixcy::archive::Archive`'s open/create + method-surface
//! shape (one struct wrapping the host file plus parsed header state,
//! exposing the operations a caller actually wants), rewritten around
//! compio's random-access read/write model instead of the teacher's
//! append-only pack/extract model.

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::alloc::Allocator;
use crate::btree::{self, NodeStore};
use crate::codec::Codec;
use crate::config::CompioConfig;
use crate::error::CompioError;
use crate::file_handle::{CompioFile, FileHandle, Whence};
use crate::files_table::FilesTable;
use crate::pipeline;
use crate::serializer::{FileEntry, Header};
use crate::NAME_MAX;

/// Open mode, parsed from the §4.8 vocabulary `r / w / a / r+ / w+ / a+`
/// into the three independent bits the rest of the engine actually checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveMode {
    pub read: bool,
    pub write: bool,
    pub append: bool,
}

impl ArchiveMode {
    pub fn parse(mode: &str) -> Result<Self, CompioError> {
        match mode {
            "r" => Ok(Self { read: true, write: false, append: false }),
            "w" => Ok(Self { read: false, write: true, append: false }),
            "a" => Ok(Self { read: false, write: true, append: true }),
            "r+" => Ok(Self { read: true, write: true, append: false }),
            "w+" => Ok(Self { read: true, write: true, append: false }),
            "a+" => Ok(Self { read: true, write: true, append: true }),
            other => Err(CompioError::InvalidArgument(format!("unknown archive mode {other:?}"))),
        }
    }
}

/// A handle on one open archive: the host file, its parsed header state,
/// and the configuration it was opened with.
pub struct Archive {
    path: PathBuf,
    file: File,
    mode: ArchiveMode,
    config: CompioConfig,
    codec: Box<dyn Codec>,
    index_root: u64,
    alloc: Allocator,
    files: FilesTable,
    dirty: bool,
}

fn hash_name(name: &str) -> u64 {
    let mut padded = [0u8; NAME_MAX];
    let bytes = name.as_bytes();
    let n = bytes.len().min(NAME_MAX);
    padded[..n].copy_from_slice(&bytes[..n]);
    let digest = Sha256::digest(padded);
    // "low 64 bits of SHA-256" (§3): the digest's trailing 8 bytes.
    u64::from_le_bytes(digest[24..32].try_into().unwrap())
}

impl Archive {
    // ── Constructors ─────────────────────────────────────────────────────────

    /// Open (or create) the archive at `path` (§4.8).
    pub fn open(path: impl AsRef<Path>, mode: &str, config: CompioConfig) -> Result<Self, CompioError> {
        config.validate()?;
        let mode = ArchiveMode::parse(mode)?;
        let path = path.as_ref().to_path_buf();

        let mut open_options = OpenOptions::new();
        open_options.read(true).write(mode.write).create(mode.write);
        let mut file = open_options.open(&path)?;

        let len = file.metadata()?.len();
        let (index_root, alloc, files) = if len == 0 {
            if !mode.write {
                return Err(CompioError::NoSuchFile(path.display().to_string()));
            }
            let header = Header::new(config.btree_degree as u32, config.block_size as u32, config.fill_holes_with_zeros);
            file.seek(SeekFrom::Start(0))?;
            header.write(&mut file)?;
            (0u64, Allocator::new(header.file_size, config.fill_holes_with_zeros), FilesTable::default())
        } else {
            file.seek(SeekFrom::Start(0))?;
            let header = Header::read(&mut file)?;
            let alloc = Allocator::new(header.file_size, header.fill_holes_with_zeros);
            let files = FilesTable::from_entries(header.files);
            (header.index_root, alloc, files)
        };

        let codec = config.codec.codec();
        Ok(Self { path, file, mode, config, codec, index_root, alloc, files, dirty: false })
    }

    pub fn create(path: impl AsRef<Path>, config: CompioConfig) -> Result<Self, CompioError> {
        Self::open(path, "w+", config)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn require_write(&self) -> Result<(), CompioError> {
        if !self.mode.write {
            return Err(CompioError::ReadOnly);
        }
        Ok(())
    }

    fn node_store(&mut self) -> NodeStore<'_> {
        NodeStore { file: &mut self.file, alloc: &mut self.alloc, degree: self.config.btree_degree }
    }

    // ── File handles ─────────────────────────────────────────────────────────

    /// `open_file(name, h)` (§6): look up or, in a writable archive,
    /// create the logical file named `name`.
    pub fn open_file(&mut self, name: &str) -> Result<FileHandle, CompioError> {
        if name.as_bytes().len() > NAME_MAX {
            return Err(CompioError::NameTooLong(name.to_string()));
        }
        if self.files.contains(name) {
            return Ok(FileHandle::new(name.to_string()));
        }
        self.require_write()?;
        self.files.add(name)?;
        self.dirty = true;
        Ok(FileHandle::new(name.to_string()))
    }

    /// The S.1 convenience wrapper: open a file and borrow this archive
    /// for the duration of `std::io::{Read, Write, Seek}` calls against it.
    pub fn open_file_io(&mut self, name: &str) -> Result<CompioFile<'_>, CompioError> {
        let handle = self.open_file(name)?;
        Ok(CompioFile { archive: self, handle })
    }

    pub fn close_file(&mut self, _handle: FileHandle) {
        // No per-handle resources to release; present for symmetry with
        // §6's close_file operation and the C veneer above it.
    }

    fn file_size(&self, name: &str) -> Result<u64, CompioError> {
        self.files
            .find(name)
            .map(|e| e.size)
            .ok_or_else(|| CompioError::NoSuchFile(name.to_string()))
    }

    // ── Read ─────────────────────────────────────────────────────────────────

    /// `read(buf, n, fh)` (§6 / §4.7 read path).
    pub fn read(&mut self, handle: &mut FileHandle, n: u64) -> Result<Vec<u8>, CompioError> {
        let size = self.file_size(&handle.name)?;
        let n = n.min(size.saturating_sub(handle.cursor));
        if n == 0 {
            return Ok(Vec::new());
        }
        let hash = hash_name(&handle.name);
        let root = self.index_root;
        let cursor = handle.cursor;
        let codec = &*self.codec;
        let mut store = NodeStore { file: &mut self.file, alloc: &mut self.alloc, degree: self.config.btree_degree };
        let bytes = pipeline::read_at(&mut store, codec, root, hash, cursor, n)?;
        handle.cursor += bytes.len() as u64;
        Ok(bytes)
    }

    // ── Write ────────────────────────────────────────────────────────────────

    /// `write(buf, n, fh)` (§6 / §4.7 write path).
    pub fn write(&mut self, handle: &mut FileHandle, buf: &[u8]) -> Result<u64, CompioError> {
        self.require_write()?;
        if !self.files.contains(&handle.name) {
            return Err(CompioError::NoSuchFile(handle.name.clone()));
        }
        let hash = hash_name(&handle.name);
        let cursor = handle.cursor;
        let block_size = self.config.block_size as u64;
        let root = self.index_root;
        let codec = &*self.codec;
        let mut store = NodeStore { file: &mut self.file, alloc: &mut self.alloc, degree: self.config.btree_degree };
        let (new_root, end) = pipeline::write_at(&mut store, codec, block_size, root, hash, cursor, buf)?;
        self.index_root = new_root;

        let size = self.file_size(&handle.name)?;
        if end > size {
            self.files.set_size(&handle.name, end)?;
        }
        handle.cursor += buf.len() as u64;
        self.dirty = true;
        self.flush_header()?;
        Ok(buf.len() as u64)
    }

    // ── Metadata ─────────────────────────────────────────────────────────────

    /// `seek(fh, offset, whence)` (§6).
    pub fn seek(&mut self, handle: &mut FileHandle, offset: i64, whence: Whence) -> Result<u64, CompioError> {
        let size = self.file_size(&handle.name)?;
        let base: i64 = match whence {
            Whence::Set => 0,
            Whence::Cur => handle.cursor as i64,
            Whence::End => size as i64,
        };
        let target = base
            .checked_add(offset)
            .ok_or_else(|| CompioError::InvalidArgument("seek overflow".into()))?;
        if target < 0 {
            return Err(CompioError::InvalidArgument("seek before start of file".into()));
        }
        handle.cursor = target as u64;
        Ok(handle.cursor)
    }

    /// `tell(fh)` (§6).
    pub fn tell(&self, handle: &FileHandle) -> u64 {
        handle.cursor
    }

    /// `remove_file(h, name)` (§6). Old storage blocks are left to the
    /// normal bump-allocator fate (§4.1); their B-Tree entries are removed
    /// so the name is immediately free for reuse.
    pub fn remove_file(&mut self, name: &str) -> Result<(), CompioError> {
        if name.as_bytes().len() > NAME_MAX {
            return Err(CompioError::NameTooLong(name.to_string()));
        }
        let hash = hash_name(name);
        let mut keys = Vec::new();
        {
            let root = self.index_root;
            let mut store = self.node_store();
            btree::range_query(
                &mut store,
                root,
                &crate::serializer::Key { hash, pos: 0 },
                &crate::serializer::Key { hash, pos: u64::MAX },
                &mut keys,
            )?;
        }
        let mut root = self.index_root;
        for (k, _) in &keys {
            let mut store = self.node_store();
            root = btree::remove(&mut store, root, k)?;
        }
        self.index_root = root;
        self.files.remove(name)?;
        self.dirty = true;
        self.flush_header()
    }

    pub fn list(&self) -> Vec<String> {
        self.files.entries().iter().map(|e| e.name_str()).collect()
    }

    pub fn stat(&self, name: &str) -> Result<u64, CompioError> {
        self.file_size(name)
    }

    /// Persist the header if it has changed since the last flush. Called
    /// after every mutating public operation (§4.8 "flushed after every
    /// mutation") and on close.
    pub fn flush_header(&mut self) -> Result<(), CompioError> {
        if !self.dirty {
            return Ok(());
        }
        let entries: Vec<FileEntry> = self
            .files
            .entries()
            .iter()
            .map(|e| FileEntry { name: e.name, name_len: e.name_len, size: e.size })
            .collect();
        let header = Header {
            index_root: self.index_root,
            file_size: self.alloc.file_size(),
            btree_degree: self.config.btree_degree as u32,
            block_size: self.config.block_size as u32,
            fill_holes_with_zeros: self.config.fill_holes_with_zeros,
            files: entries,
        };
        self.file.seek(SeekFrom::Start(0))?;
        header.write(&mut self.file)?;
        self.dirty = false;
        Ok(())
    }

    pub fn close(mut self) -> Result<(), CompioError> {
        self.flush_header()?;
        self.file.flush()?;
        Ok(())
    }
}

impl Drop for Archive {
    fn drop(&mut self) {
        if self.dirty {
            if let Err(e) = self.flush_header() {
                tracing::error!(path = %self.path.display(), error = %e, "failed to flush header on drop");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn scratch_path() -> PathBuf {
        NamedTempFile::new().unwrap().into_temp_path().to_path_buf()
    }

    #[test]
    fn create_open_roundtrip_empty_archive() {
        let path = scratch_path();
        {
            let archive = Archive::create(&path, CompioConfig::default()).unwrap();
            archive.close().unwrap();
        }
        let archive = Archive::open(&path, "r", CompioConfig::default()).unwrap();
        assert!(archive.list().is_empty());
    }

    #[test]
    fn write_then_read_back_through_archive_api() {
        let path = scratch_path();
        let mut archive = Archive::create(&path, CompioConfig { block_size: 8, ..Default::default() }).unwrap();
        let mut handle = archive.open_file("greeting").unwrap();
        archive.write(&mut handle, b"hello world").unwrap();
        archive.seek(&mut handle, 0, Whence::Set).unwrap();
        let out = archive.read(&mut handle, 11).unwrap();
        assert_eq!(out, b"hello world");
        assert_eq!(archive.stat("greeting").unwrap(), 11);
    }

    #[test]
    fn opening_empty_file_in_read_mode_fails_no_such_file() {
        let path = scratch_path();
        let err = Archive::open(&path, "r", CompioConfig::default());
        assert!(matches!(err, Err(CompioError::NoSuchFile(_))));
    }

    #[test]
    fn remove_file_frees_name_for_reuse() {
        let path = scratch_path();
        let mut archive = Archive::create(&path, CompioConfig::default()).unwrap();
        let mut a = archive.open_file("a").unwrap();
        archive.write(&mut a, b"hello").unwrap();
        let mut b = archive.open_file("b").unwrap();
        archive.write(&mut b, b"world").unwrap();

        archive.remove_file("a").unwrap();
        assert!(!archive.list().contains(&"a".to_string()));

        let mut a2 = archive.open_file("a").unwrap();
        let out = archive.read(&mut a2, 10).unwrap();
        assert!(out.is_empty());
        assert_eq!(archive.stat("b").unwrap(), 5);
    }

    #[test]
    fn reopen_after_close_preserves_contents() {
        let path = scratch_path();
        {
            let mut archive = Archive::create(&path, CompioConfig::default()).unwrap();
            let mut handle = archive.open_file("a").unwrap();
            archive.write(&mut handle, b"persisted").unwrap();
            archive.close().unwrap();
        }
        let mut archive = Archive::open(&path, "r+", CompioConfig::default()).unwrap();
        let mut handle = archive.open_file("a").unwrap();
        let out = archive.read(&mut handle, 9).unwrap();
        assert_eq!(out, b"persisted");
    }
}
