//! On-disk binary layouts (§3) and their encode/decode routines.
//!
//! Grounded on `sixcy::superblock` and `sixcy::block` for the general shape
//! (a fixed-size header struct with explicit `read`/`write` methods over a
//! `byteorder` little-endian cursor), adapted to the three structures this
//! format actually needs: [`Header`], [`Node`], and [`StorageBlockHeader`].
//! `sixcy` hand-rolled its byte offsets with local macros; this format keeps
//! the same "every field at a known offset" discipline but writes the
//! offsets out with `byteorder`'s `ReadBytesExt`/`WriteBytesExt` directly,
//! since there's no repeated multi-field-array pattern here to warrant a
//! macro.

use std::io::{self, Cursor, Read, Write};
use byteorder::{LittleEndian as LE, ReadBytesExt, WriteBytesExt};

use crate::{MAX_FILES, NAME_MAX};
use crate::error::CompioError;

/// `b"CpIo"` — distinguishes a compio archive from an arbitrary file.
pub const MAGIC: i32 = 0x436f_4970;

/// Size in bytes of one files-table entry: a `NAME_MAX`-byte name field
/// followed by an 8-byte size.
const FILE_ENTRY_SIZE: usize = NAME_MAX + 8;

/// Fixed part of the header, before the variable-length files table:
/// magic(4) + index_root(8) + file_size(8) + btree_degree(4) + block_size(4)
/// + fill_holes_with_zeros(1) + n_files(8) = 37 bytes.
const HEADER_FIXED_SIZE: usize = 4 + 8 + 8 + 4 + 4 + 1 + 8;

/// Total persisted header size (§3's `Header` struct, extended per
/// [`crate::config::CompioConfig`] — see DESIGN.md's header-layout note).
pub const HEADER_SIZE: usize = HEADER_FIXED_SIZE + MAX_FILES * FILE_ENTRY_SIZE;

/// One entry of the fixed-capacity files table (§3), as persisted.
#[derive(Debug, Clone)]
pub struct FileEntry {
    pub name: [u8; NAME_MAX],
    pub name_len: u8,
    pub size: u64,
}

impl FileEntry {
    pub fn empty() -> Self {
        Self { name: [0u8; NAME_MAX], name_len: 0, size: 0 }
    }

    pub fn name_str(&self) -> String {
        String::from_utf8_lossy(&self.name[..self.name_len as usize]).into_owned()
    }
}

/// The archive header (§3 `Header`): on-disk root of everything else.
#[derive(Debug, Clone)]
pub struct Header {
    pub index_root: u64,
    pub file_size: u64,
    pub btree_degree: u32,
    pub block_size: u32,
    pub fill_holes_with_zeros: bool,
    pub files: Vec<FileEntry>,
}

impl Header {
    pub fn new(btree_degree: u32, block_size: u32, fill_holes_with_zeros: bool) -> Self {
        Self {
            index_root: 0,
            file_size: HEADER_SIZE as u64,
            btree_degree,
            block_size,
            fill_holes_with_zeros,
            files: Vec::new(),
        }
    }

    pub fn write(&self, w: &mut impl Write) -> io::Result<()> {
        w.write_i32::<LE>(MAGIC)?;
        w.write_u64::<LE>(self.index_root)?;
        w.write_u64::<LE>(self.file_size)?;
        w.write_u32::<LE>(self.btree_degree)?;
        w.write_u32::<LE>(self.block_size)?;
        w.write_u8(self.fill_holes_with_zeros as u8)?;
        w.write_u64::<LE>(self.files.len() as u64)?;
        for entry in &self.files {
            let mut name_buf = [0u8; NAME_MAX];
            name_buf[..entry.name_len as usize].copy_from_slice(&entry.name[..entry.name_len as usize]);
            w.write_all(&name_buf)?;
            w.write_u64::<LE>(entry.size)?;
        }
        for _ in self.files.len()..MAX_FILES {
            w.write_all(&[0u8; NAME_MAX])?;
            w.write_u64::<LE>(0)?;
        }
        Ok(())
    }

    pub fn read(r: &mut impl Read) -> Result<Self, CompioError> {
        let magic = r.read_i32::<LE>()?;
        if magic != MAGIC {
            return Err(CompioError::CorruptArchive(format!(
                "bad magic: expected {MAGIC:#x}, found {magic:#x}"
            )));
        }
        let index_root = r.read_u64::<LE>()?;
        let file_size = r.read_u64::<LE>()?;
        let btree_degree = r.read_u32::<LE>()?;
        let block_size = r.read_u32::<LE>()?;
        let fill_holes_with_zeros = r.read_u8()? != 0;
        let n_files = r.read_u64::<LE>()? as usize;
        if n_files > MAX_FILES {
            return Err(CompioError::CorruptArchive(format!(
                "files table count {n_files} exceeds MAX_FILES ({MAX_FILES})"
            )));
        }

        let mut files = Vec::with_capacity(n_files);
        for i in 0..MAX_FILES {
            let mut name = [0u8; NAME_MAX];
            r.read_exact(&mut name)?;
            let size = r.read_u64::<LE>()?;
            if i < n_files {
                let name_len = name.iter().position(|&b| b == 0).unwrap_or(NAME_MAX) as u8;
                files.push(FileEntry { name, name_len, size });
            }
        }

        Ok(Self { index_root, file_size, btree_degree, block_size, fill_holes_with_zeros, files })
    }
}

/// B-Tree key: `(hash64, pos64)`, lexicographically ordered by field
/// declaration order (§4.2 / §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key {
    pub hash: u64,
    pub pos: u64,
}

impl Key {
    pub const SIZE: usize = 16;

    pub fn write(&self, w: &mut impl Write) -> io::Result<()> {
        w.write_u64::<LE>(self.hash)?;
        w.write_u64::<LE>(self.pos)
    }

    pub fn read(r: &mut impl Read) -> io::Result<Self> {
        let hash = r.read_u64::<LE>()?;
        let pos = r.read_u64::<LE>()?;
        Ok(Self { hash, pos })
    }
}

/// B-Tree value: absolute file offset + uncompressed size of the block
/// this key indexes (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Value {
    pub addr: u64,
    pub size: u64,
}

impl Value {
    pub const SIZE: usize = 16;

    pub fn write(&self, w: &mut impl Write) -> io::Result<()> {
        w.write_u64::<LE>(self.addr)?;
        w.write_u64::<LE>(self.size)
    }

    pub fn read(r: &mut impl Read) -> io::Result<Self> {
        let addr = r.read_u64::<LE>()?;
        let size = r.read_u64::<LE>()?;
        Ok(Self { addr, size })
    }
}

/// One B-Tree node (§4.3), for a tree of minimum degree `d`. A leaf's
/// `children` vector is empty; an internal node always has
/// `keys.len() + 1` children.
#[derive(Debug, Clone)]
pub struct Node {
    pub is_leaf: bool,
    pub keys: Vec<Key>,
    pub values: Vec<Value>,
    pub children: Vec<u64>,
}

impl Node {
    pub fn new_leaf() -> Self {
        Self { is_leaf: true, keys: Vec::new(), values: Vec::new(), children: Vec::new() }
    }

    /// Persisted size in bytes for a node of this degree, independent of
    /// how many keys it currently holds — every node slot is allocated at
    /// full capacity (`2d-1` keys, `2d` children) so that node addresses
    /// are interchangeable.
    pub fn encoded_size(degree: usize) -> usize {
        let max_keys = 2 * degree - 1;
        let max_children = 2 * degree;
        1 + 4 + max_keys * (Key::SIZE + Value::SIZE) + max_children * 8
    }

    pub fn write(&self, w: &mut impl Write, degree: usize) -> io::Result<()> {
        let max_keys = 2 * degree - 1;
        let max_children = 2 * degree;
        debug_assert!(self.keys.len() <= max_keys);
        debug_assert_eq!(self.keys.len(), self.values.len());

        w.write_u8(self.is_leaf as u8)?;
        w.write_u32::<LE>(self.keys.len() as u32)?;
        for i in 0..max_keys {
            match self.keys.get(i) {
                Some(k) => k.write(w)?,
                None => w.write_all(&[0u8; Key::SIZE])?,
            }
        }
        for i in 0..max_keys {
            match self.values.get(i) {
                Some(v) => v.write(w)?,
                None => w.write_all(&[0u8; Value::SIZE])?,
            }
        }
        for i in 0..max_children {
            let child = self.children.get(i).copied().unwrap_or(0);
            w.write_u64::<LE>(child)?;
        }
        Ok(())
    }

    pub fn read(r: &mut impl Read, degree: usize) -> io::Result<Self> {
        let max_keys = 2 * degree - 1;
        let max_children = 2 * degree;

        let is_leaf = r.read_u8()? != 0;
        let num_keys = r.read_u32::<LE>()? as usize;

        let mut all_keys = Vec::with_capacity(max_keys);
        for _ in 0..max_keys {
            all_keys.push(Key::read(r)?);
        }
        let mut all_values = Vec::with_capacity(max_keys);
        for _ in 0..max_keys {
            all_values.push(Value::read(r)?);
        }
        let mut all_children = Vec::with_capacity(max_children);
        for _ in 0..max_children {
            all_children.push(r.read_u64::<LE>()?);
        }

        all_keys.truncate(num_keys);
        all_values.truncate(num_keys);
        if !is_leaf {
            all_children.truncate(num_keys + 1);
        } else {
            all_children.clear();
        }

        Ok(Self { is_leaf, keys: all_keys, values: all_values, children: all_children })
    }

    pub fn to_bytes(&self, degree: usize) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::encoded_size(degree));
        self.write(&mut buf, degree).expect("writing to a Vec<u8> cannot fail");
        buf
    }

    pub fn from_bytes(bytes: &[u8], degree: usize) -> io::Result<Self> {
        Self::read(&mut Cursor::new(bytes), degree)
    }
}

/// Header prefixed to every stored data block (§3 storage block). Not to be
/// confused with the archive [`Header`].
#[derive(Debug, Clone, Copy)]
pub struct StorageBlockHeader {
    pub is_compressed: bool,
    pub size: u64,
    pub original_size: u64,
    pub index_key: Key,
}

impl StorageBlockHeader {
    pub const SIZE: usize = 1 + 8 + 8 + Key::SIZE;

    pub fn write(&self, w: &mut impl Write) -> io::Result<()> {
        w.write_u8(self.is_compressed as u8)?;
        w.write_u64::<LE>(self.size)?;
        w.write_u64::<LE>(self.original_size)?;
        self.index_key.write(w)
    }

    pub fn read(r: &mut impl Read) -> io::Result<Self> {
        let is_compressed = r.read_u8()? != 0;
        let size = r.read_u64::<LE>()?;
        let original_size = r.read_u64::<LE>()?;
        let index_key = Key::read(r)?;
        Ok(Self { is_compressed, size, original_size, index_key })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrip_empty() {
        let header = Header::new(16, 4096, true);
        let mut buf = Vec::new();
        header.write(&mut buf).unwrap();
        assert_eq!(buf.len(), HEADER_SIZE);

        let restored = Header::read(&mut Cursor::new(&buf)).unwrap();
        assert_eq!(restored.index_root, header.index_root);
        assert_eq!(restored.btree_degree, 16);
        assert_eq!(restored.block_size, 4096);
        assert!(restored.fill_holes_with_zeros);
        assert!(restored.files.is_empty());
    }

    #[test]
    fn header_roundtrip_with_files() {
        let mut header = Header::new(16, 4096, false);
        let mut name = [0u8; NAME_MAX];
        name[..4].copy_from_slice(b"a.txt".get(..4).unwrap());
        header.files.push(FileEntry { name, name_len: 4, size: 123 });

        let mut buf = Vec::new();
        header.write(&mut buf).unwrap();
        let restored = Header::read(&mut Cursor::new(&buf)).unwrap();
        assert_eq!(restored.files.len(), 1);
        assert_eq!(restored.files[0].size, 123);
        assert_eq!(restored.files[0].name_str(), "a.tx");
    }

    #[test]
    fn header_rejects_bad_magic() {
        let buf = vec![0u8; HEADER_SIZE];
        let err = Header::read(&mut Cursor::new(&buf));
        assert!(err.is_err());
    }

    #[test]
    fn node_roundtrip_leaf() {
        let degree = 4;
        let mut node = Node::new_leaf();
        node.keys.push(Key { hash: 1, pos: 0 });
        node.values.push(Value { addr: 100, size: 10 });
        let bytes = node.to_bytes(degree);
        assert_eq!(bytes.len(), Node::encoded_size(degree));

        let restored = Node::from_bytes(&bytes, degree).unwrap();
        assert!(restored.is_leaf);
        assert_eq!(restored.keys, node.keys);
        assert_eq!(restored.values.len(), 1);
        assert!(restored.children.is_empty());
    }

    #[test]
    fn node_roundtrip_internal() {
        let degree = 4;
        let node = Node {
            is_leaf: false,
            keys: vec![Key { hash: 5, pos: 0 }, Key { hash: 9, pos: 0 }],
            values: vec![Value { addr: 1, size: 1 }, Value { addr: 2, size: 2 }],
            children: vec![10, 20, 30],
        };
        let bytes = node.to_bytes(degree);
        let restored = Node::from_bytes(&bytes, degree).unwrap();
        assert!(!restored.is_leaf);
        assert_eq!(restored.children, vec![10, 20, 30]);
    }

    #[test]
    fn key_ordering_is_hash_then_pos() {
        let a = Key { hash: 1, pos: 5 };
        let b = Key { hash: 1, pos: 9 };
        let c = Key { hash: 2, pos: 0 };
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn storage_block_header_roundtrip() {
        let header = StorageBlockHeader {
            is_compressed: true,
            size: 42,
            original_size: 100,
            index_key: Key { hash: 7, pos: 3 },
        };
        let mut buf = Vec::new();
        header.write(&mut buf).unwrap();
        assert_eq!(buf.len(), StorageBlockHeader::SIZE);
        let restored = StorageBlockHeader::read(&mut Cursor::new(&buf)).unwrap();
        assert_eq!(restored.size, 42);
        assert_eq!(restored.index_key, header.index_key);
    }
}
