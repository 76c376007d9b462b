//! Read/write pipeline (§4.7): the subsystem that fetches overlapping
//! blocks, decompresses, splices, re-chunks, recompresses, and re-indexes.
//!
//! Grounded on `sixcy::io_stream`'s `SixCyReader::read_at` /
//! `SixCyWriter::add_file` for the overall "gather, splice, re-split,
//! recompress" shape, adapted to compio's in-place random-access model
//! (the teacher only ever appends whole files; this format must support
//! re-writing an arbitrary byte range of an existing file in place).

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};

use crate::btree::{self, NodeStore};
use crate::codec::Codec;
use crate::error::CompioError;
use crate::serializer::{Key, StorageBlockHeader, Value};
use crate::util::block_span;

/// Find every stored block that could overlap `[lo, hi)` within one file's
/// hash band: the half-open range query plus the predecessor-probe that
/// catches a block starting before `lo` and extending past it (§4.7
/// "Range derivation").
fn resolve_range(
    store: &mut NodeStore,
    root: u64,
    name_hash: u64,
    lo: u64,
    hi: u64,
) -> Result<Vec<(Key, Value)>, CompioError> {
    let k_min = Key { hash: name_hash, pos: lo };
    let k_max = Key { hash: name_hash, pos: hi };
    let mut out = Vec::new();
    btree::range_query(store, root, &k_min, &k_max, &mut out)?;

    if let Some((k, v)) = btree::predecessor_or_eq(store, root, &k_min)? {
        if k.hash == name_hash && k.pos + v.size > lo {
            if out.first().map(|(fk, _)| *fk) != Some(k) {
                out.insert(0, (k, v));
            }
        }
    }
    Ok(out)
}

fn read_block_raw(file: &mut File, addr: u64) -> Result<(StorageBlockHeader, Vec<u8>), CompioError> {
    file.seek(SeekFrom::Start(addr))?;
    let header = StorageBlockHeader::read(file)?;
    let mut raw = vec![0u8; header.size as usize];
    file.read_exact(&mut raw)?;
    Ok((header, raw))
}

fn decode_block(codec: &dyn Codec, header: &StorageBlockHeader, raw: Vec<u8>) -> Result<Vec<u8>, CompioError> {
    if header.is_compressed {
        let decompressed = codec.decompress(&raw)?;
        if decompressed.len() as u64 != header.original_size {
            return Err(CompioError::CorruptArchive(format!(
                "block at declared original_size {} decompressed to {} bytes",
                header.original_size,
                decompressed.len()
            )));
        }
        Ok(decompressed)
    } else {
        Ok(raw)
    }
}

fn write_block(store: &mut NodeStore, header: &StorageBlockHeader, data: &[u8]) -> Result<u64, CompioError> {
    let total = StorageBlockHeader::SIZE as u64 + data.len() as u64;
    let addr = store.alloc.allocate(total);
    store.file.seek(SeekFrom::Start(addr))?;
    header.write(store.file)?;
    store.file.write_all(data)?;
    Ok(addr)
}

/// Positional read (§4.7 read path). `n` must already be clamped to
/// `F.size - cursor` by the caller; returns exactly `n` bytes, with any
/// logical hole (a position no block covers) filled with zeros.
pub fn read_at(
    store: &mut NodeStore,
    codec: &dyn Codec,
    root: u64,
    name_hash: u64,
    cursor: u64,
    n: u64,
) -> Result<Vec<u8>, CompioError> {
    if n == 0 {
        return Ok(Vec::new());
    }
    let lo = cursor;
    let hi = cursor + n;
    let range = resolve_range(store, root, name_hash, lo, hi)?;

    let mut out = vec![0u8; (hi - lo) as usize];
    for (k, v) in &range {
        let (header, raw) = read_block_raw(store.file, v.addr)?;
        let decompressed = decode_block(codec, &header, raw)?;

        let block_start = k.pos;
        let block_end = k.pos + decompressed.len() as u64;
        let copy_start = block_start.max(lo);
        let copy_end = block_end.min(hi);
        if copy_end <= copy_start {
            continue;
        }
        let src = (copy_start - block_start) as usize;
        let dst = (copy_start - lo) as usize;
        let len = (copy_end - copy_start) as usize;
        out[dst..dst + len].copy_from_slice(&decompressed[src..src + len]);
    }
    Ok(out)
}

/// Positional write (§4.7 write path). Returns the (possibly-changed)
/// B-Tree root and the logical end offset `cursor + data.len()`; the
/// caller is responsible for `F.size = max(F.size, end)` and header flush.
pub fn write_at(
    store: &mut NodeStore,
    codec: &dyn Codec,
    block_size: u64,
    root: u64,
    name_hash: u64,
    cursor: u64,
    data: &[u8],
) -> Result<(u64, u64), CompioError> {
    if data.is_empty() {
        return Ok((root, cursor));
    }
    let requested_end = cursor + data.len() as u64;
    let range = resolve_range(store, root, name_hash, cursor, requested_end)?;

    // The scratch buffer must cover the full span of every block the write
    // touches, not just [cursor, requested_end) — a write that only
    // partially overlaps an existing block must still preserve that
    // block's untouched tail or head (§4.7 step 2's "smallest super-range
    // that contains the write").
    let start = range.iter().map(|(k, _)| k.pos).min().unwrap_or(cursor).min(cursor);
    let end = range
        .iter()
        .map(|(k, v)| k.pos + v.size)
        .max()
        .unwrap_or(requested_end)
        .max(requested_end);

    let mut scratch = vec![0u8; (end - start) as usize];
    let mut old_keys: Vec<Key> = Vec::with_capacity(range.len());
    for (k, v) in &range {
        let (header, raw) = read_block_raw(store.file, v.addr)?;
        let decompressed = decode_block(codec, &header, raw)?;
        let offset = (k.pos - start) as usize;
        scratch[offset..offset + decompressed.len()].copy_from_slice(&decompressed);

        let on_disk_len = StorageBlockHeader::SIZE as u64 + header.size;
        store.alloc.free(store.file, v.addr, on_disk_len)?;
        old_keys.push(*k);
    }

    let write_offset = (cursor - start) as usize;
    scratch[write_offset..write_offset + data.len()].copy_from_slice(data);

    let num_chunks = block_span(start, end, block_size);
    let mut new_entries: Vec<(Key, Value)> = Vec::with_capacity(num_chunks as usize);
    for i in 0..num_chunks {
        let off = i * block_size;
        let chunk_start = off as usize;
        let chunk_end = ((off + block_size).min(end - start)) as usize;
        let chunk = &scratch[chunk_start..chunk_end];
        let key = Key { hash: name_hash, pos: start + off };

        let (is_compressed, size, payload) = match codec.compress(chunk) {
            Ok(compressed) if compressed.len() < chunk.len() => (true, compressed.len() as u64, compressed),
            _ => (false, chunk.len() as u64, chunk.to_vec()),
        };
        let header = StorageBlockHeader {
            is_compressed,
            size,
            original_size: chunk.len() as u64,
            index_key: key,
        };
        let addr = write_block(store, &header, &payload)?;
        new_entries.push((key, Value { addr, size: chunk.len() as u64 }));
    }

    // §9's explicit-removal policy: update keys the new chunking shares
    // with the old range, insert genuinely new keys, then remove any old
    // key the new chunking no longer produces.
    let new_keys: std::collections::HashSet<Key> = new_entries.iter().map(|(k, _)| *k).collect();
    let mut current_root = root;
    for (k, v) in &new_entries {
        if old_keys.contains(k) {
            btree::update(store, current_root, k, *v)?;
        } else {
            current_root = btree::insert(store, current_root, *k, *v)?;
        }
    }
    for old_key in &old_keys {
        if !new_keys.contains(old_key) {
            current_root = btree::remove(store, current_root, old_key)?;
        }
    }

    Ok((current_root, requested_end))
}
