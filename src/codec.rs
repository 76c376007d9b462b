//! Codec interface (§4.4) — a pure `(compress, decompress)` pair.
//!
//! Grounded on `sixcy::codec`: the same `Codec` trait shape and the same
//! built-in implementations (`zstd`, `lz4_flex`, `brotli`, `lzma-rs`), but
//! trimmed of the frozen-UUID / short-ID identity machinery. The compio
//! storage block (§3) carries no per-block codec field — one codec is
//! configured for the whole archive (§6 `codec` option) — so there is
//! nothing here for an identity scheme to attach to.
//!
//! # Contract
//! `decompress(compress(x)) == x` for any `x`. A codec that cannot compress
//! a given input reports [`CodecError::BufferTooSmall`]; the pipeline (§4.7)
//! treats that as a routing signal into the uncompressed-fallback branch,
//! never as an error surfaced to the caller.

use std::io::{Read, Write};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Compression error: {0}")]
    Compression(String),
    #[error("Decompression error: {0}")]
    Decompression(String),
    /// Not a true error — the pipeline's uncompressed-fallback contract
    /// (§4.4 / §4.7) routes this into storing the chunk verbatim.
    #[error("Compressed output did not fit the destination buffer")]
    BufferTooSmall,
}

/// Which built-in codec an archive is configured to use.
///
/// `Default` is `Identity`, matching §6's stated default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecKind {
    Identity,
    Zstd,
    Lz4,
    Brotli,
    Lzma,
}

impl Default for CodecKind {
    fn default() -> Self { CodecKind::Identity }
}

impl CodecKind {
    pub fn name(self) -> &'static str {
        match self {
            CodecKind::Identity => "identity",
            CodecKind::Zstd     => "zstd",
            CodecKind::Lz4      => "lz4",
            CodecKind::Brotli   => "brotli",
            CodecKind::Lzma     => "lzma",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "identity" | "none" => Some(CodecKind::Identity),
            "zstd"              => Some(CodecKind::Zstd),
            "lz4"               => Some(CodecKind::Lz4),
            "brotli"            => Some(CodecKind::Brotli),
            "lzma"              => Some(CodecKind::Lzma),
            _                   => None,
        }
    }

    pub fn codec(self) -> Box<dyn Codec> {
        match self {
            CodecKind::Identity => Box::new(IdentityCodec),
            CodecKind::Zstd     => Box::new(ZstdCodec),
            CodecKind::Lz4      => Box::new(Lz4Codec),
            CodecKind::Brotli   => Box::new(BrotliCodec),
            CodecKind::Lzma     => Box::new(LzmaCodec),
        }
    }
}

pub trait Codec: Send + Sync {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError>;
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError>;
}

// ── Built-in codecs ──────────────────────────────────────────────────────────

/// Bytewise copy. The default codec (§4.4): always "succeeds" but never
/// shrinks the input, so the pipeline's shorter-result check naturally
/// routes every block through the uncompressed-fallback path.
pub struct IdentityCodec;
impl Codec for IdentityCodec {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> { Ok(data.to_vec()) }
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> { Ok(data.to_vec()) }
}

/// Fixed internal compression level — the spec's codec interface does not
/// expose a per-call level knob (§4.4, §6), unlike the teacher's per-archive
/// `PackOptions::level`.
const ZSTD_LEVEL: i32 = 3;
const BROTLI_QUALITY: u32 = 9;

pub struct ZstdCodec;
impl Codec for ZstdCodec {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        zstd::encode_all(data, ZSTD_LEVEL).map_err(|e| CodecError::Compression(e.to_string()))
    }
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        zstd::decode_all(data).map_err(|e| CodecError::Decompression(e.to_string()))
    }
}

pub struct Lz4Codec;
impl Codec for Lz4Codec {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        Ok(lz4_flex::compress_prepend_size(data))
    }
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        lz4_flex::decompress_size_prepended(data)
            .map_err(|e| CodecError::Decompression(e.to_string()))
    }
}

pub struct BrotliCodec;
impl Codec for BrotliCodec {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::new();
        {
            let mut w = brotli::CompressorWriter::new(&mut out, 4096, BROTLI_QUALITY, 22);
            w.write_all(data).map_err(|e| CodecError::Compression(e.to_string()))?;
        }
        Ok(out)
    }
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::new();
        brotli::Decompressor::new(data, 4096)
            .read_to_end(&mut out)
            .map_err(|e| CodecError::Decompression(e.to_string()))?;
        Ok(out)
    }
}

pub struct LzmaCodec;
impl Codec for LzmaCodec {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::new();
        lzma_rs::lzma_compress(&mut std::io::Cursor::new(data), &mut out)
            .map_err(|e| CodecError::Compression(e.to_string()))?;
        Ok(out)
    }
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::new();
        lzma_rs::lzma_decompress(&mut std::io::Cursor::new(data), &mut out)
            .map_err(|e| CodecError::Decompression(e.to_string()))?;
        Ok(out)
    }
}
