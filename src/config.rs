//! Archive configuration (§6 "Configuration options").
//!
//! Grounded on [`crate`]'s teacher-shaped options struct pattern
//! (`sixcy::archive::PackOptions`): a plain `Default`-impl struct consumed
//! once at open/create time.

use crate::codec::CodecKind;

/// Minimum degree below which a B-Tree node cannot hold even one key.
pub const MIN_BTREE_DEGREE: usize = 2;

/// Configuration accepted by [`crate::archive::Archive::open`] /
/// [`crate::archive::Archive::create`].
///
/// Every field here is one of the four options §6 enumerates. `btree_degree`
/// and `block_size` are also persisted into the archive header on creation
/// (§4.8 parses the header back out on reopen) so that a reopened archive
/// keeps using the layout it was built with regardless of what the caller
/// passes on a later open.
#[derive(Debug, Clone)]
pub struct CompioConfig {
    /// The compressor pair used for every storage block in this archive.
    pub codec: CodecKind,
    /// B-Tree minimum degree `d`; each node holds `d-1..2d-1` keys.
    pub btree_degree: usize,
    /// Target chunk size `B` in bytes — the re-chunking unit (§4.7).
    pub block_size: usize,
    /// On free, overwrite the reclaimed range with zeros so the OS can
    /// sparsify the file.
    pub fill_holes_with_zeros: bool,
}

impl Default for CompioConfig {
    fn default() -> Self {
        Self {
            codec: CodecKind::Identity,
            btree_degree: 16,
            block_size: 4096,
            fill_holes_with_zeros: true,
        }
    }
}

impl CompioConfig {
    /// Validate the degree constraint from §4.6 ("`d`, must be ≥ 2").
    pub fn validate(&self) -> Result<(), crate::error::CompioError> {
        if self.btree_degree < MIN_BTREE_DEGREE {
            return Err(crate::error::CompioError::InvalidArgument(format!(
                "btree_degree must be >= {MIN_BTREE_DEGREE}, got {}",
                self.btree_degree
            )));
        }
        if self.block_size == 0 {
            return Err(crate::error::CompioError::InvalidArgument(
                "block_size must be nonzero".into(),
            ));
        }
        Ok(())
    }
}
