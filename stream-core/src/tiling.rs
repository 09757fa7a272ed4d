//! Chunk tiling verification.
//!
//! Staged chunks are only reassembled when, taken in offset order, they cover
//! `[0, expected_size)` exactly: no gap, no overlap, nothing past the end.

use thiserror::Error;

/// Why a set of chunk spans does not tile the declared file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TilingError {
    /// Bytes `[at, next)` were never staged.
    #[error("missing data chunk at offset {at} (next chunk starts at {next})")]
    Gap {
        /// First missing byte
        at: u64,
        /// Offset where staged data resumes (or the declared size)
        next: u64,
    },

    /// A chunk starts before the previous one ended.
    #[error("overlapping chunk at offset {at} (previous chunk ends at {previous_end})")]
    Overlap {
        /// Start of the overlapping chunk
        at: u64,
        /// End of the chunk it overlaps
        previous_end: u64,
    },

    /// Staged data runs past the declared size.
    #[error("size mismatch: staged {actual} bytes, expected {expected}")]
    SizeMismatch {
        /// Declared size
        expected: u64,
        /// End of the last staged chunk
        actual: u64,
    },
}

/// Check that `(offset, len)` spans, already sorted by offset, tile
/// `[0, expected_size)`.
///
/// Returns the first defect found walking from offset 0.
pub fn verify_tiling<I>(spans: I, expected_size: u64) -> Result<(), TilingError>
where
    I: IntoIterator<Item = (u64, u64)>,
{
    let mut cursor = 0u64;

    for (offset, len) in spans {
        if offset > cursor {
            return Err(TilingError::Gap {
                at: cursor,
                next: offset,
            });
        }
        if offset < cursor {
            return Err(TilingError::Overlap {
                at: offset,
                previous_end: cursor,
            });
        }
        cursor = offset.saturating_add(len);
    }

    if cursor < expected_size {
        return Err(TilingError::Gap {
            at: cursor,
            next: expected_size,
        });
    }
    if cursor > expected_size {
        return Err(TilingError::SizeMismatch {
            expected: expected_size,
            actual: cursor,
        });
    }

    Ok(())
}
