//! Binary encoding of concept sets for persistence.
//!
//! A blob is a packed sequence of little-endian `u64` concept ids with no
//! header and no separators:
//!
//! ```text
//! [8 bytes] concept id (u64 LE)
//! [8 bytes] concept id (u64 LE)
//! ...
//! ```
//!
//! The empty set encodes to a zero-length blob. Members are written in
//! ascending order so the same set always produces the same bytes.

use crate::error::{TypesError, TypesResult};
use crate::{ConceptId, ConceptSet};

/// Width of one encoded concept id in bytes.
pub const ID_WIDTH: usize = std::mem::size_of::<ConceptId>();

/// Encodes a set into a packed little-endian blob.
pub fn encode(set: &ConceptSet) -> Vec<u8> {
    let mut buf = Vec::with_capacity(set.len() * ID_WIDTH);
    encode_into(set, &mut buf);
    buf
}

/// Encodes a set into `buf`, clearing it first.
///
/// Lets callers reuse one buffer across many records.
pub fn encode_into(set: &ConceptSet, buf: &mut Vec<u8>) {
    buf.clear();
    buf.reserve(set.len() * ID_WIDTH);
    for id in set.to_sorted_vec() {
        buf.extend_from_slice(&id.to_le_bytes());
    }
}

/// Decodes a blob produced by [`encode`].
///
/// # Errors
///
/// Returns [`TypesError::TruncatedBlob`] if the blob length is not a multiple of 8.
pub fn decode(blob: &[u8]) -> TypesResult<ConceptSet> {
    if blob.len() % ID_WIDTH != 0 {
        return Err(TypesError::TruncatedBlob { len: blob.len() });
    }

    let mut set = ConceptSet::with_capacity(blob.len() / ID_WIDTH);
    for chunk in blob.chunks_exact(ID_WIDTH) {
        let mut bytes = [0u8; ID_WIDTH];
        bytes.copy_from_slice(chunk);
        set.add(ConceptId::from_le_bytes(bytes));
    }
    Ok(set)
}
