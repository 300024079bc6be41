//! # Selection Fingerprints
//!
//! Deterministic fingerprints of a row selection, used to prove that two
//! snapshots (or two runs over the same shard) selected exactly the same
//! events.
//!
//! Two flavours:
//! - [`selection_checksum`]: XOR-rotate checksum, no dependencies
//! - [`selection_crypto_hash`]: BLAKE3 hex digest (`crypto-hash` feature)

/// Compute a deterministic checksum of a step label and selected rows.
///
/// # Security Note
///
/// This is **NOT** a cryptographic hash. It detects accidental differences
/// in row selection. Use [`selection_crypto_hash`] when collision
/// resistance matters.
#[must_use]
pub fn selection_checksum(step: &str, rows: &[usize]) -> u64 {
    let mut hash: u64 = (rows.len() as u64).rotate_left(3);

    for byte in step.as_bytes() {
        hash = hash.rotate_left(5) ^ u64::from(*byte);
    }

    // Position-dependent mixing so that row order matters
    for (pos, &row) in rows.iter().enumerate() {
        hash ^= (row as u64).rotate_left(17) ^ (pos as u64).rotate_left(29);
        hash = hash.rotate_left(7);
    }

    hash
}

/// Canonical byte encoding of a selection: label length, label, then rows
/// as little-endian u64.
#[cfg(feature = "crypto-hash")]
fn selection_bytes(step: &str, rows: &[usize]) -> Vec<u8> {
    let mut data = Vec::with_capacity(8 + step.len() + rows.len() * 8);
    data.extend_from_slice(&(step.len() as u64).to_le_bytes());
    data.extend_from_slice(step.as_bytes());
    for &row in rows {
        data.extend_from_slice(&(row as u64).to_le_bytes());
    }
    data
}

/// Compute a BLAKE3 hash of a step label and selected rows.
///
/// Returns the hash as a hex string (64 characters).
///
/// # Requires
///
/// This function is only available with the `crypto-hash` feature enabled.
#[cfg(feature = "crypto-hash")]
#[must_use]
pub fn selection_crypto_hash(step: &str, rows: &[usize]) -> String {
    blake3::hash(&selection_bytes(step, rows)).to_hex().to_string()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_deterministic() {
        let rows = [2, 3, 4];
        assert_eq!(selection_checksum("B", &rows), selection_checksum("B", &rows));
    }

    #[test]
    fn checksum_changes_with_rows_and_label() {
        let base = selection_checksum("B", &[2, 3, 4]);
        assert_ne!(base, selection_checksum("B", &[2, 3]));
        assert_ne!(base, selection_checksum("B", &[2, 3, 5]));
        assert_ne!(base, selection_checksum("A", &[2, 3, 4]));
    }

    #[test]
    fn empty_selection_has_stable_checksum() {
        assert_eq!(selection_checksum("", &[]), 0);
    }

    #[cfg(feature = "crypto-hash")]
    #[test]
    fn crypto_hash_is_hex() {
        let hash = selection_crypto_hash("B", &[2, 3, 4]);
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, selection_crypto_hash("B", &[2, 3, 4]));
        assert_ne!(hash, selection_crypto_hash("B", &[2, 3]));
    }
}
