//! # Persistence Format
//!
//! Binary serialization for run outputs.
//!
//! File I/O lives in the driver; this module only maps between a
//! [`RunOutput`] and bytes.
//!
//! Format: Header (5 bytes) + postcard-serialized run output.
//! - 4 bytes: Magic ("CTFL")
//! - 1 byte: Version
//!
//! Size and header are validated before the payload is decoded.

use crate::primitives::{FORMAT_VERSION, MAGIC_BYTES};
use crate::selector::RunOutput;
use crate::types::{CutflowError, Result};

/// Maximum accepted size of encoded run output.
///
/// Checked before decoding so corrupted length prefixes cannot trigger
/// huge allocations.
pub const MAX_PERSISTENCE_PAYLOAD_SIZE: usize = 1024 * 1024 * 1024; // 1 GB

/// Header length in bytes.
const HEADER_SIZE: usize = 5;

// =============================================================================
// FILE HEADER
// =============================================================================

/// The header that precedes every encoded run output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistenceHeader {
    pub magic: [u8; 4],
    pub version: u8,
}

impl PersistenceHeader {
    #[must_use]
    pub fn new() -> Self {
        Self {
            magic: *MAGIC_BYTES,
            version: FORMAT_VERSION,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if &self.magic != MAGIC_BYTES {
            return Err(CutflowError::DeserializationError(
                "Invalid magic bytes".to_string(),
            ));
        }
        if self.version != FORMAT_VERSION {
            return Err(CutflowError::DeserializationError(format!(
                "Unsupported version: {} (expected {})",
                self.version, FORMAT_VERSION
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4] = self.version;
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(CutflowError::DeserializationError(
                "Header too short".to_string(),
            ));
        }
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[0..4]);
        Ok(Self {
            magic,
            version: bytes[4],
        })
    }
}

impl Default for PersistenceHeader {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// SERIALIZATION FUNCTIONS
// =============================================================================

/// Encode a run output (header + payload).
pub fn run_output_to_bytes(output: &RunOutput) -> Result<Vec<u8>> {
    let payload =
        postcard::to_stdvec(output).map_err(|e| CutflowError::SerializationError(e.to_string()))?;

    let mut result = Vec::with_capacity(HEADER_SIZE + payload.len());
    result.extend_from_slice(&PersistenceHeader::new().to_bytes());
    result.extend_from_slice(&payload);
    Ok(result)
}

/// Decode a run output.
///
/// Checks, in order: minimum size, maximum size, header. The payload is
/// only decoded after all three pass, and the decoded batches go through
/// the same validation as freshly built ones.
pub fn run_output_from_bytes(bytes: &[u8]) -> Result<RunOutput> {
    if bytes.len() < HEADER_SIZE {
        return Err(CutflowError::DeserializationError(format!(
            "Data too short: minimum {} bytes required",
            HEADER_SIZE
        )));
    }
    if bytes.len() > MAX_PERSISTENCE_PAYLOAD_SIZE {
        return Err(CutflowError::DeserializationError(format!(
            "Data size {} bytes exceeds maximum allowed {} bytes",
            bytes.len(),
            MAX_PERSISTENCE_PAYLOAD_SIZE
        )));
    }

    PersistenceHeader::from_bytes(bytes)?.validate()?;

    postcard::from_bytes(&bytes[HEADER_SIZE..]).map_err(|e| {
        CutflowError::DeserializationError(format!("Failed to decode run output: {}", e))
    })
}

// =============================================================================
// TESTS
// =============================================================================
