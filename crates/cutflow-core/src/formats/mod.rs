//! # Formats
//!
//! Byte-level encodings of engine outputs.

pub mod persistence;

pub use persistence::{
    MAX_PERSISTENCE_PAYLOAD_SIZE, PersistenceHeader, run_output_from_bytes, run_output_to_bytes,
};
