//! CBOR encoding of ledger entries.
//!
//! Entries are stored as CBOR maps with camelCase keys. The schema version is
//! read first so an older binary refuses entries written by a newer schema
//! instead of misreading them.

use super::entry::{BlockReplicaEntry, SCHEMA_VERSION};
use serde::Deserialize;
use thiserror::Error;

/// Entry (de)serialization errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("failed to encode entry: {0}")]
    Encode(String),

    #[error("failed to decode entry: {0}")]
    Decode(String),

    #[error("unsupported entry schema version {found} (this build reads {supported})")]
    UnsupportedSchema { found: u32, supported: u32 },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SchemaHeader {
    schema_version: u32,
}

/// Encode an entry for storage.
pub fn encode_entry(entry: &BlockReplicaEntry) -> Result<Vec<u8>, CodecError> {
    let mut buf = Vec::new();
    ciborium::into_writer(entry, &mut buf).map_err(|e| CodecError::Encode(e.to_string()))?;
    Ok(buf)
}

/// Decode a stored entry, checking its schema version.
pub fn decode_entry(bytes: &[u8]) -> Result<BlockReplicaEntry, CodecError> {
    let header: SchemaHeader =
        ciborium::from_reader(bytes).map_err(|e| CodecError::Decode(e.to_string()))?;
    if header.schema_version != SCHEMA_VERSION {
        return Err(CodecError::UnsupportedSchema {
            found: header.schema_version,
            supported: SCHEMA_VERSION,
        });
    }
    ciborium::from_reader(bytes).map_err(|e| CodecError::Decode(e.to_string()))
}
