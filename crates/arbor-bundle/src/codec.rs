//! Record framing for bundles and reference lists.
//!
//! ```text
//! [4 bytes: payload length (little-endian u32)]
//! [4 bytes: CRC32 of payload (little-endian u32)]
//! [N bytes: bincode payload]
//! ```

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::bundle::NodePropBundle;
use crate::error::{StorageError, StorageResult};

/// Header size: 4 bytes length + 4 bytes CRC.
pub const HEADER_SIZE: usize = 8;

/// Serialize and frame a record.
pub fn encode<T: Serialize>(value: &T) -> StorageResult<Vec<u8>> {
    let payload =
        bincode::serialize(value).map_err(|e| StorageError::Serialization(e.to_string()))?;
    let length = u32::try_from(payload.len()).map_err(|_| {
        StorageError::Serialization(format!("record too large: {} bytes", payload.len()))
    })?;
    let crc = crc32fast::hash(&payload);

    let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
    out.extend_from_slice(&length.to_le_bytes());
    out.extend_from_slice(&crc.to_le_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Check the framing of `bytes` and deserialize the payload. `what` names
/// the record in errors.
pub fn decode<T: DeserializeOwned>(bytes: &[u8], what: &str) -> StorageResult<T> {
    let corrupt = |reason: String| StorageError::Corrupt {
        what: what.to_string(),
        reason,
    };
    if bytes.len() < HEADER_SIZE {
        return Err(corrupt(format!("truncated header ({} bytes)", bytes.len())));
    }
    let length = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    let expected_crc = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    let payload = &bytes[HEADER_SIZE..];
    if payload.len() != length {
        return Err(corrupt(format!(
            "length mismatch: header says {length}, found {}",
            payload.len()
        )));
    }
    let actual_crc = crc32fast::hash(payload);
    if actual_crc != expected_crc {
        return Err(corrupt(format!(
            "checksum mismatch: expected {expected_crc:08x}, got {actual_crc:08x}"
        )));
    }
    bincode::deserialize(payload).map_err(|e| corrupt(e.to_string()))
}

pub fn encode_bundle(bundle: &NodePropBundle) -> StorageResult<Vec<u8>> {
    encode(bundle)
}

/// Decode a bundle record. The result is marked as in sync with storage.
pub fn decode_bundle(bytes: &[u8], what: &str) -> StorageResult<NodePropBundle> {
    let mut bundle: NodePropBundle = decode(bytes, what)?;
    bundle.mark_old();
    Ok(bundle)
}
