//! Metadata key encoding for chain descriptors.
//!
//! Every descriptor lives under `"{namespace}/{hex(segment name)}"`. Hex
//! encoding keeps arbitrary segment names (which may contain `/`) out of the
//! key path structure and preserves byte ordering for prefix scans.

use crate::error::SegmentError;

/// Builds the metadata key of a segment's chain descriptor.
pub(crate) fn chain_key(namespace: &str, name: &str) -> Vec<u8> {
    format!("{namespace}/{}", encode_name(name)).into_bytes()
}

/// Builds the prefix shared by all descriptor keys of a namespace.
pub(crate) fn namespace_prefix(namespace: &str) -> Vec<u8> {
    format!("{namespace}/").into_bytes()
}

/// Recovers a segment name from a descriptor key listed under `namespace`.
///
/// Returns `None` for a key of a nested namespace: hex names never contain
/// `/`, so a further separator after the prefix marks a child namespace.
pub(crate) fn name_from_key(namespace: &str, key: &[u8]) -> Result<Option<String>, SegmentError> {
    let prefix = namespace_prefix(namespace);
    let encoded = key.strip_prefix(prefix.as_slice()).ok_or_else(|| {
        SegmentError::invalid_argument(format!(
            "key '{}' is outside namespace '{namespace}'",
            String::from_utf8_lossy(key)
        ))
    })?;
    let encoded = std::str::from_utf8(encoded)
        .map_err(|e| SegmentError::invalid_argument(format!("non-UTF-8 descriptor key: {e}")))?;
    if encoded.contains('/') {
        return Ok(None);
    }
    decode_name(encoded).map(Some)
}

fn encode_name(name: &str) -> String {
    hex::encode(name.as_bytes())
}

fn decode_name(encoded: &str) -> Result<String, SegmentError> {
    let bytes = hex::decode(encoded)
        .map_err(|e| SegmentError::invalid_argument(format!("bad descriptor key '{encoded}': {e}")))?;
    String::from_utf8(bytes)
        .map_err(|e| SegmentError::invalid_argument(format!("bad descriptor key '{encoded}': {e}")))
}
