//! Wire form of the replicated snapshot: compact JSON, carried as base64
//! inside the remote file API.

use crate::errors::CodecError;
use crate::models::Snapshot;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Deterministic JSON bytes. Entries live in a `BTreeMap`, so two equal
/// snapshots always serialize to the same bytes.
pub fn to_canonical_json(snapshot: &Snapshot) -> Result<Vec<u8>, CodecError> {
    Ok(serde_json::to_vec(snapshot)?)
}

pub fn encode_content(snapshot: &Snapshot) -> Result<String, CodecError> {
    Ok(STANDARD.encode(to_canonical_json(snapshot)?))
}

/// Accepts base64 with embedded line breaks, as file APIs commonly wrap it.
pub fn decode_content(content: &str) -> Result<Snapshot, CodecError> {
    let compact: String = content.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = STANDARD.decode(compact)?;
    let text = String::from_utf8(bytes)?;
    Ok(serde_json::from_str(&text)?)
}
