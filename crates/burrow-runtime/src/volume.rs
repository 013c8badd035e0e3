//! Volume list codec for the re-exec boundary.
//!
//! The parent normalizes the requested volumes, serializes them with
//! `bincode` and hex-encodes the bytes so they survive as one environment
//! variable. The child decodes them before touching any mount.

use std::path::Path;

use burrow_common::constants::ENV_MOUNTS;
use burrow_common::error::{BurrowError, Result};
use burrow_common::types::VolumeMount;

/// Normalizes `volumes` against `cwd` and encodes them.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode(volumes: &[VolumeMount], cwd: &Path) -> Result<String> {
    let normalized: Vec<VolumeMount> = volumes.iter().map(|v| v.normalized(cwd)).collect();
    let bytes = bincode::serialize(&normalized).map_err(|e| BurrowError::Codec {
        message: format!("serializing volumes: {e}"),
    })?;
    Ok(hex::encode(bytes))
}

/// Decodes a string produced by [`encode`].
///
/// # Errors
///
/// Returns an error if the text is not hex or the bytes are not a volume list.
pub fn decode(encoded: &str) -> Result<Vec<VolumeMount>> {
    let bytes = hex::decode(encoded.trim()).map_err(|e| BurrowError::Codec {
        message: format!("volume list is not hex: {e}"),
    })?;
    bincode::deserialize(&bytes).map_err(|e| BurrowError::Codec {
        message: format!("deserializing volumes: {e}"),
    })
}

/// Decodes the volume list handed over in the environment.
///
/// # Errors
///
/// Returns an error if the variable is absent or malformed. An absent
/// variable never means "no volumes".
pub fn decode_from_env() -> Result<Vec<VolumeMount>> {
    let encoded = std::env::var(ENV_MOUNTS).map_err(|e| BurrowError::Codec {
        message: format!("{ENV_MOUNTS}: {e}"),
    })?;
    decode(&encoded)
}
