//! Trained-artifact persistence.
//!
//! A trained model persists as a directory of three files:
//!
//! - `manifest.json` — scaling state, combine policy, temporal model
//!   configuration, and sequence length
//! - `forest.fcst` — the bagged forest as a 16-byte header followed by a
//!   Postcard-encoded payload, CRC32-checked
//! - `temporal.safetensors` — the temporal model weights in candle's
//!   native safetensors format
//!
//! Loading happens once at process start; any missing or corrupt piece is
//! an [`ArtifactError`] and the serving process must not start.
//!
//! # Forest file layout
//!
//! ```text
//! Offset  Size  Field
//! ------  ----  -----
//! 0       4     Magic ("FCST")
//! 4       1     Version major
//! 5       1     Version minor
//! 6       2     Reserved
//! 8       4     Payload size (bytes, little-endian)
//! 12      4     CRC32 checksum of payload (little-endian)
//! ```

use std::fs;
use std::path::Path;

use candle_core::{DType, Device};
use candle_nn::{VarBuilder, VarMap};
use serde::{Deserialize, Serialize};

use crate::data::ScalingState;
use crate::ensemble::CombinePolicy;
use crate::forest::BaggedForest;
use crate::model::HybridModel;
use crate::temporal::{AttentionLstm, TemporalConfig};

/// Magic bytes identifying a floodcast forest file.
pub const MAGIC: &[u8; 4] = b"FCST";

/// Current forest format version (major).
pub const CURRENT_VERSION_MAJOR: u8 = 1;

/// Current forest format version (minor).
pub const CURRENT_VERSION_MINOR: u8 = 0;

/// Size of the forest file header in bytes.
pub const HEADER_SIZE: usize = 16;

const MANIFEST_FILE: &str = "manifest.json";
const FOREST_FILE: &str = "forest.fcst";
const TEMPORAL_FILE: &str = "temporal.safetensors";

/// Errors raised while saving or loading trained artifacts.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not a floodcast forest file")]
    NotAForest,

    #[error("forest file requires floodcast {major}.{minor} or later")]
    UnsupportedVersion { major: u8, minor: u8 },

    #[error("forest file truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("forest checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    #[error("forest payload error: {0}")]
    Payload(#[from] postcard::Error),

    #[error("manifest error: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("temporal weights error: {0}")]
    Tensor(#[from] candle_core::Error),
}

/// The JSON manifest tying the artifact bundle together.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Manifest {
    seq_len: usize,
    scaling: ScalingState,
    policy: CombinePolicy,
    temporal: TemporalConfig,
}

/// Serialize a forest into header + checked Postcard payload.
fn encode_forest(forest: &BaggedForest) -> Result<Vec<u8>, ArtifactError> {
    let payload = postcard::to_allocvec(forest)?;

    let mut bytes = Vec::with_capacity(HEADER_SIZE + payload.len());
    bytes.extend_from_slice(MAGIC);
    bytes.push(CURRENT_VERSION_MAJOR);
    bytes.push(CURRENT_VERSION_MINOR);
    bytes.extend_from_slice(&[0, 0]);
    bytes.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    bytes.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    bytes.extend_from_slice(&payload);

    Ok(bytes)
}

/// Parse and verify a forest file.
fn decode_forest(bytes: &[u8]) -> Result<BaggedForest, ArtifactError> {
    if bytes.len() < HEADER_SIZE {
        return Err(ArtifactError::Truncated {
            expected: HEADER_SIZE,
            actual: bytes.len(),
        });
    }
    if &bytes[0..4] != MAGIC {
        return Err(ArtifactError::NotAForest);
    }

    let version_major = bytes[4];
    let version_minor = bytes[5];
    if version_major > CURRENT_VERSION_MAJOR {
        return Err(ArtifactError::UnsupportedVersion {
            major: version_major,
            minor: version_minor,
        });
    }

    let payload_size =
        u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
    let expected_checksum = u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]);

    let payload = &bytes[HEADER_SIZE..];
    if payload.len() != payload_size {
        return Err(ArtifactError::Truncated {
            expected: HEADER_SIZE + payload_size,
            actual: bytes.len(),
        });
    }

    let actual_checksum = crc32fast::hash(payload);
    if actual_checksum != expected_checksum {
        return Err(ArtifactError::ChecksumMismatch {
            expected: expected_checksum,
            actual: actual_checksum,
        });
    }

    Ok(postcard::from_bytes(payload)?)
}

/// Persist a trained model into `dir`, creating it if needed.
pub fn save(dir: impl AsRef<Path>, model: &HybridModel) -> Result<(), ArtifactError> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;

    let manifest = Manifest {
        seq_len: model.seq_len,
        scaling: model.scaling.clone(),
        policy: model.policy,
        temporal: model.temporal.config(),
    };
    fs::write(
        dir.join(MANIFEST_FILE),
        serde_json::to_vec_pretty(&manifest)?,
    )?;

    fs::write(dir.join(FOREST_FILE), encode_forest(&model.forest)?)?;
    model.varmap.save(dir.join(TEMPORAL_FILE))?;

    tracing::info!(dir = %dir.display(), "saved trained artifacts");
    Ok(())
}

/// Load a trained model from `dir`.
///
/// All three files must load cleanly before this returns; the serving
/// process calls this before binding its listener, so a bad bundle is
/// fatal to startup rather than a per-request failure.
pub fn load(dir: impl AsRef<Path>) -> Result<HybridModel, ArtifactError> {
    let dir = dir.as_ref();

    let manifest: Manifest = serde_json::from_slice(&fs::read(dir.join(MANIFEST_FILE))?)?;
    let forest = decode_forest(&fs::read(dir.join(FOREST_FILE))?)?;

    let device = Device::Cpu;
    let mut varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
    let temporal = AttentionLstm::new(manifest.temporal, vb)?;
    varmap.load(dir.join(TEMPORAL_FILE))?;

    tracing::info!(dir = %dir.display(), "loaded trained artifacts");
    Ok(HybridModel::from_parts(
        forest,
        temporal,
        varmap,
        manifest.scaling,
        manifest.policy,
        manifest.seq_len,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forest::{BaggedForest, TreeBuilder};

    fn small_forest() -> BaggedForest {
        let mut builder = TreeBuilder::with_root();
        let (left, right) = builder.apply_split(0, 2, 0.25);
        builder.make_leaf(left, 0.1);
        builder.make_leaf(right, 0.9);
        BaggedForest::from_trees(vec![builder.freeze()], 4)
    }

    #[test]
    fn forest_encode_decode_roundtrip() {
        let forest = small_forest();
        let bytes = encode_forest(&forest).unwrap();
        let restored = decode_forest(&bytes).unwrap();
        assert_eq!(forest, restored);
    }

    #[test]
    fn wrong_magic_is_rejected() {
        let forest = small_forest();
        let mut bytes = encode_forest(&forest).unwrap();
        bytes[0..4].copy_from_slice(b"XXXX");
        assert!(matches!(decode_forest(&bytes), Err(ArtifactError::NotAForest)));
    }

    #[test]
    fn future_version_is_rejected() {
        let forest = small_forest();
        let mut bytes = encode_forest(&forest).unwrap();
        bytes[4] = 99;
        assert!(matches!(
            decode_forest(&bytes),
            Err(ArtifactError::UnsupportedVersion { major: 99, .. })
        ));
    }

    #[test]
    fn corruption_is_detected() {
        let forest = small_forest();
        let mut bytes = encode_forest(&forest).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(matches!(
            decode_forest(&bytes),
            Err(ArtifactError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn truncation_is_detected() {
        let forest = small_forest();
        let bytes = encode_forest(&forest).unwrap();
        assert!(matches!(
            decode_forest(&bytes[..bytes.len() - 3]),
            Err(ArtifactError::Truncated { .. })
        ));
        assert!(matches!(
            decode_forest(&bytes[..7]),
            Err(ArtifactError::Truncated { .. })
        ));
    }

    #[test]
    fn loading_a_missing_bundle_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load(dir.path().join("nope")),
            Err(ArtifactError::Io(_))
        ));
    }
}
