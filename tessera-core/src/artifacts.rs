//! Provenance artifacts on disk.
//!
//! Signing writes a small set of files into an artifact directory and
//! verification reads them back. File names are fixed so that artifacts
//! produced by one signer can be checked by any verifier:
//!
//! | Artifact | Image | Video |
//! |----------|-------|-------|
//! | signature | `signature.sig` | `video_sig.bin` |
//! | reference | `ahash.bin` (8-byte fingerprint) | `video_chain.bin` (chain links) |
//!
//! Reads distinguish a missing artifact ([`TesseraError::MissingReference`])
//! from one that exists but cannot be parsed
//! ([`TesseraError::MalformedArtifact`]).

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{Result, TesseraError};
use crate::perceptual::{Fingerprint, FINGERPRINT_SIZE};

pub const IMAGE_SIGNATURE_FILE: &str = "signature.sig";
pub const IMAGE_FINGERPRINT_FILE: &str = "ahash.bin";
pub const VIDEO_CHAIN_FILE: &str = "video_chain.bin";
pub const VIDEO_SIGNATURE_FILE: &str = "video_sig.bin";

/// Artifact paths for a signed image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageArtifacts {
    pub signature: PathBuf,
    pub fingerprint: PathBuf,
}

impl ImageArtifacts {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            signature: dir.join(IMAGE_SIGNATURE_FILE),
            fingerprint: dir.join(IMAGE_FINGERPRINT_FILE),
        }
    }

    pub fn write_signature(&self, signature: &[u8]) -> Result<()> {
        write_artifact(&self.signature, signature)
    }

    pub fn read_signature(&self) -> Result<Vec<u8>> {
        read_artifact(&self.signature)
    }

    pub fn write_fingerprint(&self, fingerprint: Fingerprint) -> Result<()> {
        write_artifact(&self.fingerprint, &fingerprint.to_le_bytes())
    }

    pub fn read_fingerprint(&self) -> Result<Fingerprint> {
        let bytes = read_artifact(&self.fingerprint)?;
        Fingerprint::from_slice(&bytes).ok_or_else(|| TesseraError::MalformedArtifact {
            path: self.fingerprint.clone(),
            reason: format!(
                "fingerprint must be {FINGERPRINT_SIZE} bytes, found {}",
                bytes.len()
            ),
        })
    }
}

/// Artifact paths for a signed video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoArtifacts {
    pub chain: PathBuf,
    pub signature: PathBuf,
}

impl VideoArtifacts {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            chain: dir.join(VIDEO_CHAIN_FILE),
            signature: dir.join(VIDEO_SIGNATURE_FILE),
        }
    }

    pub fn write_signature(&self, signature: &[u8]) -> Result<()> {
        write_artifact(&self.signature, signature)
    }

    pub fn read_signature(&self) -> Result<Vec<u8>> {
        read_artifact(&self.signature)
    }
}

pub(crate) fn read_artifact(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => TesseraError::MissingReference {
            path: path.to_path_buf(),
        },
        _ => TesseraError::Io(e),
    })
}

pub(crate) fn write_artifact(path: &Path, bytes: &[u8]) -> Result<()> {
    ensure_parent(path)?;
    fs::write(path, bytes)?;
    Ok(())
}

pub(crate) fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}
