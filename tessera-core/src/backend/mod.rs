//! Signature backends.
//!
//! The provenance core never touches key material directly. It signs and
//! verifies 32-byte digests through a [`SignatureBackend`], so the chain and
//! image pipelines are identical whether the key lives in a file or in a
//! hardware token.
//!
//! ## Supported Backends
//!
//! - `MlDsa65File` - ML-DSA-65 (FIPS 204) key file, the default
//! - `Ed25519File` - Ed25519 key file
//! - `Hardware` - recognized in configuration, not available in this build
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::path::PathBuf;
//! use tessera_core::backend::{BackendConfig, BackendFactory, BackendKind};
//!
//! # fn example() -> tessera_core::Result<()> {
//! let backend = BackendFactory::create(&BackendConfig {
//!     kind: BackendKind::MlDsa65File,
//!     key_path: PathBuf::from("keys/tessera.key"),
//! })?;
//! let signature = backend.sign(&[0u8; 32])?;
//! assert!(backend.verify(&[0u8; 32], &signature)?);
//! # Ok(())
//! # }
//! ```

mod ed25519;
mod keyfile;
mod mldsa;

pub use ed25519::Ed25519Backend;
pub use keyfile::KeyFile;
pub use mldsa::MlDsa65Backend;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::chain::DIGEST_SIZE;
use crate::error::{Result, TesseraError};

/// Sign/verify capability over 32-byte digests.
///
/// Implementations must be thread-safe (`Send + Sync`). An invalid signature
/// is a normal `Ok(false)`; errors are reserved for unusable keys.
pub trait SignatureBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    fn sign(&self, digest: &[u8; DIGEST_SIZE]) -> Result<Vec<u8>>;

    fn verify(&self, digest: &[u8; DIGEST_SIZE], signature: &[u8]) -> Result<bool>;
}

/// Backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BackendKind {
    /// ML-DSA-65 software key file
    #[default]
    MlDsa65File,
    /// Ed25519 software key file
    Ed25519File,
    /// Hardware token or secure element
    Hardware,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MlDsa65File => write!(f, "mldsa65"),
            Self::Ed25519File => write!(f, "ed25519"),
            Self::Hardware => write!(f, "hardware"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = TesseraError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "mldsa65" | "ml-dsa-65" | "mldsa" => Ok(Self::MlDsa65File),
            "ed25519" => Ok(Self::Ed25519File),
            "hardware" | "hsm" => Ok(Self::Hardware),
            other => Err(TesseraError::BackendUnavailable(format!(
                "unknown backend '{other}' (expected mldsa65, ed25519 or hardware)"
            ))),
        }
    }
}

/// Configuration for creating a signature backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    pub kind: BackendKind,
    /// Key file for software backends, token URI for hardware ones.
    pub key_path: PathBuf,
}

/// Factory for creating signature backends.
pub struct BackendFactory;

impl BackendFactory {
    pub fn create(config: &BackendConfig) -> Result<Box<dyn SignatureBackend>> {
        match config.kind {
            BackendKind::MlDsa65File => {
                let key = KeyFile::read(&config.key_path)?;
                info!(path = %config.key_path.display(), "Loaded ML-DSA-65 key file");
                Ok(Box::new(MlDsa65Backend::from_key_file(&key)?))
            }
            BackendKind::Ed25519File => {
                let key = KeyFile::read(&config.key_path)?;
                info!(path = %config.key_path.display(), "Loaded Ed25519 key file");
                Ok(Box::new(Ed25519Backend::from_key_file(&key)?))
            }
            BackendKind::Hardware => Err(TesseraError::BackendUnavailable(
                "hardware-backed keys are not supported by this build".into(),
            )),
        }
    }

    /// Build a backend from an already loaded key file, using its algorithm.
    pub fn from_key_file(key: &KeyFile) -> Result<Box<dyn SignatureBackend>> {
        match key.algorithm() {
            BackendKind::MlDsa65File => Ok(Box::new(MlDsa65Backend::from_key_file(key)?)),
            BackendKind::Ed25519File => Ok(Box::new(Ed25519Backend::from_key_file(key)?)),
            BackendKind::Hardware => Err(TesseraError::BackendUnavailable(
                "key file cannot describe a hardware-backed key".into(),
            )),
        }
    }
}

pub(crate) fn expect_algorithm(key: &KeyFile, kind: BackendKind) -> Result<()> {
    if key.algorithm() != kind {
        return Err(TesseraError::Signature(format!(
            "key file holds a {} key, backend expects {}",
            key.algorithm(),
            kind
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_kind_parsing() {
        assert_eq!("mldsa65".parse::<BackendKind>().unwrap(), BackendKind::MlDsa65File);
        assert_eq!("ML-DSA-65".parse::<BackendKind>().unwrap(), BackendKind::MlDsa65File);
        assert_eq!("ed25519".parse::<BackendKind>().unwrap(), BackendKind::Ed25519File);
        assert_eq!("hsm".parse::<BackendKind>().unwrap(), BackendKind::Hardware);
        assert!("rsa".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_backend_kind_display_roundtrips() {
        for kind in [
            BackendKind::MlDsa65File,
            BackendKind::Ed25519File,
            BackendKind::Hardware,
        ] {
            assert_eq!(kind.to_string().parse::<BackendKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_hardware_backend_unavailable() {
        let result = BackendFactory::create(&BackendConfig {
            kind: BackendKind::Hardware,
            key_path: PathBuf::from("pkcs11:token=tessera"),
        });
        assert!(matches!(result, Err(TesseraError::BackendUnavailable(_))));
    }

    #[test]
    fn test_factory_loads_key_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signer.key");
        KeyFile::generate(BackendKind::Ed25519File)
            .unwrap()
            .write(&path)
            .unwrap();

        let backend = BackendFactory::create(&BackendConfig {
            kind: BackendKind::Ed25519File,
            key_path: path.clone(),
        })
        .unwrap();
        assert_eq!(backend.kind(), BackendKind::Ed25519File);

        let mismatched = BackendFactory::create(&BackendConfig {
            kind: BackendKind::MlDsa65File,
            key_path: path,
        });
        assert!(matches!(mismatched, Err(TesseraError::Signature(_))));
    }

    #[test]
    fn test_factory_missing_key_file() {
        let result = BackendFactory::create(&BackendConfig {
            kind: BackendKind::MlDsa65File,
            key_path: PathBuf::from("/nonexistent/tessera.key"),
        });
        assert!(matches!(result, Err(TesseraError::MissingReference { .. })));
    }
}
