//! CBOR key files for the software backends.

use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use super::BackendKind;
use crate::error::{Result, TesseraError};

const KEY_FILE_VERSION: u8 = 1;

/// Serialized form, borrowed so secret bytes are never cloned on write.
#[derive(Serialize)]
struct KeyFileOut<'a> {
    version: u8,
    algorithm: BackendKind,
    public_key: &'a [u8],
    secret_key: Option<&'a [u8]>,
}

#[derive(Deserialize)]
struct KeyFileIn {
    version: u8,
    algorithm: BackendKind,
    public_key: Vec<u8>,
    secret_key: Option<Vec<u8>>,
}

/// Key material for a software backend.
///
/// The secret key is optional: a public-only key file is enough to verify.
/// Secret bytes are zeroized when the key file is dropped.
pub struct KeyFile {
    algorithm: BackendKind,
    public_key: Vec<u8>,
    secret_key: Option<Zeroizing<Vec<u8>>>,
}

impl std::fmt::Debug for KeyFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyFile")
            .field("algorithm", &self.algorithm)
            .field("public_key", &hex::encode(&self.public_key))
            .field(
                "secret_key",
                &self.secret_key.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl KeyFile {
    pub fn new(algorithm: BackendKind, public_key: Vec<u8>, secret_key: Option<Vec<u8>>) -> Self {
        Self {
            algorithm,
            public_key,
            secret_key: secret_key.map(Zeroizing::new),
        }
    }

    /// Generate a fresh keypair for a software backend.
    ///
    /// Intended for provisioning tools and tests.
    pub fn generate(algorithm: BackendKind) -> Result<Self> {
        match algorithm {
            BackendKind::MlDsa65File => Ok(super::mldsa::generate_key_file()),
            BackendKind::Ed25519File => Ok(super::ed25519::generate_key_file()),
            BackendKind::Hardware => Err(TesseraError::BackendUnavailable(
                "hardware keys cannot be generated into a key file".into(),
            )),
        }
    }

    pub fn algorithm(&self) -> BackendKind {
        self.algorithm
    }

    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    pub fn secret_key(&self) -> Option<&[u8]> {
        self.secret_key.as_ref().map(|k| k.as_slice())
    }

    /// Copy of this key file without the secret key.
    pub fn public_only(&self) -> Self {
        Self {
            algorithm: self.algorithm,
            public_key: self.public_key.clone(),
            secret_key: None,
        }
    }

    pub fn to_cbor(&self) -> Result<Vec<u8>> {
        let out = KeyFileOut {
            version: KEY_FILE_VERSION,
            algorithm: self.algorithm,
            public_key: &self.public_key,
            secret_key: self.secret_key(),
        };

        let mut bytes = Vec::new();
        ciborium::into_writer(&out, &mut bytes)
            .map_err(|e| TesseraError::Serialization(e.to_string()))?;
        Ok(bytes)
    }

    pub fn from_cbor(bytes: &[u8]) -> Result<Self> {
        let parsed: KeyFileIn = ciborium::from_reader(bytes)
            .map_err(|e| TesseraError::Serialization(e.to_string()))?;

        if parsed.version != KEY_FILE_VERSION {
            return Err(TesseraError::Serialization(format!(
                "unsupported key file version {}",
                parsed.version
            )));
        }

        Ok(Self::new(parsed.algorithm, parsed.public_key, parsed.secret_key))
    }

    pub fn read(path: &Path) -> Result<Self> {
        let bytes = match fs::read(path) {
            Ok(bytes) => Zeroizing::new(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(TesseraError::MissingReference {
                    path: path.to_path_buf(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        Self::from_cbor(&bytes).map_err(|e| match e {
            TesseraError::Serialization(reason) => TesseraError::MalformedArtifact {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let bytes = Zeroizing::new(self.to_cbor()?);
        fs::write(path, bytes.as_slice())?;
        Ok(())
    }
}
