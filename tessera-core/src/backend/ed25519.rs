//! Ed25519 key-file backend.

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use rand::rngs::OsRng;

use super::{expect_algorithm, BackendKind, KeyFile, SignatureBackend};
use crate::chain::DIGEST_SIZE;
use crate::error::{Result, TesseraError};

/// Signs digests with Ed25519; signatures are 64 bytes.
pub struct Ed25519Backend {
    verifying_key: VerifyingKey,
    signing_key: Option<SigningKey>,
}

impl Ed25519Backend {
    pub fn from_key_file(key: &KeyFile) -> Result<Self> {
        expect_algorithm(key, BackendKind::Ed25519File)?;

        let public: [u8; 32] = key
            .public_key()
            .try_into()
            .map_err(|_| TesseraError::Signature("Ed25519 public key must be 32 bytes".into()))?;
        let verifying_key = VerifyingKey::from_bytes(&public)
            .map_err(|e| TesseraError::Signature(format!("invalid Ed25519 public key: {e}")))?;

        let signing_key = match key.secret_key() {
            Some(bytes) => {
                let secret: &[u8; 32] = bytes.try_into().map_err(|_| {
                    TesseraError::Signature("Ed25519 secret key must be 32 bytes".into())
                })?;
                let signing_key = SigningKey::from_bytes(secret);
                if signing_key.verifying_key() != verifying_key {
                    return Err(TesseraError::Signature(
                        "Ed25519 secret key does not match public key".into(),
                    ));
                }
                Some(signing_key)
            }
            None => None,
        };

        Ok(Self {
            verifying_key,
            signing_key,
        })
    }
}

impl SignatureBackend for Ed25519Backend {
    fn kind(&self) -> BackendKind {
        BackendKind::Ed25519File
    }

    fn sign(&self, digest: &[u8; DIGEST_SIZE]) -> Result<Vec<u8>> {
        let signing_key = self
            .signing_key
            .as_ref()
            .ok_or(TesseraError::MissingSecretKey)?;
        Ok(signing_key.sign(digest).to_bytes().to_vec())
    }

    fn verify(&self, digest: &[u8; DIGEST_SIZE], signature: &[u8]) -> Result<bool> {
        let Ok(signature) = Signature::from_slice(signature) else {
            return Ok(false);
        };
        Ok(self.verifying_key.verify_strict(digest, &signature).is_ok())
    }
}

pub(super) fn generate_key_file() -> KeyFile {
    let signing_key = SigningKey::generate(&mut OsRng);
    KeyFile::new(
        BackendKind::Ed25519File,
        signing_key.verifying_key().to_bytes().to_vec(),
        Some(signing_key.to_bytes().to_vec()),
    )
}
