//! ML-DSA-65 (FIPS 204) key-file backend.

use pqcrypto_mldsa::mldsa65;
use pqcrypto_traits::sign::{DetachedSignature, PublicKey, SecretKey};
use zeroize::Zeroizing;

use super::{expect_algorithm, BackendKind, KeyFile, SignatureBackend};
use crate::chain::DIGEST_SIZE;
use crate::error::{Result, TesseraError};

/// ML-DSA-65 public key size in bytes.
pub const MLDSA65_PUBLIC_KEY_BYTES: usize = 1952;
/// ML-DSA-65 secret key size in bytes.
pub const MLDSA65_SECRET_KEY_BYTES: usize = 4032;
/// ML-DSA-65 detached signature size in bytes.
pub const MLDSA65_SIGNATURE_BYTES: usize = 3309;

/// Signs digests with a detached ML-DSA-65 signature.
pub struct MlDsa65Backend {
    public_key: mldsa65::PublicKey,
    secret_key: Option<Zeroizing<Vec<u8>>>,
}

impl MlDsa65Backend {
    pub fn from_key_file(key: &KeyFile) -> Result<Self> {
        expect_algorithm(key, BackendKind::MlDsa65File)?;

        let public_key = mldsa65::PublicKey::from_bytes(key.public_key())
            .map_err(|_| TesseraError::Signature("Invalid ML-DSA-65 public key".into()))?;

        let secret_key = match key.secret_key() {
            Some(bytes) => {
                // Parse once up front so a corrupt key fails at load time.
                mldsa65::SecretKey::from_bytes(bytes).map_err(|_| {
                    TesseraError::Signature("Invalid ML-DSA-65 secret key".into())
                })?;
                Some(Zeroizing::new(bytes.to_vec()))
            }
            None => None,
        };

        Ok(Self {
            public_key,
            secret_key,
        })
    }
}

impl SignatureBackend for MlDsa65Backend {
    fn kind(&self) -> BackendKind {
        BackendKind::MlDsa65File
    }

    fn sign(&self, digest: &[u8; DIGEST_SIZE]) -> Result<Vec<u8>> {
        let bytes = self
            .secret_key
            .as_ref()
            .ok_or(TesseraError::MissingSecretKey)?;
        let secret_key = mldsa65::SecretKey::from_bytes(bytes)
            .map_err(|_| TesseraError::Signature("Invalid ML-DSA-65 secret key".into()))?;

        let signature = mldsa65::detached_sign(digest, &secret_key);
        Ok(signature.as_bytes().to_vec())
    }

    fn verify(&self, digest: &[u8; DIGEST_SIZE], signature: &[u8]) -> Result<bool> {
        let Ok(signature) = mldsa65::DetachedSignature::from_bytes(signature) else {
            return Ok(false);
        };
        Ok(mldsa65::verify_detached_signature(&signature, digest, &self.public_key).is_ok())
    }
}

pub(super) fn generate_key_file() -> KeyFile {
    let (public_key, secret_key) = mldsa65::keypair();
    KeyFile::new(
        BackendKind::MlDsa65File,
        public_key.as_bytes().to_vec(),
        Some(secret_key.as_bytes().to_vec()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> (MlDsa65Backend, KeyFile) {
        let key = KeyFile::generate(BackendKind::MlDsa65File).unwrap();
        (MlDsa65Backend::from_key_file(&key).unwrap(), key)
    }

    #[test]
    fn test_key_sizes() {
        assert_eq!(mldsa65::public_key_bytes(), MLDSA65_PUBLIC_KEY_BYTES);
        assert_eq!(mldsa65::secret_key_bytes(), MLDSA65_SECRET_KEY_BYTES);
        assert_eq!(mldsa65::signature_bytes(), MLDSA65_SIGNATURE_BYTES);
    }

    #[test]
    fn test_sign_and_verify() {
        let (backend, _) = backend();
        let digest = [7u8; DIGEST_SIZE];

        let signature = backend.sign(&digest).unwrap();
        assert_eq!(signature.len(), MLDSA65_SIGNATURE_BYTES);
        assert!(backend.verify(&digest, &signature).unwrap());

        let mut other = digest;
        other[0] ^= 1;
        assert!(!backend.verify(&other, &signature).unwrap());
    }

    #[test]
    fn test_malformed_signature_is_invalid_not_error() {
        let (backend, _) = backend();
        assert!(!backend.verify(&[0u8; DIGEST_SIZE], b"short").unwrap());
    }

    #[test]
    fn test_public_only_key_verifies_but_cannot_sign() {
        let (signer, key) = backend();
        let digest = [9u8; DIGEST_SIZE];
        let signature = signer.sign(&digest).unwrap();

        let verifier = MlDsa65Backend::from_key_file(&key.public_only()).unwrap();
        assert!(verifier.verify(&digest, &signature).unwrap());
        assert!(matches!(
            verifier.sign(&digest),
            Err(TesseraError::MissingSecretKey)
        ));
    }

    #[test]
    fn test_signature_from_other_key_is_rejected() {
        let (a, _) = backend();
        let (b, _) = backend();
        let digest = [1u8; DIGEST_SIZE];
        assert!(!b.verify(&digest, &a.sign(&digest).unwrap()).unwrap());
    }
}
