//! Sign and verify pipelines for images and videos.
//!
//! The pipelines tie the engines together: pixel buffers and frame sources
//! go in, artifacts are written or read through [`crate::artifacts`], and
//! every signature goes through a [`SignatureBackend`].

use std::fs::File;
use std::io::BufWriter;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::artifacts::{ensure_parent, ImageArtifacts, VideoArtifacts};
use crate::backend::SignatureBackend;
use crate::chain::{
    ChainBuilder, ChainDigest, ChainFormat, ChainHashAlgorithm, ChainReader, ChainVerifier,
    ChainWriter, TamperReport, DIGEST_SIZE,
};
use crate::error::{Result, TesseraError};
use crate::frames::FrameSource;
use crate::perceptual::{Fingerprint, PixelBuffer};
use crate::policy::{IdentityVerdict, VerificationPolicy, VerificationReport};

/// Result of signing an image.
#[derive(Debug, Clone, Serialize)]
pub struct ImageSignature {
    pub fingerprint: Fingerprint,
    #[serde(serialize_with = "serialize_hex")]
    pub digest: [u8; DIGEST_SIZE],
    pub signature_len: usize,
}

/// Result of verifying an image.
#[derive(Debug, Clone, Serialize)]
pub struct ImageVerification {
    pub report: VerificationReport,
    /// Fingerprint of the presented image.
    pub current: Fingerprint,
    /// Fingerprint recorded at signing time, if one was found.
    pub stored: Option<Fingerprint>,
}

/// Image signing and verification against one artifact directory.
pub struct ImagePipeline<'a> {
    backend: &'a dyn SignatureBackend,
    artifacts: ImageArtifacts,
    policy: VerificationPolicy,
}

impl<'a> ImagePipeline<'a> {
    pub fn new(backend: &'a dyn SignatureBackend, artifacts: ImageArtifacts) -> Self {
        Self {
            backend,
            artifacts,
            policy: VerificationPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: VerificationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn artifacts(&self) -> &ImageArtifacts {
        &self.artifacts
    }

    /// Sign the decoded pixels and record their fingerprint.
    pub fn sign(&self, image: &PixelBuffer) -> Result<ImageSignature> {
        let fingerprint = image.fingerprint()?;
        let digest = image.digest();
        let signature = self.backend.sign(&digest)?;

        self.artifacts.write_signature(&signature)?;
        self.artifacts.write_fingerprint(fingerprint)?;

        info!(
            width = image.width(),
            height = image.height(),
            fingerprint = %fingerprint,
            backend = %self.backend.kind(),
            "Signed image"
        );

        Ok(ImageSignature {
            fingerprint,
            digest,
            signature_len: signature.len(),
        })
    }

    /// Grade the presented pixels on both axes.
    ///
    /// A missing signature degrades identity to `WARNING`, a missing
    /// fingerprint yields `NO REFERENCE` on the content axis. Neither is an
    /// error; malformed artifacts are.
    pub fn verify(&self, image: &PixelBuffer) -> Result<ImageVerification> {
        let current = image.fingerprint()?;

        let identity_ok = match self.artifacts.read_signature() {
            Ok(signature) => self.backend.verify(&image.digest(), &signature)?,
            Err(TesseraError::MissingReference { path }) => {
                warn!(path = %path.display(), "No image signature found");
                false
            }
            Err(e) => return Err(e),
        };

        let stored = match self.artifacts.read_fingerprint() {
            Ok(fingerprint) => Some(fingerprint),
            Err(TesseraError::MissingReference { path }) => {
                warn!(path = %path.display(), "No stored fingerprint found");
                None
            }
            Err(e) => return Err(e),
        };

        let distance = stored.map(|s| s.distance(&current));
        let report = self.policy.evaluate(identity_ok, distance);

        info!(
            identity = %report.identity,
            content = %report.content,
            distance = ?distance,
            "Verified image"
        );

        Ok(ImageVerification {
            report,
            current,
            stored,
        })
    }
}

/// Result of signing a video.
#[derive(Debug, Clone, Serialize)]
pub struct VideoSignature {
    pub frames: u64,
    pub root: ChainDigest,
    pub signature_len: usize,
}

/// Outcome of a video verification run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VideoOutcome {
    /// Every frame matched and the root signature is valid.
    Verified { frames: u64, root: ChainDigest },
    /// Every frame matched but the root signature does not verify.
    SignatureInvalid { frames: u64, root: ChainDigest },
    /// Every frame matched but no root signature was found.
    SignatureMissing { frames: u64, root: ChainDigest },
    /// The first frame whose recomputed digest diverged.
    Tampered(TamperReport),
}

impl VideoOutcome {
    pub fn identity(&self) -> IdentityVerdict {
        IdentityVerdict::from_signature(matches!(self, Self::Verified { .. }))
    }
}

/// Result of verifying a video.
#[derive(Debug, Clone, Serialize)]
pub struct VideoVerification {
    pub outcome: VideoOutcome,
    pub format: ChainFormat,
    pub algorithm: ChainHashAlgorithm,
}

/// Video chaining and verification against one artifact directory.
pub struct VideoPipeline<'a> {
    backend: &'a dyn SignatureBackend,
    artifacts: VideoArtifacts,
    chain_format: ChainFormat,
    algorithm: ChainHashAlgorithm,
}

impl<'a> VideoPipeline<'a> {
    pub fn new(backend: &'a dyn SignatureBackend, artifacts: VideoArtifacts) -> Self {
        Self {
            backend,
            artifacts,
            chain_format: ChainFormat::default(),
            algorithm: ChainHashAlgorithm::default(),
        }
    }

    /// Layout used for newly written chain files.
    pub fn with_chain_format(mut self, format: ChainFormat) -> Self {
        self.chain_format = format;
        self
    }

    /// Hash used for newly written chains. Verification always uses the
    /// algorithm recorded in the chain file.
    pub fn with_algorithm(mut self, algorithm: ChainHashAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn artifacts(&self) -> &VideoArtifacts {
        &self.artifacts
    }

    /// Chain every frame, write the links as they are produced, then sign
    /// the root. An empty source signs [`ChainDigest::ZERO`].
    pub fn sign(&self, source: &mut dyn FrameSource) -> Result<VideoSignature> {
        let mut builder = ChainBuilder::new(source.frame_size())?.with_algorithm(self.algorithm);
        ensure_parent(&self.artifacts.chain)?;
        let file = BufWriter::new(File::create(&self.artifacts.chain)?);
        let mut writer = ChainWriter::new(file, self.chain_format, self.algorithm)?;

        while let Some(frame) = source.next_frame()? {
            let digest = builder.push(&frame)?;
            writer.append(&digest)?;
        }
        writer.finish()?;

        let root = builder.root();
        let signature = self.backend.sign(root.as_bytes())?;
        self.artifacts.write_signature(&signature)?;

        info!(
            frames = builder.frame_count(),
            root = %root,
            format = ?self.chain_format,
            backend = %self.backend.kind(),
            "Signed video"
        );

        Ok(VideoSignature {
            frames: builder.frame_count(),
            root,
            signature_len: signature.len(),
        })
    }

    /// Recompute the chain from `source` and compare it with the stored one.
    ///
    /// Tampering is an outcome, not an error. A missing chain file, frame
    /// size or length mismatches and malformed artifacts are errors.
    pub fn verify(&self, source: &mut dyn FrameSource) -> Result<VideoVerification> {
        let links = ChainReader::open(&self.artifacts.chain)?;
        let format = links.format();
        let algorithm = links.algorithm();
        debug!(
            links = links.len(),
            format = ?format,
            algorithm = %algorithm,
            "Opened stored chain"
        );

        let mut verifier =
            ChainVerifier::new(source.frame_size(), links)?.with_algorithm(algorithm);

        while let Some(frame) = source.next_frame()? {
            match verifier.check(&frame) {
                Ok(_) => {}
                Err(TesseraError::Tampered(report)) => {
                    warn!(frame = report.frame_index, "Tampering detected");
                    return Ok(VideoVerification {
                        outcome: VideoOutcome::Tampered(report),
                        format,
                        algorithm,
                    });
                }
                Err(e) => return Err(e),
            }
        }

        let frames = verifier.frames_checked();
        let root = verifier.finish()?;

        let outcome = match self.artifacts.read_signature() {
            Ok(signature) => {
                if self.backend.verify(root.as_bytes(), &signature)? {
                    VideoOutcome::Verified { frames, root }
                } else {
                    warn!(root = %root, "Root signature invalid");
                    VideoOutcome::SignatureInvalid { frames, root }
                }
            }
            Err(TesseraError::MissingReference { path }) => {
                warn!(path = %path.display(), "No video signature found");
                VideoOutcome::SignatureMissing { frames, root }
            }
            Err(e) => return Err(e),
        };

        info!(frames, root = %root, identity = %outcome.identity(), "Verified video");

        Ok(VideoVerification {
            outcome,
            format,
            algorithm,
        })
    }
}

fn serialize_hex<S>(bytes: &[u8; DIGEST_SIZE], s: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    s.serialize_str(&hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendFactory, BackendKind, KeyFile};
    use crate::chain::build_chain;
    use crate::frames::VecFrameSource;
    use crate::policy::ContentVerdict;

    const FRAME: usize = 48;

    fn ed25519() -> Box<dyn SignatureBackend> {
        let key = KeyFile::generate(BackendKind::Ed25519File).unwrap();
        BackendFactory::from_key_file(&key).unwrap()
    }

    fn frames(n: u8) -> Vec<Vec<u8>> {
        (0..n).map(|i| vec![i.wrapping_mul(37); FRAME]).collect()
    }

    fn gradient(width: u32, height: u32) -> PixelBuffer {
        let pixels = (0..height)
            .flat_map(|y| (0..width).flat_map(move |x| [(x * 8) as u8, (y * 8) as u8, 128]))
            .collect();
        PixelBuffer::new(width, height, 3, pixels).unwrap()
    }

    #[test]
    fn test_video_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ed25519();
        let pipeline = VideoPipeline::new(backend.as_ref(), VideoArtifacts::in_dir(dir.path()));

        let signed = pipeline
            .sign(&mut VecFrameSource::new(FRAME, frames(5)))
            .unwrap();
        assert_eq!(signed.frames, 5);
        assert_eq!(signed.root, build_chain(FRAME, frames(5)).unwrap().root);

        let verified = pipeline
            .verify(&mut VecFrameSource::new(FRAME, frames(5)))
            .unwrap();
        assert_eq!(
            verified.outcome,
            VideoOutcome::Verified {
                frames: 5,
                root: signed.root
            }
        );
        assert_eq!(verified.format, ChainFormat::Legacy);
    }

    #[test]
    fn test_video_tamper_is_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ed25519();
        let pipeline = VideoPipeline::new(backend.as_ref(), VideoArtifacts::in_dir(dir.path()));
        pipeline
            .sign(&mut VecFrameSource::new(FRAME, frames(4)))
            .unwrap();

        let mut altered = frames(4);
        altered[2][0] ^= 0xFF;
        let verified = pipeline
            .verify(&mut VecFrameSource::new(FRAME, altered))
            .unwrap();

        match verified.outcome {
            VideoOutcome::Tampered(report) => assert_eq!(report.frame_index, 2),
            other => panic!("expected tamper, got {other:?}"),
        }
        assert_eq!(verified.outcome.identity(), IdentityVerdict::Warning);
    }

    #[test]
    fn test_video_missing_signature_and_chain() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ed25519();
        let artifacts = VideoArtifacts::in_dir(dir.path());
        let pipeline = VideoPipeline::new(backend.as_ref(), artifacts.clone());

        assert!(matches!(
            pipeline.verify(&mut VecFrameSource::new(FRAME, frames(1))),
            Err(TesseraError::MissingReference { .. })
        ));

        pipeline
            .sign(&mut VecFrameSource::new(FRAME, frames(2)))
            .unwrap();
        std::fs::remove_file(&artifacts.signature).unwrap();

        let verified = pipeline
            .verify(&mut VecFrameSource::new(FRAME, frames(2)))
            .unwrap();
        assert!(matches!(
            verified.outcome,
            VideoOutcome::SignatureMissing { frames: 2, .. }
        ));
    }

    #[test]
    fn test_video_signature_from_other_key() {
        let dir = tempfile::tempdir().unwrap();
        let signer = ed25519();
        let other = ed25519();
        let artifacts = VideoArtifacts::in_dir(dir.path());

        VideoPipeline::new(signer.as_ref(), artifacts.clone())
            .sign(&mut VecFrameSource::new(FRAME, frames(3)))
            .unwrap();
        let verified = VideoPipeline::new(other.as_ref(), artifacts)
            .verify(&mut VecFrameSource::new(FRAME, frames(3)))
            .unwrap();

        assert!(matches!(
            verified.outcome,
            VideoOutcome::SignatureInvalid { frames: 3, .. }
        ));
    }

    #[test]
    fn test_video_length_mismatch_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ed25519();
        let pipeline = VideoPipeline::new(backend.as_ref(), VideoArtifacts::in_dir(dir.path()));
        pipeline
            .sign(&mut VecFrameSource::new(FRAME, frames(3)))
            .unwrap();

        let err = pipeline
            .verify(&mut VecFrameSource::new(FRAME, frames(2)))
            .unwrap_err();
        assert!(matches!(
            err,
            TesseraError::ChainLengthMismatch {
                expected_links: 3,
                observed_frames: 2
            }
        ));
    }

    #[test]
    fn test_video_zero_frame_size_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ed25519();
        let artifacts = VideoArtifacts::in_dir(dir.path());
        let pipeline = VideoPipeline::new(backend.as_ref(), artifacts.clone());

        assert!(matches!(
            pipeline.sign(&mut VecFrameSource::new(0, Vec::new())),
            Err(TesseraError::InvalidFrameGeometry(_))
        ));
        assert!(!artifacts.chain.exists());

        pipeline
            .sign(&mut VecFrameSource::new(FRAME, Vec::new()))
            .unwrap();
        assert!(matches!(
            pipeline.verify(&mut VecFrameSource::new(0, Vec::new())),
            Err(TesseraError::InvalidFrameGeometry(_))
        ));
    }

    #[test]
    fn test_versioned_sha3_chain() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ed25519();
        let pipeline = VideoPipeline::new(backend.as_ref(), VideoArtifacts::in_dir(dir.path()))
            .with_chain_format(ChainFormat::Versioned)
            .with_algorithm(ChainHashAlgorithm::Sha3_256);

        pipeline
            .sign(&mut VecFrameSource::new(FRAME, frames(3)))
            .unwrap();

        // Verification follows the file, not the pipeline defaults.
        let verifier = VideoPipeline::new(backend.as_ref(), VideoArtifacts::in_dir(dir.path()));
        let verified = verifier
            .verify(&mut VecFrameSource::new(FRAME, frames(3)))
            .unwrap();
        assert_eq!(verified.format, ChainFormat::Versioned);
        assert_eq!(verified.algorithm, ChainHashAlgorithm::Sha3_256);
        assert_eq!(verified.outcome.identity(), IdentityVerdict::Verified);
    }

    #[test]
    fn test_image_roundtrip_and_missing_references() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ed25519();
        let artifacts = ImageArtifacts::in_dir(dir.path());
        let pipeline = ImagePipeline::new(backend.as_ref(), artifacts.clone());
        let image = gradient(32, 32);

        let signed = pipeline.sign(&image).unwrap();
        let verified = pipeline.verify(&image).unwrap();
        assert_eq!(verified.report.identity, IdentityVerdict::Verified);
        assert_eq!(verified.report.content, ContentVerdict::Identical);
        assert_eq!(verified.stored, Some(signed.fingerprint));

        std::fs::remove_file(&artifacts.fingerprint).unwrap();
        let verified = pipeline.verify(&image).unwrap();
        assert_eq!(verified.report.content, ContentVerdict::NoReferenceAvailable);

        std::fs::remove_file(&artifacts.signature).unwrap();
        let verified = pipeline.verify(&image).unwrap();
        assert_eq!(verified.report.identity, IdentityVerdict::Warning);
    }

    #[test]
    fn test_image_pixel_change_breaks_identity() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ed25519();
        let pipeline = ImagePipeline::new(backend.as_ref(), ImageArtifacts::in_dir(dir.path()));
        let image = gradient(32, 32);
        pipeline.sign(&image).unwrap();

        // One pixel that is never sampled by the 8x8 grid.
        let mut pixels = image.as_bytes().to_vec();
        let idx = (32 + 1) * 3;
        pixels[idx] ^= 0x01;
        let touched = PixelBuffer::new(32, 32, 3, pixels).unwrap();

        let verified = pipeline.verify(&touched).unwrap();
        assert_eq!(verified.report.identity, IdentityVerdict::Warning);
        assert_eq!(verified.report.content, ContentVerdict::Identical);
    }
}
