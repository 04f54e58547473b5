//! Tessera Core - media provenance for images and video
//!
//! This crate provides the engines behind Tessera provenance artifacts:
//! hash-chained video frames, perceptual image fingerprints, and a
//! verification policy that keeps bit-exact identity separate from visual
//! similarity.
//!
//! # Features
//!
//! - Per-frame SHA-256 hash chain with exact tamper localization
//! - Streaming chain construction and verification in constant memory
//! - 64-bit average-hash fingerprints for images
//! - Two-axis verdicts: identity (`VERIFIED`/`WARNING`) and content
//!   (`IDENTICAL`/`AUTHENTIC`/`TAMPERED`)
//! - Pluggable signature backends (ML-DSA-65, Ed25519), secret keys zeroized
//!   on drop
//! - Legacy headerless and versioned chain file layouts
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use tessera_core::{
//!     BackendKind, KeyFile, VecFrameSource, VideoArtifacts, VideoOutcome, VideoPipeline,
//! };
//!
//! # fn example() -> tessera_core::Result<()> {
//! // In production the key file is provisioned once and read from disk
//! let key = KeyFile::generate(BackendKind::MlDsa65File)?;
//! let backend = tessera_core::BackendFactory::from_key_file(&key)?;
//!
//! let frame_size = 224 * 224 * 3;
//! let frames = vec![vec![0u8; frame_size]; 3];
//! let pipeline = VideoPipeline::new(backend.as_ref(), VideoArtifacts::in_dir(Path::new("provenance")));
//!
//! pipeline.sign(&mut VecFrameSource::new(frame_size, frames.clone()))?;
//! let result = pipeline.verify(&mut VecFrameSource::new(frame_size, frames))?;
//! assert!(matches!(result.outcome, VideoOutcome::Verified { frames: 3, .. }));
//! # Ok(())
//! # }
//! ```

pub mod artifacts;
pub mod backend;
pub mod chain;
pub mod error;
pub mod frames;
pub mod perceptual;
pub mod pipeline;
pub mod policy;

// Re-export main types for convenience
pub use artifacts::{ImageArtifacts, VideoArtifacts};
pub use backend::{BackendConfig, BackendFactory, BackendKind, KeyFile, SignatureBackend};
pub use chain::{
    build_chain, verify_chain, Chain, ChainBuilder, ChainDigest, ChainFile, ChainFormat,
    ChainHashAlgorithm, ChainReader, ChainVerifier, TamperReport, DIGEST_SIZE,
};
pub use error::{Result, TesseraError};
pub use frames::{
    FfmpegFrameSource, FrameGeometry, FrameSource, RawFrameReader, VecFrameSource,
};
pub use perceptual::{hamming_distance, Fingerprint, PixelBuffer, FINGERPRINT_SIZE};
pub use pipeline::{
    ImagePipeline, ImageSignature, ImageVerification, VideoOutcome, VideoPipeline,
    VideoSignature, VideoVerification,
};
pub use policy::{
    ContentThresholds, ContentVerdict, IdentityVerdict, VerificationPolicy, VerificationReport,
};
