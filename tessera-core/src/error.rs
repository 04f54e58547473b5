use std::path::PathBuf;

use thiserror::Error;

use crate::chain::TamperReport;

#[derive(Error, Debug)]
pub enum TesseraError {
    #[error("Frame {index} has {actual} bytes, expected {expected}")]
    FrameSizeMismatch {
        index: u64,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid frame geometry: {0}")]
    InvalidFrameGeometry(String),

    #[error("Chain length mismatch: chain has {expected_links} links, observed {observed_frames} frames")]
    ChainLengthMismatch {
        expected_links: u64,
        observed_frames: u64,
    },

    #[error("Tampering detected at frame {}", .0.frame_index)]
    Tampered(TamperReport),

    #[error("Invalid image buffer: {0}")]
    InvalidImageBuffer(String),

    #[error("Image decode error: {0}")]
    ImageDecode(String),

    #[error("Missing reference artifact: {}", path.display())]
    MissingReference { path: PathBuf },

    #[error("Malformed artifact {}: {reason}", path.display())]
    MalformedArtifact { path: PathBuf, reason: String },

    #[error("Signature error: {0}")]
    Signature(String),

    #[error("Signature backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Key file has no secret key; it can verify but not sign")]
    MissingSecretKey,

    #[error("Frame source error: {0}")]
    FrameSource(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid content thresholds: identical <= {identical_max} must stay below tampered >= {tampered_min}")]
    InvalidThresholds { identical_max: u32, tampered_min: u32 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TesseraError {
    /// True for failures that mean the provenance data itself is malformed,
    /// as opposed to content that was tampered with.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::FrameSizeMismatch { .. }
                | Self::ChainLengthMismatch { .. }
                | Self::MalformedArtifact { .. }
                | Self::InvalidImageBuffer(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, TesseraError>;
