//! Two-axis verification verdicts.
//!
//! A verification run answers two separate questions:
//!
//! - **Identity**: are these exactly the bytes that were signed? This is a
//!   pure signature check and never looks at perceptual distance.
//! - **Content**: does the picture still look like the one that was signed?
//!   This grades the Hamming distance between the stored and the fresh
//!   fingerprint.
//!
//! The axes are never collapsed. A re-encoded photo is `WARNING` on identity
//! and `AUTHENTIC` on content, which is exactly the case a plain signature
//! check cannot express.

use std::fmt;

use serde::Serialize;

use crate::error::{Result, TesseraError};

/// Largest distance still graded as identical.
pub const DEFAULT_IDENTICAL_MAX: u32 = 0;
/// Smallest distance graded as tampered.
pub const DEFAULT_TAMPERED_MIN: u32 = 5;

/// Distance bands for the content axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ContentThresholds {
    identical_max: u32,
    tampered_min: u32,
}

impl ContentThresholds {
    /// Distances `<= identical_max` are identical, distances
    /// `>= tampered_min` are tampered, anything between is authentic.
    pub fn new(identical_max: u32, tampered_min: u32) -> Result<Self> {
        if identical_max >= tampered_min {
            return Err(TesseraError::InvalidThresholds {
                identical_max,
                tampered_min,
            });
        }
        Ok(Self {
            identical_max,
            tampered_min,
        })
    }

    pub fn identical_max(&self) -> u32 {
        self.identical_max
    }

    pub fn tampered_min(&self) -> u32 {
        self.tampered_min
    }

    pub fn classify(&self, distance: u32) -> ContentVerdict {
        if distance <= self.identical_max {
            ContentVerdict::Identical
        } else if distance < self.tampered_min {
            ContentVerdict::Authentic { distance }
        } else {
            ContentVerdict::Tampered { distance }
        }
    }
}

impl Default for ContentThresholds {
    fn default() -> Self {
        Self {
            identical_max: DEFAULT_IDENTICAL_MAX,
            tampered_min: DEFAULT_TAMPERED_MIN,
        }
    }
}

/// Bit-exactness verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IdentityVerdict {
    /// Signature verifies against the presented bytes.
    Verified,
    /// Data modified or re-encoded since signing.
    Warning,
}

impl IdentityVerdict {
    pub fn from_signature(identity_ok: bool) -> Self {
        if identity_ok {
            Self::Verified
        } else {
            Self::Warning
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Verified => "File is bit-perfect and signed by owner",
            Self::Warning => "Data modified or re-encoded since signing",
        }
    }
}

impl fmt::Display for IdentityVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Verified => f.write_str("VERIFIED"),
            Self::Warning => f.write_str("WARNING"),
        }
    }
}

/// Perceptual verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContentVerdict {
    Identical,
    /// Minor noise or compression.
    Authentic { distance: u32 },
    /// Structural modification.
    Tampered { distance: u32 },
    /// No stored fingerprint to compare against.
    NoReferenceAvailable,
}

impl ContentVerdict {
    pub fn distance(&self) -> Option<u32> {
        match self {
            Self::Identical => Some(0),
            Self::Authentic { distance } | Self::Tampered { distance } => Some(*distance),
            Self::NoReferenceAvailable => None,
        }
    }

    pub fn is_tampered(&self) -> bool {
        matches!(self, Self::Tampered { .. })
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Identical => "Content matches the signed image exactly",
            Self::Authentic { .. } => "Minor noise or compression detected",
            Self::Tampered { .. } => "Structural modification detected",
            Self::NoReferenceAvailable => "No stored fingerprint to compare visual content",
        }
    }
}

impl fmt::Display for ContentVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identical => f.write_str("IDENTICAL"),
            Self::Authentic { .. } => f.write_str("AUTHENTIC"),
            Self::Tampered { .. } => f.write_str("TAMPERED"),
            Self::NoReferenceAvailable => f.write_str("NO REFERENCE"),
        }
    }
}

/// Both axes of a verification run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    pub identity: IdentityVerdict,
    pub content: ContentVerdict,
}

impl VerificationReport {
    /// True when identity verified and content was not graded as tampered.
    pub fn is_clean(&self) -> bool {
        self.identity == IdentityVerdict::Verified && !self.content.is_tampered()
    }
}

/// Combines a signature result and a fingerprint distance into a report.
#[derive(Debug, Clone, Copy, Default)]
pub struct VerificationPolicy {
    thresholds: ContentThresholds,
}

impl VerificationPolicy {
    pub fn new(thresholds: ContentThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> ContentThresholds {
        self.thresholds
    }

    pub fn evaluate(&self, identity_ok: bool, content_distance: Option<u32>) -> VerificationReport {
        VerificationReport {
            identity: IdentityVerdict::from_signature(identity_ok),
            content: content_distance
                .map(|d| self.thresholds.classify(d))
                .unwrap_or(ContentVerdict::NoReferenceAvailable),
        }
    }
}
