//! CLI configuration.
//!
//! Values come from defaults, then `TESSERA_*` environment variables, then
//! command-line flags, each layer overriding the previous one.

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use tessera_core::frames::{DEFAULT_FRAME_HEIGHT, DEFAULT_FRAME_WIDTH};
use tessera_core::policy::{DEFAULT_IDENTICAL_MAX, DEFAULT_TAMPERED_MIN};
use tessera_core::{
    BackendConfig, BackendKind, ContentThresholds, FrameGeometry, VerificationPolicy,
};
use tracing::warn;

/// Effective configuration for one CLI invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Artifact directory (default: provenance)
    pub artifact_dir: PathBuf,
    /// Key file for the signature backend (default: keys/tessera.key)
    pub key_path: PathBuf,
    /// Signature backend (default: mldsa65)
    pub backend: BackendKind,
    /// ffmpeg executable (default: ffmpeg, resolved through PATH)
    pub ffmpeg: PathBuf,
    /// Video frame width after rescaling (default: 224)
    pub frame_width: u32,
    /// Video frame height after rescaling (default: 224)
    pub frame_height: u32,
    /// Largest fingerprint distance graded identical (default: 0)
    pub identical_max: u32,
    /// Smallest fingerprint distance graded tampered (default: 5)
    pub tampered_min: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            artifact_dir: PathBuf::from("provenance"),
            key_path: PathBuf::from("keys/tessera.key"),
            backend: BackendKind::default(),
            ffmpeg: PathBuf::from("ffmpeg"),
            frame_width: DEFAULT_FRAME_WIDTH,
            frame_height: DEFAULT_FRAME_HEIGHT,
            identical_max: DEFAULT_IDENTICAL_MAX,
            tampered_min: DEFAULT_TAMPERED_MIN,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let backend = match lookup("TESSERA_BACKEND") {
            Some(value) => value
                .parse::<BackendKind>()
                .map_err(|e| anyhow!("Invalid configuration: TESSERA_BACKEND={value}: {e}"))?,
            None => defaults.backend,
        };

        Ok(Self {
            artifact_dir: lookup("TESSERA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.artifact_dir),
            key_path: lookup("TESSERA_KEY")
                .map(PathBuf::from)
                .unwrap_or(defaults.key_path),
            backend,
            ffmpeg: lookup("TESSERA_FFMPEG")
                .map(PathBuf::from)
                .unwrap_or(defaults.ffmpeg),
            frame_width: parse_or(&lookup, "TESSERA_FRAME_WIDTH", defaults.frame_width),
            frame_height: parse_or(&lookup, "TESSERA_FRAME_HEIGHT", defaults.frame_height),
            identical_max: parse_or(&lookup, "TESSERA_IDENTICAL_MAX", defaults.identical_max),
            tampered_min: parse_or(&lookup, "TESSERA_TAMPER_MIN", defaults.tampered_min),
        })
    }

    pub fn backend_config(&self) -> BackendConfig {
        BackendConfig {
            kind: self.backend,
            key_path: self.key_path.clone(),
        }
    }

    pub fn geometry(&self) -> Result<FrameGeometry> {
        FrameGeometry::rgb24(self.frame_width, self.frame_height)
            .context("Invalid configuration: frame geometry")
    }

    pub fn policy(&self) -> Result<VerificationPolicy> {
        let thresholds = ContentThresholds::new(self.identical_max, self.tampered_min)
            .context("Invalid configuration: content thresholds")?;
        Ok(VerificationPolicy::new(thresholds))
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> T
where
    T: FromStr + Copy,
{
    match lookup(name) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(variable = name, value = %raw, "Ignoring unparseable setting");
            default
        }),
        None => default,
    }
}
