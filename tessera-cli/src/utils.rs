//! Common utility functions shared across CLI commands.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{bail, Context, Result};
use tessera_core::frames::{FfmpegFrameSource, FrameGeometry, FrameSource, RawFrameReader};
use tessera_core::{BackendFactory, SignatureBackend};
use tracing::debug;

use crate::config::Config;

/// Load the configured signature backend.
pub fn load_backend(config: &Config) -> Result<Box<dyn SignatureBackend>> {
    BackendFactory::create(&config.backend_config()).with_context(|| {
        format!(
            "Failed to load {} key from {}",
            config.backend,
            config.key_path.display()
        )
    })
}

/// Fail early with an input error if `path` is not a readable file.
pub fn require_input(path: &Path) -> Result<()> {
    let metadata = std::fs::metadata(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;
    if !metadata.is_file() {
        bail!("Failed to read file: {} is not a regular file", path.display());
    }
    Ok(())
}

/// Open a frame source for a video file.
///
/// With `raw` the file is read directly as concatenated rgb24 frames of the
/// configured geometry; otherwise ffmpeg decodes and rescales it.
pub fn open_frames(
    path: &Path,
    config: &Config,
    geometry: FrameGeometry,
    raw: bool,
) -> Result<Box<dyn FrameSource>> {
    require_input(path)?;

    if raw {
        let file =
            File::open(path).with_context(|| format!("Failed to read file: {}", path.display()))?;
        debug!(path = %path.display(), frame_size = geometry.frame_size(), "Reading raw frames");
        return Ok(Box::new(RawFrameReader::new(
            BufReader::new(file),
            geometry.frame_size(),
        )?));
    }

    let source = FfmpegFrameSource::spawn(&config.ffmpeg, path, geometry)
        .context("Failed to start frame extraction")?;
    Ok(Box::new(source))
}
