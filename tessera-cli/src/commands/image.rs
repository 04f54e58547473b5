//! Image sign and verify commands.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use colored::Colorize;
use serde::Serialize;
use tessera_core::{
    ContentVerdict, IdentityVerdict, ImageArtifacts, ImagePipeline, ImageSignature,
    ImageVerification, PixelBuffer,
};
use tracing::info;

use super::{banner, short_hex, Output};
use crate::config::Config;
use crate::utils;

#[derive(Serialize)]
struct SignedImage<'a> {
    file: &'a Path,
    signature_path: &'a Path,
    fingerprint_path: &'a Path,
    backend: String,
    #[serde(flatten)]
    signed: &'a ImageSignature,
}

#[derive(Serialize)]
struct VerifiedImage<'a> {
    file: &'a Path,
    #[serde(flatten)]
    result: &'a ImageVerification,
}

fn open_image(file: &Path) -> Result<PixelBuffer> {
    utils::require_input(file)?;
    let image = PixelBuffer::open(file)
        .with_context(|| format!("Failed to read file: {}", file.display()))?;
    info!(
        path = %file.display(),
        width = image.width(),
        height = image.height(),
        channels = image.channels(),
        "Decoded image"
    );
    Ok(image)
}

/// Execute `sign image`.
pub fn sign(file: PathBuf, config: &Config, output: Output) -> Result<()> {
    let image = open_image(&file)?;
    let backend = utils::load_backend(config)?;
    let pipeline = ImagePipeline::new(
        backend.as_ref(),
        ImageArtifacts::in_dir(&config.artifact_dir),
    );

    let signed = pipeline.sign(&image).context("Failed to sign image")?;
    let artifacts = pipeline.artifacts();

    output.json(&SignedImage {
        file: &file,
        signature_path: &artifacts.signature,
        fingerprint_path: &artifacts.fingerprint,
        backend: backend.kind().to_string(),
        signed: &signed,
    })?;

    if output.human() {
        println!();
        println!("{}", "Image signed".green().bold());
        println!();
        println!(
            "   {} {} ({} bytes, {})",
            "Signature:".dimmed(),
            artifacts.signature.display(),
            signed.signature_len,
            backend.kind()
        );
        println!(
            "   {} {}",
            "Fingerprint:".dimmed(),
            artifacts.fingerprint.display()
        );
        println!("   {} {}", "aHash:".dimmed(), signed.fingerprint);
        println!(
            "   {} {}",
            "Pixel digest:".dimmed(),
            short_hex(&hex::encode(signed.digest))
        );
    }

    Ok(())
}

/// Execute `verify image`.
pub fn verify(file: PathBuf, config: &Config, output: Output) -> Result<()> {
    let policy = config.policy()?;
    let image = open_image(&file)?;
    let backend = utils::load_backend(config)?;
    let pipeline = ImagePipeline::new(
        backend.as_ref(),
        ImageArtifacts::in_dir(&config.artifact_dir),
    )
    .with_policy(policy);

    let result = pipeline.verify(&image).context("Failed to verify image")?;
    let report = result.report;

    output.json(&VerifiedImage {
        file: &file,
        result: &result,
    })?;

    if output.human() {
        banner("TESSERA VERIFICATION REPORT", report.is_clean());

        let identity = format!("{} ({})", report.identity, report.identity.description());
        let identity = match report.identity {
            IdentityVerdict::Verified => identity.green(),
            IdentityVerdict::Warning => identity.yellow(),
        };
        println!("   {} {}", "[IDENTITY]:".dimmed(), identity);

        if let Some(distance) = report.content.distance() {
            println!(
                "   {}  Structural difference: {} bits",
                "[CONTENT]:".dimmed(),
                distance
            );
        }
        let content = format!("STATUS: {} ({})", report.content, report.content.description());
        let content = match report.content {
            ContentVerdict::Identical | ContentVerdict::Authentic { .. } => content.green(),
            ContentVerdict::Tampered { .. } => content.red(),
            ContentVerdict::NoReferenceAvailable => content.yellow(),
        };
        println!("   {}  {}", "[CONTENT]:".dimmed(), content);

        if let Some(stored) = result.stored {
            println!(
                "   {}  stored {} / current {}",
                "[CONTENT]:".dimmed(),
                stored,
                result.current
            );
        }
        println!();
    }

    if !report.is_clean() {
        bail!(
            "Verification failed: identity {}, content {}",
            report.identity,
            report.content
        );
    }
    Ok(())
}
