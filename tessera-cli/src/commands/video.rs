//! Video sign and verify commands.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use colored::Colorize;
use serde::Serialize;
use tessera_core::{
    ChainFormat, VideoArtifacts, VideoOutcome, VideoPipeline, VideoSignature, VideoVerification,
};

use super::{banner, short_hex, Output};
use crate::config::Config;
use crate::utils;

#[derive(Serialize)]
struct SignedVideo<'a> {
    file: &'a Path,
    chain_path: &'a Path,
    signature_path: &'a Path,
    chain_format: ChainFormat,
    backend: String,
    #[serde(flatten)]
    signed: &'a VideoSignature,
}

#[derive(Serialize)]
struct VerifiedVideo<'a> {
    file: &'a Path,
    #[serde(flatten)]
    result: &'a VideoVerification,
}

/// Execute `sign video`.
pub fn sign(
    file: PathBuf,
    config: &Config,
    raw: bool,
    chain_format: ChainFormat,
    output: Output,
) -> Result<()> {
    let geometry = config.geometry()?;
    let backend = utils::load_backend(config)?;
    let mut source = utils::open_frames(&file, config, geometry, raw)?;
    let pipeline = VideoPipeline::new(
        backend.as_ref(),
        VideoArtifacts::in_dir(&config.artifact_dir),
    )
    .with_chain_format(chain_format);

    let signed = pipeline
        .sign(source.as_mut())
        .context("Failed to sign video")?;
    let artifacts = pipeline.artifacts();

    output.json(&SignedVideo {
        file: &file,
        chain_path: &artifacts.chain,
        signature_path: &artifacts.signature,
        chain_format,
        backend: backend.kind().to_string(),
        signed: &signed,
    })?;

    if output.human() {
        println!();
        println!("{}", "Video signed".green().bold());
        println!();
        println!("   {} {}", "Frames:".dimmed(), signed.frames);
        println!(
            "   {} {}",
            "Chain root:".dimmed(),
            short_hex(&signed.root.to_hex())
        );
        println!(
            "   {} {} ({:?})",
            "Chain:".dimmed(),
            artifacts.chain.display(),
            chain_format
        );
        println!(
            "   {} {} ({} bytes, {})",
            "Signature:".dimmed(),
            artifacts.signature.display(),
            signed.signature_len,
            backend.kind()
        );
    }

    Ok(())
}

/// Execute `verify video`.
pub fn verify(file: PathBuf, config: &Config, raw: bool, output: Output) -> Result<()> {
    let geometry = config.geometry()?;
    let backend = utils::load_backend(config)?;
    let mut source = utils::open_frames(&file, config, geometry, raw)?;
    let pipeline = VideoPipeline::new(
        backend.as_ref(),
        VideoArtifacts::in_dir(&config.artifact_dir),
    );

    let result = pipeline
        .verify(source.as_mut())
        .context("Failed to verify video")?;

    output.json(&VerifiedVideo {
        file: &file,
        result: &result,
    })?;

    match result.outcome {
        VideoOutcome::Verified { frames, root } => {
            if output.human() {
                banner("VERIFIED", true);
                println!("   {}", "✔ Video verified successfully".green());
                println!("   {} {}", "Frames:".dimmed(), frames);
                println!("   {} {}", "Chain root:".dimmed(), short_hex(&root.to_hex()));
                println!(
                    "   {} {}",
                    "Chain hash:".dimmed(),
                    result.algorithm
                );
            }
            Ok(())
        }
        VideoOutcome::Tampered(report) => {
            if output.human() {
                banner("TAMPERED", false);
                println!(
                    "   {}",
                    format!("✘ Tampering detected at frame {}", report.frame_index).red()
                );
                println!(
                    "   {} {}",
                    "Expected:".dimmed(),
                    short_hex(&report.expected.to_hex())
                );
                println!(
                    "   {} {}",
                    "Got:".dimmed(),
                    short_hex(&report.actual.to_hex())
                );
            }
            bail!(
                "Verification failed: tampering detected at frame {}",
                report.frame_index
            )
        }
        VideoOutcome::SignatureInvalid { frames, .. } => {
            if output.human() {
                banner("WARNING", false);
                println!("   {}", "✘ Final signature invalid".red());
                println!("   {} {} (all match)", "Frames:".dimmed(), frames);
            }
            bail!("Verification failed: final signature invalid")
        }
        VideoOutcome::SignatureMissing { frames, .. } => {
            if output.human() {
                banner("WARNING", false);
                println!(
                    "   {} {}",
                    "✘ No signature found at".red(),
                    pipeline.artifacts().signature.display()
                );
                println!("   {} {} (all match)", "Frames:".dimmed(), frames);
            }
            bail!("Verification failed: chain root is not signed")
        }
    }
}
