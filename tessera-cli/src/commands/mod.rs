//! CLI command implementations.

pub mod image;
pub mod video;

use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;

use crate::OutputFormat;

/// Where and how a command reports its result.
#[derive(Debug, Clone, Copy)]
pub struct Output {
    pub format: OutputFormat,
    pub quiet: bool,
}

impl Output {
    /// True when human-readable text should be printed.
    pub fn human(&self) -> bool {
        !self.quiet && self.format == OutputFormat::Text
    }

    /// Print `value` as pretty JSON when JSON output was requested.
    pub fn json<T: Serialize>(&self, value: &T) -> Result<()> {
        if !self.quiet && self.format == OutputFormat::Json {
            let json =
                serde_json::to_string_pretty(value).context("Failed to serialize JSON output")?;
            println!("{json}");
        }
        Ok(())
    }
}

/// Print a boxed status banner.
fn banner(label: &str, ok: bool) {
    let top = "╔════════════════════════════════════════╗";
    let line = format!("║{label:^40}║");
    let bottom = "╚════════════════════════════════════════╝";

    println!();
    if ok {
        println!("{}", top.green());
        println!("{}", line.green().bold());
        println!("{}", bottom.green());
    } else {
        println!("{}", top.red());
        println!("{}", line.red().bold());
        println!("{}", bottom.red());
    }
    println!();
}

/// First 16 hex characters of a digest, enough to eyeball a match.
fn short_hex(hex: &str) -> &str {
    &hex[..hex.len().min(16)]
}
