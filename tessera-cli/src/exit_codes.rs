//! Exit codes following sysexits.h conventions.
//!
//! These codes provide semantic meaning for different failure modes,
//! enabling scripts and CI systems to handle errors appropriately.

use tessera_core::TesseraError;

/// Successful execution.
pub const SUCCESS: u8 = 0;

/// General error (catch-all).
pub const GENERAL_ERROR: u8 = 1;

/// Command line usage error (invalid arguments or configuration).
/// Maps to EX_USAGE from sysexits.h.
pub const USAGE_ERROR: u8 = 64;

/// Data format error (verification failed, tampered content, malformed
/// provenance data).
/// Maps to EX_DATAERR from sysexits.h.
pub const VERIFICATION_FAILED: u8 = 65;

/// Cannot open input file or reference artifact.
/// Maps to EX_NOINPUT from sysexits.h.
pub const INPUT_ERROR: u8 = 66;

/// Service unavailable (ffmpeg, signature backend).
/// Maps to EX_UNAVAILABLE from sysexits.h.
pub const UNAVAILABLE: u8 = 69;

/// I/O error (cannot write artifacts).
/// Maps to EX_IOERR from sysexits.h.
pub const IO_ERROR: u8 = 74;

/// Text appended to `--help`.
pub const HELP_TEXT: &str = "\
Exit codes:
  0   Success
  1   General error
  64  Usage or configuration error
  65  Verification failed (tampering, invalid signature, malformed data)
  66  Input file or provenance artifact missing
  69  ffmpeg or signature backend unavailable
  74  I/O error";

/// Represents an exit code with optional error context.
pub struct ExitCode {
    pub code: u8,
    pub message: Option<String>,
}

impl ExitCode {
    pub const fn success() -> Self {
        Self {
            code: SUCCESS,
            message: None,
        }
    }

    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        let message = format!("{err:#}");

        // Typed errors first, then fall back to the context messages
        let code = err
            .chain()
            .find_map(|cause| {
                if let Some(e) = cause.downcast_ref::<TesseraError>() {
                    Some(classify_core(e))
                } else {
                    cause.downcast_ref::<std::io::Error>().map(classify_io)
                }
            })
            .unwrap_or_else(|| classify_message(&message));

        Self {
            code,
            message: Some(message),
        }
    }
}

fn classify_core(err: &TesseraError) -> u8 {
    match err {
        TesseraError::Tampered(_)
        | TesseraError::FrameSizeMismatch { .. }
        | TesseraError::ChainLengthMismatch { .. }
        | TesseraError::MalformedArtifact { .. }
        | TesseraError::InvalidImageBuffer(_)
        | TesseraError::ImageDecode(_) => VERIFICATION_FAILED,
        TesseraError::MissingReference { .. } => INPUT_ERROR,
        TesseraError::BackendUnavailable(_) | TesseraError::FrameSource(_) => UNAVAILABLE,
        TesseraError::InvalidThresholds { .. } | TesseraError::InvalidFrameGeometry(_) => {
            USAGE_ERROR
        }
        TesseraError::Io(e) => classify_io(e),
        TesseraError::Signature(_)
        | TesseraError::MissingSecretKey
        | TesseraError::Serialization(_) => GENERAL_ERROR,
    }
}

fn classify_io(err: &std::io::Error) -> u8 {
    match err.kind() {
        std::io::ErrorKind::NotFound => INPUT_ERROR,
        _ => IO_ERROR,
    }
}

fn classify_message(message: &str) -> u8 {
    if message.contains("Verification failed") {
        VERIFICATION_FAILED
    } else if message.contains("Invalid configuration") {
        USAGE_ERROR
    } else if message.contains("Failed to read file") {
        INPUT_ERROR
    } else if message.contains("Failed to write") {
        IO_ERROR
    } else {
        GENERAL_ERROR
    }
}
