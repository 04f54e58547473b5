//! Sparse average-hash fingerprint.
//!
//! # Algorithm
//!
//! 1. Sample an 8×8 grid by nearest neighbour: cell `(x, y)` reads the source
//!    pixel at `(x * width / 8, y * height / 8)`.
//! 2. Grey value of a cell is the integer mean of the first three channels.
//!    Further channels (alpha) are ignored; one- and two-channel images use
//!    the first channel directly.
//! 3. Bit `y * 8 + x` is set when the cell is at least the mean of all 64
//!    cells.
//!
//! Only 64 source pixels are ever read. This is a sparse sample, not an
//! area-averaged downsample, so a single corrupted sampled pixel can flip a
//! bit. The sampling is kept as-is because changing it would change every
//! stored fingerprint.
//!
//! # Usage
//!
//! ```
//! use tessera_core::perceptual::Fingerprint;
//!
//! let pixels = vec![128u8; 16 * 16 * 3];
//! let a = Fingerprint::compute(&pixels, 16, 16, 3)?;
//! let b = Fingerprint::compute(&pixels, 16, 16, 3)?;
//! assert_eq!(a.distance(&b), 0);
//! # Ok::<(), tessera_core::TesseraError>(())
//! ```

use std::fmt;

use serde::{Serialize, Serializer};

use crate::error::{Result, TesseraError};

/// Fingerprint size in bytes (64 bits).
pub const FINGERPRINT_SIZE: usize = 8;

const GRID: u64 = 8;
const CELLS: usize = 64;

/// 64-bit perceptual fingerprint, bits in row-major raster order.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Fingerprint(u64);

impl Fingerprint {
    /// Compute the fingerprint of a raw, row-major, 8-bit pixel buffer.
    ///
    /// Fails with [`TesseraError::InvalidImageBuffer`] if any dimension is
    /// zero or the buffer is shorter than `width * height * channels`.
    pub fn compute(pixels: &[u8], width: u32, height: u32, channels: u32) -> Result<Self> {
        if width == 0 || height == 0 || channels == 0 {
            return Err(TesseraError::InvalidImageBuffer(format!(
                "dimensions must be non-zero, got {width}x{height}x{channels}"
            )));
        }

        let required = (width as u64)
            .checked_mul(height as u64)
            .and_then(|n| n.checked_mul(channels as u64))
            .ok_or_else(|| {
                TesseraError::InvalidImageBuffer(format!(
                    "{width}x{height}x{channels} overflows"
                ))
            })?;
        if (pixels.len() as u64) < required {
            return Err(TesseraError::InvalidImageBuffer(format!(
                "buffer holds {} bytes, {width}x{height}x{channels} needs {required}",
                pixels.len()
            )));
        }

        let channels = channels as usize;
        let mut cells = [0u32; CELLS];
        let mut total = 0u32;

        for y in 0..GRID {
            let source_y = y * height as u64 / GRID;
            for x in 0..GRID {
                let source_x = x * width as u64 / GRID;
                let offset = ((source_y * width as u64 + source_x) as usize) * channels;
                let pixel = &pixels[offset..offset + channels];

                let grey = if channels >= 3 {
                    (pixel[0] as u32 + pixel[1] as u32 + pixel[2] as u32) / 3
                } else {
                    pixel[0] as u32
                };

                cells[(y * GRID + x) as usize] = grey;
                total += grey;
            }
        }

        // cell >= total / 64, kept in integers.
        let bits = cells
            .iter()
            .enumerate()
            .filter(|(_, cell)| **cell * CELLS as u32 >= total)
            .fold(0u64, |bits, (i, _)| bits | (1u64 << i));

        Ok(Self(bits))
    }

    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Hamming distance to another fingerprint, in `0..=64`.
    pub fn distance(&self, other: &Self) -> u32 {
        hamming_distance(*self, *other)
    }

    /// On-disk representation: 8 bytes, little-endian.
    pub fn to_le_bytes(self) -> [u8; FINGERPRINT_SIZE] {
        self.0.to_le_bytes()
    }

    pub fn from_le_bytes(bytes: [u8; FINGERPRINT_SIZE]) -> Self {
        Self(u64::from_le_bytes(bytes))
    }

    /// Parse a stored fingerprint; `None` unless exactly 8 bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let bytes: [u8; FINGERPRINT_SIZE] = bytes.try_into().ok()?;
        Some(Self::from_le_bytes(bytes))
    }

    pub fn to_hex(&self) -> String {
        format!("{:016x}", self.0)
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.to_hex())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

/// Number of differing bits between two fingerprints.
pub fn hamming_distance(a: Fingerprint, b: Fingerprint) -> u32 {
    (a.0 ^ b.0).count_ones()
}
