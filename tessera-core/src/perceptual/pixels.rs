//! Decoded pixel buffers.

use sha2::{Digest, Sha256};
#[cfg(feature = "decode")]
use tracing::debug;

use super::Fingerprint;
use crate::chain::DIGEST_SIZE;
use crate::error::{Result, TesseraError};

/// Raw, row-major, 8-bit pixels with their native channel count.
///
/// Image signatures bind to these bytes, not to the encoded file, so two
/// encodings that decode to identical pixels carry the same signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    channels: u32,
    pixels: Vec<u8>,
}

impl PixelBuffer {
    pub fn new(width: u32, height: u32, channels: u32, pixels: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * channels as usize;
        if width == 0 || height == 0 || channels == 0 || pixels.len() != expected {
            return Err(TesseraError::InvalidImageBuffer(format!(
                "{} bytes do not form a {width}x{height}x{channels} image",
                pixels.len()
            )));
        }

        Ok(Self {
            width,
            height,
            channels,
            pixels,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u32 {
        self.channels
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.pixels
    }

    pub fn fingerprint(&self) -> Result<Fingerprint> {
        Fingerprint::compute(&self.pixels, self.width, self.height, self.channels)
    }

    /// SHA-256 of the raw pixel bytes; the value image signatures cover.
    pub fn digest(&self) -> [u8; DIGEST_SIZE] {
        let mut hasher = Sha256::new();
        hasher.update(&self.pixels);
        let result = hasher.finalize();

        let mut digest = [0u8; DIGEST_SIZE];
        digest.copy_from_slice(&result);
        digest
    }
}

#[cfg(feature = "decode")]
impl PixelBuffer {
    /// Decode an encoded image (JPEG, PNG, GIF or WebP).
    ///
    /// Grey, grey+alpha, RGB and RGBA images keep their channel count; higher
    /// bit depths are reduced to 8 bits per channel.
    pub fn decode(image_data: &[u8]) -> Result<Self> {
        use image::GenericImageView;

        let image = image::load_from_memory(image_data)
            .map_err(|e| TesseraError::ImageDecode(format!("Failed to decode image: {}", e)))?;

        let (width, height) = image.dimensions();
        let (channels, pixels) = match image.color().channel_count() {
            1 => (1, image.to_luma8().into_raw()),
            2 => (2, image.to_luma_alpha8().into_raw()),
            3 => (3, image.to_rgb8().into_raw()),
            _ => (4, image.to_rgba8().into_raw()),
        };

        Self::new(width, height, channels, pixels)
    }

    /// Read and decode an image file.
    pub fn open(path: &std::path::Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        debug!(path = %path.display(), bytes = bytes.len(), "Read image");
        Self::decode(&bytes)
    }

    /// Check if the provided bytes appear to be a supported image format.
    pub fn is_supported_format(data: &[u8]) -> bool {
        image::guess_format(data).is_ok()
    }
}
