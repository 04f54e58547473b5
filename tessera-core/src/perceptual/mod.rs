//! Perceptual fingerprints for images.
//!
//! A fingerprint summarizes an image's brightness structure in 64 bits. It
//! stays stable across light re-encoding, where a cryptographic hash of the
//! pixels changes completely, and moves by many bits when the picture itself
//! changes.
//!
//! # Components
//!
//! - **Fingerprint**: sparse 8×8 average hash and Hamming distance.
//! - **Pixels**: decoded pixel buffers (via the `image` crate when the
//!   `decode` feature is enabled) and the pixel digest that image signatures
//!   bind to.

pub mod fingerprint;
pub mod pixels;

pub use fingerprint::*;
pub use pixels::*;
