//! Per-frame hash chaining for video provenance.
//!
//! Every link folds the current frame together with the previous link:
//!
//! ```text
//! digest[i] = H(frame[i] || digest[i-1]),   digest[-1] = 0^32
//! ```
//!
//! Because each digest commits to all prior history, the first index at which
//! a recomputed chain diverges from a stored one is exactly the first frame
//! that was modified, reordered, inserted or dropped. Only the last digest
//! (the chain root) is signed.
//!
//! Both building and verifying are streaming: processing frame `i` needs only
//! frame `i` and the running digest, so arbitrarily long videos can be
//! chained in constant memory. Feeding a prefix and stopping early yields a
//! valid, truncated chain.
//!
//! # Example
//!
//! ```
//! use tessera_core::chain::{build_chain, verify_chain};
//!
//! let frames = vec![vec![1u8; 12], vec![2u8; 12], vec![3u8; 12]];
//! let chain = build_chain(12, &frames)?;
//!
//! let root = verify_chain(12, &frames, chain.links.iter().copied())?;
//! assert_eq!(root, chain.root);
//! # Ok::<(), tessera_core::TesseraError>(())
//! ```

mod file;

pub use file::{
    ChainFile, ChainFormat, ChainReader, ChainWriter, CHAIN_FORMAT_VERSION, CHAIN_MAGIC,
};

use std::fmt;

use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};
use sha3::Sha3_256;
use tracing::debug;

use crate::error::{Result, TesseraError};

/// Size of every chain digest in bytes.
pub const DIGEST_SIZE: usize = 32;

/// A 32-byte link digest.
///
/// Values only come out of [`chain_step`] or from parsing a stored chain
/// file; the all-zero seed is [`ChainDigest::ZERO`].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChainDigest([u8; DIGEST_SIZE]);

impl ChainDigest {
    /// Seed digest preceding the first frame, also the root of an empty chain.
    pub const ZERO: Self = Self([0u8; DIGEST_SIZE]);

    pub(crate) fn from_bytes(bytes: [u8; DIGEST_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; DIGEST_SIZE]
    }
}

impl fmt::Debug for ChainDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChainDigest({})", self.to_hex())
    }
}

impl fmt::Display for ChainDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for ChainDigest {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

/// Hash function used for chaining.
///
/// SHA-256 is the default and the only algorithm the headerless chain file
/// layout can express.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChainHashAlgorithm {
    #[default]
    Sha256,
    Sha3_256,
}

impl ChainHashAlgorithm {
    /// Identifier stored in the versioned chain file header.
    pub fn id(self) -> u8 {
        match self {
            Self::Sha256 => 1,
            Self::Sha3_256 => 2,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Self::Sha256),
            2 => Some(Self::Sha3_256),
            _ => None,
        }
    }
}

impl fmt::Display for ChainHashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sha256 => f.write_str("SHA-256"),
            Self::Sha3_256 => f.write_str("SHA3-256"),
        }
    }
}

/// Compute one link: `H(frame || previous)`.
pub fn chain_step(
    algorithm: ChainHashAlgorithm,
    frame: &[u8],
    previous: &ChainDigest,
) -> ChainDigest {
    match algorithm {
        ChainHashAlgorithm::Sha256 => digest_link::<Sha256>(frame, previous),
        ChainHashAlgorithm::Sha3_256 => digest_link::<Sha3_256>(frame, previous),
    }
}

fn digest_link<D: Digest>(frame: &[u8], previous: &ChainDigest) -> ChainDigest {
    let mut hasher = D::new();
    hasher.update(frame);
    hasher.update(previous.as_bytes());
    let result = hasher.finalize();

    let mut bytes = [0u8; DIGEST_SIZE];
    bytes.copy_from_slice(&result);
    ChainDigest(bytes)
}

/// First point of divergence between a recomputed and a stored chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TamperReport {
    /// Zero-based index of the first frame whose digest differs.
    pub frame_index: u64,
    /// Digest recorded in the stored chain.
    pub expected: ChainDigest,
    /// Digest recomputed from the presented frame.
    pub actual: ChainDigest,
}

/// A fully materialized chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chain {
    pub links: Vec<ChainDigest>,
    pub root: ChainDigest,
}

/// Incremental chain construction over fixed-size frames.
#[derive(Debug, Clone)]
pub struct ChainBuilder {
    algorithm: ChainHashAlgorithm,
    frame_size: usize,
    previous: ChainDigest,
    frames: u64,
}

impl ChainBuilder {
    /// Fails with [`TesseraError::InvalidFrameGeometry`] for a zero frame
    /// size.
    pub fn new(frame_size: usize) -> Result<Self> {
        if frame_size == 0 {
            return Err(TesseraError::InvalidFrameGeometry(
                "frame size must be non-zero".into(),
            ));
        }

        Ok(Self {
            algorithm: ChainHashAlgorithm::default(),
            frame_size,
            previous: ChainDigest::ZERO,
            frames: 0,
        })
    }

    pub fn with_algorithm(mut self, algorithm: ChainHashAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Append a frame and return its link digest.
    pub fn push(&mut self, frame: &[u8]) -> Result<ChainDigest> {
        if frame.len() != self.frame_size {
            return Err(TesseraError::FrameSizeMismatch {
                index: self.frames,
                expected: self.frame_size,
                actual: frame.len(),
            });
        }

        let digest = chain_step(self.algorithm, frame, &self.previous);
        self.previous = digest;
        self.frames += 1;
        Ok(digest)
    }

    /// Digest of the last pushed frame, or the zero seed if none were pushed.
    pub fn root(&self) -> ChainDigest {
        self.previous
    }

    pub fn frame_count(&self) -> u64 {
        self.frames
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn algorithm(&self) -> ChainHashAlgorithm {
        self.algorithm
    }
}

/// Build the SHA-256 chain for an ordered sequence of frames.
///
/// Fails with [`TesseraError::FrameSizeMismatch`] on the first frame whose
/// length differs from `frame_size`. An empty sequence yields
/// [`ChainDigest::ZERO`] as the root.
pub fn build_chain<I, F>(frame_size: usize, frames: I) -> Result<Chain>
where
    I: IntoIterator<Item = F>,
    F: AsRef<[u8]>,
{
    let mut builder = ChainBuilder::new(frame_size)?;
    let links = frames
        .into_iter()
        .map(|frame| builder.push(frame.as_ref()))
        .collect::<Result<Vec<_>>>()?;

    debug!(
        frames = builder.frame_count(),
        root = %builder.root(),
        "Built hash chain"
    );

    Ok(Chain {
        links,
        root: builder.root(),
    })
}

/// Streaming comparison of presented frames against stored links.
///
/// Stored links arrive as `Result`s so they can be read lazily from disk; a
/// failed read is returned as-is from [`check`](Self::check) or
/// [`finish`](Self::finish). Each call to `check` consumes exactly one
/// link. `finish` must be called once the frames run out so that a stored
/// chain longer than the presented video is caught.
pub struct ChainVerifier<I> {
    builder: ChainBuilder,
    expected: I,
}

impl<I> ChainVerifier<I>
where
    I: Iterator<Item = Result<ChainDigest>>,
{
    pub fn new<E>(frame_size: usize, expected: E) -> Result<Self>
    where
        E: IntoIterator<IntoIter = I>,
    {
        Ok(Self {
            builder: ChainBuilder::new(frame_size)?,
            expected: expected.into_iter(),
        })
    }

    pub fn with_algorithm(mut self, algorithm: ChainHashAlgorithm) -> Self {
        self.builder = self.builder.with_algorithm(algorithm);
        self
    }

    /// Recompute the next link and compare it with the stored one.
    ///
    /// When frames outrun the stored chain, `observed_frames` in the
    /// resulting [`TesseraError::ChainLengthMismatch`] counts the frames seen
    /// up to and including the extra one.
    pub fn check(&mut self, frame: &[u8]) -> Result<ChainDigest> {
        let index = self.builder.frame_count();
        if frame.len() != self.builder.frame_size() {
            return Err(TesseraError::FrameSizeMismatch {
                index,
                expected: self.builder.frame_size(),
                actual: frame.len(),
            });
        }

        let Some(expected) = self.expected.next().transpose()? else {
            return Err(TesseraError::ChainLengthMismatch {
                expected_links: index,
                observed_frames: index + 1,
            });
        };

        let actual = self.builder.push(frame)?;
        if actual != expected {
            return Err(TesseraError::Tampered(TamperReport {
                frame_index: index,
                expected,
                actual,
            }));
        }

        Ok(actual)
    }

    pub fn frames_checked(&self) -> u64 {
        self.builder.frame_count()
    }

    /// Conclude verification and return the recomputed root.
    pub fn finish(mut self) -> Result<ChainDigest> {
        let observed = self.builder.frame_count();
        let mut remaining = 0u64;
        for link in self.expected.by_ref() {
            link?;
            remaining += 1;
        }
        if remaining > 0 {
            return Err(TesseraError::ChainLengthMismatch {
                expected_links: observed + remaining,
                observed_frames: observed,
            });
        }

        debug!(frames = observed, root = %self.builder.root(), "Hash chain verified");
        Ok(self.builder.root())
    }
}

/// Verify an ordered frame sequence against stored SHA-256 links.
///
/// Returns the recomputed root on a full match. The first digest mismatch is
/// reported as [`TesseraError::Tampered`]; size and length problems are
/// reported as structural errors.
pub fn verify_chain<I, F, E>(frame_size: usize, frames: I, expected_links: E) -> Result<ChainDigest>
where
    I: IntoIterator<Item = F>,
    F: AsRef<[u8]>,
    E: IntoIterator<Item = ChainDigest>,
{
    let mut verifier = ChainVerifier::new(frame_size, expected_links.into_iter().map(Ok))?;
    for frame in frames {
        verifier.check(frame.as_ref())?;
    }
    verifier.finish()
}
