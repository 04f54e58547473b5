//! On-disk chain layouts.
//!
//! The legacy layout is a flat concatenation of 32-byte digests in frame
//! order with no header; its length is implicitly `frames × 32` and it always
//! implies SHA-256.
//!
//! The versioned layout prefixes the digests with a 16-byte header:
//!
//! ```text
//! offset  size  field
//! 0       4     magic "TSCH"
//! 4       1     format version (1)
//! 5       1     hash algorithm id
//! 6       2     reserved, zero
//! 8       8     frame count, little-endian u64
//! 16      32×N  digests
//! ```
//!
//! Legacy files are always a multiple of 32 bytes long and versioned files
//! never are, so the reader can tell them apart from the length alone.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

use super::{ChainDigest, ChainHashAlgorithm, DIGEST_SIZE};
use crate::error::{Result, TesseraError};

pub const CHAIN_MAGIC: [u8; 4] = *b"TSCH";
pub const CHAIN_FORMAT_VERSION: u8 = 1;
const HEADER_LEN: usize = 16;

/// Layout used when writing a chain file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainFormat {
    /// Headerless digests, readable by every existing verifier.
    #[default]
    Legacy,
    /// Header with version, algorithm and frame count.
    Versioned,
}

/// A parsed chain file held in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainFile {
    pub format: ChainFormat,
    pub algorithm: ChainHashAlgorithm,
    pub links: Vec<ChainDigest>,
}

impl ChainFile {
    /// Read and parse a whole chain file.
    ///
    /// A missing file is reported as [`TesseraError::MissingReference`], an
    /// unparseable one as [`TesseraError::MalformedArtifact`]. Use
    /// [`ChainReader::open`] to stream links instead.
    pub fn read(path: &Path) -> Result<Self> {
        Self::from_reader(ChainReader::open(path)?)
    }

    /// Parse either layout from raw bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Self::from_reader(ChainReader::new(bytes, bytes.len() as u64)?)
    }

    fn from_reader<R: Read>(reader: ChainReader<R>) -> Result<Self> {
        let format = reader.format();
        let algorithm = reader.algorithm();
        Ok(Self {
            format,
            algorithm,
            links: reader.collect::<Result<Vec<_>>>()?,
        })
    }

    /// Serialize to the layout recorded in `self.format`.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.links.len() * DIGEST_SIZE);
        if self.format == ChainFormat::Versioned {
            out.extend_from_slice(&header(self.algorithm, self.links.len() as u64));
        }
        for link in &self.links {
            out.extend_from_slice(link.as_bytes());
        }
        out
    }

    pub fn root(&self) -> ChainDigest {
        self.links.last().copied().unwrap_or(ChainDigest::ZERO)
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

/// Streaming chain file reader.
///
/// The layout is decided from the total length and the header, then links
/// are yielded one at a time, so verifying a video needs one digest of
/// memory no matter how long the chain is. A read failure ends the
/// iteration after yielding its error.
pub struct ChainReader<R> {
    inner: R,
    format: ChainFormat,
    algorithm: ChainHashAlgorithm,
    links: u64,
    read: u64,
    path: Option<PathBuf>,
}

impl ChainReader<BufReader<File>> {
    /// Open a chain file for streaming.
    ///
    /// A missing file is reported as [`TesseraError::MissingReference`];
    /// header and read failures as [`TesseraError::MalformedArtifact`].
    pub fn open(path: &Path) -> Result<Self> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(TesseraError::MissingReference {
                    path: path.to_path_buf(),
                })
            }
            Err(e) => return Err(e.into()),
        };
        let len = file.metadata()?.len();

        let mut reader = Self::new(BufReader::new(file), len).map_err(|e| malformed(path, e))?;
        reader.path = Some(path.to_path_buf());
        Ok(reader)
    }
}

impl<R: Read> ChainReader<R> {
    /// Parse the layout of a chain `len` bytes long from `inner`.
    pub fn new(mut inner: R, len: u64) -> Result<Self> {
        let digest = DIGEST_SIZE as u64;
        let header_len = HEADER_LEN as u64;

        if len % digest == 0 {
            return Ok(Self {
                inner,
                format: ChainFormat::Legacy,
                algorithm: ChainHashAlgorithm::Sha256,
                links: len / digest,
                read: 0,
                path: None,
            });
        }

        if len < header_len || (len - header_len) % digest != 0 {
            return Err(TesseraError::Serialization(format!(
                "chain length {len} is not a multiple of {DIGEST_SIZE}"
            )));
        }

        let mut bytes = [0u8; HEADER_LEN];
        inner
            .read_exact(&mut bytes)
            .map_err(|e| TesseraError::Serialization(format!("unreadable chain header: {e}")))?;
        let (algorithm, declared) = parse_header(&bytes)?;

        let actual = (len - header_len) / digest;
        if declared != actual {
            return Err(TesseraError::Serialization(format!(
                "header declares {declared} frames but file holds {actual} digests"
            )));
        }

        Ok(Self {
            inner,
            format: ChainFormat::Versioned,
            algorithm,
            links: actual,
            read: 0,
            path: None,
        })
    }

    pub fn format(&self) -> ChainFormat {
        self.format
    }

    pub fn algorithm(&self) -> ChainHashAlgorithm {
        self.algorithm
    }

    /// Total number of links in the chain.
    pub fn len(&self) -> u64 {
        self.links
    }

    pub fn is_empty(&self) -> bool {
        self.links == 0
    }
}

impl<R: Read> Iterator for ChainReader<R> {
    type Item = Result<ChainDigest>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.read >= self.links {
            return None;
        }

        let mut bytes = [0u8; DIGEST_SIZE];
        if let Err(e) = self.inner.read_exact(&mut bytes) {
            let err = TesseraError::Serialization(format!("link {} unreadable: {e}", self.read));
            self.read = self.links;
            return Some(Err(match &self.path {
                Some(path) => malformed(path, err),
                None => err,
            }));
        }

        self.read += 1;
        Some(Ok(ChainDigest::from_bytes(bytes)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = usize::try_from(self.links - self.read).unwrap_or(usize::MAX);
        (0, Some(remaining))
    }
}

fn malformed(path: &Path, err: TesseraError) -> TesseraError {
    match err {
        TesseraError::Serialization(reason) => TesseraError::MalformedArtifact {
            path: path.to_path_buf(),
            reason,
        },
        other => other,
    }
}

fn parse_header(bytes: &[u8; HEADER_LEN]) -> Result<(ChainHashAlgorithm, u64)> {
    if bytes[..4] != CHAIN_MAGIC {
        return Err(TesseraError::Serialization(
            "chain header magic is missing".into(),
        ));
    }

    let version = bytes[4];
    if version != CHAIN_FORMAT_VERSION {
        return Err(TesseraError::Serialization(format!(
            "unsupported chain format version {version}"
        )));
    }

    let algorithm = ChainHashAlgorithm::from_id(bytes[5]).ok_or_else(|| {
        TesseraError::Serialization(format!("unknown chain hash algorithm id {}", bytes[5]))
    })?;

    let mut count = [0u8; 8];
    count.copy_from_slice(&bytes[8..16]);
    Ok((algorithm, u64::from_le_bytes(count)))
}

fn header(algorithm: ChainHashAlgorithm, frames: u64) -> [u8; HEADER_LEN] {
    let mut header = [0u8; HEADER_LEN];
    header[..4].copy_from_slice(&CHAIN_MAGIC);
    header[4] = CHAIN_FORMAT_VERSION;
    header[5] = algorithm.id();
    header[8..].copy_from_slice(&frames.to_le_bytes());
    header
}

/// Streaming chain file writer.
///
/// Links are written as they are produced. For the versioned layout a
/// placeholder header is written first and patched with the final frame
/// count in [`finish`](Self::finish).
pub struct ChainWriter<W: Write + Seek> {
    inner: W,
    format: ChainFormat,
    algorithm: ChainHashAlgorithm,
    links: u64,
}

impl<W: Write + Seek> ChainWriter<W> {
    pub fn new(mut inner: W, format: ChainFormat, algorithm: ChainHashAlgorithm) -> Result<Self> {
        if format == ChainFormat::Legacy && algorithm != ChainHashAlgorithm::Sha256 {
            return Err(TesseraError::Serialization(format!(
                "legacy chain files cannot record {algorithm}; use the versioned format"
            )));
        }

        if format == ChainFormat::Versioned {
            inner.write_all(&header(algorithm, 0))?;
        }

        Ok(Self {
            inner,
            format,
            algorithm,
            links: 0,
        })
    }

    pub fn append(&mut self, digest: &ChainDigest) -> Result<()> {
        self.inner.write_all(digest.as_bytes())?;
        self.links += 1;
        Ok(())
    }

    /// Flush, patch the header if needed, and hand back the inner writer.
    pub fn finish(mut self) -> Result<W> {
        if self.format == ChainFormat::Versioned {
            let end = self.inner.stream_position()?;
            self.inner.seek(SeekFrom::Start(0))?;
            self.inner.write_all(&header(self.algorithm, self.links))?;
            self.inner.seek(SeekFrom::Start(end))?;
        }
        self.inner.flush()?;
        Ok(self.inner)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::io::Cursor;

    use super::*;
    use crate::chain::{build_chain, ChainBuilder};

    fn sample_links() -> Vec<ChainDigest> {
        let frames: Vec<Vec<u8>> = (0..3u8).map(|i| vec![i; 8]).collect();
        build_chain(8, &frames).unwrap().links
    }

    #[test]
    fn test_legacy_layout_is_flat_digests() {
        let links = sample_links();
        let mut writer = ChainWriter::new(
            Cursor::new(Vec::new()),
            ChainFormat::Legacy,
            ChainHashAlgorithm::Sha256,
        )
        .unwrap();
        for link in &links {
            writer.append(link).unwrap();
        }
        let bytes = writer.finish().unwrap().into_inner();

        assert_eq!(bytes.len(), 3 * DIGEST_SIZE);
        assert_eq!(&bytes[32..64], links[1].as_bytes());

        let parsed = ChainFile::decode(&bytes).unwrap();
        assert_eq!(parsed.format, ChainFormat::Legacy);
        assert_eq!(parsed.algorithm, ChainHashAlgorithm::Sha256);
        assert_eq!(parsed.links, links);
        assert_eq!(parsed.root(), links[2]);
    }

    #[test]
    fn test_versioned_writer_patches_frame_count() {
        let mut builder = ChainBuilder::new(4)
            .unwrap()
            .with_algorithm(ChainHashAlgorithm::Sha3_256);
        let mut writer = ChainWriter::new(
            Cursor::new(Vec::new()),
            ChainFormat::Versioned,
            ChainHashAlgorithm::Sha3_256,
        )
        .unwrap();
        for frame in [[1u8; 4], [2u8; 4]] {
            writer.append(&builder.push(&frame).unwrap()).unwrap();
        }
        let bytes = writer.finish().unwrap().into_inner();

        assert_eq!(bytes.len(), HEADER_LEN + 2 * DIGEST_SIZE);
        assert_eq!(&bytes[..4], b"TSCH");
        assert_eq!(u64::from_le_bytes(bytes[8..16].try_into().unwrap()), 2);

        let parsed = ChainFile::decode(&bytes).unwrap();
        assert_eq!(parsed.format, ChainFormat::Versioned);
        assert_eq!(parsed.algorithm, ChainHashAlgorithm::Sha3_256);
        assert_eq!(parsed.root(), builder.root());
        assert_eq!(parsed.encode(), bytes);
    }

    #[test]
    fn test_empty_chain_files() {
        let legacy = ChainFile::decode(&[]).unwrap();
        assert!(legacy.is_empty());
        assert_eq!(legacy.root(), ChainDigest::ZERO);

        let versioned = ChainFile {
            format: ChainFormat::Versioned,
            algorithm: ChainHashAlgorithm::Sha256,
            links: Vec::new(),
        };
        let parsed = ChainFile::decode(&versioned.encode()).unwrap();
        assert_eq!(parsed, versioned);
    }

    #[test]
    fn test_rejects_truncated_legacy_file() {
        let bytes = vec![0u8; DIGEST_SIZE + 5];
        assert!(matches!(
            ChainFile::decode(&bytes),
            Err(TesseraError::Serialization(_))
        ));
    }

    #[test]
    fn test_rejects_count_mismatch_in_header() {
        let file = ChainFile {
            format: ChainFormat::Versioned,
            algorithm: ChainHashAlgorithm::Sha256,
            links: sample_links(),
        };
        let mut bytes = file.encode();
        bytes[8] = 7;
        assert!(ChainFile::decode(&bytes).is_err());
    }

    #[test]
    fn test_legacy_writer_refuses_non_default_algorithm() {
        let result = ChainWriter::new(
            Cursor::new(Vec::new()),
            ChainFormat::Legacy,
            ChainHashAlgorithm::Sha3_256,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_read_missing_file_is_missing_reference() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("video_chain.bin");
        assert!(matches!(
            ChainFile::read(&path),
            Err(TesseraError::MissingReference { .. })
        ));

        fs::write(&path, [0u8; 33]).unwrap();
        assert!(matches!(
            ChainFile::read(&path),
            Err(TesseraError::MalformedArtifact { .. })
        ));
    }

    #[test]
    fn test_reader_streams_both_layouts() {
        let links = sample_links();
        for format in [ChainFormat::Legacy, ChainFormat::Versioned] {
            let bytes = ChainFile {
                format,
                algorithm: ChainHashAlgorithm::Sha256,
                links: links.clone(),
            }
            .encode();

            let mut reader = ChainReader::new(Cursor::new(&bytes), bytes.len() as u64).unwrap();
            assert_eq!(reader.format(), format);
            assert_eq!(reader.len(), 3);
            assert_eq!(reader.next().unwrap().unwrap(), links[0]);
            let rest: Vec<_> = reader.by_ref().map(|link| link.unwrap()).collect();
            assert_eq!(rest, links[1..]);
            assert!(reader.next().is_none());
        }
    }

    #[test]
    fn test_reader_reports_short_stream_once() {
        let links = sample_links();
        let bytes: Vec<u8> = links.iter().flat_map(|l| *l.as_bytes()).collect();

        // Length claims four links, the stream holds three.
        let mut reader = ChainReader::new(Cursor::new(&bytes), 4 * DIGEST_SIZE as u64).unwrap();
        for link in &links {
            assert_eq!(&reader.next().unwrap().unwrap(), link);
        }
        assert!(matches!(
            reader.next(),
            Some(Err(TesseraError::Serialization(_)))
        ));
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_open_streams_versioned_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("video_chain.bin");
        let file = ChainFile {
            format: ChainFormat::Versioned,
            algorithm: ChainHashAlgorithm::Sha3_256,
            links: sample_links(),
        };
        fs::write(&path, file.encode()).unwrap();

        let reader = ChainReader::open(&path).unwrap();
        assert_eq!(reader.format(), ChainFormat::Versioned);
        assert_eq!(reader.algorithm(), ChainHashAlgorithm::Sha3_256);
        let links = reader.collect::<Result<Vec<_>>>().unwrap();
        assert_eq!(links, file.links);

        let mut bytes = file.encode();
        bytes[5] = 9;
        fs::write(&path, bytes).unwrap();
        assert!(matches!(
            ChainReader::open(&path),
            Err(TesseraError::MalformedArtifact { .. })
        ));
    }
}
