//! End-to-end video provenance: chain, sign, store, verify.
//!
//! Frames use the production geometry (224x224 rgb24) so these tests exercise
//! the same frame size the ffmpeg source produces.

use std::io::Cursor;

use tessera_core::backend::{BackendFactory, BackendKind, KeyFile, SignatureBackend};
use tessera_core::chain::{build_chain, ChainDigest, ChainFile, ChainFormat};
use tessera_core::frames::{FrameGeometry, RawFrameReader, VecFrameSource};
use tessera_core::{
    IdentityVerdict, TesseraError, VideoArtifacts, VideoOutcome, VideoPipeline,
};

const FRAMES: usize = 12;

fn geometry() -> FrameGeometry {
    FrameGeometry::default()
}

/// Deterministic frames that all differ from one another.
fn video(count: usize) -> Vec<Vec<u8>> {
    let size = geometry().frame_size();
    (0..count)
        .map(|i| (0..size).map(|p| ((p * 31 + i * 97) % 251) as u8).collect())
        .collect()
}

fn backend(kind: BackendKind) -> Box<dyn SignatureBackend> {
    let key = KeyFile::generate(kind).unwrap();
    BackendFactory::from_key_file(&key).unwrap()
}

fn source(frames: Vec<Vec<u8>>) -> VecFrameSource {
    VecFrameSource::new(geometry().frame_size(), frames)
}

#[test]
fn test_unmodified_video_verifies() {
    let dir = tempfile::tempdir().unwrap();
    let backend = backend(BackendKind::MlDsa65File);
    let pipeline = VideoPipeline::new(backend.as_ref(), VideoArtifacts::in_dir(dir.path()));

    let signed = pipeline.sign(&mut source(video(FRAMES))).unwrap();
    assert_eq!(signed.frames, FRAMES as u64);

    let stored = ChainFile::read(&pipeline.artifacts().chain).unwrap();
    assert_eq!(stored.format, ChainFormat::Legacy);
    assert_eq!(stored.len(), FRAMES);
    assert_eq!(stored.root(), signed.root);

    let result = pipeline.verify(&mut source(video(FRAMES))).unwrap();
    assert_eq!(result.outcome.identity(), IdentityVerdict::Verified);
    assert!(matches!(
        result.outcome,
        VideoOutcome::Verified { frames, root } if frames == FRAMES as u64 && root == signed.root
    ));
}

#[test]
fn test_single_flipped_byte_is_localized() {
    let dir = tempfile::tempdir().unwrap();
    let backend = backend(BackendKind::Ed25519File);
    let pipeline = VideoPipeline::new(backend.as_ref(), VideoArtifacts::in_dir(dir.path()));
    pipeline.sign(&mut source(video(FRAMES))).unwrap();

    for target in [0, 5, FRAMES - 1] {
        let mut frames = video(FRAMES);
        let last = frames[target].len() - 1;
        frames[target][last] ^= 0x01;

        let result = pipeline.verify(&mut source(frames)).unwrap();
        match result.outcome {
            VideoOutcome::Tampered(report) => {
                assert_eq!(report.frame_index, target as u64);
                assert_ne!(report.expected, report.actual);
            }
            other => panic!("frame {target}: expected tamper, got {other:?}"),
        }
    }
}

#[test]
fn test_reordered_frames_detected_at_first_swap() {
    let dir = tempfile::tempdir().unwrap();
    let backend = backend(BackendKind::Ed25519File);
    let pipeline = VideoPipeline::new(backend.as_ref(), VideoArtifacts::in_dir(dir.path()));
    pipeline.sign(&mut source(video(FRAMES))).unwrap();

    let mut frames = video(FRAMES);
    frames.swap(3, 7);

    let result = pipeline.verify(&mut source(frames)).unwrap();
    assert!(matches!(result.outcome, VideoOutcome::Tampered(r) if r.frame_index == 3));
}

#[test]
fn test_dropped_and_appended_frames_are_structural() {
    let dir = tempfile::tempdir().unwrap();
    let backend = backend(BackendKind::Ed25519File);
    let pipeline = VideoPipeline::new(backend.as_ref(), VideoArtifacts::in_dir(dir.path()));
    pipeline.sign(&mut source(video(FRAMES))).unwrap();

    let err = pipeline.verify(&mut source(video(FRAMES - 1))).unwrap_err();
    assert!(err.is_structural());
    assert!(matches!(
        err,
        TesseraError::ChainLengthMismatch {
            expected_links,
            observed_frames,
        } if expected_links == FRAMES as u64 && observed_frames == FRAMES as u64 - 1
    ));

    let err = pipeline.verify(&mut source(video(FRAMES + 1))).unwrap_err();
    assert!(matches!(err, TesseraError::ChainLengthMismatch { .. }));
}

#[test]
fn test_empty_video_signs_zero_root() {
    let dir = tempfile::tempdir().unwrap();
    let backend = backend(BackendKind::Ed25519File);
    let pipeline = VideoPipeline::new(backend.as_ref(), VideoArtifacts::in_dir(dir.path()));

    let signed = pipeline.sign(&mut source(Vec::new())).unwrap();
    assert_eq!(signed.frames, 0);
    assert_eq!(signed.root, ChainDigest::ZERO);
    assert!(std::fs::read(&pipeline.artifacts().chain).unwrap().is_empty());

    let result = pipeline.verify(&mut source(Vec::new())).unwrap();
    assert_eq!(result.outcome.identity(), IdentityVerdict::Verified);
}

#[test]
fn test_raw_stream_matches_in_memory_frames() {
    let dir = tempfile::tempdir().unwrap();
    let backend = backend(BackendKind::Ed25519File);
    let pipeline = VideoPipeline::new(backend.as_ref(), VideoArtifacts::in_dir(dir.path()))
        .with_chain_format(ChainFormat::Versioned);

    let frames = video(4);
    let raw: Vec<u8> = frames.concat();
    let mut reader = RawFrameReader::new(Cursor::new(raw), geometry().frame_size()).unwrap();

    let signed = pipeline.sign(&mut reader).unwrap();
    assert_eq!(signed.root, build_chain(geometry().frame_size(), &frames).unwrap().root);

    let result = pipeline.verify(&mut source(frames)).unwrap();
    assert_eq!(result.format, ChainFormat::Versioned);
    assert_eq!(result.outcome.identity(), IdentityVerdict::Verified);
}

#[test]
fn test_truncated_raw_stream_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let backend = backend(BackendKind::Ed25519File);
    let pipeline = VideoPipeline::new(backend.as_ref(), VideoArtifacts::in_dir(dir.path()));

    let mut raw: Vec<u8> = video(2).concat();
    raw.truncate(raw.len() - 10);
    let mut reader = RawFrameReader::new(Cursor::new(raw), geometry().frame_size()).unwrap();

    let err = pipeline.sign(&mut reader).unwrap_err();
    assert!(matches!(err, TesseraError::FrameSizeMismatch { index: 1, .. }));
}

#[test]
fn test_verify_with_public_key_only() {
    let dir = tempfile::tempdir().unwrap();
    let key = KeyFile::generate(BackendKind::MlDsa65File).unwrap();
    let key_path = dir.path().join("keys").join("verify.key");
    key.public_only().write(&key_path).unwrap();

    let signer = BackendFactory::from_key_file(&key).unwrap();
    VideoPipeline::new(signer.as_ref(), VideoArtifacts::in_dir(dir.path()))
        .sign(&mut source(video(3)))
        .unwrap();

    let verifier = BackendFactory::create(&tessera_core::BackendConfig {
        kind: BackendKind::MlDsa65File,
        key_path,
    })
    .unwrap();
    let result = VideoPipeline::new(verifier.as_ref(), VideoArtifacts::in_dir(dir.path()))
        .verify(&mut source(video(3)))
        .unwrap();
    assert_eq!(result.outcome.identity(), IdentityVerdict::Verified);
}

#[test]
fn test_degenerate_geometry_cannot_sign_anything() {
    assert!(matches!(
        FrameGeometry::rgb24(0, 224),
        Err(TesseraError::InvalidFrameGeometry(_))
    ));
    assert!(matches!(
        RawFrameReader::new(Cursor::new(vec![0xAA; 10_000]), 0),
        Err(TesseraError::InvalidFrameGeometry(_))
    ));
}

#[test]
fn test_corrupted_chain_file_is_malformed() {
    let dir = tempfile::tempdir().unwrap();
    let backend = backend(BackendKind::Ed25519File);
    let pipeline = VideoPipeline::new(backend.as_ref(), VideoArtifacts::in_dir(dir.path()));
    pipeline.sign(&mut source(video(3))).unwrap();

    let chain_path = pipeline.artifacts().chain.clone();
    let mut bytes = std::fs::read(&chain_path).unwrap();
    bytes.truncate(bytes.len() - 7);
    std::fs::write(&chain_path, bytes).unwrap();

    let err = pipeline.verify(&mut source(video(3))).unwrap_err();
    assert!(matches!(err, TesseraError::MalformedArtifact { .. }));
    assert!(err.is_structural());
}
