//! Frame sources feeding the hash chain.
//!
//! The chain engine never decodes video itself. It consumes fixed-size raw
//! frames from a [`FrameSource`], which lets tests drive it with synthetic
//! frames and lets production code stream decoder output without temporary
//! files.

use std::ffi::OsString;
use std::io::{self, Read};
use std::path::Path;
use std::process::{Child, ChildStderr, ChildStdout, Command, Stdio};
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use crate::error::{Result, TesseraError};

/// Default frame width used for chaining.
pub const DEFAULT_FRAME_WIDTH: u32 = 224;
/// Default frame height used for chaining.
pub const DEFAULT_FRAME_HEIGHT: u32 = 224;
/// rgb24 has three bytes per pixel.
pub const RGB24_CHANNELS: u32 = 3;

/// Fixed frame layout every frame of a video is normalized to.
///
/// Every dimension is non-zero, so a geometry always describes at least one
/// byte per frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameGeometry {
    width: u32,
    height: u32,
    channels: u32,
}

impl FrameGeometry {
    pub fn new(width: u32, height: u32, channels: u32) -> Result<Self> {
        for (name, value) in [("width", width), ("height", height), ("channels", channels)] {
            if value == 0 {
                return Err(TesseraError::InvalidFrameGeometry(format!(
                    "{name} must be non-zero (got {width}x{height}x{channels})"
                )));
            }
        }

        (width as usize)
            .checked_mul(height as usize)
            .and_then(|pixels| pixels.checked_mul(channels as usize))
            .ok_or_else(|| {
                TesseraError::InvalidFrameGeometry(format!(
                    "{width}x{height}x{channels} frames do not fit in memory"
                ))
            })?;

        Ok(Self {
            width,
            height,
            channels,
        })
    }

    pub fn rgb24(width: u32, height: u32) -> Result<Self> {
        Self::new(width, height, RGB24_CHANNELS)
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

    /// Bytes per frame, never zero.
    pub fn frame_size(&self) -> usize {
        self.width as usize * self.height as usize * self.channels as usize
    }
}

impl Default for FrameGeometry {
    fn default() -> Self {
        Self {
            width: DEFAULT_FRAME_WIDTH,
            height: DEFAULT_FRAME_HEIGHT,
            channels: RGB24_CHANNELS,
        }
    }
}

/// An ordered producer of raw frames.
pub trait FrameSource {
    /// Size in bytes of every frame this source yields.
    fn frame_size(&self) -> usize;

    /// Next frame in presentation order, or `None` at end of input.
    fn next_frame(&mut self) -> Result<Option<Vec<u8>>>;
}

/// In-memory frames, mainly for tests and callers that already hold decoded
/// frames.
#[derive(Debug, Clone)]
pub struct VecFrameSource {
    frame_size: usize,
    frames: std::vec::IntoIter<Vec<u8>>,
}

impl VecFrameSource {
    pub fn new(frame_size: usize, frames: Vec<Vec<u8>>) -> Self {
        Self {
            frame_size,
            frames: frames.into_iter(),
        }
    }
}

impl FrameSource for VecFrameSource {
    fn frame_size(&self) -> usize {
        self.frame_size
    }

    fn next_frame(&mut self) -> Result<Option<Vec<u8>>> {
        Ok(self.frames.next())
    }
}

/// Splits a raw byte stream into fixed-size frames.
///
/// A trailing chunk shorter than one frame is reported as
/// [`TesseraError::FrameSizeMismatch`] rather than silently dropped.
pub struct RawFrameReader<R> {
    inner: R,
    frame_size: usize,
    index: u64,
}

impl<R: Read> RawFrameReader<R> {
    /// Fails with [`TesseraError::InvalidFrameGeometry`] for a zero frame
    /// size, which would end the stream before reading a byte.
    pub fn new(inner: R, frame_size: usize) -> Result<Self> {
        if frame_size == 0 {
            return Err(TesseraError::InvalidFrameGeometry(
                "frame size must be non-zero".into(),
            ));
        }

        Ok(Self {
            inner,
            frame_size,
            index: 0,
        })
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> FrameSource for RawFrameReader<R> {
    fn frame_size(&self) -> usize {
        self.frame_size
    }

    fn next_frame(&mut self) -> Result<Option<Vec<u8>>> {
        let mut frame = vec![0u8; self.frame_size];
        let mut filled = 0;

        while filled < self.frame_size {
            match self.inner.read(&mut frame[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        if filled == 0 {
            return Ok(None);
        }
        if filled < self.frame_size {
            return Err(TesseraError::FrameSizeMismatch {
                index: self.index,
                expected: self.frame_size,
                actual: filled,
            });
        }

        self.index += 1;
        Ok(Some(frame))
    }
}

/// Bytes of decoder stderr kept for error reports.
const STDERR_TAIL_BYTES: usize = 4096;

/// Streams rgb24 frames out of an `ffmpeg` subprocess.
///
/// The decoder rescales every frame to the configured geometry, so the
/// resulting chain is independent of the container's native resolution.
/// Its stderr is drained on a helper thread while frames are read, keeping
/// only the tail. Dropping the source before end of input kills the
/// subprocess.
pub struct FfmpegFrameSource {
    child: Child,
    reader: RawFrameReader<ChildStdout>,
    stderr: Option<JoinHandle<io::Result<String>>>,
    finished: bool,
}

impl FfmpegFrameSource {
    pub fn spawn(ffmpeg: &Path, input: &Path, geometry: FrameGeometry) -> Result<Self> {
        if geometry.channels != RGB24_CHANNELS {
            return Err(TesseraError::FrameSource(format!(
                "ffmpeg output is rgb24, geometry asks for {} channels",
                geometry.channels
            )));
        }

        let mut child = Command::new(ffmpeg)
            .args(ffmpeg_args(input, geometry))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                TesseraError::FrameSource(format!(
                    "failed to launch {}: {e}",
                    ffmpeg.display()
                ))
            })?;

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            stop(&mut child);
            return Err(TesseraError::FrameSource(
                "ffmpeg output pipes were not captured".into(),
            ));
        };
        let reader = match RawFrameReader::new(stdout, geometry.frame_size()) {
            Ok(reader) => reader,
            Err(e) => {
                stop(&mut child);
                return Err(e);
            }
        };

        // From here on, dropping `source` kills the child.
        let mut source = Self {
            child,
            reader,
            stderr: None,
            finished: false,
        };
        source.stderr = Some(drain_stderr(stderr)?);

        debug!(
            input = %input.display(),
            width = geometry.width,
            height = geometry.height,
            "Spawned ffmpeg frame extraction"
        );

        Ok(source)
    }

    fn wait_for_exit(&mut self) -> Result<()> {
        self.finished = true;

        let status = self.child.wait()?;
        let stderr = match self.stderr.take().map(JoinHandle::join) {
            Some(Ok(Ok(tail))) => tail,
            Some(Ok(Err(e))) => {
                warn!(error = %e, "Failed to read ffmpeg stderr");
                String::new()
            }
            Some(Err(_)) => {
                warn!("ffmpeg stderr reader panicked");
                String::new()
            }
            None => String::new(),
        };

        if !status.success() {
            return Err(TesseraError::FrameSource(format!(
                "ffmpeg exited with {status}: {}",
                stderr.trim()
            )));
        }
        Ok(())
    }
}

/// Read the decoder's stderr to EOF so it can never block on a full pipe.
fn drain_stderr(mut pipe: ChildStderr) -> Result<JoinHandle<io::Result<String>>> {
    let handle = thread::Builder::new()
        .name("ffmpeg-stderr".into())
        .spawn(move || {
            let mut tail = Vec::with_capacity(STDERR_TAIL_BYTES);
            let mut buf = [0u8; 8192];
            loop {
                let n = match pipe.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => n,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e),
                };
                tail.extend_from_slice(&buf[..n]);
                if tail.len() > STDERR_TAIL_BYTES {
                    tail.drain(..tail.len() - STDERR_TAIL_BYTES);
                }
            }
            Ok(String::from_utf8_lossy(&tail).into_owned())
        })
        .map_err(|e| TesseraError::FrameSource(format!("failed to start stderr reader: {e}")))?;
    Ok(handle)
}

fn ffmpeg_args(input: &Path, geometry: FrameGeometry) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-loglevel".into(), "error".into(), "-i".into()];
    args.push(input.as_os_str().to_owned());
    args.extend(
        [
            "-vf".to_string(),
            format!("scale={}:{}", geometry.width, geometry.height),
            "-f".to_string(),
            "rawvideo".to_string(),
            "-pix_fmt".to_string(),
            "rgb24".to_string(),
            "-".to_string(),
        ]
        .map(OsString::from),
    );
    args
}

impl FrameSource for FfmpegFrameSource {
    fn frame_size(&self) -> usize {
        self.reader.frame_size()
    }

    fn next_frame(&mut self) -> Result<Option<Vec<u8>>> {
        if self.finished {
            return Ok(None);
        }

        match self.reader.next_frame() {
            Ok(Some(frame)) => Ok(Some(frame)),
            Ok(None) => {
                self.wait_for_exit()?;
                Ok(None)
            }
            Err(e) => {
                // Surface the decoder's own failure ahead of a short read.
                self.wait_for_exit()?;
                Err(e)
            }
        }
    }
}

impl Drop for FfmpegFrameSource {
    fn drop(&mut self) {
        if !self.finished {
            stop(&mut self.child);
        }
    }
}

fn stop(child: &mut Child) {
    if let Err(e) = child.kill() {
        warn!(error = %e, "Failed to stop ffmpeg");
    }
    if let Err(e) = child.wait() {
        warn!(error = %e, "Failed to reap ffmpeg");
    }
}
