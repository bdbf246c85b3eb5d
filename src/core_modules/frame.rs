// THEORY:
// A `Frame` is one captured image plus the instant it was captured. Timestamps
// travel with the pixels because the detection state machine measures dwell time
// on capture time, not on the (variable) time it took to analyze the frame.
//
// The camera itself is outside this crate. The core only sees a pull-based
// `FrameSource`, which may be "not ready yet" (the capture surface is still
// warming up) without that being an error.

use image::RgbaImage;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Replays slower than one frame a minute are rejected.
const MAX_FRAME_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct Frame {
    pub image: RgbaImage,
    pub timestamp: Instant,
}

impl Frame {
    pub fn new(image: RgbaImage, timestamp: Instant) -> Self {
        Self { image, timestamp }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Result of asking a source for its next frame.
#[derive(Debug)]
pub enum FramePoll {
    Ready(Frame),
    /// The capture side has no frame yet. The caller skips this cycle.
    NotReady,
    /// The source is exhausted or closed.
    Finished,
}

/// A pull source of frames, polled by the tracking worker.
pub trait FrameSource: Send {
    fn poll_frame(&mut self) -> FramePoll;
}

/// Replays a directory of still images as if they were a live stream.
///
/// Files are read in lexical order. Timestamps are synthesized at a fixed
/// frame interval from the moment the source is created, so dwell timing in a
/// replay matches the recording rate rather than decode speed.
pub struct DirectorySource {
    paths: Vec<PathBuf>,
    next_index: usize,
    origin: Instant,
    frame_interval: Duration,
}

impl DirectorySource {
    pub fn open(directory: &Path, frames_per_second: f64) -> std::io::Result<Self> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(directory)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file())
            .collect();
        paths.sort();

        let frames_per_second = if frames_per_second > 0.0 { frames_per_second } else { 30.0 };
        let frame_interval = Duration::try_from_secs_f64(1.0 / frames_per_second)
            .ok()
            .filter(|interval| !interval.is_zero() && *interval <= MAX_FRAME_INTERVAL)
            .ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("unusable frame rate {frames_per_second}"),
                )
            })?;
        debug!(count = paths.len(), ?directory, "opened frame directory");

        Ok(Self {
            paths,
            next_index: 0,
            origin: Instant::now(),
            frame_interval,
        })
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl FrameSource for DirectorySource {
    fn poll_frame(&mut self) -> FramePoll {
        while let Some(path) = self.paths.get(self.next_index) {
            let index = self.next_index;
            self.next_index += 1;

            match image::open(path) {
                Ok(decoded) => {
                    let timestamp = self.origin + self.frame_interval * index as u32;
                    return FramePoll::Ready(Frame::new(decoded.to_rgba8(), timestamp));
                }
                Err(e) => {
                    // Unreadable files are skipped; the stream keeps going.
                    warn!(?path, error = %e, "skipping undecodable frame");
                }
            }
        }
        FramePoll::Finished
    }
}
