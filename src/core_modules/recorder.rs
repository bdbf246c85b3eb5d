// THEORY:
// The `RecordingController` owns the one thing in the tracker that allocates an
// external resource: the output sink a clip is written into. Its job is to make
// the lifecycle commands of the state machine safe to execute blindly.
//
// Key architectural principles:
// 1.  **Single Session**: At most one session is active. A second `start` is
//     refused with `AlreadyRecording` instead of opening a second sink.
// 2.  **Exclusive Handles**: `start` hands out a non-cloneable `SessionHandle`.
//     `stop`/`abort` consume it and check it against the active session, so a
//     stale handle can never close somebody else's clip.
// 3.  **Stop Before Upload**: An `ArtifactRef` only comes out of `stop`, after
//     the sink has been closed and flushed. `upload` takes an `ArtifactRef`, so
//     uploading an unfinished clip does not type-check.
// 4.  **Off-Loop Upload**: `upload` spawns onto the tokio runtime and returns
//     immediately. The local file is deleted after the attempt, success or not.
// 5.  **Events, Not Callbacks**: Everything a UI wants to hear about (started,
//     stopped, preview restored, upload result) is published as a
//     `RecorderEvent` on an unbounded channel.

use crate::core_modules::frame::Frame;
use crate::error::{RecorderError, SinkError, UploadError};
use async_trait::async_trait;
use chrono::Local;
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub const DEFAULT_JPEG_QUALITY: u8 = 85;
pub const MJPEG_MIME: &str = "video/x-motion-jpeg";

/// What a sink reports after it has been closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosedClip {
    pub path: PathBuf,
    pub mime_type: &'static str,
    pub frames: u64,
}

/// The video encoder boundary. The sink owns muxing; the controller only opens
/// and closes it around the recording window and forwards captured frames.
pub trait VideoSink: Send {
    /// File extension (without the dot) of the clips this sink produces.
    fn extension(&self) -> &'static str;
    fn open(&mut self, path: &Path) -> Result<(), SinkError>;
    fn write(&mut self, frame: &Frame) -> Result<(), SinkError>;
    fn close(&mut self) -> Result<ClosedClip, SinkError>;
}

/// The remote side of the upload handoff.
#[async_trait]
pub trait UploadTarget: Send + Sync {
    /// Posts a finished clip.
    async fn upload_artifact(&self, artifact: &ArtifactRef) -> Result<(), UploadError>;
    /// Posts a single JPEG snapshot.
    async fn upload_photo(&self, jpeg: Vec<u8>) -> Result<(), UploadError>;
}

/// Proof that a session was active. Consumed by `stop`/`abort`.
#[derive(Debug, PartialEq, Eq)]
pub struct SessionHandle {
    pub id: u64,
    pub path: PathBuf,
}

/// A finalized clip, ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRef {
    pub session_id: u64,
    pub path: PathBuf,
    pub mime_type: &'static str,
    pub frames: u64,
}

impl ArtifactRef {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("clip-{}", self.session_id))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecorderEvent {
    RecordingStarted { session_id: u64, path: PathBuf },
    RecordingStopped(ArtifactRef),
    /// The capture side may switch back to plain live preview.
    PreviewRestored,
    /// A session was discarded without upload (tracking switched off).
    RecordingAborted { session_id: u64 },
    UploadSucceeded(ArtifactRef),
    UploadFailed { artifact: ArtifactRef, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ActiveSession {
    id: u64,
}

pub struct RecordingController<S: VideoSink> {
    sink: S,
    uploader: Arc<dyn UploadTarget>,
    clip_dir: PathBuf,
    events: mpsc::UnboundedSender<RecorderEvent>,
    active: Option<ActiveSession>,
    next_session_id: u64,
}

impl<S: VideoSink> RecordingController<S> {
    /// Creates a controller and the receiving end of its event channel.
    pub fn new(
        sink: S,
        uploader: Arc<dyn UploadTarget>,
        clip_dir: impl Into<PathBuf>,
    ) -> (Self, mpsc::UnboundedReceiver<RecorderEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let controller = Self {
            sink,
            uploader,
            clip_dir: clip_dir.into(),
            events,
            active: None,
            next_session_id: 1,
        };
        (controller, receiver)
    }

    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    pub fn active_session(&self) -> Option<u64> {
        self.active.map(|session| session.id)
    }

    fn publish(&self, event: RecorderEvent) {
        // Nobody listening is fine; events are observational.
        let _ = self.events.send(event);
    }

    pub fn start(&mut self) -> Result<SessionHandle, RecorderError> {
        if let Some(active) = self.active {
            warn!(session = active.id, "start requested while already recording");
            return Err(RecorderError::AlreadyRecording(active.id));
        }

        std::fs::create_dir_all(&self.clip_dir).map_err(SinkError::from)?;
        let id = self.next_session_id;
        let path = self.clip_dir.join(format!(
            "VIDEO_{}_{}.{}",
            Local::now().format("%Y%m%d_%H%M%S"),
            id,
            self.sink.extension()
        ));

        self.sink.open(&path)?;
        self.next_session_id += 1;
        self.active = Some(ActiveSession { id });

        info!(session = id, ?path, "recording started");
        self.publish(RecorderEvent::RecordingStarted {
            session_id: id,
            path: path.clone(),
        });
        Ok(SessionHandle { id, path })
    }

    /// Forwards a captured frame to the open sink. A no-op while idle.
    pub fn write_frame(&mut self, frame: &Frame) -> Result<(), RecorderError> {
        if self.active.is_none() {
            return Ok(());
        }
        self.sink.write(frame)?;
        Ok(())
    }

    fn release(&mut self, handle: &SessionHandle) -> Result<ClosedClip, RecorderError> {
        let active = match self.active {
            Some(active) => active,
            None => {
                warn!(session = handle.id, "stop requested while not recording");
                return Err(RecorderError::NotRecording);
            }
        };
        if active.id != handle.id {
            warn!(requested = handle.id, active = active.id, "stale session handle");
            return Err(RecorderError::StaleSession {
                requested: handle.id,
                active: active.id,
            });
        }

        // The session is over even if the sink fails to close cleanly. A clip
        // that could not be finalized is never uploaded, so it is deleted here.
        self.active = None;
        match self.sink.close() {
            Ok(clip) => Ok(clip),
            Err(e) => {
                warn!(session = handle.id, error = %e, "clip could not be finalized, discarding it");
                if let Err(remove) = std::fs::remove_file(&handle.path) {
                    warn!(path = ?handle.path, error = %remove, "could not delete unfinished clip");
                }
                Err(e.into())
            }
        }
    }

    /// Finalizes the session and returns the clip for upload.
    pub fn stop(&mut self, handle: SessionHandle) -> Result<ArtifactRef, RecorderError> {
        let clip = self.release(&handle)?;
        let artifact = ArtifactRef {
            session_id: handle.id,
            path: clip.path,
            mime_type: clip.mime_type,
            frames: clip.frames,
        };

        info!(session = handle.id, frames = artifact.frames, "recording stopped");
        self.publish(RecorderEvent::RecordingStopped(artifact.clone()));
        self.publish(RecorderEvent::PreviewRestored);
        Ok(artifact)
    }

    /// Ends the session and deletes the partial clip. Never uploads.
    pub fn abort(&mut self, handle: SessionHandle) -> Result<(), RecorderError> {
        let clip = self.release(&handle)?;
        if let Err(e) = std::fs::remove_file(&clip.path) {
            warn!(path = ?clip.path, error = %e, "could not delete aborted clip");
        }

        info!(session = handle.id, "recording aborted");
        self.publish(RecorderEvent::RecordingAborted {
            session_id: handle.id,
        });
        self.publish(RecorderEvent::PreviewRestored);
        Ok(())
    }

    /// Uploads a finished clip in the background, then deletes it locally.
    pub fn upload(&self, artifact: ArtifactRef) -> JoinHandle<Result<(), UploadError>> {
        let uploader = Arc::clone(&self.uploader);
        let events = self.events.clone();

        tokio::spawn(async move {
            let result = uploader.upload_artifact(&artifact).await;

            if let Err(e) = tokio::fs::remove_file(&artifact.path).await {
                warn!(path = ?artifact.path, error = %e, "could not delete uploaded clip");
            }

            let event = match &result {
                Ok(()) => {
                    info!(session = artifact.session_id, "upload successful");
                    RecorderEvent::UploadSucceeded(artifact)
                }
                Err(e) => {
                    error!(session = artifact.session_id, error = %e, "upload failed");
                    RecorderEvent::UploadFailed {
                        artifact,
                        reason: e.to_string(),
                    }
                }
            };
            let _ = events.send(event);
            result
        })
    }
}

struct OpenClip {
    path: PathBuf,
    writer: BufWriter<File>,
    frames: u64,
}

/// A Motion-JPEG sink: every frame is appended as a standalone JPEG image.
pub struct MjpegSink {
    quality: u8,
    open: Option<OpenClip>,
}

impl MjpegSink {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
            open: None,
        }
    }
}

impl Default for MjpegSink {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

impl VideoSink for MjpegSink {
    fn extension(&self) -> &'static str {
        "mjpeg"
    }

    fn open(&mut self, path: &Path) -> Result<(), SinkError> {
        if let Some(clip) = &self.open {
            return Err(SinkError::AlreadyOpen(clip.path.clone()));
        }
        let file = File::create(path)?;
        self.open = Some(OpenClip {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            frames: 0,
        });
        Ok(())
    }

    fn write(&mut self, frame: &Frame) -> Result<(), SinkError> {
        let quality = self.quality;
        let clip = self.open.as_mut().ok_or(SinkError::NotOpen)?;

        // JPEG has no alpha channel.
        let rgb = RgbImage::from_fn(frame.width(), frame.height(), |x, y| {
            let [red, green, blue, _] = frame.image.get_pixel(x, y).0;
            Rgb([red, green, blue])
        });
        JpegEncoder::new_with_quality(&mut clip.writer, quality).encode_image(&rgb)?;
        clip.frames += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<ClosedClip, SinkError> {
        let mut clip = self.open.take().ok_or(SinkError::NotOpen)?;
        clip.writer.flush()?;
        debug!(path = ?clip.path, frames = clip.frames, "mjpeg clip closed");
        Ok(ClosedClip {
            path: clip.path,
            mime_type: MJPEG_MIME,
            frames: clip.frames,
        })
    }
}
