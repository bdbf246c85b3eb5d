// THEORY:
// A `TrackingSession` is the dedicated worker that drives a `TrackingPipeline`.
// Analysis is strictly sequential, so there is exactly one worker and it runs
// on tokio's blocking pool: frame analysis is CPU work and must not stall the
// async tasks doing fetches and uploads.
//
// Key architectural principles:
// 1.  **Poll, Then Listen**: Each cycle polls the source first and then drains
//     the control channel, so a control sent before a frame was queued is always
//     applied before that frame is processed.
// 2.  **Not Ready Is Not An Error**: `FramePoll::NotReady` sleeps for one poll
//     interval and tries again.
// 3.  **Observers Never Block**: Overlays go out on a `broadcast` bus. A slow or
//     absent UI loses packets, the worker does not wait for it.
// 4.  **Background Work Is Handed Back**: Clip and photo uploads started by the
//     worker are returned from `join`, so the caller decides whether to await
//     them before exiting.

use crate::core_modules::detection_state::{TrackingMode, TrackingState};
use crate::core_modules::frame::{FramePoll, FrameSource};
use crate::core_modules::frame_region::FrameRegion;
use crate::core_modules::recorder::{UploadTarget, VideoSink};
use crate::pipeline::{Report, TrackingPipeline, UploadHandle};
use crate::uploader::encode_photo;
use image::RgbaImage;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{broadcast, mpsc};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Operator commands for a running session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Track(TrackingMode),
    StopTracking,
    /// Upload a JPEG of the next captured frame.
    TakePhoto,
    Shutdown,
}

/// What the UI receives for every analyzed frame.
#[derive(Debug, Clone)]
pub struct OverlayPacket {
    pub frame_index: u64,
    pub detected: bool,
    pub largest: Option<FrameRegion>,
    pub state: TrackingState,
    pub overlay: Arc<RgbaImage>,
}

/// Everything the worker hands back when it exits.
pub struct SessionOutcome<S: VideoSink> {
    pub pipeline: TrackingPipeline<S>,
    pub frames_seen: u64,
    pub uploads: Vec<UploadHandle>,
}

pub struct TrackingSession<S: VideoSink> {
    control: mpsc::UnboundedSender<Control>,
    worker: JoinHandle<SessionOutcome<S>>,
}

impl<S: VideoSink + 'static> TrackingSession<S> {
    pub fn spawn<F: FrameSource + 'static>(
        source: F,
        pipeline: TrackingPipeline<S>,
        uploader: Arc<dyn UploadTarget>,
        overlays: broadcast::Sender<OverlayPacket>,
    ) -> Self {
        let (control, receiver) = mpsc::unbounded_channel();
        let worker = tokio::task::spawn_blocking(move || {
            Worker {
                source,
                pipeline,
                uploader,
                overlays,
                control: receiver,
                photo_requested: false,
                frames_seen: 0,
                uploads: Vec::new(),
            }
            .run()
        });
        Self { control, worker }
    }

    /// A sender for controls, e.g. for a UI task.
    pub fn control(&self) -> mpsc::UnboundedSender<Control> {
        self.control.clone()
    }

    /// Sends a control. Returns false if the worker has already exited.
    pub fn send(&self, control: Control) -> bool {
        self.control.send(control).is_ok()
    }

    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Waits for the worker to exit.
    pub async fn join(self) -> Result<SessionOutcome<S>, JoinError> {
        self.worker.await
    }
}

struct Worker<F, S: VideoSink> {
    source: F,
    pipeline: TrackingPipeline<S>,
    uploader: Arc<dyn UploadTarget>,
    overlays: broadcast::Sender<OverlayPacket>,
    control: mpsc::UnboundedReceiver<Control>,
    photo_requested: bool,
    frames_seen: u64,
    uploads: Vec<UploadHandle>,
}

impl<F: FrameSource, S: VideoSink> Worker<F, S> {
    fn run(mut self) -> SessionOutcome<S> {
        info!("tracking worker started");
        loop {
            let poll = self.source.poll_frame();

            if self.drain_controls() {
                info!("tracking worker shutting down");
                self.pipeline.set_tracking(None);
                break;
            }

            match poll {
                FramePoll::Ready(frame) => {
                    self.frames_seen += 1;
                    if self.photo_requested {
                        self.photo_requested = false;
                        match encode_photo(&frame) {
                            Ok(jpeg) => self.spawn_photo_upload(jpeg),
                            Err(e) => error!(error = %e, "could not encode photo"),
                        }
                    }
                    if let Report::Analyzed(report) = self.pipeline.process_frame(frame) {
                        self.uploads.extend(report.upload);
                        // No subscribers is fine.
                        let _ = self.overlays.send(OverlayPacket {
                            frame_index: report.frame_index,
                            detected: report.detection.detected,
                            largest: report.largest,
                            state: report.state,
                            overlay: Arc::new(report.overlay),
                        });
                    }
                }
                FramePoll::NotReady => std::thread::sleep(POLL_INTERVAL),
                FramePoll::Finished => {
                    info!(frames = self.frames_seen, "frame source finished");
                    self.uploads.extend(self.pipeline.finish());
                    break;
                }
            }

            self.uploads.retain(|upload| !upload.is_finished());
        }

        SessionOutcome {
            pipeline: self.pipeline,
            frames_seen: self.frames_seen,
            uploads: self.uploads,
        }
    }

    /// Applies every queued control. Returns true when a shutdown was requested.
    fn drain_controls(&mut self) -> bool {
        loop {
            match self.control.try_recv() {
                Ok(Control::Track(mode)) => self.pipeline.set_tracking(Some(mode)),
                Ok(Control::StopTracking) => self.pipeline.set_tracking(None),
                Ok(Control::TakePhoto) => {
                    debug!("photo requested");
                    self.photo_requested = true;
                }
                Ok(Control::Shutdown) => return true,
                // A dropped session handle just means nobody sends controls anymore.
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return false,
            }
        }
    }

    fn spawn_photo_upload(&mut self, jpeg: Vec<u8>) {
        let uploader = Arc::clone(&self.uploader);
        self.uploads.push(tokio::spawn(async move {
            let result = uploader.upload_photo(jpeg).await;
            match &result {
                Ok(()) => info!("photo uploaded"),
                Err(e) => error!(error = %e, "photo upload failed"),
            }
            result
        }));
    }
}
