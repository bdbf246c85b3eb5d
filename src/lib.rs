// THEORY:
// This file is the main entry point for the `ball_tracker` library crate.
// It exposes the tracker as three layers:
//
// - `core_modules`: the synchronous engine (color thresholding, region
//   extraction, the debounced detection state machine and the recording
//   controller). Nothing in here touches the network.
// - `pipeline` and `tracking_session`: the per-frame wiring and the dedicated
//   worker that drives it from a frame source.
// - `endpoint`, `uploader` and `config_fetcher`: the companion-server side,
//   i.e. threshold tuning in and finished clips out.
//
// The binary in `main.rs` is one consumer of this API; a mobile or desktop
// shell would be another.

pub mod config;
pub mod config_fetcher;
pub mod core_modules;
pub mod endpoint;
pub mod error;
pub mod pipeline;
pub mod tracking_session;
pub mod uploader;

// Re-export key data structures for the public API.
pub use crate::config::TrackerConfig;
pub use crate::config_fetcher::{ConfigFetcher, HttpThresholdSource, ThresholdSource};
pub use crate::core_modules::detection_state::{RecordingCommand, TrackingMode, TrackingState};
pub use crate::core_modules::frame::{DirectorySource, Frame, FramePoll, FrameSource};
pub use crate::core_modules::frame_analyzer::{DetectionResult, FrameAnalyzer};
pub use crate::core_modules::recorder::{
    ArtifactRef, MjpegSink, RecorderEvent, RecordingController, UploadTarget, VideoSink,
};
pub use crate::core_modules::threshold::{ChannelRange, SharedThresholds, ThresholdConfig};
pub use crate::endpoint::EndpointStore;
pub use crate::pipeline::{PipelineConfig, Report, TrackingPipeline};
pub use crate::tracking_session::{Control, OverlayPacket, TrackingSession};
pub use crate::uploader::HttpUploader;
