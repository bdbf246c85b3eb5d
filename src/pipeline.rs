// THEORY:
// The `pipeline` module is the top-level per-frame API of the tracker. It wires
// the layers into one call, `process_frame`, that the capture worker runs once
// per captured frame:
//
//   Frame --> recorder (while recording) --> stride --> FrameAnalyzer
//         --> DetectionStateMachine --> RecordingCommands --> RecordingController
//
// Key architectural principles:
// 1.  **Never Stop The Loop**: Nothing in `process_frame` returns an error. Recorder
//     misuse and sink failures are logged and the next frame is processed as usual.
// 2.  **Stop Before Upload**: `UploadArtifact` only ever uploads the artifact that
//     the preceding `StopRecording` produced in the same call.
// 3.  **Tracking Off Is Abrupt**: Any change of tracking mode resets the state
//     machine and discards an active clip without uploading it.
// 4.  **Uploads Are Background Work**: The pipeline returns the upload's join
//     handle in the report and moves on. It must run inside a tokio runtime.

use crate::core_modules::detection_state::{
    DetectionStateMachine, DwellSettings, RecordingCommand, TrackingMode, TrackingState,
};
use crate::core_modules::frame::Frame;
use crate::core_modules::frame_analyzer::{AnalyzerSettings, DetectionResult, FrameAnalyzer};
use crate::core_modules::frame_region::FrameRegion;
use crate::core_modules::recorder::{ArtifactRef, RecordingController, SessionHandle, VideoSink};
use crate::core_modules::threshold::SharedThresholds;
use crate::config::DEFAULT_FRAME_STRIDE;
use crate::error::UploadError;
use image::RgbaImage;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

pub type UploadHandle = JoinHandle<Result<(), UploadError>>;

/// Configuration for the TrackingPipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Analyze every Nth captured frame. Zero is treated as one.
    pub frame_stride: u32,
    pub analyzer: AnalyzerSettings,
    pub dwell: DwellSettings,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            frame_stride: DEFAULT_FRAME_STRIDE,
            analyzer: AnalyzerSettings::default(),
            dwell: DwellSettings::default(),
        }
    }
}

/// The data package for one analyzed frame.
#[derive(Debug)]
pub struct FrameReport {
    /// Position of the frame in the capture stream, counting skipped frames.
    pub frame_index: u64,
    pub detection: DetectionResult,
    pub regions: Vec<FrameRegion>,
    pub largest: Option<FrameRegion>,
    pub overlay: RgbaImage,
    pub state: TrackingState,
    pub commands: Vec<RecordingCommand>,
    /// Background upload started by this frame, if any.
    pub upload: Option<UploadHandle>,
}

/// The primary output of the pipeline for a single frame.
#[derive(Debug)]
pub enum Report {
    /// Tracking is off or the frame fell between stride samples.
    Skipped,
    Analyzed(FrameReport),
}

pub struct TrackingPipeline<S: VideoSink> {
    analyzer: FrameAnalyzer,
    state_machine: DetectionStateMachine,
    recorder: RecordingController<S>,
    thresholds: SharedThresholds,
    frame_stride: u64,
    frame_counter: u64,
    mode: Option<TrackingMode>,
    session: Option<SessionHandle>,
}

impl<S: VideoSink> TrackingPipeline<S> {
    pub fn new(config: PipelineConfig, recorder: RecordingController<S>, thresholds: SharedThresholds) -> Self {
        Self {
            analyzer: FrameAnalyzer::new(config.analyzer),
            state_machine: DetectionStateMachine::new(config.dwell),
            recorder,
            thresholds,
            frame_stride: u64::from(config.frame_stride.max(1)),
            frame_counter: 0,
            mode: None,
            session: None,
        }
    }

    pub fn mode(&self) -> Option<TrackingMode> {
        self.mode
    }

    pub fn state(&self) -> TrackingState {
        self.state_machine.state()
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.is_recording()
    }

    pub fn thresholds(&self) -> &SharedThresholds {
        &self.thresholds
    }

    /// Switches tracking on (in a mode) or off. Any actual change drops pending
    /// dwell state and discards an active clip.
    pub fn set_tracking(&mut self, mode: Option<TrackingMode>) {
        if mode == self.mode {
            return;
        }
        info!(from = ?self.mode, to = ?mode, "tracking mode changed");
        self.state_machine.reset();
        if let Some(handle) = self.session.take() {
            if let Err(e) = self.recorder.abort(handle) {
                warn!(error = %e, "could not abort recording");
            }
        }
        self.mode = mode;
    }

    pub fn process_frame(&mut self, frame: Frame) -> Report {
        if let Err(e) = self.recorder.write_frame(&frame) {
            error!(error = %e, "could not write frame to clip");
        }

        let frame_index = self.frame_counter;
        self.frame_counter += 1;

        let Some(mode) = self.mode else {
            return Report::Skipped;
        };
        if frame_index % self.frame_stride != 0 {
            return Report::Skipped;
        }

        let analysis = self.analyzer.analyze(&frame, &self.thresholds.snapshot());
        let commands = self.state_machine.update(&analysis.detection, mode);
        let upload = self.execute(&commands);

        Report::Analyzed(FrameReport {
            frame_index,
            detection: analysis.detection,
            regions: analysis.regions,
            largest: analysis.largest,
            overlay: analysis.overlay,
            state: self.state_machine.state(),
            commands,
            upload,
        })
    }

    fn execute(&mut self, commands: &[RecordingCommand]) -> Option<UploadHandle> {
        let mut finished: Option<ArtifactRef> = None;
        let mut upload = None;

        for command in commands {
            match command {
                RecordingCommand::StartRecording => match self.recorder.start() {
                    Ok(handle) => self.session = Some(handle),
                    Err(e) => error!(error = %e, "could not start recording"),
                },
                RecordingCommand::StopRecording => match self.session.take() {
                    Some(handle) => match self.recorder.stop(handle) {
                        Ok(artifact) => finished = Some(artifact),
                        Err(e) => error!(error = %e, "could not stop recording"),
                    },
                    None => warn!("stop requested but no session is active"),
                },
                RecordingCommand::UploadArtifact => match finished.take() {
                    Some(artifact) => upload = Some(self.recorder.upload(artifact)),
                    None => warn!("upload requested but no clip was finalized"),
                },
            }
        }
        upload
    }

    /// Ends the stream: a clip still being recorded is finalized and uploaded.
    pub fn finish(&mut self) -> Option<UploadHandle> {
        self.state_machine.reset();
        let handle = self.session.take()?;
        match self.recorder.stop(handle) {
            Ok(artifact) => Some(self.recorder.upload(artifact)),
            Err(e) => {
                error!(error = %e, "could not finalize recording at end of stream");
                None
            }
        }
    }
}
