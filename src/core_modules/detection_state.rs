// THEORY:
// The `DetectionStateMachine` turns the noisy per-frame yes/no of the analyzer
// into clean recording lifecycle commands. It is a debounce filter with
// hysteresis in both directions:
//
//   Idle --seen--> PendingStart --seen for > start_dwell--> Recording
//     ^                 |                                    |    ^
//     |              not seen                          not seen  seen
//     |                 v                                    v    |
//     +-----------------+------not seen for > stop_dwell--- PendingStop
//
// - Presence must be sustained for longer than `start_dwell` before recording
//   starts, so a single false positive never opens a clip.
// - Absence must be sustained for longer than `stop_dwell` before recording
//   stops, so a brief occlusion never cuts a clip in two.
// - Each pending state carries the capture instant it was entered at; dwell is
//   measured on frame timestamps, never on the wall clock.
// - Stopping always emits `StopRecording` followed by `UploadArtifact`.
// - `reset` drops straight to `Idle` and emits nothing. It is the "tracking was
//   switched off" path and must never trigger an upload.
//
// The machine cannot fail. Commands are fire-and-forget: whether the recorder
// honoured them has no influence on the state here.

use crate::core_modules::frame_analyzer::DetectionResult;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const DEFAULT_DWELL: Duration = Duration::from_millis(1500);

/// Which UI mode is driving the analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackingMode {
    /// Detection drives recording.
    Game,
    /// Detection only feeds the overlay; recording state is never touched.
    Preview,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingState {
    /// Not recording, ball not seen.
    Idle,
    /// Ball seen since `since`, waiting out the start dwell.
    PendingStart { since: Instant },
    /// Recording with the ball in view.
    Recording,
    /// Recording, ball missing since `since`, waiting out the stop dwell.
    PendingStop { since: Instant },
}

impl fmt::Display for TrackingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TrackingState::Idle => "Idle",
            TrackingState::PendingStart { .. } => "PendingStart",
            TrackingState::Recording => "Recording",
            TrackingState::PendingStop { .. } => "PendingStop",
        };
        f.write_str(name)
    }
}

/// Lifecycle commands emitted towards the recorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordingCommand {
    StartRecording,
    StopRecording,
    UploadArtifact,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DwellSettings {
    pub start_dwell: Duration,
    pub stop_dwell: Duration,
}

impl Default for DwellSettings {
    fn default() -> Self {
        Self {
            start_dwell: DEFAULT_DWELL,
            stop_dwell: DEFAULT_DWELL,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DetectionStateMachine {
    state: TrackingState,
    settings: DwellSettings,
    /// Timestamp of the last accepted result, used to reject out-of-order input.
    last_timestamp: Option<Instant>,
}

impl Default for DetectionStateMachine {
    fn default() -> Self {
        Self::new(DwellSettings::default())
    }
}

impl DetectionStateMachine {
    pub fn new(settings: DwellSettings) -> Self {
        Self {
            state: TrackingState::Idle,
            settings,
            last_timestamp: None,
        }
    }

    pub fn state(&self) -> TrackingState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        matches!(self.state, TrackingState::Recording | TrackingState::PendingStop { .. })
    }

    pub fn ball_present(&self) -> bool {
        matches!(self.state, TrackingState::PendingStart { .. } | TrackingState::Recording)
    }

    /// Feeds one sampled result. Returns the commands to execute, in order.
    pub fn update(&mut self, result: &DetectionResult, mode: TrackingMode) -> Vec<RecordingCommand> {
        if mode == TrackingMode::Preview {
            return Vec::new();
        }

        let now = result.timestamp;
        if let Some(last) = self.last_timestamp {
            if now < last {
                warn!("dropping out-of-order detection result");
                return Vec::new();
            }
        }
        self.last_timestamp = Some(now);

        let (next, commands) = self.transition(result.detected, now);
        if next != self.state {
            debug!(from = %self.state, to = %next, detected = result.detected, "tracking transition");
        }
        self.state = next;

        for command in &commands {
            info!(?command, "recording command");
        }
        commands
    }

    fn transition(&self, detected: bool, now: Instant) -> (TrackingState, Vec<RecordingCommand>) {
        use RecordingCommand::*;
        use TrackingState::*;

        match (self.state, detected) {
            (Idle, true) => (PendingStart { since: now }, Vec::new()),
            (Idle, false) => (Idle, Vec::new()),

            (PendingStart { since }, true) => {
                if now.saturating_duration_since(since) > self.settings.start_dwell {
                    (Recording, vec![StartRecording])
                } else {
                    (self.state, Vec::new())
                }
            }
            (PendingStart { .. }, false) => (Idle, Vec::new()),

            (Recording, true) => (Recording, Vec::new()),
            (Recording, false) => (PendingStop { since: now }, Vec::new()),

            (PendingStop { .. }, true) => (Recording, Vec::new()),
            (PendingStop { since }, false) => {
                if now.saturating_duration_since(since) > self.settings.stop_dwell {
                    (Idle, vec![StopRecording, UploadArtifact])
                } else {
                    (self.state, Vec::new())
                }
            }
        }
    }

    /// Hard reset to `Idle`. Emits nothing, in particular no stop or upload.
    pub fn reset(&mut self) {
        if self.state != TrackingState::Idle {
            debug!(from = %self.state, "tracking reset");
        }
        self.state = TrackingState::Idle;
        self.last_timestamp = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use RecordingCommand::*;

    struct Feed {
        machine: DetectionStateMachine,
        origin: Instant,
    }

    impl Feed {
        fn new() -> Self {
            Self {
                machine: DetectionStateMachine::default(),
                origin: Instant::now(),
            }
        }

        fn at(&mut self, millis: u64, detected: bool) -> Vec<RecordingCommand> {
            self.at_in(millis, detected, TrackingMode::Game)
        }

        fn at_in(&mut self, millis: u64, detected: bool, mode: TrackingMode) -> Vec<RecordingCommand> {
            let result = DetectionResult {
                detected,
                timestamp: self.origin + Duration::from_millis(millis),
            };
            self.machine.update(&result, mode)
        }

        /// Feeds a run of results every `step` ms and collects (time, commands) pairs with output.
        fn run(&mut self, from: u64, to: u64, step: u64, detected: bool) -> Vec<(u64, Vec<RecordingCommand>)> {
            let mut emitted = Vec::new();
            let mut t = from;
            while t <= to {
                let commands = self.at(t, detected);
                if !commands.is_empty() {
                    emitted.push((t, commands));
                }
                t += step;
            }
            emitted
        }
    }

    #[test]
    fn sustained_presence_starts_exactly_once() {
        let mut feed = Feed::new();
        let emitted = feed.run(0, 4000, 100, true);
        // 1500 is not > 1500; the first sample past the dwell is at 1600.
        assert_eq!(emitted, vec![(1600, vec![StartRecording])]);
        assert_eq!(feed.machine.state(), TrackingState::Recording);
    }

    #[test]
    fn short_presence_never_starts() {
        let mut feed = Feed::new();
        assert!(feed.run(0, 1400, 100, true).is_empty());
        assert!(feed.at(1500, false).is_empty());
        assert_eq!(feed.machine.state(), TrackingState::Idle);
        // Presence restarts from scratch.
        assert!(feed.run(1600, 3000, 100, true).is_empty());
        assert_eq!(feed.at(3200, true), vec![StartRecording]);
    }

    #[test]
    fn brief_absence_does_not_stop() {
        let mut feed = Feed::new();
        feed.run(0, 2000, 100, true);
        assert!(feed.machine.is_recording());

        assert!(feed.run(2100, 3000, 100, false).is_empty());
        assert!(matches!(feed.machine.state(), TrackingState::PendingStop { .. }));
        assert!(feed.at(3100, true).is_empty());
        assert_eq!(feed.machine.state(), TrackingState::Recording);
        assert!(feed.run(3200, 4500, 100, false).is_empty());
    }

    #[test]
    fn sustained_absence_stops_then_uploads() {
        let mut feed = Feed::new();
        feed.run(0, 2000, 100, true);
        let emitted = feed.run(2100, 5000, 100, false);
        assert_eq!(emitted, vec![(3700, vec![StopRecording, UploadArtifact])]);
        assert_eq!(feed.machine.state(), TrackingState::Idle);
    }

    #[test]
    fn absence_while_idle_emits_nothing() {
        let mut feed = Feed::new();
        assert!(feed.run(0, 5000, 100, false).is_empty());
    }

    #[test]
    fn preview_mode_never_transitions() {
        let mut feed = Feed::new();
        for t in (0..=4000).step_by(100) {
            assert!(feed.at_in(t, true, TrackingMode::Preview).is_empty());
        }
        assert_eq!(feed.machine.state(), TrackingState::Idle);
    }

    #[test]
    fn reset_from_pending_start_is_silent() {
        let mut feed = Feed::new();
        feed.run(0, 1000, 100, true);
        assert!(matches!(feed.machine.state(), TrackingState::PendingStart { .. }));
        feed.machine.reset();
        assert_eq!(feed.machine.state(), TrackingState::Idle);
        assert!(!feed.machine.ball_present());
    }

    #[test]
    fn reset_while_recording_emits_no_stop_or_upload() {
        let mut feed = Feed::new();
        feed.run(0, 2000, 100, true);
        assert!(feed.machine.is_recording());
        feed.machine.reset();
        assert_eq!(feed.machine.state(), TrackingState::Idle);
        // Absence afterwards has nothing to stop.
        assert!(feed.run(2100, 6000, 100, false).is_empty());
    }

    #[test]
    fn out_of_order_results_are_ignored() {
        let mut feed = Feed::new();
        feed.at(1000, true);
        assert!(feed.at(2600, true).contains(&StartRecording));
        // A stale "not seen" must not open the stop dwell.
        assert!(feed.at(100, false).is_empty());
        assert_eq!(feed.machine.state(), TrackingState::Recording);
    }

    #[test]
    fn dwell_times_are_independent() {
        let mut feed = Feed {
            machine: DetectionStateMachine::new(DwellSettings {
                start_dwell: Duration::from_millis(200),
                stop_dwell: Duration::from_millis(1000),
            }),
            origin: Instant::now(),
        };
        assert_eq!(feed.run(0, 500, 100, true), vec![(300, vec![StartRecording])]);
        assert_eq!(
            feed.run(600, 2000, 100, false),
            vec![(1700, vec![StopRecording, UploadArtifact])]
        );
    }
}
