// THEORY:
// Every fallible edge of the tracker reports through one of the enums below.
// None of them are allowed to escape the frame loop: the pipeline logs them and
// moves on to the next frame. They exist so that callers above the loop (the CLI,
// a UI layer) can tell a transient network problem from a recorder misuse.

use std::path::PathBuf;
use thiserror::Error;

/// Failures of the output sink (the video encoder boundary).
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("sink is not open")]
    NotOpen,

    #[error("sink is already open at {0}")]
    AlreadyOpen(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("encode error: {0}")]
    Encode(#[from] image::ImageError),
}

/// Failures and defensive conditions of the recording lifecycle.
#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("a recording session is already active (session {0})")]
    AlreadyRecording(u64),

    #[error("stop requested while not recording")]
    NotRecording,

    #[error("session {requested} is not the active session {active}")]
    StaleSession { requested: u64, active: u64 },

    #[error("sink error: {0}")]
    Sink(#[from] SinkError),
}

/// Failures of the upload handoff.
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("the server address is not set")]
    NoServer,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("server rejected upload with status {0}")]
    Rejected(u16),

    #[error("encode error: {0}")]
    Encode(#[from] image::ImageError),
}

/// Failures of a single threshold fetch.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("the server address is not set")]
    NoServer,

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("unexpected status {0}")]
    Status(u16),

    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Failures while loading the tracker configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
}
