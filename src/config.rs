// THEORY:
// `TrackerConfig` collects every tunable of the tracker in one TOML document.
// Every table and every key has a default, so an empty file (or no file at all)
// yields the reference behaviour: stride 5, 50 px minimum, 1500 ms dwell in both
// directions, a fetch every 5 s against port 7878.

use crate::core_modules::detection_state::DwellSettings;
use crate::core_modules::frame_analyzer::{
    AnalyzerSettings, DEFAULT_HIGHLIGHT, DEFAULT_MIN_REGION_SIZE, DEFAULT_STROKE_WIDTH,
};
use crate::core_modules::recorder::DEFAULT_JPEG_QUALITY;
use crate::core_modules::threshold::ThresholdConfig;
use crate::endpoint::DEFAULT_PORT;
use crate::error::ConfigError;
use crate::pipeline::PipelineConfig;
use image::Rgba;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_FRAME_STRIDE: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host of the companion server. Unset means "not configured yet".
    pub host: Option<String>,
    pub port: u16,
    pub fetch_interval_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: DEFAULT_PORT,
            fetch_interval_ms: 5_000,
            request_timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Analyze every Nth captured frame.
    pub frame_stride: u32,
    pub min_region_width: u32,
    pub min_region_height: u32,
    pub highlight: [u8; 4],
    pub stroke_width: u32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            frame_stride: DEFAULT_FRAME_STRIDE,
            min_region_width: DEFAULT_MIN_REGION_SIZE,
            min_region_height: DEFAULT_MIN_REGION_SIZE,
            highlight: DEFAULT_HIGHLIGHT,
            stroke_width: DEFAULT_STROKE_WIDTH,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub start_dwell_ms: u64,
    pub stop_dwell_ms: u64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            start_dwell_ms: 1_500,
            stop_dwell_ms: 1_500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    pub clip_dir: PathBuf,
    pub jpeg_quality: u8,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            clip_dir: std::env::temp_dir().join("ball_tracker"),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub server: ServerConfig,
    pub analysis: AnalysisConfig,
    pub detection: DetectionConfig,
    pub recording: RecordingConfig,
    /// Bounds used until the first successful fetch.
    pub thresholds: ThresholdConfig,
}

impl TrackerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn analyzer_settings(&self) -> AnalyzerSettings {
        AnalyzerSettings {
            min_region_width: self.analysis.min_region_width,
            min_region_height: self.analysis.min_region_height,
            highlight: Rgba(self.analysis.highlight),
            stroke_width: self.analysis.stroke_width,
        }
    }

    pub fn dwell_settings(&self) -> DwellSettings {
        DwellSettings {
            start_dwell: Duration::from_millis(self.detection.start_dwell_ms),
            stop_dwell: Duration::from_millis(self.detection.stop_dwell_ms),
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            frame_stride: self.analysis.frame_stride,
            analyzer: self.analyzer_settings(),
            dwell: self.dwell_settings(),
        }
    }

    pub fn fetch_interval(&self) -> Duration {
        Duration::from_millis(self.server.fetch_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.server.request_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_reference_behaviour() {
        let config = TrackerConfig::from_toml_str("").unwrap();
        assert_eq!(config, TrackerConfig::default());
        assert_eq!(config.analysis.frame_stride, 5);
        assert_eq!(config.server.port, 7878);
        assert_eq!(config.analyzer_settings(), AnalyzerSettings::default());
        assert_eq!(config.dwell_settings(), DwellSettings::default());
        assert_eq!(config.fetch_interval(), Duration::from_secs(5));
        assert_eq!(config.pipeline_config(), PipelineConfig::default());
    }

    #[test]
    fn partial_tables_keep_other_defaults() {
        let config = TrackerConfig::from_toml_str(
            r#"
            [server]
            host = "192.168.50.107"

            [analysis]
            min_region_width = 80

            [detection]
            stop_dwell_ms = 3000
            "#,
        )
        .unwrap();

        assert_eq!(config.server.host.as_deref(), Some("192.168.50.107"));
        assert_eq!(config.server.port, 7878);
        assert_eq!(config.analysis.min_region_width, 80);
        assert_eq!(config.analysis.min_region_height, 50);
        assert_eq!(config.dwell_settings().start_dwell, Duration::from_millis(1500));
        assert_eq!(config.dwell_settings().stop_dwell, Duration::from_millis(3000));
    }

    #[test]
    fn initial_thresholds_can_be_partial() {
        let config = TrackerConfig::from_toml_str(
            r#"
            [thresholds.hue]
            min = 20
            max = 40
            "#,
        )
        .unwrap();
        assert_eq!(config.thresholds.hue.min, 20);
        assert_eq!(config.thresholds.hue.max, 40);
        assert_eq!(config.thresholds.saturation.max, 255);
    }

    #[test]
    fn wrong_types_are_parse_errors() {
        let result = TrackerConfig::from_toml_str("[analysis]\nframe_stride = \"five\"");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn load_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracker.toml");
        std::fs::write(&path, "[recording]\njpeg_quality = 70\n").unwrap();
        assert_eq!(TrackerConfig::load(&path).unwrap().recording.jpeg_quality, 70);

        let missing = TrackerConfig::load(&dir.path().join("absent.toml"));
        assert!(matches!(missing, Err(ConfigError::Read { .. })));
    }
}
