// THEORY:
// `ThresholdConfig` is the six-number description of "what the ball looks like":
// one inclusive [min, max] range per HSV channel. A pixel belongs to the ball iff
// all three of its channels fall inside their ranges.
//
// Ranges are never validated. An inverted range (min > max) simply contains no
// value, which makes the whole mask empty. This keeps a bad remote payload from
// ever becoming an error inside the frame loop.
//
// The configuration is written by the fetcher and read by the analyzer on
// different schedules, so it lives in a `SharedThresholds` cell. The value is
// `Copy`, so readers take a snapshot and never hold the lock during analysis.

use crate::core_modules::pixel::{Channel, Hsv};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};

/// An inclusive range for a single channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelRange {
    pub min: Channel,
    pub max: Channel,
}

impl ChannelRange {
    pub const FULL: ChannelRange = ChannelRange { min: 0, max: 255 };

    pub fn new(min: Channel, max: Channel) -> Self {
        Self { min, max }
    }

    #[inline]
    pub fn contains(&self, value: Channel) -> bool {
        self.min <= value && value <= self.max
    }

    pub fn is_inverted(&self) -> bool {
        self.min > self.max
    }
}

impl Default for ChannelRange {
    fn default() -> Self {
        Self::FULL
    }
}

/// Lower/upper bounds for each of the three HSV channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub hue: ChannelRange,
    pub saturation: ChannelRange,
    pub value: ChannelRange,
}

impl ThresholdConfig {
    pub fn new(hue: ChannelRange, saturation: ChannelRange, value: ChannelRange) -> Self {
        Self {
            hue,
            saturation,
            value,
        }
    }

    /// Elementwise AND of the three per-channel range tests.
    #[inline]
    pub fn matches(&self, hsv: &Hsv) -> bool {
        self.hue.contains(hsv.hue)
            && self.saturation.contains(hsv.saturation)
            && self.value.contains(hsv.value)
    }

    /// True when at least one channel range is inverted, i.e. nothing can match.
    pub fn matches_nothing(&self) -> bool {
        self.hue.is_inverted() || self.saturation.is_inverted() || self.value.is_inverted()
    }
}

/// The synchronized cell shared between the fetcher (writer) and the analyzer (reader).
#[derive(Debug, Clone, Default)]
pub struct SharedThresholds {
    inner: Arc<RwLock<ThresholdConfig>>,
}

impl SharedThresholds {
    pub fn new(initial: ThresholdConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(initial)),
        }
    }

    /// Copies the current configuration out of the cell.
    pub fn snapshot(&self) -> ThresholdConfig {
        // The value is `Copy` and written in one assignment, so a poisoned lock
        // still holds a whole configuration.
        *self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Installs `next` and reports whether it differed from the current value.
    pub fn replace(&self, next: ThresholdConfig) -> bool {
        let mut current = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if *current == next {
            return false;
        }
        *current = next;
        true
    }
}
