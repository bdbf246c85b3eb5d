// THEORY:
// The `FrameAnalyzer` is the per-frame classifier. It chains the lower layers
// into one stateless call:
//
//   Frame --(HSV + thresholds)--> Mask --(region_detector)--> FrameRegions
//         --(size test)--> DetectionResult
//
// and renders an operator overlay on the side: a black canvas holding only the
// "on" pixels of the original frame, with every candidate rectangle stroked in a
// highlight colour. The stroke lies entirely inside the rectangle, so a box never
// marks pixels outside its region and never runs past the frame edge.
//
// The size test uses fixed pixel minimums. They are not scaled to the frame
// resolution; a caller running at a different capture size has to tune them.

use crate::core_modules::frame::Frame;
use crate::core_modules::frame_region::FrameRegion;
use crate::core_modules::mask::Mask;
use crate::core_modules::region_detector::find_regions;
use crate::core_modules::threshold::ThresholdConfig;
use image::{Rgba, RgbaImage};
use std::time::Instant;
use tracing::debug;

pub const DEFAULT_MIN_REGION_SIZE: u32 = 50;
pub const DEFAULT_STROKE_WIDTH: u32 = 2;
pub const DEFAULT_HIGHLIGHT: [u8; 4] = [255, 0, 0, 255];

/// Tunable behaviour of the analyzer.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzerSettings {
    /// A region qualifies only if its width is strictly greater than this.
    pub min_region_width: u32,
    /// A region qualifies only if its height is strictly greater than this.
    pub min_region_height: u32,
    pub highlight: Rgba<u8>,
    pub stroke_width: u32,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            min_region_width: DEFAULT_MIN_REGION_SIZE,
            min_region_height: DEFAULT_MIN_REGION_SIZE,
            highlight: Rgba(DEFAULT_HIGHLIGHT),
            stroke_width: DEFAULT_STROKE_WIDTH,
        }
    }
}

/// The frame-level classification outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectionResult {
    pub detected: bool,
    pub timestamp: Instant,
}

/// Everything the analyzer produces for one frame.
#[derive(Debug, Clone)]
pub struct FrameAnalysis {
    pub detection: DetectionResult,
    /// Every exterior region, qualifying or not.
    pub regions: Vec<FrameRegion>,
    /// The largest region (by area) that passed the size test.
    pub largest: Option<FrameRegion>,
    pub overlay: RgbaImage,
}

#[derive(Debug, Clone, Default)]
pub struct FrameAnalyzer {
    settings: AnalyzerSettings,
}

impl FrameAnalyzer {
    pub fn new(settings: AnalyzerSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &AnalyzerSettings {
        &self.settings
    }

    pub fn analyze(&self, frame: &Frame, config: &ThresholdConfig) -> FrameAnalysis {
        let mask = Mask::from_image(&frame.image, config);
        let regions = find_regions(&mask);

        let largest = regions
            .iter()
            .filter(|region| {
                region.exceeds(self.settings.min_region_width, self.settings.min_region_height)
            })
            .max_by_key(|region| region.area())
            .copied();

        let overlay = self.render_overlay(&frame.image, &mask, &regions);

        debug!(
            regions = regions.len(),
            on_pixels = mask.count_on(),
            detected = largest.is_some(),
            "analyzed frame"
        );

        FrameAnalysis {
            detection: DetectionResult {
                detected: largest.is_some(),
                timestamp: frame.timestamp,
            },
            regions,
            largest,
            overlay,
        }
    }

    fn render_overlay(&self, source: &RgbaImage, mask: &Mask, regions: &[FrameRegion]) -> RgbaImage {
        let (width, height) = source.dimensions();
        let mut overlay = RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 255]));

        for (x, y, pixel) in overlay.enumerate_pixels_mut() {
            if mask.is_on(x, y) {
                *pixel = *source.get_pixel(x, y);
            }
        }

        for region in regions {
            stroke_rect(&mut overlay, region, self.settings.stroke_width, self.settings.highlight);
        }

        overlay
    }
}

/// Draws the outline of `region` with the stroke growing inward from its edge.
fn stroke_rect(canvas: &mut RgbaImage, region: &FrameRegion, stroke_width: u32, color: Rgba<u8>) {
    if stroke_width == 0 {
        return;
    }
    let x_end = (region.x + region.width).min(canvas.width());
    let y_end = (region.y + region.height).min(canvas.height());
    let inner_left = region.x.saturating_add(stroke_width);
    let inner_top = region.y.saturating_add(stroke_width);
    let inner_right = (region.x + region.width).saturating_sub(stroke_width);
    let inner_bottom = (region.y + region.height).saturating_sub(stroke_width);

    for y in region.y..y_end {
        for x in region.x..x_end {
            let on_stroke = x < inner_left || x >= inner_right || y < inner_top || y >= inner_bottom;
            if on_stroke {
                canvas.put_pixel(x, y, color);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::threshold::ChannelRange;

    const YELLOW: Rgba<u8> = Rgba([255, 255, 0, 255]);
    const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);

    fn yellow_thresholds() -> ThresholdConfig {
        ThresholdConfig::new(
            ChannelRange::new(20, 40),
            ChannelRange::new(100, 255),
            ChannelRange::new(100, 255),
        )
    }

    fn frame_with_square(side: u32, at: (u32, u32)) -> Frame {
        let mut image = RgbaImage::from_pixel(320, 240, BLUE);
        for y in at.1..at.1 + side {
            for x in at.0..at.0 + side {
                image.put_pixel(x, y, YELLOW);
            }
        }
        Frame::new(image, Instant::now())
    }

    #[test]
    fn sixty_pixel_square_is_detected() {
        let frame = frame_with_square(60, (100, 80));
        let analysis = FrameAnalyzer::default().analyze(&frame, &yellow_thresholds());
        assert!(analysis.detection.detected);
        assert_eq!(analysis.detection.timestamp, frame.timestamp);
        assert_eq!(analysis.largest, Some(FrameRegion::new(100, 80, 60, 60)));
    }

    #[test]
    fn forty_pixel_square_is_not_detected() {
        let frame = frame_with_square(40, (10, 10));
        let analysis = FrameAnalyzer::default().analyze(&frame, &yellow_thresholds());
        assert!(!analysis.detection.detected);
        assert_eq!(analysis.regions, vec![FrameRegion::new(10, 10, 40, 40)]);
        assert_eq!(analysis.largest, None);
    }

    #[test]
    fn inverted_thresholds_never_detect() {
        let frame = frame_with_square(120, (0, 0));
        let mut config = yellow_thresholds();
        config.hue = ChannelRange::new(40, 20);
        let analysis = FrameAnalyzer::default().analyze(&frame, &config);
        assert!(!analysis.detection.detected);
        assert!(analysis.regions.is_empty());
        assert!(analysis.overlay.pixels().all(|p| *p == Rgba([0, 0, 0, 255])));
    }

    #[test]
    fn minimum_size_is_configurable() {
        let frame = frame_with_square(40, (10, 10));
        let analyzer = FrameAnalyzer::new(AnalyzerSettings {
            min_region_width: 30,
            min_region_height: 30,
            ..AnalyzerSettings::default()
        });
        assert!(analyzer.analyze(&frame, &yellow_thresholds()).detection.detected);
    }

    #[test]
    fn overlay_keeps_matching_pixels_and_strokes_candidates() {
        let frame = frame_with_square(60, (100, 80));
        let analysis = FrameAnalyzer::default().analyze(&frame, &yellow_thresholds());
        let overlay = &analysis.overlay;

        // Border stroke, two pixels deep.
        assert_eq!(*overlay.get_pixel(100, 80), Rgba(DEFAULT_HIGHLIGHT));
        assert_eq!(*overlay.get_pixel(101, 120), Rgba(DEFAULT_HIGHLIGHT));
        assert_eq!(*overlay.get_pixel(159, 139), Rgba(DEFAULT_HIGHLIGHT));
        // Interior keeps the original colour, background is blacked out.
        assert_eq!(*overlay.get_pixel(102, 120), YELLOW);
        assert_eq!(*overlay.get_pixel(130, 110), YELLOW);
        assert_eq!(*overlay.get_pixel(5, 5), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn largest_qualifying_region_wins() {
        let mut frame = frame_with_square(60, (10, 10));
        for y in 100..190 {
            for x in 150..230 {
                frame.image.put_pixel(x, y, YELLOW);
            }
        }
        let analysis = FrameAnalyzer::default().analyze(&frame, &yellow_thresholds());
        assert_eq!(analysis.regions.len(), 2);
        assert_eq!(analysis.largest, Some(FrameRegion::new(150, 100, 80, 90)));
    }
}
