// THEORY:
// The `Mask` is the binary image produced by thresholding: a pixel is "on" iff
// its HSV triple is inside every configured channel range. It is a plain data
// container, one flag per pixel in row-major order, and knows nothing about
// regions or contours. That is the job of the `region_detector`.

use crate::core_modules::pixel::Pixel;
use crate::core_modules::threshold::ThresholdConfig;
use image::RgbaImage;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    pub width: u32,
    pub height: u32,
    pub bits: Vec<bool>,
}

impl Mask {
    /// An all-off mask of the given size.
    pub fn empty(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            bits: vec![false; (width as usize) * (height as usize)],
        }
    }

    /// Thresholds `image` against `config`.
    pub fn from_image(image: &RgbaImage, config: &ThresholdConfig) -> Self {
        let (width, height) = image.dimensions();
        if config.matches_nothing() {
            return Self::empty(width, height);
        }

        let bits = image
            .pixels()
            .map(|rgba| config.matches(&Pixel::from(rgba).to_hsv()))
            .collect();

        Self { width, height, bits }
    }

    #[inline]
    pub fn index(&self, x: u32, y: u32) -> usize {
        (y as usize) * (self.width as usize) + x as usize
    }

    #[inline]
    pub fn is_on(&self, x: u32, y: u32) -> bool {
        self.bits[self.index(x, y)]
    }

    pub fn count_on(&self) -> usize {
        self.bits.iter().filter(|&&bit| bit).count()
    }

    pub fn is_empty(&self) -> bool {
        !self.bits.iter().any(|&bit| bit)
    }
}
