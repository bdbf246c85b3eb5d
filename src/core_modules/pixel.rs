// THEORY (Pixel & HSV):
// The `Pixel` module is the smallest unit of the tracker. It is a "dumb" data
// container for a single RGBA pixel plus the one transform the analyzer needs:
// the conversion into the hue/saturation/value space that thresholds are
// expressed in.
//
// The HSV triple follows the 8-bit convention used by the remote tuning tool:
// - hue is the colour-wheel angle halved, so it fits a byte: [0, 180)
// - saturation is chroma / value, scaled to [0, 255]
// - value is the brightest channel, [0, 255]
//
// Alpha is carried but never participates in classification.

use image::Rgba;

pub type Channel = u8;
pub type HueDegrees = f32;

/// A "dumb" data container representing a single RGBA pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pixel {
    pub red: Channel,
    pub green: Channel,
    pub blue: Channel,
    pub alpha: Channel,
}

/// A pixel expressed in the threshold channel space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Hsv {
    /// Half-degree hue, [0, 180).
    pub hue: Channel,
    pub saturation: Channel,
    pub value: Channel,
}

impl Pixel {
    pub fn new(red: Channel, green: Channel, blue: Channel, alpha: Channel) -> Self {
        Pixel {
            red,
            green,
            blue,
            alpha,
        }
    }

    /// Hue angle in degrees [0, 360). Achromatic pixels report 0.
    pub fn hue_degrees(&self) -> HueDegrees {
        let (red, green, blue) = (self.red as f32, self.green as f32, self.blue as f32);
        let maximum_channel = red.max(green.max(blue));
        let minimum_channel = red.min(green.min(blue));
        let chroma = maximum_channel - minimum_channel;

        if chroma <= 0.0 {
            return 0.0;
        }

        let (base_difference, sector_offset) = if maximum_channel == red {
            (green - blue, 0.0)
        } else if maximum_channel == green {
            (blue - red, 2.0)
        } else {
            (red - green, 4.0)
        };

        let mut hue_degrees = (base_difference / chroma + sector_offset) * 60.0;
        if hue_degrees < 0.0 {
            hue_degrees += 360.0;
        }
        hue_degrees
    }

    /// Converts to the byte-scaled HSV triple used for thresholding.
    pub fn to_hsv(&self) -> Hsv {
        let maximum_channel = self.red.max(self.green.max(self.blue));
        let minimum_channel = self.red.min(self.green.min(self.blue));
        let chroma = maximum_channel - minimum_channel;

        let saturation = if maximum_channel == 0 {
            0
        } else {
            (255.0 * chroma as f32 / maximum_channel as f32).round() as Channel
        };

        // 359.5 degrees rounds up to 180, which is the same angle as 0.
        let half_degrees = (self.hue_degrees() / 2.0).round() as u16;
        let hue = if half_degrees >= 180 { 0 } else { half_degrees as Channel };

        Hsv {
            hue,
            saturation,
            value: maximum_channel,
        }
    }
}

impl From<&Rgba<u8>> for Pixel {
    fn from(rgba: &Rgba<u8>) -> Self {
        let [red, green, blue, alpha] = rgba.0;
        Pixel::new(red, green, blue, alpha)
    }
}

impl From<Pixel> for Rgba<u8> {
    fn from(pixel: Pixel) -> Self {
        Rgba([pixel.red, pixel.green, pixel.blue, pixel.alpha])
    }
}

impl TryFrom<&[u8]> for Pixel {
    type Error = usize;

    /// Builds a pixel from exactly four RGBA bytes; any other length is returned as the error.
    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        match bytes {
            [red, green, blue, alpha] => Ok(Pixel::new(*red, *green, *blue, *alpha)),
            _ => Err(bytes.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primaries_map_to_half_degree_hue() {
        assert_eq!(Pixel::new(255, 0, 0, 255).to_hsv(), Hsv { hue: 0, saturation: 255, value: 255 });
        assert_eq!(Pixel::new(0, 255, 0, 255).to_hsv().hue, 60);
        assert_eq!(Pixel::new(0, 0, 255, 255).to_hsv().hue, 120);
    }

    #[test]
    fn yellow_sits_at_thirty() {
        let hsv = Pixel::new(255, 255, 0, 255).to_hsv();
        assert_eq!(hsv.hue, 30);
        assert_eq!(hsv.saturation, 255);
        assert_eq!(hsv.value, 255);
    }

    #[test]
    fn gray_and_black_are_achromatic() {
        assert_eq!(Pixel::new(128, 128, 128, 255).to_hsv(), Hsv { hue: 0, saturation: 0, value: 128 });
        assert_eq!(Pixel::new(0, 0, 0, 255).to_hsv(), Hsv::default());
    }

    #[test]
    fn hue_just_below_red_wraps_to_zero() {
        // (255, 0, 1) sits at ~359.76 degrees.
        assert_eq!(Pixel::new(255, 0, 1, 255).to_hsv().hue, 0);
    }

    #[test]
    fn byte_conversion_rejects_wrong_length() {
        assert_eq!(Pixel::try_from(&[1u8, 2, 3, 4][..]), Ok(Pixel::new(1, 2, 3, 4)));
        assert_eq!(Pixel::try_from(&[1u8, 2, 3][..]), Err(3));
    }
}
