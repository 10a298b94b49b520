//! Display-time enhancement filters.
//!
//! In [`QualityMode::High`] the renderer first smooths the image by
//! supersampling it with bilinear interpolation, then runs the chain below in
//! the fixed order contrast, brightness, saturation, sharpen. In
//! [`QualityMode::Standard`] the chain is bypassed entirely.

use crate::enums::QualityMode;

use image::{Rgb, Rgb32FImage, imageops};
use serde::{Deserialize, Serialize};

pub const PERCENT_MAX: f32 = 200.0;
pub const SHARPNESS_MAX: f32 = 100.0;

/// Gaussian sigma of the blurred copy used by the unsharp mask.
const SHARPEN_SIGMA: f32 = 1.0;

/// Percentages, 100 meaning "unchanged" except for sharpness where 0 is off.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhancementFilters {
    pub contrast: f32,
    pub brightness: f32,
    pub saturation: f32,
    pub sharpness: f32,
}

impl Default for EnhancementFilters {
    fn default() -> Self {
        Self {
            contrast: 100.0,
            brightness: 100.0,
            saturation: 100.0,
            sharpness: 0.0,
        }
    }
}

impl EnhancementFilters {
    /// Same values forced into their allowed ranges.
    pub fn clamped(self) -> Self {
        let percent = |v: f32| if v.is_nan() { 100.0 } else { v.clamp(0.0, PERCENT_MAX) };
        Self {
            contrast: percent(self.contrast),
            brightness: percent(self.brightness),
            saturation: percent(self.saturation),
            sharpness: if self.sharpness.is_nan() {
                0.0
            } else {
                self.sharpness.clamp(0.0, SHARPNESS_MAX)
            },
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterStage {
    Contrast,
    Brightness,
    Saturation,
    Sharpen,
}

pub const FILTER_ORDER: [FilterStage; 4] = [
    FilterStage::Contrast,
    FilterStage::Brightness,
    FilterStage::Saturation,
    FilterStage::Sharpen,
];

/// The stages that run for `quality`, in order.
pub fn plan(quality: QualityMode) -> &'static [FilterStage] {
    match quality {
        QualityMode::Standard => &[],
        QualityMode::High => &FILTER_ORDER,
    }
}

/// Run the chain selected by `quality` over `image`.
pub fn apply(
    image: Rgb32FImage,
    filters: &EnhancementFilters,
    quality: QualityMode,
    sharpen_gain: f32,
) -> Rgb32FImage {
    let filters = filters.clamped();
    plan(quality)
        .iter()
        .fold(image, |image, stage| stage.apply(image, &filters, sharpen_gain))
}

impl FilterStage {
    pub fn apply(
        self,
        mut image: Rgb32FImage,
        filters: &EnhancementFilters,
        sharpen_gain: f32,
    ) -> Rgb32FImage {
        match self {
            FilterStage::Contrast => {
                let factor = filters.contrast / 100.0;
                map_channels(&mut image, |v| (v - 0.5) * factor + 0.5);
                image
            }
            FilterStage::Brightness => {
                let factor = filters.brightness / 100.0;
                map_channels(&mut image, |v| v * factor);
                image
            }
            FilterStage::Saturation => {
                saturate(&mut image, filters.saturation / 100.0);
                image
            }
            FilterStage::Sharpen => {
                let amount = filters.sharpness / 100.0 * sharpen_gain;
                if amount > 0.0 {
                    unsharp_mask(&image, amount)
                } else {
                    image
                }
            }
        }
    }
}

fn map_channels(image: &mut Rgb32FImage, f: impl Fn(f32) -> f32) {
    for pixel in image.pixels_mut() {
        for channel in pixel.0.iter_mut() {
            *channel = f(*channel).clamp(0.0, 1.0);
        }
    }
}

/// CSS `saturate()` colour matrix.
fn saturate(image: &mut Rgb32FImage, s: f32) {
    for pixel in image.pixels_mut() {
        let [r, g, b] = pixel.0;
        let out = [
            (0.213 + 0.787 * s) * r + (0.715 - 0.715 * s) * g + (0.072 - 0.072 * s) * b,
            (0.213 - 0.213 * s) * r + (0.715 + 0.285 * s) * g + (0.072 - 0.072 * s) * b,
            (0.213 - 0.213 * s) * r + (0.715 - 0.715 * s) * g + (0.072 + 0.928 * s) * b,
        ];
        *pixel = Rgb(out.map(|v| v.clamp(0.0, 1.0)));
    }
}

fn unsharp_mask(image: &Rgb32FImage, amount: f32) -> Rgb32FImage {
    let blurred = imageops::blur(image, SHARPEN_SIGMA);
    let mut output = image.clone();
    for (out, blur) in output.pixels_mut().zip(blurred.pixels()) {
        for (channel, blurred) in out.0.iter_mut().zip(blur.0) {
            *channel = (*channel + (*channel - blurred) * amount).clamp(0.0, 1.0);
        }
    }
    output
}
