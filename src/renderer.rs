use crate::{
    config::RenderConfig,
    enums::{Interpolation, QualityMode},
    filters::{self, EnhancementFilters},
    frame::{Frame, PixelState},
    interpolator::Interpolator,
    resources::{Surface, ToolkitHandle},
    viewport::{ViewportState, WindowLevel},
};

use image::{Rgb, Rgb32FImage, Rgba, RgbaImage};
use ndarray::{Array2, ArrayView2, Zip};
use rayon::prelude::*;
use tracing::debug;
use web_time::Instant;

/// A drawn frame together with its position in the series.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderedFrame {
    pub index: usize,
    pub total: usize,
    pub image: RgbaImage,
}

#[derive(Clone, Debug, PartialEq)]
pub enum RenderOutcome {
    Rendered(RenderedFrame),
    /// Pixels for the frame are not decoded yet.
    Loading { index: usize, total: usize },
    /// The frame's pixels could not be decoded.
    Failed {
        index: usize,
        total: usize,
        message: String,
    },
}

/// Everything besides pixels that determines a rendered image.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderState<'a> {
    pub viewport: &'a ViewportState,
    pub window_level: &'a WindowLevel,
    pub filters: &'a EnhancementFilters,
    pub quality: QualityMode,
    pub surface: Surface,
}

/// Composes windowing, the viewport transform and the enhancement filters.
///
/// Rendering is a pure function of the pixels and the [`RenderState`], so
/// drawing the same state twice yields identical bytes.
#[derive(Clone)]
pub struct RenderPipeline {
    toolkit: ToolkitHandle,
    supersample: u32,
    sharpen_gain: f32,
}

impl RenderPipeline {
    pub fn new(toolkit: ToolkitHandle, config: &RenderConfig) -> Self {
        Self {
            toolkit,
            supersample: config.supersample.max(1),
            sharpen_gain: config.sharpen_gain,
        }
    }

    pub fn render(
        &self,
        frame: &Frame,
        index: usize,
        total: usize,
        state: RenderState<'_>,
    ) -> RenderOutcome {
        match frame.pixels() {
            PixelState::Ready(pixels) => RenderOutcome::Rendered(RenderedFrame {
                index,
                total,
                image: self.render_pixels(pixels, state),
            }),
            PixelState::NotLoaded | PixelState::Decoding => RenderOutcome::Loading { index, total },
            PixelState::Failed(err) => RenderOutcome::Failed {
                index,
                total,
                message: err.to_string(),
            },
        }
    }

    /// Window `pixels`, place them on the surface and run the filter chain.
    pub fn render_pixels(&self, pixels: &Array2<f32>, state: RenderState<'_>) -> RgbaImage {
        let started = Instant::now();
        let window = *state.window_level;
        let windowed = self
            .toolkit
            .install(|| Zip::from(pixels).par_map_collect(|&value| window.map(value)));

        let placed = self.place(&windowed.view(), state);
        let filtered = filters::apply(placed, state.filters, state.quality, self.sharpen_gain);
        let image = Self::to_rgba(&filtered);

        debug!(
            width = state.surface.width,
            height = state.surface.height,
            quality = ?state.quality,
            elapsed_us = started.elapsed().as_micros() as u64,
            "Frame rendered"
        );
        image
    }

    /// Resample the windowed image through the inverse viewport transform.
    fn place(&self, windowed: &ArrayView2<'_, f32>, state: RenderState<'_>) -> Rgb32FImage {
        let Surface { width, height } = state.surface;
        let transform = &InverseTransform::new(state.viewport, windowed.dim(), state.surface);
        let interpolation = state.quality.interpolation();
        let samples_per_axis = match state.quality {
            QualityMode::Standard => 1,
            QualityMode::High => self.supersample,
        };
        let invert = state.viewport.invert;

        let shades: Vec<f32> = self.toolkit.install(|| {
            (0..height)
                .into_par_iter()
                .flat_map_iter(|y| {
                    (0..width).map(move |x| {
                        Self::shade(
                            windowed,
                            transform,
                            x,
                            y,
                            samples_per_axis,
                            interpolation,
                            invert,
                        )
                    })
                })
                .collect()
        });

        Rgb32FImage::from_fn(width, height, |x, y| {
            let v = shades[(y as usize) * (width as usize) + x as usize];
            Rgb([v, v, v])
        })
    }

    /// Average of `n * n` samples spread over the output pixel. Samples that
    /// miss the image count as background.
    #[inline]
    fn shade(
        windowed: &ArrayView2<'_, f32>,
        transform: &InverseTransform,
        x: u32,
        y: u32,
        n: u32,
        interpolation: Interpolation,
        invert: bool,
    ) -> f32 {
        let step = 1.0 / n as f32;
        let mut total = 0.0;
        for sy in 0..n {
            for sx in 0..n {
                let px = x as f32 + (sx as f32 + 0.5) * step;
                let py = y as f32 + (sy as f32 + 0.5) * step;
                let (src_y, src_x) = transform.source(px, py);
                if let Some(value) = Interpolator::sample(windowed, src_y, src_x, interpolation) {
                    total += if invert { 1.0 - value } else { value };
                }
            }
        }
        total / (n * n) as f32
    }

    fn to_rgba(image: &Rgb32FImage) -> RgbaImage {
        RgbaImage::from_fn(image.width(), image.height(), |x, y| {
            let Rgb([r, g, b]) = *image.get_pixel(x, y);
            Rgba([
                Self::normalize_to_u8(r),
                Self::normalize_to_u8(g),
                Self::normalize_to_u8(b),
                255,
            ])
        })
    }

    #[inline]
    fn normalize_to_u8(value: f32) -> u8 {
        (value * 255.0).round().clamp(0.0, 255.0) as u8
    }
}

/// Maps surface coordinates back into image pixel coordinates.
///
/// Forward order: flip, scale (fit-to-surface times viewport scale), rotate
/// clockwise about the image centre, translate in screen pixels.
struct InverseTransform {
    sin: f32,
    cos: f32,
    inv_scale_x: f32,
    inv_scale_y: f32,
    surface_center: (f32, f32),
    translation: (f32, f32),
    image_center: (f32, f32),
}

impl InverseTransform {
    fn new(viewport: &ViewportState, (rows, columns): (usize, usize), surface: Surface) -> Self {
        let fit = (surface.width as f32 / columns as f32).min(surface.height as f32 / rows as f32);
        let scale = fit * viewport.scale;
        let (sin, cos) = match viewport.display_rotation() {
            r if r == 0.0 => (0.0, 1.0),
            r if r == 90.0 => (1.0, 0.0),
            r if r == 180.0 => (0.0, -1.0),
            r if r == 270.0 => (-1.0, 0.0),
            r => r.to_radians().sin_cos(),
        };
        let flip = |flipped: bool| if flipped { -1.0 } else { 1.0 };
        Self {
            sin,
            cos,
            inv_scale_x: flip(viewport.flip_horizontal) / scale,
            inv_scale_y: flip(viewport.flip_vertical) / scale,
            surface_center: (surface.width as f32 / 2.0, surface.height as f32 / 2.0),
            translation: viewport.translation,
            image_center: (columns as f32 / 2.0 - 0.5, rows as f32 / 2.0 - 0.5),
        }
    }

    /// Returns `(row, column)` for the surface point (`px`, `py`).
    #[inline]
    fn source(&self, px: f32, py: f32) -> (f32, f32) {
        let dx = px - self.surface_center.0 - self.translation.0;
        let dy = py - self.surface_center.1 - self.translation.1;
        let rx = dx * self.cos + dy * self.sin;
        let ry = dy * self.cos - dx * self.sin;
        (
            ry * self.inv_scale_y + self.image_center.1,
            rx * self.inv_scale_x + self.image_center.0,
        )
    }
}
