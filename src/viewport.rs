//! Spatial transform and intensity windowing state.
//!
//! [`ViewState`] is the high-frequency channel: pointer drags and preset
//! selection mutate it many times per second and the render pipeline reads it
//! directly. Mutations never touch pixel data and never trigger decode work.

use serde::{Deserialize, Serialize};

/// Smallest scale a zoom can reach.
pub const MIN_SCALE: f32 = 1e-3;
/// Smallest window width. A narrower window degenerates into a threshold.
pub const MIN_WINDOW_WIDTH: f32 = 1.0;

/// Linear mapping from raw intensities to the display range.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct WindowLevel {
    pub width: f32,
    pub center: f32,
}

impl WindowLevel {
    pub fn new(width: f32, center: f32) -> Self {
        Self {
            width: width.max(MIN_WINDOW_WIDTH),
            center,
        }
    }

    /// Full-range window for the given stored bit depth.
    pub fn from_bit_depth(bits_stored: Option<u16>) -> Self {
        match bits_stored {
            Some(bits @ 1..=31) => {
                let range = (1_u64 << bits) as f32;
                Self::new(range, range / 2.0)
            }
            _ => Self::new(256.0, 128.0),
        }
    }

    pub fn lower(&self) -> f32 {
        self.center - self.width / 2.0
    }

    pub fn upper(&self) -> f32 {
        self.center + self.width / 2.0
    }

    /// Maps `value` into `[0, 1]`: at or below the lower edge is 0, at or
    /// above the upper edge is 1, linear in between.
    #[inline]
    pub fn map(&self, value: f32) -> f32 {
        let lower = self.lower();
        if value <= lower {
            0.0
        } else if value >= self.upper() {
            1.0
        } else {
            (value - lower) / self.width
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ViewportState {
    pub scale: f32,
    /// Degrees, clockwise. Unbounded; see [`ViewportState::display_rotation`].
    pub rotation: f32,
    pub translation: (f32, f32),
    pub flip_horizontal: bool,
    pub flip_vertical: bool,
    pub invert: bool,
}

impl Default for ViewportState {
    fn default() -> Self {
        Self {
            scale: 1.0,
            rotation: 0.0,
            translation: (0.0, 0.0),
            flip_horizontal: false,
            flip_vertical: false,
            invert: false,
        }
    }
}

impl ViewportState {
    /// Rotation normalised into `[0, 360)`.
    pub fn display_rotation(&self) -> f32 {
        self.rotation.rem_euclid(360.0)
    }
}

/// Partial update of a [`ViewportState`]. Unset fields are left untouched.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ViewportPatch {
    pub scale: Option<f32>,
    pub rotation: Option<f32>,
    pub translation: Option<(f32, f32)>,
    pub flip_horizontal: Option<bool>,
    pub flip_vertical: Option<bool>,
    pub invert: Option<bool>,
}

impl ViewportPatch {
    pub fn scale(mut self, scale: f32) -> Self {
        self.scale = Some(scale);
        self
    }

    pub fn rotation(mut self, degrees: f32) -> Self {
        self.rotation = Some(degrees);
        self
    }

    pub fn translation(mut self, x: f32, y: f32) -> Self {
        self.translation = Some((x, y));
        self
    }

    pub fn flip_horizontal(mut self, flip: bool) -> Self {
        self.flip_horizontal = Some(flip);
        self
    }

    pub fn flip_vertical(mut self, flip: bool) -> Self {
        self.flip_vertical = Some(flip);
        self
    }

    pub fn invert(mut self, invert: bool) -> Self {
        self.invert = Some(invert);
        self
    }

    fn apply(&self, viewport: &mut ViewportState) {
        if let Some(scale) = self.scale {
            viewport.scale = if scale.is_finite() {
                scale.max(MIN_SCALE)
            } else {
                MIN_SCALE
            };
        }
        if let Some(rotation) = self.rotation.filter(|r| r.is_finite()) {
            viewport.rotation = rotation;
        }
        if let Some(translation) = self.translation {
            viewport.translation = translation;
        }
        if let Some(flip) = self.flip_horizontal {
            viewport.flip_horizontal = flip;
        }
        if let Some(flip) = self.flip_vertical {
            viewport.flip_vertical = flip;
        }
        if let Some(invert) = self.invert {
            viewport.invert = invert;
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct WindowLevelPatch {
    pub width: Option<f32>,
    pub center: Option<f32>,
}

impl WindowLevelPatch {
    pub fn width(mut self, width: f32) -> Self {
        self.width = Some(width);
        self
    }

    pub fn center(mut self, center: f32) -> Self {
        self.center = Some(center);
        self
    }

    fn apply(&self, window: &mut WindowLevel) {
        if let Some(width) = self.width.filter(|w| w.is_finite()) {
            window.width = width.max(MIN_WINDOW_WIDTH);
        }
        if let Some(center) = self.center.filter(|c| c.is_finite()) {
            window.center = center;
        }
    }
}

/// Viewport and window-level of the current session.
///
/// Every mutation bumps `revision` so the viewer can tell whether the last
/// rendered image is still current without comparing floats.
#[derive(Clone, Debug, PartialEq)]
pub struct ViewState {
    viewport: ViewportState,
    window_level: WindowLevel,
    revision: u64,
}

impl ViewState {
    pub fn new(seed: WindowLevel) -> Self {
        Self {
            viewport: ViewportState::default(),
            window_level: seed,
            revision: 0,
        }
    }

    pub fn viewport(&self) -> &ViewportState {
        &self.viewport
    }

    pub fn window_level(&self) -> &WindowLevel {
        &self.window_level
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn mutate_viewport(&mut self, patch: ViewportPatch) {
        patch.apply(&mut self.viewport);
        self.revision += 1;
    }

    pub fn mutate_window_level(&mut self, patch: WindowLevelPatch) {
        patch.apply(&mut self.window_level);
        self.revision += 1;
    }

    /// Explicit "reset view". Window-level is left alone.
    pub fn reset_viewport(&mut self) {
        self.viewport = ViewportState::default();
        self.revision += 1;
    }

    /// Replace the window-level with a series default or a chosen preset.
    pub fn seed_window_level(&mut self, defaults: WindowLevel) {
        self.window_level = WindowLevel::new(defaults.width, defaults.center);
        self.revision += 1;
    }
}
