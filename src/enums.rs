use serde::{Deserialize, Serialize};
use std::fmt;

/// Pointer-drag tools. Exactly one owns the drag channel at a time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tool {
    Pan,
    Zoom,
    #[default]
    WindowLevel,
    Rotate,
    StackScroll,
}

impl Tool {
    pub const ALL: [Tool; 5] = [
        Tool::Pan,
        Tool::Zoom,
        Tool::WindowLevel,
        Tool::Rotate,
        Tool::StackScroll,
    ];
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Tool::Pan => "Pan",
            Tool::Zoom => "Zoom",
            Tool::WindowLevel => "Window/Level",
            Tool::Rotate => "Rotate",
            Tool::StackScroll => "Stack Scroll",
        };
        f.write_str(label)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QualityMode {
    /// Nearest-neighbour sampling, enhancement filters bypassed.
    #[default]
    Standard,
    /// Supersampled bilinear sampling followed by the enhancement filter chain.
    High,
}

impl QualityMode {
    pub fn interpolation(self) -> Interpolation {
        match self {
            QualityMode::Standard => Interpolation::Nearest,
            QualityMode::High => Interpolation::Bilinear,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Interpolation {
    #[default]
    Nearest,
    Bilinear,
}

/// Ordering rule chosen for a catalog once all frames are known.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortBy {
    SliceLocation,
    InstanceNumber,
    #[default]
    Arrival,
}

/// Keyboard keys routed to navigation and playback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Key {
    ArrowUp,
    ArrowDown,
    ArrowLeft,
    ArrowRight,
    Home,
    End,
    Space,
}
