use crate::ingest::{DecodeError, PixelPayload};
use crate::resources::TempHandleId;
use crate::viewport::WindowLevel;

use ndarray::Array2;
use std::{fmt, path::PathBuf, sync::Arc};

/// Identifies one loaded series. Every install gets a fresh id so that late
/// callbacks for a replaced series can be recognised and dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeriesId(pub(crate) u64);

impl fmt::Display for SeriesId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "series#{}", self.0)
    }
}

/// Where the bytes of a frame come from.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum FrameSource {
    /// A file on the local file system.
    File(PathBuf),
    /// An uploaded blob held in memory, keyed by its upload id.
    Blob(String),
    /// A streamed URL resolved by the host application.
    Url(String),
}

impl fmt::Display for FrameSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameSource::File(path) => write!(f, "{}", path.display()),
            FrameSource::Blob(id) => write!(f, "blob:{id}"),
            FrameSource::Url(url) => f.write_str(url),
        }
    }
}

/// Tag metadata read during ingestion.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameMetadata {
    pub patient_id: Option<String>,
    pub patient_name: Option<String>,
    pub study_instance_uid: Option<String>,
    pub series_instance_uid: Option<String>,
    pub sop_instance_uid: Option<String>,
    pub modality: Option<String>,
    pub series_description: Option<String>,
    pub rows: u32,
    pub columns: u32,
    pub bits_stored: Option<u16>,
    /// (row spacing, column spacing) in millimetres
    pub pixel_spacing: Option<(f32, f32)>,
    pub default_window: Option<WindowLevel>,
    pub instance_number: Option<i32>,
    pub slice_location: Option<f64>,
}

impl FrameMetadata {
    /// The window this frame asks for, falling back to its bit depth.
    pub fn window_or_fallback(&self) -> WindowLevel {
        self.default_window
            .unwrap_or_else(|| WindowLevel::from_bit_depth(self.bits_stored))
    }
}

/// Decode progress of a frame's pixel buffer.
#[derive(Clone, Debug, Default)]
pub enum PixelState {
    #[default]
    NotLoaded,
    Decoding,
    Ready(Arc<Array2<f32>>),
    Failed(DecodeError),
}

impl PixelState {
    pub fn is_ready(&self) -> bool {
        matches!(self, PixelState::Ready(_))
    }
}

/// One image of a series.
///
/// The frame owns its lazily decoded pixel buffer and the temporary handle
/// used to access its bytes until the catalog holding it is torn down.
pub struct Frame {
    pub source: FrameSource,
    pub metadata: FrameMetadata,
    pub(crate) arrival: usize,
    pub(crate) payload: Arc<dyn PixelPayload>,
    pub(crate) pixels: PixelState,
    pub(crate) temp_handle: Option<TempHandleId>,
}

impl Frame {
    pub fn new(
        source: FrameSource,
        metadata: FrameMetadata,
        payload: Arc<dyn PixelPayload>,
        arrival: usize,
    ) -> Self {
        Self {
            source,
            metadata,
            arrival,
            payload,
            pixels: PixelState::NotLoaded,
            temp_handle: None,
        }
    }

    pub fn with_temp_handle(mut self, handle: Option<TempHandleId>) -> Self {
        self.temp_handle = handle;
        self
    }

    /// Position of this frame in the batch it was loaded from.
    pub fn arrival(&self) -> usize {
        self.arrival
    }

    pub fn pixels(&self) -> &PixelState {
        &self.pixels
    }

    pub fn temp_handle(&self) -> Option<TempHandleId> {
        self.temp_handle
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("source", &self.source)
            .field("arrival", &self.arrival)
            .field("instance_number", &self.metadata.instance_number)
            .field("slice_location", &self.metadata.slice_location)
            .field("pixels", &self.pixels)
            .finish()
    }
}
