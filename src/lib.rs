//! # DICOM stack viewer library
//!
//! This crate provides the engine of an interactive viewer for stacks of
//! single-frame DICOM images.
//!
//! It is part of the dicom-rs ecosystem and builds on its components to load
//! a series of files into an ordered, navigable stack. If the environment
//! supports it, files are parsed in parallel on a shared rayon pool. The
//! engine keeps two channels of state:
//!  - High-frequency: viewport transform and window-level, mutated by
//!    pointer drags, presets and playback
//!  - Low-frequency: the loaded series, its metadata and load warnings
//!
//! Every render reads the latest combined state and runs the frame through
//! windowing, the viewport transform and, in high quality mode, the
//! enhancement filters. Drag tools are a closed enum with an exhaustive
//! dispatcher. Cine playback runs on a tokio timer.
//!
//!  DICOM files are assumed to have the following attributes:
//!   - Single frame (always the first frame is used)
//!   - Images from the same series
//!
//! # Roadmap
//!
//!  - Measurement and annotation tools
//!  - Multi-frame instances
//!  - Caching of decoded frames across series reloads
//!
//! # Examples
//!
//! ## Loading a directory and rendering the middle frame
//!
//! ```no_run
//! # use dicom_stack_viewer::{
//! #     DicomFrameDecoder, FileResolver, SeriesLoader, StackViewer, Surface, Toolkit,
//! #     ViewerConfig,
//! # };
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let mut toolkit = Toolkit::new(0);
//! toolkit.init()?;
//! let mut viewer = StackViewer::mount(&toolkit, Surface::new(512, 512), ViewerConfig::default())?;
//!
//! let sources = SeriesLoader::sources_from_directory("dicom")?;
//! let total = viewer
//!     .load_series(&sources, &FileResolver, &DicomFrameDecoder)
//!     .await?
//!     .len();
//! viewer.goto(total / 2)?;
//! viewer.decode_pending();
//! viewer.render()?;
//! if let Some(image) = viewer.frame_buffer() {
//!     image.save("result.png")?;
//! }
//! viewer.unmount()?;
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod config;
pub mod dicom_decoder;
pub mod enums;
pub mod filters;
pub mod frame;
pub mod ingest;
mod interpolator;
pub mod playback;
pub mod renderer;
pub mod resources;
pub mod series_loader;
pub mod tools;
pub mod viewer;
pub mod viewport;

pub use catalog::{CatalogError, FrameCatalog};
pub use config::{ConfigError, ViewerConfig, WindowPreset};
pub use dicom_decoder::DicomFrameDecoder;
pub use enums::{Interpolation, Key, QualityMode, SortBy, Tool};
pub use filters::EnhancementFilters;
pub use frame::{Frame, FrameMetadata, FrameSource, PixelState, SeriesId};
pub use ingest::{
    BlobStore, DecodeError, FileResolver, FrameDecoder, FrameResolver, ParseError, ParsedFrame,
    PixelPayload, RawPixels, ResolveError, ResolvedSource,
};
pub use playback::{PlaybackController, PlaybackError, PlaybackTick};
pub use renderer::{RenderOutcome, RenderPipeline, RenderState, RenderedFrame};
pub use resources::{
    ContextAcquisitionError, RenderingContext, ResourceError, ResourceManager, Surface,
    TempHandleId, Toolkit, ToolkitHandle,
};
pub use series_loader::{LoadError, LoadReport, LoadedSeries, SeriesLoader};
pub use tools::{DragState, InputEvent, InteractionEngine, NavigationAction, ToolEffect};
pub use viewer::{
    DecodeJob, DecodeOutcome, DecodeTicket, FrameStatus, LoadTicket, SeriesInfo, StackViewer,
    ViewerError, ViewerEvent, ViewerSnapshot,
};
pub use viewport::{ViewState, ViewportPatch, ViewportState, WindowLevel, WindowLevelPatch};
