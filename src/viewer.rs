//! The stack viewer façade.
//!
//! State is split into two channels. The high-frequency channel is the
//! session's [`ViewState`] plus the current index: drags, presets, playback
//! and navigation mutate it and the render pipeline reads it directly. The
//! low-frequency channel is everything that only changes when a series is
//! loaded: the catalog's metadata, [`SeriesInfo`] and the [`LoadReport`].
//!
//! Mutations only mark the viewer dirty. [`StackViewer::render`] always draws
//! the latest combined state, so several mutations between two renders are
//! drawn once.

use crate::{
    catalog::{CatalogError, FrameCatalog},
    config::{ConfigError, ViewerConfig},
    enums::{QualityMode, SortBy, Tool},
    filters::EnhancementFilters,
    frame::{FrameMetadata, FrameSource, PixelState, SeriesId},
    ingest::{DecodeError, FrameDecoder, FrameResolver, PixelPayload},
    playback::{PlaybackController, PlaybackError, PlaybackTick},
    renderer::{RenderOutcome, RenderPipeline, RenderState},
    resources::{
        ContextAcquisitionError, RenderingContext, ResourceError, ResourceManager, Surface,
        TempHandleId, Toolkit, ToolkitHandle,
    },
    series_loader::{LoadError, LoadReport, LoadedSeries, SeriesLoader},
    tools::{InputEvent, InteractionEngine, NavigationAction, ToolEffect},
    viewport::{ViewState, ViewportPatch, ViewportState, WindowLevel, WindowLevelPatch},
};

use image::RgbaImage;
use ndarray::Array2;
use rayon::prelude::*;
use std::{fmt, sync::Arc};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ViewerError {
    #[error(transparent)]
    Context(#[from] ContextAcquisitionError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error(transparent)]
    Playback(#[from] PlaybackError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("No series loaded")]
    NoSeries,

    #[error("Viewer has been unmounted")]
    Unmounted,

    #[error("Unknown window preset {0}")]
    UnknownPreset(String),
}

#[derive(Clone, Debug, PartialEq)]
pub enum ViewerEvent {
    SeriesLoaded {
        series: SeriesId,
        total: usize,
        warnings: usize,
    },
    FrameChanged {
        index: usize,
        total: usize,
    },
    FrameRendered {
        index: usize,
        total: usize,
    },
    Error {
        message: String,
    },
}

/// Identifies one call to [`StackViewer::begin_load`]. Only the newest ticket
/// may install its series.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoadTicket(u64);

/// Names the frame a decode job belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DecodeTicket {
    pub series: SeriesId,
    pub index: usize,
}

/// Pixel decode of one frame, to be run wherever the host likes.
pub struct DecodeJob {
    ticket: DecodeTicket,
    payload: Arc<dyn PixelPayload>,
}

impl DecodeJob {
    pub fn ticket(&self) -> DecodeTicket {
        self.ticket
    }

    pub fn run(self) -> DecodeOutcome {
        DecodeOutcome {
            ticket: self.ticket,
            result: self.payload.decode(),
        }
    }

    /// Run on tokio's blocking pool.
    pub async fn run_blocking(self) -> DecodeOutcome {
        let ticket = self.ticket;
        tokio::task::spawn_blocking(move || self.run())
            .await
            .unwrap_or_else(|err| DecodeOutcome {
                ticket,
                result: Err(DecodeError::Pixel(format!("decode task failed: {err}"))),
            })
    }
}

impl fmt::Debug for DecodeJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodeJob")
            .field("ticket", &self.ticket)
            .finish()
    }
}

#[derive(Debug)]
pub struct DecodeOutcome {
    pub ticket: DecodeTicket,
    pub result: Result<Array2<f32>, DecodeError>,
}

/// Low-frequency description of the loaded series.
#[derive(Clone, Debug, PartialEq)]
pub struct SeriesInfo {
    pub series: SeriesId,
    pub patient_id: Option<String>,
    pub patient_name: Option<String>,
    pub study_instance_uid: Option<String>,
    pub series_instance_uid: Option<String>,
    pub modality: Option<String>,
    pub series_description: Option<String>,
    pub frame_count: usize,
    pub rows: u32,
    pub columns: u32,
    pub pixel_spacing: Option<(f32, f32)>,
    pub sort_by: SortBy,
}

impl SeriesInfo {
    fn from_catalog(catalog: &FrameCatalog) -> Self {
        let first = catalog.first_metadata();
        Self {
            series: catalog.series(),
            patient_id: first.patient_id.clone(),
            patient_name: first.patient_name.clone(),
            study_instance_uid: first.study_instance_uid.clone(),
            series_instance_uid: first.series_instance_uid.clone(),
            modality: first.modality.clone(),
            series_description: first.series_description.clone(),
            frame_count: catalog.len(),
            rows: first.rows,
            columns: first.columns,
            pixel_spacing: first.pixel_spacing,
            sort_by: catalog.sort_by(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStatus {
    Loading,
    Ready,
    Failed,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FrameSnapshot {
    pub index: usize,
    pub total: usize,
    pub status: FrameStatus,
    pub metadata: FrameMetadata,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlaybackSnapshot {
    pub is_playing: bool,
    pub interval_ms: u64,
}

/// Everything an overlay needs to describe the viewer.
#[derive(Clone, Debug, PartialEq)]
pub struct ViewerSnapshot {
    pub frame: Option<FrameSnapshot>,
    pub viewport: Option<ViewportState>,
    pub window_level: Option<WindowLevel>,
    pub filters: EnhancementFilters,
    pub quality: QualityMode,
    pub tool: Tool,
    pub playback: PlaybackSnapshot,
    /// Files skipped while loading the current series.
    pub warnings: usize,
}

impl ViewerSnapshot {
    /// e.g. `Image 3 / 40  W: 400 L: 40  Window/Level`
    pub fn overlay_text(&self) -> String {
        let position = match &self.frame {
            Some(frame) => format!("Image {} / {}", frame.index + 1, frame.total),
            None => "No image".to_string(),
        };
        let window = match &self.window_level {
            Some(window) => format!("W: {:.0} L: {:.0}", window.width, window.center),
            None => "W: - L: -".to_string(),
        };
        format!("{position}  {window}  {}", self.tool)
    }
}

struct Session {
    catalog: FrameCatalog,
    view: ViewState,
    info: SeriesInfo,
    report: LoadReport,
    default_window: WindowLevel,
}

type Listener = Box<dyn FnMut(&ViewerEvent)>;

pub struct StackViewer {
    toolkit: ToolkitHandle,
    config: ViewerConfig,
    resources: ResourceManager,
    context: Option<RenderingContext>,
    pipeline: RenderPipeline,
    filters: EnhancementFilters,
    quality: QualityMode,
    tools: InteractionEngine,
    playback: PlaybackController,
    session: Option<Session>,
    next_series: u64,
    latest_load: u64,
    dirty: bool,
    listeners: Vec<Listener>,
}

impl StackViewer {
    /// Create a viewer drawing into `container`.
    pub fn mount(
        toolkit: &Toolkit,
        container: Surface,
        config: ViewerConfig,
    ) -> Result<Self, ViewerError> {
        config.validate()?;
        let toolkit = toolkit.handle()?;
        let mut resources = ResourceManager::new();
        let context = resources.acquire(container)?;

        Ok(Self {
            pipeline: RenderPipeline::new(toolkit.clone(), &config.render),
            toolkit,
            resources,
            context: Some(context),
            filters: config.filters.clamped(),
            quality: config.render.quality,
            tools: InteractionEngine::new(config.interaction.clone(), Tool::default()),
            playback: PlaybackController::new(config.playback.interval_ms),
            session: None,
            next_series: 0,
            latest_load: 0,
            dirty: false,
            listeners: Vec::new(),
            config,
        })
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn resources(&self) -> &ResourceManager {
        &self.resources
    }

    pub fn context(&self) -> Option<&RenderingContext> {
        self.context.as_ref()
    }

    /// Last image presented to the rendering context.
    pub fn frame_buffer(&self) -> Option<&RgbaImage> {
        self.context.as_ref().map(RenderingContext::target)
    }

    // ---------------------------------------------------------------------
    // Events
    // ---------------------------------------------------------------------

    pub fn on_event(&mut self, listener: impl FnMut(&ViewerEvent) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    pub fn on_frame_changed(&mut self, mut callback: impl FnMut(usize, usize) + 'static) {
        self.on_event(move |event| {
            if let ViewerEvent::FrameChanged { index, total } = event {
                callback(*index, *total);
            }
        });
    }

    pub fn on_error(&mut self, mut callback: impl FnMut(&str) + 'static) {
        self.on_event(move |event| {
            if let ViewerEvent::Error { message } = event {
                callback(message);
            }
        });
    }

    fn emit(&mut self, event: ViewerEvent) {
        for listener in &mut self.listeners {
            listener(&event);
        }
    }

    fn report_error(&mut self, err: &impl fmt::Display) {
        self.emit(ViewerEvent::Error {
            message: err.to_string(),
        });
    }

    // ---------------------------------------------------------------------
    // Series lifecycle
    // ---------------------------------------------------------------------

    /// Start a new load. Any earlier ticket that has not been installed yet
    /// becomes stale.
    pub fn begin_load(&mut self) -> LoadTicket {
        self.latest_load += 1;
        LoadTicket(self.latest_load)
    }

    /// Resolve and parse `sources` without touching the current session.
    pub async fn ingest<R, D>(
        &mut self,
        sources: &[FrameSource],
        resolver: &R,
        decoder: &D,
    ) -> Result<LoadedSeries, LoadError>
    where
        R: FrameResolver + ?Sized,
        D: FrameDecoder + ?Sized,
    {
        SeriesLoader::load(sources, resolver, decoder, &mut self.resources, &self.toolkit).await
    }

    /// Replace the current series with `loaded`.
    ///
    /// The new session is installed before the old one's temporary handles
    /// are released. Viewport state starts fresh and the window-level is
    /// seeded from the first frame of the new series.
    pub fn install_series(
        &mut self,
        ticket: LoadTicket,
        loaded: LoadedSeries,
    ) -> Result<&FrameCatalog, ViewerError> {
        if self.context.is_none() {
            self.release_handles(loaded.temp_handles().collect())?;
            return Err(ViewerError::Unmounted);
        }
        if ticket.0 != self.latest_load {
            warn!(?ticket, latest = self.latest_load, "Discarding superseded series load");
            self.release_handles(loaded.temp_handles().collect())?;
            return Err(LoadError::Superseded.into());
        }

        self.next_series += 1;
        let series = SeriesId(self.next_series);
        let LoadedSeries { frames, report } = loaded;
        let failures = report.failures.len();
        let catalog = FrameCatalog::build(series, frames).map_err(|err| match err {
            CatalogError::Empty => LoadError::EmptySeries { failures },
        })?;
        let default_window = catalog.first_metadata().window_or_fallback();
        let session = Session {
            info: SeriesInfo::from_catalog(&catalog),
            view: ViewState::new(default_window),
            catalog,
            report,
            default_window,
        };

        self.playback.stop();
        self.tools.pointer_up();
        let previous = self.session.replace(session);
        if let Some(previous) = previous {
            info!(series = %previous.catalog.series(), "Replacing series");
            self.release_handles(previous.catalog.temp_handles().collect())?;
        }
        self.dirty = true;

        let total = self.total();
        info!(%series, total, warnings = failures, "Series installed");
        self.emit(ViewerEvent::SeriesLoaded {
            series,
            total,
            warnings: failures,
        });
        self.emit(ViewerEvent::FrameChanged { index: 0, total });
        self.catalog().ok_or(ViewerError::NoSeries)
    }

    /// Load `sources` and install them as the current series.
    pub async fn load_series<R, D>(
        &mut self,
        sources: &[FrameSource],
        resolver: &R,
        decoder: &D,
    ) -> Result<&FrameCatalog, ViewerError>
    where
        R: FrameResolver + ?Sized,
        D: FrameDecoder + ?Sized,
    {
        let ticket = self.begin_load();
        match self.ingest(sources, resolver, decoder).await {
            Ok(loaded) => self.install_series(ticket, loaded),
            Err(err) => {
                self.report_error(&err);
                Err(err.into())
            }
        }
    }

    fn release_handles(&mut self, handles: Vec<TempHandleId>) -> Result<(), ResourceError> {
        for handle in handles {
            self.resources.release_temp_handle(handle)?;
        }
        Ok(())
    }

    /// Stop playback and release the series and the rendering context. Each
    /// resource is released by whichever of replace or unmount happens first.
    pub fn unmount(&mut self) -> Result<(), ViewerError> {
        self.playback.stop();
        self.tools.pointer_up();
        if let Some(session) = self.session.take() {
            self.release_handles(session.catalog.temp_handles().collect())?;
        }
        if let Some(context) = self.context.take() {
            self.resources.release(context.id())?;
            info!("Viewer unmounted");
        }
        Ok(())
    }

    /// Swap the rendering context for one bound to a new container size. An
    /// empty container is rejected and the current context stays live.
    pub fn resize(&mut self, container: Surface) -> Result<(), ViewerError> {
        if self.context.is_none() {
            return Err(ViewerError::Unmounted);
        }
        let container = container.check()?;
        let current = self.context.take().ok_or(ViewerError::Unmounted)?;
        self.resources.release(current.id())?;
        self.context = Some(self.resources.acquire(container)?);
        self.dirty = true;
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Read access
    // ---------------------------------------------------------------------

    pub fn catalog(&self) -> Option<&FrameCatalog> {
        self.session.as_ref().map(|session| &session.catalog)
    }

    pub fn series_info(&self) -> Option<&SeriesInfo> {
        self.session.as_ref().map(|session| &session.info)
    }

    pub fn load_report(&self) -> Option<&LoadReport> {
        self.session.as_ref().map(|session| &session.report)
    }

    pub fn viewport(&self) -> Option<&ViewportState> {
        self.session.as_ref().map(|session| session.view.viewport())
    }

    pub fn window_level(&self) -> Option<&WindowLevel> {
        self.session.as_ref().map(|session| session.view.window_level())
    }

    pub fn index(&self) -> Option<usize> {
        self.catalog().map(FrameCatalog::index)
    }

    fn total(&self) -> usize {
        self.catalog().map_or(0, FrameCatalog::len)
    }

    pub fn filters(&self) -> &EnhancementFilters {
        &self.filters
    }

    pub fn quality(&self) -> QualityMode {
        self.quality
    }

    pub fn active_tool(&self) -> Tool {
        self.tools.active_tool()
    }

    pub fn is_playing(&self) -> bool {
        self.playback.is_playing()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn snapshot(&self) -> ViewerSnapshot {
        let frame = self.session.as_ref().map(|session| {
            let catalog = &session.catalog;
            let current = catalog.current();
            FrameSnapshot {
                index: catalog.index(),
                total: catalog.len(),
                status: match current.pixels() {
                    PixelState::Ready(_) => FrameStatus::Ready,
                    PixelState::Failed(_) => FrameStatus::Failed,
                    PixelState::NotLoaded | PixelState::Decoding => FrameStatus::Loading,
                },
                metadata: current.metadata.clone(),
            }
        });
        ViewerSnapshot {
            frame,
            viewport: self.viewport().copied(),
            window_level: self.window_level().copied(),
            filters: self.filters,
            quality: self.quality,
            tool: self.tools.active_tool(),
            playback: PlaybackSnapshot {
                is_playing: self.playback.is_playing(),
                interval_ms: self.playback.interval_ms(),
            },
            warnings: self.load_report().map_or(0, LoadReport::warning_count),
        }
    }

    // ---------------------------------------------------------------------
    // Navigation
    // ---------------------------------------------------------------------

    fn navigate(&mut self, op: impl FnOnce(&mut FrameCatalog)) -> Result<usize, ViewerError> {
        let catalog = &mut self
            .session
            .as_mut()
            .ok_or(ViewerError::NoSeries)?
            .catalog;
        let before = catalog.index();
        op(catalog);
        let (index, total) = (catalog.index(), catalog.len());
        if index != before {
            self.dirty = true;
            self.emit(ViewerEvent::FrameChanged { index, total });
        }
        Ok(index)
    }

    /// Jump to `index`, clamped to the series.
    pub fn goto(&mut self, index: usize) -> Result<usize, ViewerError> {
        self.navigate(|catalog| {
            catalog.goto(index);
        })
    }

    pub fn step(&mut self, delta: isize) -> Result<usize, ViewerError> {
        self.navigate(|catalog| {
            catalog.step(delta);
        })
    }

    pub fn next(&mut self) -> Result<usize, ViewerError> {
        self.step(1)
    }

    pub fn previous(&mut self) -> Result<usize, ViewerError> {
        self.step(-1)
    }

    pub fn first(&mut self) -> Result<usize, ViewerError> {
        self.navigate(|catalog| {
            catalog.first();
        })
    }

    pub fn last(&mut self) -> Result<usize, ViewerError> {
        self.navigate(|catalog| {
            catalog.last();
        })
    }

    // ---------------------------------------------------------------------
    // View state
    // ---------------------------------------------------------------------

    fn view_mut(&mut self) -> Result<&mut ViewState, ViewerError> {
        self.dirty = true;
        self.session
            .as_mut()
            .map(|session| &mut session.view)
            .ok_or(ViewerError::NoSeries)
    }

    pub fn mutate_viewport(&mut self, patch: ViewportPatch) -> Result<(), ViewerError> {
        self.view_mut()?.mutate_viewport(patch);
        Ok(())
    }

    pub fn mutate_window_level(&mut self, patch: WindowLevelPatch) -> Result<(), ViewerError> {
        self.view_mut()?.mutate_window_level(patch);
        Ok(())
    }

    pub fn reset_view(&mut self) -> Result<(), ViewerError> {
        self.view_mut()?.reset_viewport();
        Ok(())
    }

    pub fn seed_window_level(&mut self, defaults: WindowLevel) -> Result<(), ViewerError> {
        self.view_mut()?.seed_window_level(defaults);
        Ok(())
    }

    /// Return to the series' default window.
    pub fn reset_window_level(&mut self) -> Result<(), ViewerError> {
        let defaults = self
            .session
            .as_ref()
            .ok_or(ViewerError::NoSeries)?
            .default_window;
        self.seed_window_level(defaults)
    }

    pub fn apply_preset(&mut self, name: &str) -> Result<(), ViewerError> {
        let window = self
            .config
            .preset(name)
            .map(|preset| preset.window())
            .ok_or_else(|| ViewerError::UnknownPreset(name.to_string()))?;
        self.seed_window_level(window)
    }

    pub fn set_scale(&mut self, scale: f32) -> Result<(), ViewerError> {
        self.mutate_viewport(ViewportPatch::default().scale(scale))
    }

    pub fn rotate_by(&mut self, degrees: f32) -> Result<(), ViewerError> {
        let view = self.view_mut()?;
        let rotation = view.viewport().rotation + degrees;
        view.mutate_viewport(ViewportPatch::default().rotation(rotation));
        Ok(())
    }

    pub fn toggle_flip_horizontal(&mut self) -> Result<(), ViewerError> {
        let view = self.view_mut()?;
        let flip = !view.viewport().flip_horizontal;
        view.mutate_viewport(ViewportPatch::default().flip_horizontal(flip));
        Ok(())
    }

    pub fn toggle_flip_vertical(&mut self) -> Result<(), ViewerError> {
        let view = self.view_mut()?;
        let flip = !view.viewport().flip_vertical;
        view.mutate_viewport(ViewportPatch::default().flip_vertical(flip));
        Ok(())
    }

    pub fn toggle_invert(&mut self) -> Result<(), ViewerError> {
        let view = self.view_mut()?;
        let invert = !view.viewport().invert;
        view.mutate_viewport(ViewportPatch::default().invert(invert));
        Ok(())
    }

    pub fn set_filters(&mut self, filters: EnhancementFilters) {
        self.filters = filters.clamped();
        self.dirty = true;
    }

    pub fn set_quality(&mut self, quality: QualityMode) {
        self.quality = quality;
        self.dirty = true;
    }

    pub fn set_active_tool(&mut self, tool: Tool) {
        self.tools.set_active_tool(tool);
    }

    // ---------------------------------------------------------------------
    // Input
    // ---------------------------------------------------------------------

    /// Route one input event. Errors are also reported to `on_error`.
    pub fn handle_input(&mut self, event: InputEvent) -> Result<(), ViewerError> {
        let result = self.dispatch_input(event);
        if let Err(err) = &result {
            self.report_error(err);
        }
        result
    }

    fn dispatch_input(&mut self, event: InputEvent) -> Result<(), ViewerError> {
        match event {
            InputEvent::PointerDown { x, y } => {
                self.tools.pointer_down(x, y, &mut self.playback);
                Ok(())
            }
            InputEvent::PointerMove { x, y } => {
                let Some(session) = self.session.as_ref() else {
                    return Ok(());
                };
                let effect = self.tools.pointer_move(x, y, &session.view);
                self.apply_effect(effect)
            }
            InputEvent::PointerUp => {
                self.tools.pointer_up();
                Ok(())
            }
            InputEvent::PointerLeave => {
                self.tools.pointer_leave();
                Ok(())
            }
            InputEvent::Wheel { delta_y } => match NavigationAction::from_wheel(delta_y) {
                Some(action) => self.apply_navigation(action),
                None => Ok(()),
            },
            InputEvent::Key(key) => self.apply_navigation(NavigationAction::from_key(key)),
        }
    }

    fn apply_effect(&mut self, effect: ToolEffect) -> Result<(), ViewerError> {
        match effect {
            ToolEffect::None => Ok(()),
            ToolEffect::Viewport(patch) => self.mutate_viewport(patch),
            ToolEffect::WindowLevel(patch) => self.mutate_window_level(patch),
            ToolEffect::Navigate(delta) => self.step(delta).map(|_| ()),
        }
    }

    fn apply_navigation(&mut self, action: NavigationAction) -> Result<(), ViewerError> {
        match action {
            NavigationAction::Step(delta) => self.step(delta).map(|_| ()),
            NavigationAction::First => self.first().map(|_| ()),
            NavigationAction::Last => self.last().map(|_| ()),
            NavigationAction::TogglePlayback => self.toggle_playback().map(|_| ()),
        }
    }

    // ---------------------------------------------------------------------
    // Playback
    // ---------------------------------------------------------------------

    pub fn play(&mut self) -> Result<(), ViewerError> {
        if self.session.is_none() {
            return Err(ViewerError::NoSeries);
        }
        let interval = self.playback.interval_ms();
        self.playback.start(interval)?;
        Ok(())
    }

    pub fn stop_playback(&mut self) -> bool {
        self.playback.stop()
    }

    pub fn toggle_playback(&mut self) -> Result<bool, ViewerError> {
        if self.playback.is_playing() {
            self.playback.stop();
            Ok(false)
        } else {
            self.play()?;
            Ok(true)
        }
    }

    pub fn set_playback_interval(&mut self, interval_ms: u64) -> Result<(), ViewerError> {
        self.playback.set_interval(interval_ms)?;
        Ok(())
    }

    /// Advance one frame, wrapping, if `tick` comes from the running timer.
    pub fn handle_playback_tick(&mut self, tick: PlaybackTick) -> bool {
        if !self.playback.accept(tick) {
            return false;
        }
        self.navigate(|catalog| {
            catalog.advance_wrapping();
        })
        .is_ok()
    }

    /// Wait for the next playback tick and apply it. Returns the new index, or
    /// `None` once playback is stopped.
    pub async fn next_playback_frame(&mut self) -> Option<usize> {
        let tick = self.playback.next_tick().await?;
        self.handle_playback_tick(tick);
        self.index()
    }

    /// Apply every tick that arrived since the last call without waiting.
    pub fn pump_playback(&mut self) -> usize {
        self.playback
            .drain_ticks()
            .into_iter()
            .filter(|tick| self.handle_playback_tick(*tick))
            .count()
    }

    // ---------------------------------------------------------------------
    // Decode scheduling
    // ---------------------------------------------------------------------

    /// Decode jobs for the current frame and its neighbours that have not
    /// been requested yet. The frames are marked as decoding.
    pub fn pending_decodes(&mut self) -> Vec<DecodeJob> {
        let radius = self.config.render.prefetch_radius;
        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };
        let catalog = &mut session.catalog;
        let (current, len) = (catalog.index(), catalog.len());
        let series = catalog.series();

        let mut order = vec![current];
        for distance in 1..=radius {
            if current + distance < len {
                order.push(current + distance);
            }
            if let Some(index) = current.checked_sub(distance) {
                order.push(index);
            }
        }

        order
            .into_iter()
            .filter_map(|index| {
                let frame = catalog.get_mut(index)?;
                if !matches!(frame.pixels, PixelState::NotLoaded) {
                    return None;
                }
                frame.pixels = PixelState::Decoding;
                Some(DecodeJob {
                    ticket: DecodeTicket { series, index },
                    payload: Arc::clone(&frame.payload),
                })
            })
            .collect()
    }

    /// Store a finished decode. Outcomes for a series that is no longer
    /// loaded are dropped and `false` is returned.
    pub fn complete_decode(&mut self, outcome: DecodeOutcome) -> bool {
        let DecodeOutcome { ticket, result } = outcome;
        let Some(session) = self.session.as_mut() else {
            warn!(?ticket, "Discarding decode without a loaded series");
            return false;
        };
        if session.catalog.series() != ticket.series {
            warn!(
                ?ticket,
                current = %session.catalog.series(),
                "Discarding decode for a replaced series"
            );
            return false;
        }
        let is_current = session.catalog.index() == ticket.index;
        let Some(frame) = session.catalog.get_mut(ticket.index) else {
            return false;
        };

        let failure = match result {
            Ok(pixels) => {
                frame.pixels = PixelState::Ready(Arc::new(pixels));
                None
            }
            Err(err) => {
                frame.pixels = PixelState::Failed(err.clone());
                Some(err)
            }
        };
        debug!(?ticket, failed = failure.is_some(), "Decode completed");
        if is_current {
            self.dirty = true;
        }
        if let Some(err) = failure {
            self.report_error(&format!("frame {}: {err}", ticket.index + 1));
        }
        true
    }

    /// Run all pending decode jobs on the toolkit pool and store the results.
    pub fn decode_pending(&mut self) -> usize {
        let jobs = self.pending_decodes();
        let outcomes: Vec<DecodeOutcome> = self
            .toolkit
            .install(|| jobs.into_par_iter().map(DecodeJob::run).collect());
        outcomes
            .into_iter()
            .map(|outcome| self.complete_decode(outcome))
            .filter(|stored| *stored)
            .count()
    }

    // ---------------------------------------------------------------------
    // Rendering
    // ---------------------------------------------------------------------

    /// Draw the current state into the rendering context.
    pub fn render(&mut self) -> Result<RenderOutcome, ViewerError> {
        let context = self.context.as_mut().ok_or(ViewerError::Unmounted)?;
        let session = self.session.as_ref().ok_or(ViewerError::NoSeries)?;
        let catalog = &session.catalog;
        let state = RenderState {
            viewport: session.view.viewport(),
            window_level: session.view.window_level(),
            filters: &self.filters,
            quality: self.quality,
            surface: context.surface(),
        };
        let outcome = self
            .pipeline
            .render(catalog.current(), catalog.index(), catalog.len(), state);

        match &outcome {
            RenderOutcome::Rendered(frame) => context.present(frame.image.clone()),
            RenderOutcome::Failed { .. } => context.clear(),
            RenderOutcome::Loading { .. } => {}
        }
        self.dirty = false;

        if let RenderOutcome::Rendered(frame) = &outcome {
            let (index, total) = (frame.index, frame.total);
            self.emit(ViewerEvent::FrameRendered { index, total });
        }
        Ok(outcome)
    }

    /// Render only if something changed since the last render.
    pub fn render_if_dirty(&mut self) -> Result<Option<RenderOutcome>, ViewerError> {
        if !self.dirty {
            return Ok(None);
        }
        self.render().map(Some)
    }
}

impl fmt::Debug for StackViewer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StackViewer")
            .field("context", &self.context)
            .field("series", &self.catalog().map(FrameCatalog::series))
            .field("index", &self.index())
            .field("playback", &self.playback)
            .field("dirty", &self.dirty)
            .finish()
    }
}
