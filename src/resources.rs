//! Process-wide toolkit setup and per-viewer resource bookkeeping.
//!
//! The [`Toolkit`] owns the worker pool shared by every viewer in the process.
//! It is created explicitly, initialised with [`Toolkit::init`] (idempotent)
//! and torn down with [`Toolkit::teardown`]. Viewers take a [`ToolkitHandle`]
//! from it instead of reaching for global state.
//!
//! A [`ResourceManager`] tracks the single rendering context of a viewer and
//! the temporary handles created while ingesting a series. Releasing anything
//! twice is reported as an error.

use image::{Rgba, RgbaImage};
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};
use std::{
    collections::{HashMap, HashSet},
    fmt,
    sync::Arc,
};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ContextAcquisitionError {
    #[error("Toolkit has not been initialised")]
    ToolkitNotInitialised,

    #[error("Failed to start worker pool: {0}")]
    WorkerPool(#[from] ThreadPoolBuildError),

    #[error("A rendering context ({0}) is already held by this viewer")]
    AlreadyAcquired(ContextId),

    #[error("Cannot render into an empty surface ({width}x{height})")]
    EmptySurface { width: u32, height: u32 },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResourceError {
    #[error("{0} was already released")]
    DoubleRelease(ResourceId),

    #[error("{0} was never issued by this manager")]
    Unknown(ResourceId),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "context#{}", self.0)
    }
}

/// A temporary handle giving in-memory access to an ingested file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TempHandleId(u64);

impl fmt::Display for TempHandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "temp-handle#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceId {
    Context(ContextId),
    TempHandle(TempHandleId),
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceId::Context(id) => id.fmt(f),
            ResourceId::TempHandle(id) => id.fmt(f),
        }
    }
}

/// Shared rendering toolkit.
#[derive(Default)]
pub struct Toolkit {
    threads: usize,
    pool: Option<Arc<ThreadPool>>,
}

impl Toolkit {
    /// `threads == 0` lets rayon pick the number of workers.
    pub fn new(threads: usize) -> Self {
        Self {
            threads,
            pool: None,
        }
    }

    /// Start the worker pool. Calling it again while initialised is a no-op
    /// and returns `Ok(false)`.
    pub fn init(&mut self) -> Result<bool, ContextAcquisitionError> {
        if self.pool.is_some() {
            return Ok(false);
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .thread_name(|i| format!("stack-viewer-{i}"))
            .build()?;
        info!(threads = pool.current_num_threads(), "Toolkit initialised");
        self.pool = Some(Arc::new(pool));
        Ok(true)
    }

    pub fn is_initialised(&self) -> bool {
        self.pool.is_some()
    }

    pub fn handle(&self) -> Result<ToolkitHandle, ContextAcquisitionError> {
        self.pool
            .clone()
            .map(|pool| ToolkitHandle { pool })
            .ok_or(ContextAcquisitionError::ToolkitNotInitialised)
    }

    /// Drop the toolkit's reference to the pool. Viewers still holding a
    /// handle keep the workers alive until they are dropped.
    pub fn teardown(&mut self) {
        if self.pool.take().is_some() {
            info!("Toolkit torn down");
        }
    }
}

/// A viewer's reference to the initialised toolkit.
#[derive(Clone)]
pub struct ToolkitHandle {
    pool: Arc<ThreadPool>,
}

impl ToolkitHandle {
    pub fn install<R: Send>(&self, op: impl FnOnce() -> R + Send) -> R {
        self.pool.install(op)
    }
}

/// Size of the container a viewer draws into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Surface {
    pub width: u32,
    pub height: u32,
}

impl Surface {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Reject a surface with no drawable area.
    pub fn check(self) -> Result<Self, ContextAcquisitionError> {
        if self.width == 0 || self.height == 0 {
            return Err(ContextAcquisitionError::EmptySurface {
                width: self.width,
                height: self.height,
            });
        }
        Ok(self)
    }
}

/// Render target bound to one viewer.
pub struct RenderingContext {
    id: ContextId,
    surface: Surface,
    target: RgbaImage,
}

impl RenderingContext {
    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn surface(&self) -> Surface {
        self.surface
    }

    pub fn target(&self) -> &RgbaImage {
        &self.target
    }

    pub(crate) fn present(&mut self, image: RgbaImage) {
        self.target = image;
    }

    pub(crate) fn clear(&mut self) {
        for pixel in self.target.pixels_mut() {
            *pixel = Rgba([0, 0, 0, 255]);
        }
    }
}

impl fmt::Debug for RenderingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderingContext")
            .field("id", &self.id)
            .field("surface", &self.surface)
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct ResourceManager {
    next_id: u64,
    live_context: Option<ContextId>,
    released_contexts: HashSet<ContextId>,
    live_handles: HashMap<TempHandleId, String>,
    released_handles: HashSet<TempHandleId>,
}

impl ResourceManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Bind a render target to `container`. Only one context may be live.
    pub fn acquire(
        &mut self,
        container: Surface,
    ) -> Result<RenderingContext, ContextAcquisitionError> {
        if let Some(live) = self.live_context {
            return Err(ContextAcquisitionError::AlreadyAcquired(live));
        }
        let container = container.check()?;
        let id = ContextId(self.next_id());
        self.live_context = Some(id);
        debug!(
            %id,
            width = container.width,
            height = container.height,
            "Rendering context acquired"
        );
        Ok(RenderingContext {
            id,
            surface: container,
            target: RgbaImage::from_pixel(container.width, container.height, Rgba([0, 0, 0, 255])),
        })
    }

    pub fn release(&mut self, context: ContextId) -> Result<(), ResourceError> {
        if self.live_context == Some(context) {
            self.live_context = None;
            self.released_contexts.insert(context);
            debug!(id = %context, "Rendering context released");
            return Ok(());
        }
        if self.released_contexts.contains(&context) {
            Err(ResourceError::DoubleRelease(ResourceId::Context(context)))
        } else {
            Err(ResourceError::Unknown(ResourceId::Context(context)))
        }
    }

    pub fn has_live_context(&self) -> bool {
        self.live_context.is_some()
    }

    /// Register a temporary handle for the file described by `label`.
    pub fn issue_temp_handle(&mut self, label: impl Into<String>) -> TempHandleId {
        let id = TempHandleId(self.next_id());
        self.live_handles.insert(id, label.into());
        id
    }

    pub fn release_temp_handle(&mut self, handle: TempHandleId) -> Result<(), ResourceError> {
        if let Some(label) = self.live_handles.remove(&handle) {
            self.released_handles.insert(handle);
            debug!(%handle, %label, "Temporary handle released");
            return Ok(());
        }
        if self.released_handles.contains(&handle) {
            Err(ResourceError::DoubleRelease(ResourceId::TempHandle(handle)))
        } else {
            Err(ResourceError::Unknown(ResourceId::TempHandle(handle)))
        }
    }

    pub fn live_temp_handles(&self) -> usize {
        self.live_handles.len()
    }

    pub fn is_live(&self, handle: TempHandleId) -> bool {
        self.live_handles.contains_key(&handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent_and_teardown_resets() {
        let mut toolkit = Toolkit::new(1);
        assert!(toolkit.handle().is_err());
        assert!(toolkit.init().expect("pool should start"));
        assert!(!toolkit.init().expect("second init is a no-op"));
        assert!(toolkit.handle().is_ok());

        toolkit.teardown();
        assert!(!toolkit.is_initialised());
        assert!(matches!(
            toolkit.handle(),
            Err(ContextAcquisitionError::ToolkitNotInitialised)
        ));
    }

    #[test]
    fn handle_runs_work_on_the_pool() {
        let mut toolkit = Toolkit::new(2);
        toolkit.init().expect("pool should start");
        let handle = toolkit.handle().expect("initialised");
        let sum: u32 = handle.install(|| (1..=4_u32).sum());
        assert_eq!(sum, 10);
    }

    #[test]
    fn second_context_requires_release() {
        let mut manager = ResourceManager::new();
        let context = manager
            .acquire(Surface::new(4, 4))
            .expect("first acquire succeeds");
        assert!(matches!(
            manager.acquire(Surface::new(4, 4)),
            Err(ContextAcquisitionError::AlreadyAcquired(id)) if id == context.id()
        ));

        manager.release(context.id()).expect("release live context");
        assert!(manager.acquire(Surface::new(4, 4)).is_ok());
    }

    #[test]
    fn empty_surface_is_refused() {
        let mut manager = ResourceManager::new();
        assert!(matches!(
            manager.acquire(Surface::new(0, 10)),
            Err(ContextAcquisitionError::EmptySurface { .. })
        ));
        assert!(!manager.has_live_context());
    }

    #[test]
    fn context_double_release_is_an_error() {
        let mut manager = ResourceManager::new();
        let context = manager.acquire(Surface::new(2, 2)).expect("acquire");
        assert_eq!(manager.release(context.id()), Ok(()));
        assert_eq!(
            manager.release(context.id()),
            Err(ResourceError::DoubleRelease(ResourceId::Context(context.id())))
        );
    }

    #[test]
    fn temp_handle_released_exactly_once() {
        let mut manager = ResourceManager::new();
        let handle = manager.issue_temp_handle("blob:a");
        assert!(manager.is_live(handle));
        assert_eq!(manager.release_temp_handle(handle), Ok(()));
        assert_eq!(
            manager.release_temp_handle(handle),
            Err(ResourceError::DoubleRelease(ResourceId::TempHandle(handle)))
        );
        assert_eq!(manager.live_temp_handles(), 0);
    }

    #[test]
    fn foreign_handle_is_unknown() {
        let mut manager = ResourceManager::new();
        let _ = manager.issue_temp_handle("blob:c");
        let stranger = TempHandleId(999);
        assert_eq!(
            manager.release_temp_handle(stranger),
            Err(ResourceError::Unknown(ResourceId::TempHandle(stranger)))
        );
    }
}
