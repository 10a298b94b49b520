//! Seams to the collaborators that turn a [`FrameSource`] into bytes and the
//! bytes into metadata plus a lazily decodable pixel buffer.

use crate::frame::{FrameMetadata, FrameSource};

use futures::future::{self, FutureExt, LocalBoxFuture};
use ndarray::Array2;
use std::{collections::HashMap, fs, sync::Arc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No blob registered under id {0}")]
    UnknownBlob(String),

    #[error("Source not supported by this resolver: {0}")]
    Unsupported(String),
}

/// One file could not be turned into a frame. Recovered by skipping the file.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Could not resolve frame bytes: {0}")]
    Resolve(#[from] ResolveError),

    #[error("DICOM error: {0}")]
    Dicom(#[from] dicom::object::ReadError),

    #[error("Missing attribute {0}")]
    MissingAttribute(&'static str),

    #[error("Unsupported image: {0}")]
    Unsupported(String),
}

/// Pixel decode of a single frame failed. Other frames stay navigable.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum DecodeError {
    #[error("Pixel data decode failed: {0}")]
    Pixel(String),

    #[error("Decoded buffer is {actual:?}, expected {expected:?}")]
    Shape {
        expected: (usize, usize),
        actual: (usize, usize),
    },
}

/// Encoded pixel data kept in memory until the frame is first displayed.
pub trait PixelPayload: Send + Sync {
    /// Raw intensities after the modality LUT, shape `(rows, columns)`.
    fn decode(&self) -> Result<Array2<f32>, DecodeError>;
}

/// An already decoded buffer.
pub struct RawPixels(pub Array2<f32>);

impl PixelPayload for RawPixels {
    fn decode(&self) -> Result<Array2<f32>, DecodeError> {
        Ok(self.0.clone())
    }
}

pub struct ParsedFrame {
    pub metadata: FrameMetadata,
    pub payload: Arc<dyn PixelPayload>,
}

/// Parses one file's bytes. Implementations must be shareable across the
/// ingestion worker pool.
pub trait FrameDecoder: Sync {
    fn decode(&self, bytes: &[u8]) -> Result<ParsedFrame, ParseError>;
}

pub struct ResolvedSource {
    pub bytes: Vec<u8>,
    /// The bytes are reachable only through a temporary handle that must be
    /// released when the frame is dropped from the viewer.
    pub temporary: bool,
}

/// Resolves a frame reference to its bytes.
pub trait FrameResolver {
    fn resolve<'a>(
        &'a self,
        source: &'a FrameSource,
    ) -> LocalBoxFuture<'a, Result<ResolvedSource, ResolveError>>;
}

/// Reads [`FrameSource::File`] references from disk.
#[derive(Clone, Copy, Debug, Default)]
pub struct FileResolver;

impl FrameResolver for FileResolver {
    fn resolve<'a>(
        &'a self,
        source: &'a FrameSource,
    ) -> LocalBoxFuture<'a, Result<ResolvedSource, ResolveError>> {
        future::ready(read_local(source)).boxed_local()
    }
}

fn read_local(source: &FrameSource) -> Result<ResolvedSource, ResolveError> {
    match source {
        FrameSource::File(path) => Ok(ResolvedSource {
            bytes: fs::read(path)?,
            temporary: false,
        }),
        other => Err(ResolveError::Unsupported(other.to_string())),
    }
}

/// In-memory uploads. Also falls back to the file system for local paths so a
/// mixed batch can be ingested with one resolver.
#[derive(Debug, Default)]
pub struct BlobStore {
    blobs: HashMap<String, Arc<[u8]>>,
}

impl BlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<String>, bytes: impl Into<Arc<[u8]>>) {
        self.blobs.insert(id.into(), bytes.into());
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

impl FrameResolver for BlobStore {
    fn resolve<'a>(
        &'a self,
        source: &'a FrameSource,
    ) -> LocalBoxFuture<'a, Result<ResolvedSource, ResolveError>> {
        let result = match source {
            FrameSource::Blob(id) => self
                .blobs
                .get(id)
                .map(|bytes| ResolvedSource {
                    bytes: bytes.to_vec(),
                    temporary: true,
                })
                .ok_or_else(|| ResolveError::UnknownBlob(id.clone())),
            other => read_local(other),
        };
        future::ready(result).boxed_local()
    }
}
