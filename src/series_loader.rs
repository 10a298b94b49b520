use crate::{
    frame::{Frame, FrameSource},
    ingest::{FrameDecoder, FrameResolver, ParseError, ParsedFrame},
    resources::{ResourceManager, TempHandleId, ToolkitHandle},
};

use futures::future::join_all;
use rayon::prelude::*;
use std::{fs, path::Path};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("No valid frames ({failures} file(s) failed to parse)")]
    EmptySeries { failures: usize },

    #[error("Load was superseded by a newer series")]
    Superseded,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A file that was skipped during ingestion.
#[derive(Debug)]
pub struct ParseFailure {
    pub source: FrameSource,
    pub error: ParseError,
}

#[derive(Debug, Default)]
pub struct LoadReport {
    pub loaded: usize,
    pub failures: Vec<ParseFailure>,
}

impl LoadReport {
    pub fn warning_count(&self) -> usize {
        self.failures.len()
    }
}

/// Frames of one batch that parsed successfully, in arrival order.
#[derive(Debug)]
pub struct LoadedSeries {
    pub frames: Vec<Frame>,
    pub report: LoadReport,
}

impl LoadedSeries {
    pub(crate) fn temp_handles(&self) -> impl Iterator<Item = TempHandleId> + '_ {
        self.frames.iter().filter_map(Frame::temp_handle)
    }
}

type ParseOutcome =
    Result<(ParsedFrame, Option<TempHandleId>), (ParseError, Option<TempHandleId>)>;

pub struct SeriesLoader;

impl SeriesLoader {
    /// Resolve and parse a batch of frame sources.
    ///
    /// Sources are resolved concurrently, then parsed in parallel on the
    /// toolkit's worker pool. A file that fails to resolve or parse is
    /// recorded in the report and skipped; its temporary handle, if any, is
    /// released right away. Only a batch without a single valid frame fails.
    pub async fn load<R, D>(
        sources: &[FrameSource],
        resolver: &R,
        decoder: &D,
        resources: &mut ResourceManager,
        toolkit: &ToolkitHandle,
    ) -> Result<LoadedSeries, LoadError>
    where
        R: FrameResolver + ?Sized,
        D: FrameDecoder + ?Sized,
    {
        let resolved = join_all(sources.iter().map(|source| resolver.resolve(source))).await;

        let inputs: Vec<_> = sources
            .iter()
            .zip(resolved)
            .map(|(source, result)| {
                result.map(|resolved| {
                    let handle = resolved
                        .temporary
                        .then(|| resources.issue_temp_handle(source.to_string()));
                    (resolved.bytes, handle)
                })
            })
            .collect();

        let parsed: Vec<ParseOutcome> = toolkit.install(|| {
            inputs
                .into_par_iter()
                .map(|input| match input {
                    Ok((bytes, handle)) => decoder
                        .decode(&bytes)
                        .map(|frame| (frame, handle))
                        .map_err(|err| (err, handle)),
                    Err(err) => Err((ParseError::from(err), None)),
                })
                .collect()
        });

        let mut frames = Vec::with_capacity(parsed.len());
        let mut report = LoadReport::default();
        for (arrival, (source, result)) in sources.iter().zip(parsed).enumerate() {
            match result {
                Ok((parsed, handle)) => {
                    let frame = Frame::new(source.clone(), parsed.metadata, parsed.payload, arrival)
                        .with_temp_handle(handle);
                    frames.push(frame);
                }
                Err((error, handle)) => {
                    warn!(%source, %error, "Skipping file that failed to parse");
                    if let Some(handle) = handle {
                        if let Err(release) = resources.release_temp_handle(handle) {
                            warn!(%source, error = %release, "Skipped file's handle was not live");
                        }
                    }
                    report.failures.push(ParseFailure {
                        source: source.clone(),
                        error,
                    });
                }
            }
        }
        report.loaded = frames.len();

        if frames.is_empty() {
            return Err(LoadError::EmptySeries {
                failures: report.failures.len(),
            });
        }
        info!(
            loaded = report.loaded,
            failed = report.failures.len(),
            "Series ingested"
        );
        Ok(LoadedSeries { frames, report })
    }

    /// Frame sources for the given file paths.
    pub fn sources_from_file_paths(paths: &[impl AsRef<Path>]) -> Vec<FrameSource> {
        paths
            .iter()
            .map(|path| FrameSource::File(path.as_ref().to_path_buf()))
            .collect()
    }

    /// Frame sources for every ".dcm" file in a directory, ordered by file name.
    pub fn sources_from_directory(path: impl AsRef<Path>) -> Result<Vec<FrameSource>, LoadError> {
        let mut paths: Vec<_> = fs::read_dir(path.as_ref())?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .and_then(|s| s.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("dcm"))
            })
            .collect();

        if paths.is_empty() {
            return Err(LoadError::EmptySeries { failures: 0 });
        }
        paths.sort();

        Ok(Self::sources_from_file_paths(&paths))
    }
}
