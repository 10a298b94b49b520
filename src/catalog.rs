use crate::{
    enums::SortBy,
    frame::{Frame, FrameMetadata, SeriesId},
    resources::TempHandleId,
};

use std::cmp::Ordering;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("No valid frames")]
    Empty,
}

/// Ordered, navigable frames of one series.
///
/// The current index always satisfies `0 <= index < len`. Manual navigation
/// clamps at both ends, only [`FrameCatalog::advance_wrapping`] wraps around.
#[derive(Debug)]
pub struct FrameCatalog {
    series: SeriesId,
    frames: Vec<Frame>,
    index: usize,
    sort_by: SortBy,
}

impl FrameCatalog {
    /// Sort `frames` into display order.
    ///
    /// If every frame carries a slice location they are ordered by it,
    /// otherwise by instance number. Frames without a key keep their arrival
    /// order and follow the keyed ones.
    pub fn build(series: SeriesId, mut frames: Vec<Frame>) -> Result<Self, CatalogError> {
        if frames.is_empty() {
            return Err(CatalogError::Empty);
        }
        let sort_by = Self::sort_frames(&mut frames);
        Ok(Self {
            series,
            frames,
            index: 0,
            sort_by,
        })
    }

    fn sort_frames(frames: &mut [Frame]) -> SortBy {
        frames.sort_by_key(|frame| frame.arrival);

        if frames
            .iter()
            .all(|frame| frame.metadata.slice_location.is_some())
        {
            frames.sort_by(|a, b| {
                Self::compare_keys(a.metadata.slice_location, b.metadata.slice_location)
            });
            return SortBy::SliceLocation;
        }

        if frames
            .iter()
            .any(|frame| frame.metadata.instance_number.is_some())
        {
            frames.sort_by(|a, b| {
                Self::compare_keys(a.metadata.instance_number, b.metadata.instance_number)
            });
            return SortBy::InstanceNumber;
        }

        SortBy::Arrival
    }

    /// Keyed frames first in ascending order. `sort_by` is stable, so equal or
    /// missing keys fall back to arrival order.
    fn compare_keys<T: PartialOrd>(a: Option<T>, b: Option<T>) -> Ordering {
        match (a, b) {
            (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }

    pub fn series(&self) -> SeriesId {
        self.series
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Always false for a built catalog; present for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn sort_by(&self) -> SortBy {
        self.sort_by
    }

    pub fn current(&self) -> &Frame {
        &self.frames[self.index]
    }

    pub fn get(&self, index: usize) -> Option<&Frame> {
        self.frames.get(index)
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut Frame> {
        self.frames.get_mut(index)
    }

    pub fn frames(&self) -> impl Iterator<Item = &Frame> {
        self.frames.iter()
    }

    pub fn first_metadata(&self) -> &FrameMetadata {
        &self.frames[0].metadata
    }

    /// Jump to `index`, clamped into `[0, len - 1]`.
    pub fn goto(&mut self, index: usize) -> &Frame {
        self.index = index.min(self.frames.len() - 1);
        self.current()
    }

    /// Move by `delta` frames, clamped at both ends.
    pub fn step(&mut self, delta: isize) -> &Frame {
        let target = self.index.saturating_add_signed(delta);
        self.goto(target)
    }

    pub fn next(&mut self) -> &Frame {
        self.step(1)
    }

    pub fn previous(&mut self) -> &Frame {
        self.step(-1)
    }

    pub fn first(&mut self) -> &Frame {
        self.goto(0)
    }

    pub fn last(&mut self) -> &Frame {
        self.goto(usize::MAX)
    }

    /// Cine advance: past the last frame comes the first.
    pub fn advance_wrapping(&mut self) -> &Frame {
        let next = (self.index + 1) % self.frames.len();
        self.goto(next)
    }

    pub(crate) fn temp_handles(&self) -> impl Iterator<Item = TempHandleId> + '_ {
        self.frames.iter().filter_map(Frame::temp_handle)
    }
}
