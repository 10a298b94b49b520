#![allow(dead_code)]

use dicom_stack_viewer::{
    BlobStore, DecodeError, FrameDecoder, FrameMetadata, FrameSource, ParseError, ParsedFrame,
    PixelPayload, RawPixels, StackViewer, Surface, Toolkit, ViewerConfig, WindowLevel,
};
use futures::executor::block_on;
use ndarray::Array2;
use std::sync::Arc;

/// Decodes the test blob format `"<slice>;<width>/<center>;<value>"`, where the
/// slice may be `-` for "no slice location". Every frame is a 4x4 image filled
/// with `value`. The value `ramp` gives a horizontal ramp and `broken` a frame
/// whose pixels fail to decode.
pub struct TextDecoder;

impl FrameDecoder for TextDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<ParsedFrame, ParseError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|_| ParseError::Unsupported("not utf-8".into()))?;
        let parts: Vec<&str> = text.split(';').collect();
        let &[slice, window, value] = parts.as_slice() else {
            return Err(ParseError::Unsupported(text.to_string()));
        };
        let bad = || ParseError::Unsupported(text.to_string());

        let slice_location = match slice {
            "-" => None,
            s => Some(s.parse::<f64>().map_err(|_| bad())?),
        };
        let (width, center) = window.split_once('/').ok_or_else(bad)?;
        let default_window = WindowLevel::new(
            width.parse().map_err(|_| bad())?,
            center.parse().map_err(|_| bad())?,
        );
        let payload: Arc<dyn PixelPayload> = match value {
            "broken" => Arc::new(BrokenPixels),
            "ramp" => Arc::new(RawPixels(Array2::from_shape_fn((4, 4), |(_, x)| {
                x as f32 * 100.0
            }))),
            v => Arc::new(RawPixels(Array2::from_elem(
                (4, 4),
                v.parse::<f32>().map_err(|_| bad())?,
            ))),
        };

        Ok(ParsedFrame {
            metadata: FrameMetadata {
                rows: 4,
                columns: 4,
                slice_location,
                default_window: Some(default_window),
                modality: Some("CT".into()),
                ..Default::default()
            },
            payload,
        })
    }
}

pub struct BrokenPixels;

impl PixelPayload for BrokenPixels {
    fn decode(&self) -> Result<Array2<f32>, DecodeError> {
        Err(DecodeError::Pixel("corrupt pixel data".into()))
    }
}

/// Put each entry into `store` as a blob and return the matching sources.
pub fn blobs(store: &mut BlobStore, prefix: &str, entries: &[&str]) -> Vec<FrameSource> {
    entries
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let id = format!("{prefix}-{i}");
            store.insert(id.clone(), entry.as_bytes().to_vec());
            FrameSource::Blob(id)
        })
        .collect()
}

pub fn toolkit() -> Toolkit {
    let mut toolkit = Toolkit::new(2);
    toolkit.init().expect("toolkit should initialise");
    toolkit
}

pub fn mount(toolkit: &Toolkit) -> StackViewer {
    StackViewer::mount(toolkit, Surface::new(8, 8), ViewerConfig::default())
        .expect("viewer should mount")
}

/// Load `entries` as a blob series into `viewer`.
pub fn load(viewer: &mut StackViewer, store: &mut BlobStore, prefix: &str, entries: &[&str]) {
    let sources = blobs(store, prefix, entries);
    block_on(viewer.load_series(&sources, &*store, &TextDecoder)).expect("series should load");
}
