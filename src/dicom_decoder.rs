use crate::{
    frame::FrameMetadata,
    ingest::{DecodeError, FrameDecoder, ParseError, ParsedFrame, PixelPayload},
    viewport::WindowLevel,
};

use dicom::{
    core::Tag,
    object::{FileDicomObject, InMemDicomObject, from_reader},
    pixeldata::{ConvertOptions, PixelDecoder, VoiLutOption},
};
use dicom_dictionary_std::tags;
use ndarray::{Array2, s};
use std::sync::Arc;

const PREAMBLE_LEN: usize = 128;
const MAGIC: &[u8; 4] = b"DICM";

/// Parses single-frame DICOM files.
///
/// Only the header is interpreted during ingestion. The pixel data stays
/// encoded inside the parsed object until the frame is first requested.
#[derive(Clone, Copy, Debug, Default)]
pub struct DicomFrameDecoder;

impl FrameDecoder for DicomFrameDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<ParsedFrame, ParseError> {
        let object = from_reader(Self::strip_preamble(bytes))?;
        let metadata = Self::extract_metadata(&object)?;
        let payload = DicomPixels {
            rows: metadata.rows as usize,
            columns: metadata.columns as usize,
            object,
        };
        Ok(ParsedFrame {
            metadata,
            payload: Arc::new(payload),
        })
    }
}

impl DicomFrameDecoder {
    /// Accept files with or without the 128 byte preamble.
    fn strip_preamble(bytes: &[u8]) -> &[u8] {
        match bytes.get(PREAMBLE_LEN..PREAMBLE_LEN + MAGIC.len()) {
            Some(magic) if magic == MAGIC => &bytes[PREAMBLE_LEN..],
            _ => bytes,
        }
    }

    fn extract_metadata(
        dicom_object: &FileDicomObject<InMemDicomObject>,
    ) -> Result<FrameMetadata, ParseError> {
        if dicom_object.element(tags::PIXEL_DATA).is_err() {
            return Err(ParseError::MissingAttribute("PixelData"));
        }
        let rows = Self::read_u32(dicom_object, tags::ROWS)
            .ok_or(ParseError::MissingAttribute("Rows"))?;
        let columns = Self::read_u32(dicom_object, tags::COLUMNS)
            .ok_or(ParseError::MissingAttribute("Columns"))?;
        if rows == 0 || columns == 0 {
            return Err(ParseError::Unsupported(format!(
                "empty image {columns}x{rows}"
            )));
        }

        let pixel_spacing = dicom_object
            .element(tags::PIXEL_SPACING)
            .ok()
            .and_then(|element| element.to_multi_float32().ok())
            .and_then(|spacing| Some((*spacing.first()?, *spacing.get(1)?)));

        Ok(FrameMetadata {
            patient_id: Self::read_string(dicom_object, tags::PATIENT_ID),
            patient_name: Self::read_string(dicom_object, tags::PATIENT_NAME),
            study_instance_uid: Self::read_string(dicom_object, tags::STUDY_INSTANCE_UID),
            series_instance_uid: Self::read_string(dicom_object, tags::SERIES_INSTANCE_UID),
            sop_instance_uid: Self::read_string(dicom_object, tags::SOP_INSTANCE_UID),
            modality: Self::read_string(dicom_object, tags::MODALITY),
            series_description: Self::read_string(dicom_object, tags::SERIES_DESCRIPTION),
            rows,
            columns,
            bits_stored: Self::read_u32(dicom_object, tags::BITS_STORED)
                .and_then(|bits| u16::try_from(bits).ok()),
            pixel_spacing,
            default_window: Self::read_window(dicom_object),
            instance_number: dicom_object
                .element(tags::INSTANCE_NUMBER)
                .ok()
                .and_then(|element| element.to_int::<i32>().ok()),
            slice_location: Self::read_slice_location(dicom_object),
        })
    }

    /// Slice Location, or the z component of Image Position (Patient).
    fn read_slice_location(dicom_object: &FileDicomObject<InMemDicomObject>) -> Option<f64> {
        Self::read_f64(dicom_object, tags::SLICE_LOCATION).or_else(|| {
            let pos = dicom_object
                .element(tags::IMAGE_POSITION_PATIENT)
                .ok()?
                .to_multi_float64()
                .ok()?;
            pos.get(2).copied()
        })
    }

    fn read_window(dicom_object: &FileDicomObject<InMemDicomObject>) -> Option<WindowLevel> {
        let width = Self::read_f64(dicom_object, tags::WINDOW_WIDTH)?;
        let center = Self::read_f64(dicom_object, tags::WINDOW_CENTER)?;
        (width > 0.0).then(|| WindowLevel::new(width as f32, center as f32))
    }

    fn read_string(dicom_object: &FileDicomObject<InMemDicomObject>, tag: Tag) -> Option<String> {
        let value = dicom_object.element(tag).ok()?.to_str().ok()?;
        let value = value.trim_matches(|c: char| c.is_whitespace() || c == '\0');
        (!value.is_empty()).then(|| value.to_string())
    }

    /// First value of a possibly multi-valued numeric attribute.
    fn read_f64(dicom_object: &FileDicomObject<InMemDicomObject>, tag: Tag) -> Option<f64> {
        dicom_object
            .element(tag)
            .ok()?
            .to_multi_float64()
            .ok()?
            .first()
            .copied()
    }

    fn read_u32(dicom_object: &FileDicomObject<InMemDicomObject>, tag: Tag) -> Option<u32> {
        dicom_object.element(tag).ok()?.to_int::<u32>().ok()
    }
}

struct DicomPixels {
    object: FileDicomObject<InMemDicomObject>,
    rows: usize,
    columns: usize,
}

impl PixelPayload for DicomPixels {
    fn decode(&self) -> Result<Array2<f32>, DecodeError> {
        let pixel_data = self
            .object
            .decode_pixel_data()
            .map_err(|err| DecodeError::Pixel(err.to_string()))?;
        // Modality LUT stays on so intensities are in output units (e.g. HU);
        // windowing happens in the render pipeline.
        let options = ConvertOptions::new().with_voi_lut(VoiLutOption::Identity);
        let image = pixel_data
            .to_ndarray_with_options::<f32>(&options)
            .map_err(|err| DecodeError::Pixel(err.to_string()))?
            .slice_move(s![0, .., .., 0]);

        if image.dim() != (self.rows, self.columns) {
            return Err(DecodeError::Shape {
                expected: (self.rows, self.columns),
                actual: image.dim(),
            });
        }
        Ok(image)
    }
}
