use approx::assert_relative_eq;
use dicom_stack_viewer::{
    EnhancementFilters, QualityMode,
    filters::{self, FILTER_ORDER, FilterStage},
};
use image::{Rgb, Rgb32FImage};

fn flat(value: f32) -> Rgb32FImage {
    Rgb32FImage::from_pixel(4, 4, Rgb([value; 3]))
}

fn first_value(image: &Rgb32FImage) -> f32 {
    image.get_pixel(0, 0).0[0]
}

// ---------------------------------------------------------------------------
// Chain selection
// ---------------------------------------------------------------------------

#[test]
fn test_standard_quality_runs_no_stage() {
    assert!(filters::plan(QualityMode::Standard).is_empty());
}

#[test]
fn test_high_quality_runs_fixed_order() {
    assert_eq!(
        filters::plan(QualityMode::High),
        &[
            FilterStage::Contrast,
            FilterStage::Brightness,
            FilterStage::Saturation,
            FilterStage::Sharpen,
        ]
    );
    assert_eq!(filters::plan(QualityMode::High), &FILTER_ORDER);
}

#[test]
fn test_standard_quality_returns_input_untouched() {
    let tuned = EnhancementFilters {
        contrast: 10.0,
        brightness: 190.0,
        saturation: 0.0,
        sharpness: 100.0,
    };
    let image = flat(0.3);
    let output = filters::apply(image.clone(), &tuned, QualityMode::Standard, 1.0);
    assert_eq!(output, image);
}

#[test]
fn test_contrast_runs_before_brightness() {
    let tuned = EnhancementFilters {
        contrast: 200.0,
        brightness: 50.0,
        ..Default::default()
    };
    // contrast: (0.75 - 0.5) * 2 + 0.5 = 1.0, then brightness halves it
    let output = filters::apply(flat(0.75), &tuned, QualityMode::High, 1.0);
    assert_relative_eq!(first_value(&output), 0.5, epsilon = 1e-5);

    // the reverse order would give 0.25
    let reversed = FilterStage::Contrast.apply(
        FilterStage::Brightness.apply(flat(0.75), &tuned, 1.0),
        &tuned,
        1.0,
    );
    assert_relative_eq!(first_value(&reversed), 0.25, epsilon = 1e-5);
}

#[test]
fn test_defaults_are_neutral() {
    let output = filters::apply(
        flat(0.42),
        &EnhancementFilters::default(),
        QualityMode::High,
        1.0,
    );
    for pixel in output.pixels() {
        for channel in pixel.0 {
            assert_relative_eq!(channel, 0.42, epsilon = 1e-5);
        }
    }
}

// ---------------------------------------------------------------------------
// Individual stages
// ---------------------------------------------------------------------------

#[test]
fn test_saturation_keeps_grey_grey() {
    let tuned = EnhancementFilters {
        saturation: 0.0,
        ..Default::default()
    };
    let output = FilterStage::Saturation.apply(flat(0.6), &tuned, 1.0);
    let [r, g, b] = output.get_pixel(1, 1).0;
    assert_relative_eq!(r, 0.6, epsilon = 1e-5);
    assert_relative_eq!(g, 0.6, epsilon = 1e-5);
    assert_relative_eq!(b, 0.6, epsilon = 1e-5);
}

#[test]
fn test_desaturate_colour_to_luma() {
    let tuned = EnhancementFilters {
        saturation: 0.0,
        ..Default::default()
    };
    let image = Rgb32FImage::from_pixel(1, 1, Rgb([1.0, 0.0, 0.0]));
    let [r, g, b] = FilterStage::Saturation.apply(image, &tuned, 1.0).get_pixel(0, 0).0;
    assert_relative_eq!(r, 0.213, epsilon = 1e-5);
    assert_relative_eq!(g, 0.213, epsilon = 1e-5);
    assert_relative_eq!(b, 0.213, epsilon = 1e-5);
}

#[test]
fn test_sharpen_steepens_edges() {
    let edge = Rgb32FImage::from_fn(8, 1, |x, _| Rgb([if x < 4 { 0.2 } else { 0.8 }; 3]));
    let tuned = EnhancementFilters {
        sharpness: 100.0,
        ..Default::default()
    };
    let output = FilterStage::Sharpen.apply(edge.clone(), &tuned, 1.0);
    assert!(output.get_pixel(3, 0).0[0] < 0.2);
    assert!(output.get_pixel(4, 0).0[0] > 0.8);

    let off = EnhancementFilters::default();
    assert_eq!(FilterStage::Sharpen.apply(edge.clone(), &off, 1.0), edge);
}

#[test]
fn test_values_are_clamped() {
    let clamped = EnhancementFilters {
        contrast: 500.0,
        brightness: -20.0,
        saturation: f32::NAN,
        sharpness: 250.0,
    }
    .clamped();
    assert_eq!(
        clamped,
        EnhancementFilters {
            contrast: 200.0,
            brightness: 0.0,
            saturation: 100.0,
            sharpness: 100.0,
        }
    );
}
