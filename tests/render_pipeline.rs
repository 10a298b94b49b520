mod common;

use dicom_stack_viewer::{
    EnhancementFilters, QualityMode, RenderPipeline, RenderState, Surface, ViewportState,
    WindowLevel, config::RenderConfig,
};
use image::RgbaImage;
use ndarray::{Array2, array};

fn pipeline() -> RenderPipeline {
    let toolkit = common::toolkit();
    RenderPipeline::new(toolkit.handle().unwrap(), &RenderConfig::default())
}

fn render(
    pixels: &Array2<f32>,
    viewport: &ViewportState,
    window: &WindowLevel,
    filters: &EnhancementFilters,
    quality: QualityMode,
    surface: Surface,
) -> RgbaImage {
    pipeline().render_pixels(
        pixels,
        RenderState {
            viewport,
            window_level: window,
            filters,
            quality,
            surface,
        },
    )
}

fn grey(image: &RgbaImage) -> Vec<u8> {
    image.pixels().map(|pixel| pixel.0[0]).collect()
}

fn ramp() -> Array2<f32> {
    array![[0.0, 50.0, 100.0]]
}

// ---------------------------------------------------------------------------
// Windowing
// ---------------------------------------------------------------------------

#[test]
fn test_window_maps_linearly_between_bounds() {
    let image = render(
        &ramp(),
        &ViewportState::default(),
        &WindowLevel::new(100.0, 50.0),
        &EnhancementFilters::default(),
        QualityMode::Standard,
        Surface::new(3, 1),
    );
    assert_eq!(grey(&image), vec![0, 128, 255]);
    assert!(image.pixels().all(|pixel| pixel.0[3] == 255));
}

#[test]
fn test_window_saturates_outside_bounds() {
    let pixels = array![[-1000.0, 40.0, 5000.0]];
    let image = render(
        &pixels,
        &ViewportState::default(),
        &WindowLevel::new(400.0, 40.0),
        &EnhancementFilters::default(),
        QualityMode::Standard,
        Surface::new(3, 1),
    );
    assert_eq!(grey(&image), vec![0, 128, 255]);
}

// ---------------------------------------------------------------------------
// Viewport transform
// ---------------------------------------------------------------------------

#[test]
fn test_flip_horizontal_mirrors_columns() {
    let viewport = ViewportState {
        flip_horizontal: true,
        ..Default::default()
    };
    let image = render(
        &ramp(),
        &viewport,
        &WindowLevel::new(100.0, 50.0),
        &EnhancementFilters::default(),
        QualityMode::Standard,
        Surface::new(3, 1),
    );
    assert_eq!(grey(&image), vec![255, 128, 0]);
}

#[test]
fn test_rotation_is_clockwise() {
    // a b      c a
    // c d  ->  d b
    let pixels = array![[0.0, 85.0], [170.0, 255.0]];
    let viewport = ViewportState {
        rotation: 90.0,
        ..Default::default()
    };
    let image = render(
        &pixels,
        &viewport,
        &WindowLevel::new(255.0, 127.5),
        &EnhancementFilters::default(),
        QualityMode::Standard,
        Surface::new(2, 2),
    );
    assert_eq!(grey(&image), vec![170, 0, 255, 85]);
}

#[test]
fn test_full_turn_equals_identity() {
    let pixels = array![[0.0, 85.0], [170.0, 255.0]];
    let window = WindowLevel::new(255.0, 127.5);
    let filters = EnhancementFilters::default();
    let surface = Surface::new(2, 2);
    let identity = render(
        &pixels,
        &ViewportState::default(),
        &window,
        &filters,
        QualityMode::Standard,
        surface,
    );
    let turned = render(
        &pixels,
        &ViewportState {
            rotation: -360.0,
            ..Default::default()
        },
        &window,
        &filters,
        QualityMode::Standard,
        surface,
    );
    assert_eq!(identity, turned);
}

#[test]
fn test_invert_leaves_background_black() {
    let pixels = array![[0.0]];
    let viewport = ViewportState {
        invert: true,
        ..Default::default()
    };
    let image = render(
        &pixels,
        &viewport,
        &WindowLevel::new(100.0, 50.0),
        &EnhancementFilters::default(),
        QualityMode::Standard,
        Surface::new(3, 1),
    );
    assert_eq!(grey(&image), vec![0, 255, 0]);
}

#[test]
fn test_pan_shifts_in_screen_pixels() {
    let viewport = ViewportState {
        translation: (1.0, 0.0),
        ..Default::default()
    };
    let image = render(
        &ramp(),
        &viewport,
        &WindowLevel::new(100.0, 50.0),
        &EnhancementFilters::default(),
        QualityMode::Standard,
        Surface::new(3, 1),
    );
    assert_eq!(grey(&image), vec![0, 0, 128]);
}

#[test]
fn test_zoom_magnifies_about_centre() {
    let viewport = ViewportState {
        scale: 3.0,
        ..Default::default()
    };
    let image = render(
        &ramp(),
        &viewport,
        &WindowLevel::new(100.0, 50.0),
        &EnhancementFilters::default(),
        QualityMode::Standard,
        Surface::new(3, 1),
    );
    // only the middle pixel of the image is left on screen
    assert_eq!(grey(&image), vec![128, 128, 128]);
}

// ---------------------------------------------------------------------------
// Quality modes
// ---------------------------------------------------------------------------

#[test]
fn test_standard_mode_ignores_filters() {
    let pixels = Array2::from_shape_fn((6, 6), |(y, x)| (x * 40 + y * 5) as f32);
    let window = WindowLevel::new(200.0, 120.0);
    let viewport = ViewportState::default();
    let surface = Surface::new(12, 12);
    let plain = render(
        &pixels,
        &viewport,
        &window,
        &EnhancementFilters::default(),
        QualityMode::Standard,
        surface,
    );
    let tuned = render(
        &pixels,
        &viewport,
        &window,
        &EnhancementFilters {
            contrast: 180.0,
            brightness: 40.0,
            saturation: 0.0,
            sharpness: 90.0,
        },
        QualityMode::Standard,
        surface,
    );
    assert_eq!(plain, tuned);
}

#[test]
fn test_high_mode_applies_filters() {
    let pixels = Array2::from_shape_fn((6, 6), |(y, x)| (x * 40 + y * 5) as f32);
    let window = WindowLevel::new(200.0, 120.0);
    let viewport = ViewportState::default();
    let surface = Surface::new(12, 12);
    let plain = render(
        &pixels,
        &viewport,
        &window,
        &EnhancementFilters::default(),
        QualityMode::High,
        surface,
    );
    let brighter = render(
        &pixels,
        &viewport,
        &window,
        &EnhancementFilters {
            brightness: 150.0,
            ..Default::default()
        },
        QualityMode::High,
        surface,
    );
    assert_ne!(plain, brighter);

    let sum = |image: &RgbaImage| grey(image).iter().map(|&v| v as u32).sum::<u32>();
    assert!(sum(&brighter) > sum(&plain));
}

#[test]
fn test_high_mode_smooths_edges() {
    let pixels = array![[0.0, 100.0]];
    let window = WindowLevel::new(100.0, 50.0);
    let standard = render(
        &pixels,
        &ViewportState::default(),
        &window,
        &EnhancementFilters::default(),
        QualityMode::Standard,
        Surface::new(8, 4),
    );
    let high = render(
        &pixels,
        &ViewportState::default(),
        &window,
        &EnhancementFilters::default(),
        QualityMode::High,
        Surface::new(8, 4),
    );

    let row = |image: &RgbaImage| (0..8).map(|x| image.get_pixel(x, 2).0[0]).collect::<Vec<_>>();
    assert_eq!(row(&standard), vec![0, 0, 0, 0, 255, 255, 255, 255]);
    let high_row = row(&high);
    assert!(high_row.iter().any(|&v| v > 0 && v < 255), "got {high_row:?}");
    assert!(high_row.windows(2).all(|pair| pair[0] <= pair[1]));
}

#[test]
fn test_render_is_deterministic() {
    let pixels = Array2::from_shape_fn((5, 7), |(y, x)| ((x * 13 + y * 7) % 50) as f32);
    let viewport = ViewportState {
        scale: 1.3,
        rotation: 33.0,
        translation: (1.5, -2.0),
        flip_vertical: true,
        ..Default::default()
    };
    let window = WindowLevel::new(40.0, 20.0);
    let filters = EnhancementFilters {
        contrast: 120.0,
        sharpness: 50.0,
        ..Default::default()
    };
    let surface = Surface::new(9, 9);
    let first = render(&pixels, &viewport, &window, &filters, QualityMode::High, surface);
    let second = render(&pixels, &viewport, &window, &filters, QualityMode::High, surface);
    assert_eq!(first, second);
}
