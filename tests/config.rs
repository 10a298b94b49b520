use dicom_stack_viewer::{ConfigError, QualityMode, ViewerConfig, WindowLevel};
use std::io::Write;

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

#[test]
fn test_default_config_is_valid() {
    let config = ViewerConfig::default();
    config.validate().unwrap();
    assert_eq!(config.playback.interval_ms, 100);
    assert_eq!(config.render.quality, QualityMode::Standard);
    assert_eq!(config.interaction.zoom_sensitivity, 0.01);
    assert_eq!(config.presets.len(), 5);
}

#[test]
fn test_presets_lookup_ignores_case() {
    let config = ViewerConfig::default();
    let lung = config.preset("LUNG").unwrap();
    assert_eq!(lung.window(), WindowLevel::new(1500.0, -600.0));
    assert_eq!(config.preset("brain").unwrap().window(), WindowLevel::new(80.0, 40.0));
    assert!(config.preset("spine").is_none());
}

// ---------------------------------------------------------------------------
// TOML
// ---------------------------------------------------------------------------

#[test]
fn test_empty_toml_gives_defaults() {
    assert_eq!(ViewerConfig::from_toml_str("").unwrap(), ViewerConfig::default());
}

#[test]
fn test_partial_toml_overrides_sections() {
    let config = ViewerConfig::from_toml_str(
        r#"
        [playback]
        interval_ms = 40

        [render]
        quality = "High"
        supersample = 3

        [filters]
        contrast = 150.0

        [[presets]]
        name = "Liver"
        width = 150.0
        center = 30.0
        "#,
    )
    .unwrap();

    assert_eq!(config.playback.interval_ms, 40);
    assert_eq!(config.render.quality, QualityMode::High);
    assert_eq!(config.render.supersample, 3);
    assert_eq!(config.render.prefetch_radius, 1);
    assert_eq!(config.filters.contrast, 150.0);
    assert_eq!(config.filters.brightness, 100.0);
    assert_eq!(config.presets.len(), 1);
    assert!(config.preset("liver").is_some());
    assert_eq!(config.interaction.window_sensitivity, 1.0);
}

#[test]
fn test_load_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[interaction]\nscroll_step_px = 12.0\n\n[toolkit]\nthreads = 2").unwrap();

    let config = ViewerConfig::load(file.path()).unwrap();
    assert_eq!(config.interaction.scroll_step_px, 12.0);
    assert_eq!(config.toolkit.threads, 2);
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = ViewerConfig::load(dir.path().join("missing.toml"));
    assert!(matches!(result, Err(ConfigError::Io(_))));
}

#[test]
fn test_malformed_toml_is_rejected() {
    let result = ViewerConfig::from_toml_str("[playback\ninterval_ms = 1");
    assert!(matches!(result, Err(ConfigError::Toml(_))));
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[test]
fn test_zero_interval_is_invalid() {
    let result = ViewerConfig::from_toml_str("[playback]\ninterval_ms = 0");
    let Err(ConfigError::Invalid(message)) = result else {
        panic!("expected a validation error, got {result:?}");
    };
    assert!(message.contains("interval_ms"));
}

#[test]
fn test_non_positive_values_are_invalid() {
    for source in [
        "[interaction]\nzoom_sensitivity = 0.0",
        "[interaction]\nwindow_sensitivity = -1.0",
        "[render]\nsupersample = 0",
        "[[presets]]\nname = \"Flat\"\nwidth = 0.0\ncenter = 0.0",
    ] {
        assert!(
            matches!(ViewerConfig::from_toml_str(source), Err(ConfigError::Invalid(_))),
            "accepted {source:?}"
        );
    }
}
