// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for configuration module

use camera_recorder::RecorderConfig;
use camera_recorder::errors::AppError;

#[test]
fn test_config_default() {
    // Test that default config can be created
    let config = RecorderConfig::default();

    // Check sensible defaults
    assert!(config.audio.enabled, "Audio should be recorded by default");
    assert_eq!(config.audio.channels, 1);
    assert!(config.video.encoder.is_none());
    assert!(config.validate().is_ok());
}

#[test]
fn test_config_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.json");

    let mut config = RecorderConfig::default();
    config.video.bitrate_bps = 2_000_000;
    config.video.encoder = Some("x264enc".to_string());
    config.audio.device = Some("alsa_input.usb-mic".to_string());
    config.save(&path).unwrap();

    let loaded = RecorderConfig::load(Some(path.as_path())).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_missing_config_file_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let loaded = RecorderConfig::load(Some(dir.path().join("absent.json").as_path())).unwrap();
    assert_eq!(loaded, RecorderConfig::default());
}

#[test]
fn test_malformed_config_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, "{ not json").unwrap();

    assert!(matches!(
        RecorderConfig::load(Some(path.as_path())),
        Err(AppError::Config(_))
    ));
}

#[test]
fn test_zero_input_size_rejected() {
    let result = RecorderConfig::from_json(r#"{ "audio": { "max_input_size": 0 } }"#);
    assert!(matches!(result, Err(AppError::Config(_))));
}
