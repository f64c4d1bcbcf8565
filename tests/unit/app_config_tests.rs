/*!
 * Tests for application configuration functionality
 */

use std::path::PathBuf;

use mtpe::app_config::{Config, EditorKind, LogLevel, MtEngineKind};
use mtpe::translation::pipeline::PipelineSettings;

use crate::common;

fn offline_config() -> Config {
    let mut config = Config::default();
    config.pipeline.mt_engine = MtEngineKind::Passthrough;
    config.pipeline.llm_editor = EditorKind::Passthrough;
    config
}

/// Test default configuration values
#[test]
fn test_default_config_withNoParameters_shouldHaveCorrectDefaults() {
    let config = Config::default();

    assert_eq!(config.source_language, "ru");
    assert_eq!(config.target_language, "en");
    assert_eq!(config.pipeline.mt_engine, MtEngineKind::Anthropic);
    assert_eq!(config.pipeline.batch_size, 4);
    assert!(config.pipeline.use_glossary);
    assert!(config.pipeline.use_translation_memory);
    assert!(!config.pipeline.protect_terms);
    assert_eq!(config.pipeline.retry_count, 3);
    assert!(config.pipeline.fuzzy_threshold.is_none());
    assert!(config.pipeline.failure_marker.is_none());
    assert_eq!(config.storage.glossary_path, PathBuf::from("glossary.json"));
    assert_eq!(config.log_level, LogLevel::Info);
}

/// Test configuration validation
#[test]
fn test_config_validation_withVariousConfigs_shouldValidateCorrectly() {
    let mut config = offline_config();
    assert!(config.validate().is_ok());

    config.source_language = "xyz".to_string();
    assert!(config.validate().is_err());
    config.source_language = "ru".to_string();

    config.pipeline.max_concurrent_batches = 0;
    assert!(config.validate().is_err());
    config.pipeline.max_concurrent_batches = 2;

    config.pipeline.fuzzy_threshold = Some(1.5);
    assert!(config.validate().is_err());
    config.pipeline.fuzzy_threshold = Some(0.85);
    assert!(config.validate().is_ok());

    config.pipeline.llm_editor = EditorKind::Anthropic;
    config.anthropic.api_key = "sk-ant-test".to_string();
    assert!(config.validate().is_ok());
}

/// Test a missing config file is created with defaults
#[test]
fn test_loadOrCreate_missingFile_shouldWriteDefaults() {
    let dir = common::create_temp_dir().unwrap();
    let path = dir.path().join("conf.json");

    let config = Config::load_or_create(&path).unwrap();

    assert!(path.exists());
    assert_eq!(config.pipeline.batch_size, 4);
    let reloaded = Config::load_or_create(&path).unwrap();
    assert_eq!(reloaded.target_language, config.target_language);
}

/// Test partial config files fall back to defaults per field
#[test]
fn test_loadOrCreate_partialFile_shouldFillDefaults() {
    let dir = common::create_temp_dir().unwrap();
    let path = common::create_test_file(
        dir.path(),
        "conf.json",
        r#"{
            "source_language": "de",
            "target_language": "en",
            "pipeline": { "batch_size": 2, "mt_engine": "passthrough", "fuzzy_threshold": 0.9 },
            "log_level": "debug"
        }"#,
    )
    .unwrap();

    let config = Config::load_or_create(&path).unwrap();

    assert_eq!(config.pipeline.batch_size, 2);
    assert_eq!(config.pipeline.mt_engine, MtEngineKind::Passthrough);
    assert_eq!(config.pipeline.llm_editor, EditorKind::Anthropic);
    assert_eq!(config.pipeline.fuzzy_threshold, Some(0.9));
    assert_eq!(config.pipeline.retry_backoff_ms, 1000);
    assert_eq!(config.log_level, LogLevel::Debug);
}

/// Test an unparsable config file is an error, not a reset
#[test]
fn test_loadOrCreate_brokenFile_shouldFail() {
    let dir = common::create_temp_dir().unwrap();
    let path = common::create_test_file(dir.path(), "conf.json", "{ broken").unwrap();

    assert!(Config::load_or_create(&path).is_err());
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "{ broken");
}

/// Test the pipeline settings derived from the config
#[test]
fn test_pipelineSettings_fromConfig_shouldCarryValues() {
    let mut config = offline_config();
    config.pipeline.retry_backoff_ms = 250;
    config.pipeline.failure_marker = Some("[ERROR {index}]".to_string());

    let settings = PipelineSettings::from_config(&config);

    assert_eq!(settings.retry_backoff.as_millis(), 250);
    assert_eq!(settings.failure_marker.as_deref(), Some("[ERROR {index}]"));
    assert_eq!(settings.memory_path, Some(PathBuf::from("translation_memory.json")));
    assert!(settings.validate().is_ok());
}
