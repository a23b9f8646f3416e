//! Configuration file loading: each phase reports its own error with the file path

use adscout::config::Config;
use adscout::error::AppError;
use std::io::Write;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file");
    file.write_all(content.as_bytes()).expect("write config");
    file
}

#[test]
fn test_loads_valid_file() {
    let file = write_config(
        r#"
[server]
port = 4000

[scraper]
search_limit = 10

[cache]
ttl_seconds = 120
"#,
    );

    let config = Config::from_file(file.path()).expect("config should load");
    assert_eq!(config.server.port, 4000);
    assert_eq!(config.scraper.search_limit, 10);
    assert_eq!(config.cache.ttl_seconds, 120);
    // Untouched sections keep their defaults
    assert_eq!(config.rate_limit.max_requests, 100);
}

#[test]
fn test_missing_file_is_read_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");

    let err = Config::from_file(&path).unwrap_err();
    assert!(matches!(err, AppError::ConfigFileRead { .. }));
    assert!(err.to_string().contains("absent.toml"));
}

#[test]
fn test_invalid_toml_is_parse_error() {
    let file = write_config("[server\nport = 1");

    let err = Config::from_file(file.path()).unwrap_err();
    assert!(matches!(err, AppError::ConfigParseFailed { .. }));
}

#[test]
fn test_wrong_type_is_parse_error() {
    let file = write_config("[server]\nport = \"eighty\"\n");

    let err = Config::from_file(file.path()).unwrap_err();
    assert!(matches!(err, AppError::ConfigParseFailed { .. }));
}

#[test]
fn test_invalid_value_is_validation_error_naming_key() {
    let file = write_config("[rate_limit]\nwindow_seconds = 0\n");

    let err = Config::from_file(file.path()).unwrap_err();
    match err {
        AppError::ConfigValidationFailed { path, reason } => {
            assert_eq!(path, file.path().display().to_string());
            assert!(reason.contains("rate_limit.window_seconds"), "{reason}");
        }
        other => panic!("expected validation failure, got {other:?}"),
    }
}

#[test]
fn test_redis_override_is_validated() {
    let file = write_config("");
    let mut config = Config::from_file(file.path()).unwrap();

    config.apply_env_overrides(|_| Some("memcached://localhost".to_string()));
    assert!(config.validate().is_err());
}

#[test]
fn test_generated_template_loads_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, adscout::cli::generate_config_template()).unwrap();

    let config = Config::from_file(&path).expect("template should load as a valid config");
    assert_eq!(config.classifier.model, "gpt-4-turbo-preview");
    assert_eq!(config.scraper.base_url, "https://api.firecrawl.dev/v1");
    assert!(config.cache.redis_url.is_none());
}
