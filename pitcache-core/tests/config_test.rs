//! Configuration loading from disk.

use pitcache_core::{HistoryConfig, HistoryError, RecursionStrategy};
use std::io::Write;

#[test]
fn loads_config_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[cache]
maximum_size = 2048

[recursion]
strategy = "continuous"
recursion_count = 30
"#
    )
    .unwrap();

    let config = HistoryConfig::from_file(file.path()).unwrap();
    assert_eq!(config.cache.maximum_size, Some(2048));
    assert_eq!(config.recursion.strategy, RecursionStrategy::Continuous);
    assert_eq!(config.recursion.recursion_count, 30);
    // untouched sections keep their defaults
    assert_eq!(config.diagnostics.large_recalculation_log_every, 100);
}

#[test]
fn missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = HistoryConfig::from_file(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, HistoryError::Io(_)));
}

#[test]
fn invalid_file_is_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[diagnostics]\nlarge_recalculation_log_every = 0").unwrap();
    let err = HistoryConfig::from_file(file.path()).unwrap_err();
    assert!(matches!(err, HistoryError::IllegalArgument(_)));

    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[recursion]\nstrategy = \"sideways\"").unwrap();
    let err = HistoryConfig::from_file(file.path()).unwrap_err();
    assert!(matches!(err, HistoryError::ConfigParse(_)));
}
