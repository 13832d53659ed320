//! Configuration loading

use launch_sniper::config::{Config, ExecutionMode, LedgerBackend};
use std::io::Write;
use tokio_test::assert_ok;

#[test]
fn test_example_config_file_loads() {
    let config = assert_ok!(Config::load("config.toml.example"));

    assert_eq!(config.execution.mode, ExecutionMode::Paper);
    assert_eq!(config.ledger.backend, LedgerBackend::Sqlite);
    assert_eq!(config.source.feeds.len(), 1);
    assert!(config.filters.min_sentiment.is_none());
}

#[test]
fn test_invalid_config_is_refused() {
    let example = std::fs::read_to_string("config.toml.example").unwrap();
    let broken = example.replace("size = 0.05", "size = 0");

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(broken.as_bytes()).unwrap();

    assert!(Config::load(file.path()).is_err());
}
