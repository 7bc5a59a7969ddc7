//! Configuration and CLI wiring tests
//!
//! Covers the file-backed pieces: config loading, the credential cache the
//! API is built with, and the `insert-links` command end to end.

use std::path::PathBuf;

use clap::Parser;
use tempfile::TempDir;
use zenedit::agent::Provider;
use zenedit::cli::{build_api, run_cli, Cli, EXIT_FAILURE, EXIT_SUCCESS};
use zenedit::ConfigManager;

fn write_config(dir: &TempDir, toml: &str) -> PathBuf {
    let path = dir.path().join("config.toml");
    std::fs::write(&path, toml).unwrap();
    path
}

// =============================================================================
// TEST A: Configuration file
// =============================================================================

#[test]
fn test_missing_config_is_created_with_defaults() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("nested").join("config.toml");

    let manager = ConfigManager::with_path(&path).unwrap();

    assert!(path.exists());
    let config = manager.get_config();
    assert_eq!(config.retry.max_retries, 3);
    assert_eq!(config.retry.base_delay_ms, 1000);
    assert_eq!(config.retry.multiplier, 2);
    assert_eq!(manager.token_file().unwrap(), temp.path().join("nested").join("token"));
}

#[test]
fn test_partial_config_keeps_defaults() {
    let temp = TempDir::new().unwrap();
    let path = write_config(
        &temp,
        r#"
[server]
base_url = "https://books.example.com/api"

[agent]
provider = "openai"

[retry]
max_retries = 1
"#,
    );

    let manager = ConfigManager::with_path(&path).unwrap();
    let config = manager.get_config();

    assert_eq!(config.server.base_url, "https://books.example.com/api");
    assert_eq!(config.server.request_timeout_seconds, 30);
    assert_eq!(config.agent.provider, Provider::OpenAi);
    let policy = config.retry.policy();
    assert_eq!(policy.max_retries, 1);
    assert_eq!(policy.delay_for(0).as_millis(), 1000);
}

#[test]
fn test_invalid_config_is_rejected() {
    let temp = TempDir::new().unwrap();
    let path = write_config(&temp, "[server]\nbase_url = \"ftp://books\"\n");
    assert!(ConfigManager::with_path(&path).is_err());

    let path = write_config(&temp, "[retry]\nmultiplier = 0\n");
    assert!(ConfigManager::with_path(&path).is_err());

    let path = write_config(&temp, "[server\n");
    assert!(ConfigManager::with_path(&path).is_err());
}

// =============================================================================
// TEST B: API built from configuration
// =============================================================================

#[test]
fn test_build_api_reads_cached_token() {
    let temp = TempDir::new().unwrap();
    let token_file = temp.path().join("creds").join("token");
    let path = write_config(
        &temp,
        &format!("[auth]\ntoken_file = {:?}\n", token_file.display().to_string()),
    );
    let manager = ConfigManager::with_path(&path).unwrap();

    let api = build_api(&manager).unwrap();
    assert!(!api.is_authenticated());

    std::fs::create_dir_all(token_file.parent().unwrap()).unwrap();
    std::fs::write(&token_file, "cached-token\n").unwrap();
    let api = build_api(&manager).unwrap();
    assert_eq!(api.credentials().token(), Some("cached-token"));
}

#[test]
fn test_build_api_prefers_override_token() {
    let temp = TempDir::new().unwrap();
    let path = write_config(&temp, "");
    let mut manager = ConfigManager::with_path(&path).unwrap();
    std::fs::write(manager.token_file().unwrap(), "from-file").unwrap();

    manager
        .apply_overrides_from(|key| (key == "ZENEDIT_TOKEN").then(|| "from-env".to_string()))
        .unwrap();
    let api = build_api(&manager).unwrap();

    assert_eq!(api.credentials().token(), Some("from-env"));
}

// =============================================================================
// TEST C: insert-links command
// =============================================================================

#[tokio::test]
async fn test_insert_links_command() {
    let temp = TempDir::new().unwrap();
    let config = ConfigManager::with_path(temp.path().join("config.toml")).unwrap();
    let chapter = temp.path().join("chapter.md");
    std::fs::write(&chapter, "# Chapter One\nIt was a dark night.\n").unwrap();

    let cli = Cli::try_parse_from([
        "zenedit",
        "insert-links",
        "--file",
        chapter.to_str().unwrap(),
        "https://img.example.com/a.png",
        "https://img.example.com/b.png",
    ])
    .unwrap();
    assert_eq!(run_cli(cli, config).await, EXIT_SUCCESS);

    let content = std::fs::read_to_string(&chapter).unwrap();
    assert!(content.starts_with("# Chapter One\n"));
    let a = content.find("![](https://img.example.com/a.png)").unwrap();
    let b = content.find("![](https://img.example.com/b.png)").unwrap();
    let body = content.find("It was a dark night.").unwrap();
    assert!(a < b && b < body, "links go after the heading, in order: {}", content);
}

#[tokio::test]
async fn test_insert_links_missing_file_fails() {
    let temp = TempDir::new().unwrap();
    let config = ConfigManager::with_path(temp.path().join("config.toml")).unwrap();
    let missing = temp.path().join("nope.md");

    let cli = Cli::try_parse_from([
        "zenedit",
        "insert-links",
        "--file",
        missing.to_str().unwrap(),
        "a.png",
    ])
    .unwrap();

    assert_eq!(run_cli(cli, config).await, EXIT_FAILURE);
}
