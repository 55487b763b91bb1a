//! refwatch.yaml configuration

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "refwatch.yaml";
pub const DEFAULT_STATUS_FILE: &str = "refwatch.status.yaml";

/// Root of the configuration file. Paths are relative to the file's directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Glob patterns of source files to scan
    pub sources: Vec<String>,
    #[serde(default = "default_status_file")]
    pub status_file: PathBuf,
    /// Per-request timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub github: GithubConfig,
    #[serde(default)]
    pub stackexchange: StackExchangeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GithubConfig {
    pub enabled: bool,
    pub api_url: String,
    /// Parallel requests, GitHub has no multi-issue endpoint
    pub concurrency: usize,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_url: "https://api.github.com".to_string(),
            concurrency: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StackExchangeConfig {
    pub enabled: bool,
    pub api_url: String,
    /// API key, raises the daily quota
    pub key: Option<String>,
}

impl Default for StackExchangeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_url: "https://api.stackexchange.com/2.3".to_string(),
            key: None,
        }
    }
}

fn default_status_file() -> PathBuf {
    PathBuf::from(DEFAULT_STATUS_FILE)
}

fn default_timeout_ms() -> u64 {
    20_000
}

impl Config {
    pub async fn load(path: &Path) -> Result<Self> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                bail!("No config file at {} (run `refwatch init`)", path.display())
            }
            Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
        };
        Self::parse(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(content)?;
        if config.sources.is_empty() {
            bail!("`sources` must list at least one glob pattern");
        }
        Ok(config)
    }

    /// Starting point written by `refwatch init`.
    pub fn template() -> Self {
        Self {
            sources: vec!["src/**/*.rs".to_string()],
            status_file: default_status_file(),
            timeout_ms: default_timeout_ms(),
            github: GithubConfig::default(),
            stackexchange: StackExchangeConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_defaults() {
        let config = Config::parse("sources:\n  - \"**/*.py\"\n").unwrap();
        assert_eq!(config.sources, vec!["**/*.py"]);
        assert_eq!(config.status_file, PathBuf::from(DEFAULT_STATUS_FILE));
        assert_eq!(config.timeout_ms, 20_000);
        assert!(config.github.enabled);
        assert_eq!(config.stackexchange.api_url, "https://api.stackexchange.com/2.3");
        assert!(config.stackexchange.key.is_none());
    }

    #[test]
    fn test_partial_section() {
        let yaml = "sources: [\"src/*.rs\"]\ngithub:\n  enabled: false\n";
        let config = Config::parse(yaml).unwrap();
        assert!(!config.github.enabled);
        assert_eq!(config.github.api_url, "https://api.github.com");
        assert_eq!(config.github.concurrency, 4);
    }

    #[test]
    fn test_rejects_empty_sources_and_unknown_keys() {
        assert!(Config::parse("sources: []\n").is_err());
        assert!(Config::parse("sources: [\"a\"]\ncolour: blue\n").is_err());
    }

    #[test]
    fn test_template_round_trip() {
        let yaml = serde_yaml::to_string(&Config::template()).unwrap();
        let config = Config::parse(&yaml).unwrap();
        assert_eq!(config.sources, vec!["src/**/*.rs"]);
    }

    #[tokio::test]
    async fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(&dir.path().join("refwatch.yaml")).await.unwrap_err();
        assert!(err.to_string().contains("No config file"));
    }
}
