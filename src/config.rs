//! Configuration for donorflow paths and the executor.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (DONORFLOW_HOME)
//! 2. Config file (.donorflow/config.yaml)
//! 3. Defaults (~/.donorflow)
//!
//! Config file discovery:
//! - Searches current directory and parents for .donorflow/config.yaml
//! - Paths in config file are relative to the config file's parent directory

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<std::result::Result<ResolvedConfig, String>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub executor: Option<ExecutorConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Engine state directory (relative to config file)
    pub home: Option<String>,
    /// Change journal file (relative to config file)
    pub journal: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutorConfig {
    pub poll_seconds: Option<u64>,
    pub batch_size: Option<usize>,
    pub stuck_timeout_minutes: Option<i64>,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Absolute path to donorflow home (engine state)
    pub home: PathBuf,
    /// Absolute path to the change journal
    pub journal_path: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    /// Executor settings
    pub executor: ExecutorDefaults,
}

#[derive(Debug, Clone)]
pub struct ExecutorDefaults {
    pub poll_seconds: u64,
    pub batch_size: usize,
    pub stuck_timeout_minutes: i64,
}

impl Default for ExecutorDefaults {
    fn default() -> Self {
        Self {
            poll_seconds: 60,
            batch_size: 25,
            stuck_timeout_minutes: 30,
        }
    }
}

/// Get the resolved configuration, loading it on first access.
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load().map_err(|e| e.to_string()));
    match result {
        Ok(config) => Ok(config),
        Err(msg) => anyhow::bail!("configuration error: {}", msg),
    }
}

/// The donorflow home directory (engine state).
pub fn donorflow_home() -> Result<PathBuf> {
    Ok(config()?.home.clone())
}

/// The change journal path.
pub fn journal_path() -> Result<PathBuf> {
    Ok(config()?.journal_path.clone())
}

fn load() -> Result<ResolvedConfig> {
    let config_file = discover_config_file();
    let parsed = match &config_file {
        Some(path) => Some(parse_config_file(path)?),
        None => None,
    };
    let config_dir = config_file
        .as_ref()
        .and_then(|p| p.parent())
        .and_then(|p| p.parent())
        .map(Path::to_path_buf);

    // Home: env var beats config file beats ~/.donorflow
    let home = if let Ok(home) = std::env::var("DONORFLOW_HOME") {
        PathBuf::from(home)
    } else if let Some(rel) = parsed.as_ref().and_then(|c| c.paths.home.as_ref()) {
        resolve_relative(config_dir.as_deref(), rel)
    } else {
        dirs::home_dir()
            .context("could not determine home directory")?
            .join(".donorflow")
    };

    let journal_path = if let Some(rel) = parsed.as_ref().and_then(|c| c.paths.journal.as_ref()) {
        resolve_relative(config_dir.as_deref(), rel)
    } else {
        home.join("changes.jsonl")
    };

    let mut executor = ExecutorDefaults::default();
    if let Some(e) = parsed.as_ref().and_then(|c| c.executor.as_ref()) {
        if let Some(v) = e.poll_seconds {
            executor.poll_seconds = v;
        }
        if let Some(v) = e.batch_size {
            executor.batch_size = v;
        }
        if let Some(v) = e.stuck_timeout_minutes {
            executor.stuck_timeout_minutes = v;
        }
    }

    Ok(ResolvedConfig {
        home,
        journal_path,
        config_file,
        executor,
    })
}

fn parse_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    serde_yaml::from_str(&content)
        .with_context(|| format!("failed to parse config file: {}", path.display()))
}

/// Walk up from the current directory looking for .donorflow/config.yaml.
fn discover_config_file() -> Option<PathBuf> {
    let mut dir = std::env::current_dir().ok()?;
    loop {
        let candidate = dir.join(".donorflow").join("config.yaml");
        if candidate.is_file() {
            return Some(candidate);
        }
        if !dir.pop() {
            return None;
        }
    }
}

fn resolve_relative(base: Option<&Path>, path: &str) -> PathBuf {
    let p = PathBuf::from(path);
    if p.is_absolute() {
        return p;
    }
    match base {
        Some(base) => base.join(p),
        None => p,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config_file_schema() {
        let yaml = r#"
version: "1"
paths:
  home: .donorflow/state
  journal: .donorflow/state/changes.jsonl
executor:
  poll_seconds: 15
  batch_size: 10
  stuck_timeout_minutes: 5
"#;
        let parsed: ConfigFile = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(parsed.version, "1");
        assert_eq!(parsed.paths.home.as_deref(), Some(".donorflow/state"));
        let executor = parsed.executor.unwrap();
        assert_eq!(executor.poll_seconds, Some(15));
        assert_eq!(executor.batch_size, Some(10));
        assert_eq!(executor.stuck_timeout_minutes, Some(5));
    }

    #[test]
    fn test_minimal_config_file() {
        let parsed: ConfigFile = serde_yaml::from_str("version: \"1\"\n").unwrap();
        assert!(parsed.paths.home.is_none());
        assert!(parsed.executor.is_none());
    }

    #[test]
    fn test_resolve_relative() {
        let base = PathBuf::from("/srv/app");
        assert_eq!(
            resolve_relative(Some(&base), "data/changes.jsonl"),
            PathBuf::from("/srv/app/data/changes.jsonl")
        );
        assert_eq!(
            resolve_relative(Some(&base), "/var/lib/donorflow.jsonl"),
            PathBuf::from("/var/lib/donorflow.jsonl")
        );
    }
}
