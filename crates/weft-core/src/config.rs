//! Layered configuration (C7): defaults, then an optional `.weft/config.toml`
//! under the repository root, then `WEFT_*` environment variables, then
//! whatever the host's CLI flags override last. This module only builds the
//! value; applying precedence across the four layers is the host's job
//! (see `weft-cli/src/commands`).

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub repo_path: PathBuf,
    pub max_parallel: u32,
    pub git_read_timeout: Duration,
    pub git_history_timeout: Duration,
    pub harness_name: String,
    pub harness_command: Vec<String>,
    pub control_bind_addr: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            repo_path: PathBuf::from("."),
            max_parallel: 1,
            git_read_timeout: Duration::from_secs(10),
            git_history_timeout: Duration::from_secs(30),
            harness_name: "subprocess".to_string(),
            harness_command: vec!["echo".to_string()],
            control_bind_addr: None,
        }
    }
}

/// On-disk shape of `.weft/config.toml`; every field optional so a partial
/// file only overrides what it names.
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    pub max_parallel: Option<u32>,
    pub git_read_timeout_secs: Option<u64>,
    pub git_history_timeout_secs: Option<u64>,
    pub harness_name: Option<String>,
    pub harness_command: Option<Vec<String>>,
    pub control_bind_addr: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("max_parallel must be at least 1, got {0}")]
    MaxParallelZero(u32),
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path} as TOML: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl Config {
    /// Applies a parsed config file on top of the current values.
    pub fn apply_file(mut self, file: ConfigFile) -> Result<Self, ConfigError> {
        if let Some(n) = file.max_parallel {
            self.max_parallel = n;
        }
        if let Some(s) = file.git_read_timeout_secs {
            self.git_read_timeout = Duration::from_secs(s);
        }
        if let Some(s) = file.git_history_timeout_secs {
            self.git_history_timeout = Duration::from_secs(s);
        }
        if let Some(n) = file.harness_name {
            self.harness_name = n;
        }
        if let Some(c) = file.harness_command {
            self.harness_command = c;
        }
        if let Some(a) = file.control_bind_addr {
            self.control_bind_addr = Some(a);
        }
        self.validate()
    }

    /// Applies `WEFT_MAX_PARALLEL`, `WEFT_HARNESS_NAME`, `WEFT_CONTROL_BIND_ADDR`
    /// from the process environment, if set.
    pub fn apply_env(mut self) -> Result<Self, ConfigError> {
        if let Ok(raw) = std::env::var("WEFT_MAX_PARALLEL") {
            if let Ok(n) = raw.parse() {
                self.max_parallel = n;
            }
        }
        if let Ok(name) = std::env::var("WEFT_HARNESS_NAME") {
            self.harness_name = name;
        }
        if let Ok(addr) = std::env::var("WEFT_CONTROL_BIND_ADDR") {
            self.control_bind_addr = Some(addr);
        }
        self.validate()
    }

    pub fn load_file(path: &std::path::Path) -> Result<Option<ConfigFile>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let file: ConfigFile = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Some(file))
    }

    fn validate(self) -> Result<Self, ConfigError> {
        if self.max_parallel == 0 {
            return Err(ConfigError::MaxParallelZero(self.max_parallel));
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_single_worker() {
        assert_eq!(Config::default().max_parallel, 1);
    }

    #[test]
    fn apply_file_overrides_only_named_fields() {
        let base = Config::default();
        let file = ConfigFile {
            max_parallel: Some(4),
            ..Default::default()
        };
        let merged = base.apply_file(file).unwrap();
        assert_eq!(merged.max_parallel, 4);
        assert_eq!(merged.harness_name, "subprocess");
    }

    #[test]
    fn zero_max_parallel_is_rejected() {
        let base = Config::default();
        let file = ConfigFile {
            max_parallel: Some(0),
            ..Default::default()
        };
        assert!(matches!(
            base.apply_file(file),
            Err(ConfigError::MaxParallelZero(0))
        ));
    }

    #[test]
    fn missing_config_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = Config::load_file(&dir.path().join("config.toml")).unwrap();
        assert!(result.is_none());
    }
}
