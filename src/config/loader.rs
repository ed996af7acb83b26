// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::config::consts::{DEFAULT_LOG_FILTER, FALLBACK_MAX_CONCURRENCY};
use crate::errors::{FlowError, FlowResult};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Engine configuration.
///
/// Every field is optional, so an empty document is a valid config.
///
/// # Fields
/// * `executor_options` - Limits applied by sessions when invoking registered functions
/// * `log_filter` - `tracing` filter directive used by [`crate::observability::init_tracing`]
///
/// # Example
/// ```yaml
/// executor_options:
///   max_concurrency: 8
/// log_filter: "dataflow=debug"
/// ```
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub executor_options: ExecutorOptions,
    #[serde(default)]
    pub log_filter: Option<String>,
}

impl Config {
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER)
    }
}

/// Executor-specific configuration options.
///
/// # Fields
/// * `max_concurrency` - Maximum number of registered functions running at once across all
///   sessions of a flow. Defaults to the available parallelism.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ExecutorOptions {
    pub max_concurrency: Option<usize>,
}

impl ExecutorOptions {
    /// Resolved concurrency limit, never less than one.
    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(FALLBACK_MAX_CONCURRENCY)
            })
            .max(1)
    }
}

/// Supported config file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Toml,
}

impl ConfigFormat {
    /// Pick the format from the file extension.
    pub fn from_path(path: &Path) -> FlowResult<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => Ok(ConfigFormat::Yaml),
            Some("toml") => Ok(ConfigFormat::Toml),
            other => Err(FlowError::Config(format!(
                "unsupported config extension {:?} for '{}'",
                other.unwrap_or(""),
                path.display()
            ))),
        }
    }
}

pub fn parse_config(content: &str, format: ConfigFormat) -> FlowResult<Config> {
    match format {
        ConfigFormat::Yaml => {
            serde_yaml::from_str(content).map_err(|e| FlowError::Config(e.to_string()))
        }
        ConfigFormat::Toml => toml::from_str(content).map_err(|e| FlowError::Config(e.to_string())),
    }
}

/// Load a config from a YAML (`.yaml`, `.yml`) or TOML (`.toml`) file.
pub fn load_config<P: AsRef<Path>>(path: P) -> FlowResult<Config> {
    let path = path.as_ref();
    let format = ConfigFormat::from_path(path)?;
    let content = fs::read_to_string(path)
        .map_err(|e| FlowError::Config(format!("cannot read '{}': {}", path.display(), e)))?;
    parse_config(&content, format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::Builder;

    fn write_temp(suffix: &str, content: &str) -> tempfile::NamedTempFile {
        let mut file = Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn parse_basic_yaml_config() {
        let yaml = r#"
executor_options:
  max_concurrency: 3
log_filter: "dataflow=debug"
"#;

        let cfg = parse_config(yaml, ConfigFormat::Yaml).unwrap();
        assert_eq!(cfg.executor_options.max_concurrency, Some(3));
        assert_eq!(cfg.log_filter(), "dataflow=debug");
    }

    #[test]
    fn test_load_yaml_and_toml_files() {
        let yaml = write_temp(".yaml", "executor_options:\n  max_concurrency: 2\n");
        let toml = write_temp(".toml", "[executor_options]\nmax_concurrency = 5\n");

        let cfg = load_config(yaml.path()).unwrap();
        assert_eq!(cfg.executor_options.max_concurrency(), 2);

        let cfg = load_config(toml.path()).unwrap();
        assert_eq!(cfg.executor_options.max_concurrency(), 5);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let file = write_temp(".yml", "{}\n");
        let cfg = load_config(file.path()).unwrap();

        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.log_filter(), DEFAULT_LOG_FILTER);
        assert!(cfg.executor_options.max_concurrency() >= 1);
    }

    #[test]
    fn test_zero_concurrency_is_clamped() {
        let options = ExecutorOptions {
            max_concurrency: Some(0),
        };
        assert_eq!(options.max_concurrency(), 1);
    }

    #[test]
    fn test_unsupported_extension() {
        let file = write_temp(".json", "{}");
        let err = load_config(file.path()).unwrap_err();
        assert!(matches!(err, FlowError::Config(_)));
        assert!(err.to_string().contains("unsupported config extension"));
    }

    #[test]
    fn test_invalid_yaml_is_config_error() {
        let file = write_temp(".yaml", "executor_options: [unclosed\n");
        let err = load_config(file.path()).unwrap_err();
        assert!(matches!(err, FlowError::Config(_)));
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = load_config("/nonexistent/dataflow.yaml").unwrap_err();
        assert!(err.to_string().contains("cannot read"));
    }
}
