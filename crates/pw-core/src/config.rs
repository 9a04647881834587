//! Configuration structures for the pathwatch tool.
//!
//! - [`WatchConfig`] - latency window, recursion, granularity, exclusions
//! - [`OutputConfig`] - how normalized events are rendered
//! - [`Config`] - root configuration combining both
//!
//! Every type implements [`Default`] and deserializes with missing fields
//! filled from the defaults, so a configuration file only needs to name the
//! options it changes.

use std::time::Duration;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Largest accepted latency window, in milliseconds (one hour).
pub const MAX_LATENCY_MS: u64 = 60 * 60 * 1000;

/// How events are rendered by line-oriented sinks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// The changed path alone, one per line.
    #[default]
    Plain,
    /// The change kind followed by the path.
    Kind,
    /// One JSON object per line.
    Json,
}

/// Whether events are reported per path or per containing directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    /// Report paths exactly as the backend delivers them.
    #[default]
    Path,
    /// Report the directory containing each changed file.
    Directory,
}

/// Configuration for a watch session.
///
/// # Examples
///
/// ```
/// use pw_core::WatchConfig;
/// use std::time::Duration;
///
/// let config = WatchConfig::default();
/// assert_eq!(config.latency(), Duration::ZERO);
/// assert!(config.recursive);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Latency window in milliseconds.
    ///
    /// Events for the same path within this window are coalesced into one.
    /// Zero flushes every event as soon as it arrives.
    pub latency_ms: u64,

    /// Whether to watch subdirectories recursively.
    pub recursive: bool,

    /// Per-path or per-directory reporting.
    pub granularity: Granularity,

    /// Path prefixes or segments to drop, relative to the watched path.
    pub exclude: Vec<String>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            latency_ms: 0,
            recursive: true,
            granularity: Granularity::Path,
            exclude: Vec::new(),
        }
    }
}

impl WatchConfig {
    /// Returns the latency window as a [`Duration`].
    #[inline]
    #[must_use]
    pub const fn latency(&self) -> Duration {
        Duration::from_millis(self.latency_ms)
    }
}

/// Configuration for event output.
///
/// # Examples
///
/// ```
/// use pw_core::{OutputConfig, OutputFormat};
///
/// let config = OutputConfig::default();
/// assert_eq!(config.format, OutputFormat::Plain);
/// assert!(config.ready_line);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Line format.
    pub format: OutputFormat,

    /// Print `Initialized` once the watch is live.
    pub ready_line: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Plain,
            ready_line: true,
        }
    }
}

/// Root configuration for the pathwatch tool.
///
/// # Examples
///
/// ```
/// use pw_core::Config;
///
/// let config = Config::from_json_str(r#"{"watch": {"latency_ms": 250}}"#).unwrap();
/// assert_eq!(config.watch.latency_ms, 250);
/// assert!(config.watch.recursive);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Watch session configuration.
    pub watch: WatchConfig,

    /// Output configuration.
    pub output: OutputConfig,
}

impl Config {
    /// Parses and validates a JSON configuration document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed JSON and
    /// [`ConfigError::InvalidOption`] for values that fail validation.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotFound`] if the file does not exist, and the
    /// errors of [`from_json_str`](Self::from_json_str) otherwise.
    pub fn load(path: &Utf8Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_owned()));
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Checks option values that the type system cannot.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOption`] naming the first offending option.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.watch.latency_ms > MAX_LATENCY_MS {
            return Err(ConfigError::invalid_option(
                "watch.latency_ms",
                format!("must not exceed {MAX_LATENCY_MS}"),
            ));
        }
        if self.watch.exclude.iter().any(|p| p.trim().is_empty()) {
            return Err(ConfigError::invalid_option(
                "watch.exclude",
                "patterns must not be empty",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watch_config_defaults() {
        let config = WatchConfig::default();
        assert_eq!(config.latency_ms, 0);
        assert!(config.recursive);
        assert_eq!(config.granularity, Granularity::Path);
        assert!(config.exclude.is_empty());
    }

    #[test]
    fn test_output_config_defaults() {
        let config = OutputConfig::default();
        assert_eq!(config.format, OutputFormat::Plain);
        assert!(config.ready_line);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_config_deserialize_with_missing_fields() {
        let json = r#"{"output": {"format": "json"}, "watch": {"exclude": [".git"]}}"#;
        let config = Config::from_json_str(json).unwrap();
        assert_eq!(config.output.format, OutputFormat::Json);
        assert!(config.output.ready_line);
        assert_eq!(config.watch.exclude, vec![".git"]);
        assert_eq!(config.watch.latency_ms, 0);
    }

    #[test]
    fn test_config_rejects_large_latency() {
        let json = format!(r#"{{"watch": {{"latency_ms": {}}}}}"#, MAX_LATENCY_MS + 1);
        let err = Config::from_json_str(&json).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidOption { ref option, .. } if option == "watch.latency_ms"));
    }

    #[test]
    fn test_config_rejects_blank_exclude() {
        let err = Config::from_json_str(r#"{"watch": {"exclude": ["  "]}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidOption { .. }));
    }

    #[test]
    fn test_config_load_missing_file() {
        let err = Config::load(Utf8Path::new("/no/such/pathwatch.json")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_config_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("pathwatch.json");
        std::fs::write(&file, r#"{"watch": {"granularity": "directory", "recursive": false}}"#)
            .unwrap();
        let path = Utf8Path::from_path(&file).unwrap();

        let config = Config::load(path).unwrap();
        assert_eq!(config.watch.granularity, Granularity::Directory);
        assert!(!config.watch.recursive);
    }

    #[test]
    fn test_format_serialization() {
        assert_eq!(serde_json::to_string(&OutputFormat::Plain).unwrap(), r#""plain""#);
        assert_eq!(serde_json::to_string(&OutputFormat::Kind).unwrap(), r#""kind""#);
        assert_eq!(serde_json::to_string(&OutputFormat::Json).unwrap(), r#""json""#);
    }

    #[test]
    fn test_latency_duration() {
        let config = WatchConfig {
            latency_ms: 400,
            ..WatchConfig::default()
        };
        assert_eq!(config.latency(), Duration::from_millis(400));
    }
}
