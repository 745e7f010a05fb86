//! Scanner configuration.
//!
//! A [`ScannerConfig`] is passed explicitly when connecting. It can be built in
//! code or loaded from YAML; every field has a default, so a YAML document only
//! needs the values it overrides:
//!
//! ```yaml
//! connect_timeout_ms: 5000
//! read_timeout_ms: 2000
//! log_level: warning
//! recording:
//!   compression_level: 6
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::diagnostics::LogLevel;
use crate::transport::{DEFAULT_PORT, DEFAULT_TLS_PORT};
use crate::{Result, ScannerError};

/// Settings for one scanner instance and the streams it opens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    pub connect_timeout_ms: u64,
    /// Bound on each synchronous read; `None` waits indefinitely.
    pub read_timeout_ms: Option<u64>,
    pub default_port: u16,
    pub default_tls_port: u16,
    /// Threshold of the scanner's diagnostic listeners.
    pub log_level: LogLevel,
    pub recording: RecordingConfig,
}

/// Settings for recordings written from live streams.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// gzip level, 0 (store) to 9 (best).
    pub compression_level: u32,
    /// Relative tolerance when deciding whether the scan pattern changed.
    pub scan_pattern_tolerance: f32,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 30_000,
            read_timeout_ms: None,
            default_port: DEFAULT_PORT,
            default_tls_port: DEFAULT_TLS_PORT,
            log_level: LogLevel::Info,
            recording: RecordingConfig::default(),
        }
    }
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self { compression_level: 1, scan_pattern_tolerance: 1e-5 }
    }
}

impl ScannerConfig {
    /// Parses a YAML document and validates it.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: ScannerConfig = serde_yaml_ng::from_str(yaml).map_err(|e| ScannerError::Config {
            reason: "failed to parse scanner configuration".to_string(),
            source: Some(Box::new(e)),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| ScannerError::file_error(path.to_path_buf(), e))?;
        Self::from_yaml_str(&yaml)
    }

    pub fn validate(&self) -> Result<()> {
        if self.connect_timeout_ms == 0 {
            return Err(config_error("connect_timeout_ms must be greater than zero"));
        }
        if self.read_timeout_ms == Some(0) {
            return Err(config_error("read_timeout_ms must be greater than zero when set"));
        }
        if self.recording.compression_level > 9 {
            return Err(config_error(format!(
                "recording.compression_level must be between 0 and 9, got {}",
                self.recording.compression_level
            )));
        }
        let tolerance = self.recording.scan_pattern_tolerance;
        if tolerance.is_nan() || tolerance < 0.0 {
            return Err(config_error("recording.scan_pattern_tolerance must be non-negative"));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_ms.map(Duration::from_millis)
    }
}

fn config_error(reason: impl Into<String>) -> ScannerError {
    ScannerError::Config { reason: reason.into(), source: None }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_protocol() {
        let config = ScannerConfig::default();
        assert_eq!(config.default_port, 8000);
        assert_eq!(config.default_tls_port, 8800);
        assert_eq!(config.connect_timeout(), Duration::from_secs(30));
        assert_eq!(config.read_timeout(), None);
        assert_eq!(config.recording.compression_level, 1);
        config.validate().unwrap();
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config = ScannerConfig::from_yaml_str(
            "connect_timeout_ms: 1000\nlog_level: warning\nrecording:\n  compression_level: 6\n",
        )
        .unwrap();

        assert_eq!(config.connect_timeout(), Duration::from_secs(1));
        assert_eq!(config.log_level, LogLevel::Warning);
        assert_eq!(config.recording.compression_level, 6);
        assert_eq!(config.recording.scan_pattern_tolerance, 1e-5);
        assert_eq!(config.default_port, DEFAULT_PORT);
    }

    #[test]
    fn invalid_values_are_rejected() {
        for yaml in [
            "connect_timeout_ms: 0",
            "read_timeout_ms: 0",
            "recording:\n  compression_level: 12",
            "recording:\n  scan_pattern_tolerance: -1.0",
            "log_level: chatty",
        ] {
            let err = ScannerConfig::from_yaml_str(yaml).unwrap_err();
            assert!(matches!(err, ScannerError::Config { .. }), "{yaml}");
        }
    }

    #[test]
    fn load_reads_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scanner.yaml");
        std::fs::write(&path, "read_timeout_ms: 250\n").unwrap();

        let config = ScannerConfig::load(&path).unwrap();
        assert_eq!(config.read_timeout(), Some(Duration::from_millis(250)));

        let missing = ScannerConfig::load(dir.path().join("missing.yaml")).unwrap_err();
        assert!(matches!(missing, ScannerError::File { .. }));
    }
}
