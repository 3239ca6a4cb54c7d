use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use tracing::debug;

const DEFAULT_MANAGER_URL: &str = "ws://127.0.0.1:4320";
const DEFAULT_EP_NAME: &str = "epd";
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_LOG_FORMAT: &str = "compact";

fn default_capabilities() -> Vec<String> {
    vec!["actions".to_string()]
}

/// Enforcement-point configuration (`config.toml`, overridable per-field
/// from CLI flags and `EPD_*` environment variables).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EpConfig {
    /// WebSocket endpoint of the policy manager's bus.
    pub manager_url: String,
    /// Enforcement-point name announced at registration.
    pub name: String,
    /// Capability strings announced at registration. Each capability is
    /// also the signal name whose decisions this point receives.
    pub capabilities: Vec<String>,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Log format: "compact" or "json".
    pub log_format: String,
    /// Write logs to this file path (rotated daily). None = stdout only.
    pub log_file: Option<PathBuf>,
}

impl Default for EpConfig {
    fn default() -> Self {
        Self {
            manager_url: DEFAULT_MANAGER_URL.to_string(),
            name: DEFAULT_EP_NAME.to_string(),
            capabilities: default_capabilities(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_format: DEFAULT_LOG_FORMAT.to_string(),
            log_file: None,
        }
    }
}

impl EpConfig {
    /// Load configuration from `path`, falling back to defaults when no
    /// path is given or the file does not exist. A file that exists but
    /// does not parse is an error — better to refuse than to silently run
    /// misconfigured.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            debug!("no config file given — using defaults");
            return Ok(Self::default());
        };
        if !path.exists() {
            debug!(path = %path.display(), "config file not found — using defaults");
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        debug!(path = %path.display(), "config file loaded");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn defaults_without_file() {
        let config = EpConfig::load(None).unwrap();
        assert_eq!(config.manager_url, DEFAULT_MANAGER_URL);
        assert_eq!(config.name, "epd");
        assert_eq!(config.capabilities, vec!["actions".to_string()]);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = EpConfig::load(Some(Path::new("/nonexistent/config.toml"))).unwrap();
        assert_eq!(config.name, "epd");
    }

    #[test]
    fn partial_file_keeps_defaults_for_the_rest() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "name = \"backlight-ep\"\ncapabilities = [\"actions\", \"backlight\"]"
        )
        .unwrap();

        let config = EpConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.name, "backlight-ep");
        assert_eq!(
            config.capabilities,
            vec!["actions".to_string(), "backlight".to_string()]
        );
        assert_eq!(config.manager_url, DEFAULT_MANAGER_URL);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn unparseable_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "name = [this is not toml").unwrap();
        assert!(EpConfig::load(Some(file.path())).is_err());
    }
}
