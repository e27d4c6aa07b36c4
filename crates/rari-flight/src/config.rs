use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::FlightError;
use crate::request::RequestOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Development,
    Production,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Development => write!(f, "development"),
            Mode::Production => write!(f, "production"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Bytes buffered in a stream before it reports backpressure.
    pub high_water_mark: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self { high_water_mark: 16 * 1024 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlightConfig {
    pub identifier_prefix: String,
    pub mode: Mode,
    pub stream: StreamConfig,
}

impl FlightConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, FlightError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, FlightError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| FlightError::config(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), FlightError> {
        if self.stream.high_water_mark == 0 {
            return Err(FlightError::config("stream.high_water_mark must be greater than 0"));
        }
        Ok(())
    }

    pub fn is_development(&self) -> bool {
        self.mode == Mode::Development
    }

    pub fn to_request_options(&self) -> RequestOptions {
        RequestOptions::new()
            .with_identifier_prefix(self.identifier_prefix.clone())
            .with_debug(self.is_development())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = FlightConfig::default();
        assert_eq!(config.mode, Mode::Development);
        assert_eq!(config.stream.high_water_mark, 16 * 1024);
        assert!(config.identifier_prefix.is_empty());
    }

    #[test]
    fn test_from_toml() {
        let config = FlightConfig::from_toml_str(
            r#"
            identifier_prefix = "app"
            mode = "production"

            [stream]
            high_water_mark = 512
            "#,
        )
        .unwrap();
        assert_eq!(config.identifier_prefix, "app");
        assert_eq!(config.mode, Mode::Production);
        assert_eq!(config.stream.high_water_mark, 512);

        let options = config.to_request_options();
        assert_eq!(options.identifier_prefix, "app");
        assert!(!options.debug);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = FlightConfig::from_toml_str("mode = \"development\"").unwrap();
        assert_eq!(config.stream, StreamConfig::default());
        assert!(config.to_request_options().debug);
    }

    #[test]
    fn test_invalid_config() {
        let error = FlightConfig::from_toml_str("[stream]\nhigh_water_mark = 0").unwrap_err();
        assert_eq!(error.code(), "CONFIG_ERROR");
        assert!(FlightConfig::from_toml_str("mode = \"staging\"").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "identifier_prefix = \"r\"").unwrap();
        let config = FlightConfig::load(file.path()).unwrap();
        assert_eq!(config.identifier_prefix, "r");
        assert!(FlightConfig::load(file.path().with_extension("missing")).is_err());
    }

    #[test]
    fn test_mode_display() {
        assert_eq!(Mode::Production.to_string(), "production");
    }
}
