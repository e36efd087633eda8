//! # Config Loader
//!
//! Configuration loading and parsing module.
//!
//! Responsibilities:
//! - Parse TOML/JSON configuration files
//! - Validate configuration legality
//! - Generate `NotifierSettings`
//!
//! # Example
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let settings = ConfigLoader::load_from_path(Path::new("notifier.toml")).unwrap();
//! println!("Destination: {}", settings.url);
//! ```

mod parser;
mod validator;

pub use contracts::NotifierSettings;
pub use parser::ConfigFormat;
pub use validator::validate;

use contracts::ContractError;
use std::path::Path;

/// Configuration loader
///
/// Provides static methods to load configuration from files or strings.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from file path
    ///
    /// Automatically detects format from file extension (.toml / .json).
    ///
    /// # Errors
    /// - File read failure
    /// - Unsupported format
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_path(path: &Path) -> Result<NotifierSettings, ContractError> {
        let format = Self::detect_format(path)?;
        let content = Self::read_file(path)?;
        Self::load_from_str(&content, format)
    }

    /// Load configuration from string
    ///
    /// # Errors
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_str(
        content: &str,
        format: ConfigFormat,
    ) -> Result<NotifierSettings, ContractError> {
        let settings = parser::parse(content, format)?;
        validator::validate(&settings)?;
        Ok(settings)
    }

    /// Serialize NotifierSettings to TOML string
    pub fn to_toml(settings: &NotifierSettings) -> Result<String, ContractError> {
        toml::to_string_pretty(settings)
            .map_err(|e| ContractError::config_parse(format!("TOML serialize error: {e}")))
    }

    /// Serialize NotifierSettings to JSON string
    pub fn to_json(settings: &NotifierSettings) -> Result<String, ContractError> {
        serde_json::to_string_pretty(settings)
            .map_err(|e| ContractError::config_parse(format!("JSON serialize error: {e}")))
    }
}

impl ConfigLoader {
    /// Infer configuration format from file extension
    fn detect_format(path: &Path) -> Result<ConfigFormat, ContractError> {
        let ext = path.extension().and_then(|e| e.to_str()).ok_or_else(|| {
            ContractError::config_parse("cannot determine file format from extension")
        })?;

        ConfigFormat::from_extension(ext).ok_or_else(|| {
            ContractError::config_parse(format!("unsupported config format: .{ext}"))
        })
    }

    /// Read configuration file content
    fn read_file(path: &Path) -> Result<String, ContractError> {
        Ok(std::fs::read_to_string(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL_TOML: &str = r#"
url = "http://localhost:8080/notify"
"#;

    const FULL_TOML: &str = r#"
url = "https://hooks.example.com/notify"
interval_ms = 2000
max_buffer_size = 50
max_rps = 10
refill_tokens = 2
max_concurrency = 4
shutdown_grace_ms = 1500
request_timeout_ms = 800
"#;

    #[test]
    fn test_load_minimal_uses_defaults() {
        let settings = ConfigLoader::load_from_str(MINIMAL_TOML, ConfigFormat::Toml).unwrap();
        assert_eq!(
            settings,
            NotifierSettings::new("http://localhost:8080/notify")
        );
    }

    #[test]
    fn test_load_full_toml() {
        let settings = ConfigLoader::load_from_str(FULL_TOML, ConfigFormat::Toml).unwrap();
        assert_eq!(settings.max_buffer_size, 50);
        assert_eq!(settings.max_concurrency, 4);
        assert_eq!(settings.refill_tokens, 2);
        assert_eq!(settings.request_timeout_ms, Some(800));
    }

    #[test]
    fn test_round_trip_toml() {
        let settings = ConfigLoader::load_from_str(FULL_TOML, ConfigFormat::Toml).unwrap();
        let serialized = ConfigLoader::to_toml(&settings).unwrap();
        let reloaded = ConfigLoader::load_from_str(&serialized, ConfigFormat::Toml).unwrap();
        assert_eq!(settings, reloaded);
    }

    #[test]
    fn test_round_trip_json() {
        let settings = ConfigLoader::load_from_str(FULL_TOML, ConfigFormat::Toml).unwrap();
        let json = ConfigLoader::to_json(&settings).unwrap();
        let reloaded = ConfigLoader::load_from_str(&json, ConfigFormat::Json).unwrap();
        assert_eq!(settings, reloaded);
    }

    #[test]
    fn test_validation_runs_after_parse() {
        let content = r#"
url = "http://localhost/notify"
max_concurrency = 0
"#;
        let err = ConfigLoader::load_from_str(content, ConfigFormat::Toml).unwrap_err();
        assert!(err.to_string().contains("max_concurrency"));
    }

    #[test]
    fn test_load_from_path() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(FULL_TOML.as_bytes()).unwrap();

        let settings = ConfigLoader::load_from_path(file.path()).unwrap();
        assert_eq!(settings.url, "https://hooks.example.com/notify");
    }

    #[test]
    fn test_unsupported_extension() {
        let file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        let err = ConfigLoader::load_from_path(file.path()).unwrap_err();
        assert!(err.to_string().contains("unsupported config format"));
    }

    #[test]
    fn test_missing_file() {
        let err = ConfigLoader::load_from_path(Path::new("/nonexistent/notifier.toml"))
            .unwrap_err();
        assert!(matches!(err, ContractError::Io(_)));
    }
}
