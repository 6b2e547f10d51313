//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::CapsuleConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<CapsuleConfig, ConfigError> {
    let config: CapsuleConfig = toml::from_str(content).map_err(ConfigError::Parse)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<CapsuleConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    let config = parse_config(&content)?;

    tracing::debug!(path = %path.display(), "Configuration file loaded");
    Ok(config)
}

/// Load the file when given, otherwise fall back to validated defaults.
pub fn load_or_default(path: Option<&Path>) -> Result<CapsuleConfig, ConfigError> {
    match path {
        Some(path) => load_config(path),
        None => {
            let config = CapsuleConfig::default();
            validate_config(&config).map_err(ConfigError::Validation)?;
            Ok(config)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join("chrono_capsule_loader_test.toml");
        fs::write(
            &path,
            "[chain]\ncontract_address = \"0x00000000000000000000000000000000000000aa\"\n",
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert!(config.chain.contract_address.ends_with("aa"));

        std::fs::remove_file(&path).unwrap_or_default();
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load_config(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_validation_error_display() {
        let err = parse_config("[chain]\nrpc_timeout_secs = 0\n").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Validation failed: chain.rpc_timeout_secs: must be positive"
        );
    }

    #[test]
    fn test_syntax_error_is_parse_error() {
        let err = parse_config("[chain\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
