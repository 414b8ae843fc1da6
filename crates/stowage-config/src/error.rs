//! Configuration errors

use thiserror::Error;

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration text is not valid TOML for this schema
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    /// A field holds a value outside its allowed domain
    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    /// A required field was not supplied or is blank
    #[error("Missing configuration value: {0}")]
    Missing(String),
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn missing(field: impl Into<String>) -> Self {
        Self::Missing(field.into())
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_value_message() {
        let err = ConfigError::invalid("region", "mars-1");
        assert_eq!(err.to_string(), "Invalid value for region: mars-1");
    }

    #[test]
    fn test_missing_value_message() {
        let err = ConfigError::missing("tables.bundles");
        assert_eq!(err.to_string(), "Missing configuration value: tables.bundles");
    }

    #[test]
    fn test_toml_error_converts() {
        let toml_err = toml::from_str::<toml::Table>("= 1").unwrap_err();
        let err: ConfigError = toml_err.into();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
